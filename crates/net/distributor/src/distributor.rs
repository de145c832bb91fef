use crate::{
    inflight::InFlightTable, metrics::DistributorMetrics, DistributorConfig,
};
use alloy_primitives::Bytes;
use lantern_api::{PeerTransport, RawRequest, RawResponse, RequestError, RequestResult};
use lantern_network_types::{DisconnectCause, LightPeer, RequestKind, PROTOCOL_VERSION};
use lantern_pool::ServerPool;
use lantern_primitives::PeerId;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, trace};

/// The mutable context of one logical request across its attempts.
///
/// Owned by the caller so exclusions accumulated by the distributor carry
/// over when the caller redistributes after a failed validation.
#[derive(Debug)]
pub struct Distribution {
    kind: RequestKind,
    payload: Bytes,
    min_version: u32,
    exclude: HashSet<PeerId>,
    attempts_left: Option<u32>,
}

impl Distribution {
    /// Creates the context for a new logical request.
    pub fn new(kind: RequestKind, payload: Bytes) -> Self {
        Self {
            kind,
            payload,
            min_version: PROTOCOL_VERSION,
            exclude: HashSet::new(),
            attempts_left: None,
        }
    }

    /// Caps the number of peers tried.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts_left = Some(attempts);
        self
    }

    /// Requires peers to speak at least this protocol version.
    pub const fn with_min_version(mut self, min_version: u32) -> Self {
        self.min_version = min_version;
        self
    }

    /// Excludes a peer from all further attempts.
    pub fn exclude(&mut self, id: PeerId) {
        self.exclude.insert(id);
    }

    /// Peers tried or excluded so far.
    pub const fn tried(&self) -> &HashSet<PeerId> {
        &self.exclude
    }

    /// Returns `true` once the attempt bound is used up.
    pub fn exhausted(&self) -> bool {
        self.attempts_left == Some(0)
    }
}

/// A raw answer delivered by some peer, before verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    /// The peer that answered.
    pub peer: PeerId,
    /// The unverified response payload.
    pub payload: Bytes,
    /// Round-trip time of the answered attempt.
    pub elapsed: Duration,
}

/// Schedules logical requests onto eligible peers.
///
/// One dispatch is in flight per logical request at any time: a retry
/// replaces the previous attempt instead of duplicating it. Concurrent
/// logical requests contend for per-(peer, kind) pipeline slots, so one
/// slow transfer cannot queue unrelated requests behind it on the same
/// peer.
#[derive(Debug)]
pub struct RequestDistributor<T> {
    transport: T,
    pool: Arc<ServerPool>,
    config: DistributorConfig,
    inflight: InFlightTable,
    slots: Mutex<HashMap<(PeerId, RequestKind), Arc<Semaphore>>>,
    metrics: DistributorMetrics,
}

impl<T: PeerTransport> RequestDistributor<T> {
    /// Creates a distributor selecting peers from `pool`.
    pub fn new(transport: T, pool: Arc<ServerPool>, config: DistributorConfig) -> Self {
        let metrics = DistributorMetrics::default();
        let inflight = InFlightTable::new(metrics.in_flight.clone());
        Self { transport, pool, config, inflight, slots: Mutex::new(HashMap::new()), metrics }
    }

    /// The pool this distributor selects from.
    pub fn pool(&self) -> &Arc<ServerPool> {
        &self.pool
    }

    /// Requests currently awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Dispatches the request until a peer answers or attempts run out.
    ///
    /// Timeouts and disconnects are absorbed: the failing peer is penalized,
    /// excluded, and the request moves to the next eligible peer. The first
    /// raw answer is returned unverified; callers that reject it may call
    /// `distribute` again with the same context to keep the exclusion set
    /// and attempt accounting. Dropping the returned future withdraws the
    /// request and suppresses its late response.
    pub async fn distribute(&self, dist: &mut Distribution) -> RequestResult<Delivered> {
        if dist.attempts_left.is_none() {
            dist.attempts_left = Some(self.config.max_attempts);
        }
        let mut last_error = RequestError::NoPeers;
        while dist.attempts_left != Some(0) {
            let (peer, permit) = self.acquire_peer(dist).await?;
            dist.attempts_left = dist.attempts_left.map(|left| left - 1);
            dist.exclude.insert(peer.id());

            match self.dispatch(&peer, dist.kind, dist.payload.clone(), permit).await {
                Ok(delivered) => return Ok(delivered),
                Err(err) => {
                    debug!(
                        target: "net::distributor",
                        peer = %peer.id(),
                        kind = %dist.kind,
                        %err,
                        "attempt failed, redistributing"
                    );
                    if matches!(err, RequestError::Timeout) {
                        self.pool.report_timeout(&peer.id());
                    }
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }

    /// Delivery entry point for the transport layer.
    ///
    /// Responses that match no in-flight request are dropped without any
    /// score effect.
    pub fn on_response(&self, peer: &PeerId, response: RawResponse) {
        if !self.inflight.resolve(peer, response.id, response.payload) {
            self.metrics.unsolicited.increment(1);
            trace!(
                target: "net::distributor",
                peer = %peer,
                id = response.id,
                "discarding unmatched response"
            );
        }
    }

    /// Disconnect entry point for the transport layer.
    ///
    /// Every request in flight on the peer fails over to another peer
    /// immediately instead of waiting out its deadline.
    pub fn on_disconnect(&self, peer: &PeerId, cause: DisconnectCause) {
        let failed = self.inflight.fail_peer(peer);
        self.slots.lock().retain(|(id, _), _| id != peer);
        self.pool.disconnected(peer, cause);
        if failed > 0 {
            debug!(
                target: "net::distributor",
                peer = %peer,
                failed,
                "failed in-flight requests of disconnected peer"
            );
        }
    }

    /// One wire round trip on a chosen peer.
    async fn dispatch(
        &self,
        peer: &Arc<LightPeer>,
        kind: RequestKind,
        payload: Bytes,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) -> RequestResult<Delivered> {
        let _permit = permit;
        let id = peer.next_request_id();
        let (tx, rx) = oneshot::channel();
        let _guard = self.inflight.insert(peer.id(), id, tx);

        trace!(target: "net::distributor", peer = %peer.id(), %kind, id, "dispatching request");
        self.metrics.dispatched.increment(1);
        self.transport
            .send_request(peer.clone(), RawRequest { id, kind, payload })
            .await
            .map_err(|_| RequestError::Disconnected)?;

        let deadline = self.config.deadline(peer.response_time_estimate());
        let started = Instant::now();
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(Ok(payload))) => {
                let elapsed = started.elapsed();
                peer.observe_response_time(elapsed);
                Ok(Delivered { peer: peer.id(), payload, elapsed })
            }
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(_)) => Err(RequestError::ChannelClosed),
            Err(_) => {
                self.metrics.timeouts.increment(1);
                Err(RequestError::Timeout)
            }
        }
    }

    /// Waits for the best eligible peer with a free pipeline slot.
    ///
    /// Bounded: re-checks on an interval and gives up once the patience
    /// window closes.
    async fn acquire_peer(
        &self,
        dist: &Distribution,
    ) -> RequestResult<(Arc<LightPeer>, tokio::sync::OwnedSemaphorePermit)> {
        let patience = Instant::now() + self.config.selection_patience;
        loop {
            let ranked = self.pool.ranked_peers(&dist.exclude, |peer| {
                peer.version() >= dist.min_version && peer.serves(dist.kind)
            });
            for peer in ranked {
                if let Ok(permit) = self.slot(peer.id(), dist.kind).try_acquire_owned() {
                    return Ok((peer, permit))
                }
            }
            if Instant::now() >= patience {
                return Err(RequestError::NoPeers)
            }
            tokio::time::sleep(self.config.selection_interval).await;
        }
    }

    fn slot(&self, peer: PeerId, kind: RequestKind) -> Arc<Semaphore> {
        self.slots
            .lock()
            .entry((peer, kind))
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.pipeline_depth)))
            .clone()
    }
}
