use alloy_primitives::Bytes;
use lantern_api::{RequestError, RequestResult};
use lantern_primitives::PeerId;
use metrics::Gauge;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};

pub(crate) type ResponseSender = tokio::sync::oneshot::Sender<RequestResult<Bytes>>;

/// Requests awaiting a response, keyed by `(peer, request id)`.
///
/// Entries are removed on resolution, on peer disconnect, and when the
/// owning [`InFlightGuard`] drops. A key whose entry is gone resolves
/// nothing: late responses fall through without effect.
#[derive(Clone)]
pub(crate) struct InFlightTable {
    inner: Arc<Mutex<HashMap<(PeerId, u64), ResponseSender>>>,
    gauge: Gauge,
}

impl std::fmt::Debug for InFlightTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightTable").field("len", &self.len()).finish_non_exhaustive()
    }
}

impl InFlightTable {
    pub(crate) fn new(gauge: Gauge) -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())), gauge }
    }

    /// Tracks a dispatched request until the returned guard drops.
    pub(crate) fn insert(&self, peer: PeerId, id: u64, tx: ResponseSender) -> InFlightGuard {
        self.inner.lock().insert((peer, id), tx);
        self.gauge.increment(1.0);
        InFlightGuard { table: self.clone(), key: (peer, id) }
    }

    /// Delivers a response payload to the waiting request, if any.
    pub(crate) fn resolve(&self, peer: &PeerId, id: u64, payload: Bytes) -> bool {
        let Some(tx) = self.inner.lock().remove(&(*peer, id)) else { return false };
        self.gauge.decrement(1.0);
        // the receiver may have been dropped concurrently; nothing to do
        let _ = tx.send(Ok(payload));
        true
    }

    /// Fails every in-flight request on the given peer.
    pub(crate) fn fail_peer(&self, peer: &PeerId) -> usize {
        let mut inner = self.inner.lock();
        let keys: Vec<_> = inner.keys().filter(|(p, _)| p == peer).copied().collect();
        for key in &keys {
            if let Some(tx) = inner.remove(key) {
                self.gauge.decrement(1.0);
                let _ = tx.send(Err(RequestError::Disconnected));
            }
        }
        keys.len()
    }

    /// Number of requests currently in flight.
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }

    fn remove(&self, key: &(PeerId, u64)) {
        if self.inner.lock().remove(key).is_some() {
            self.gauge.decrement(1.0);
        }
    }
}

/// Removes the tracked entry when the owning request completes or is
/// withdrawn.
#[derive(Debug)]
pub(crate) struct InFlightGuard {
    table: InFlightTable,
    key: (PeerId, u64),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.table.remove(&self.key);
    }
}
