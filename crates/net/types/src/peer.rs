use crate::{Capabilities, RequestKind};
use lantern_primitives::PeerId;
use parking_lot::Mutex;
use std::{
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::Duration,
};

/// The protocol version this node speaks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Initial response-time estimate for a peer we have not measured yet.
const DEFAULT_RESPONSE_TIME: Duration = Duration::from_millis(500);

/// A connected light-protocol peer.
///
/// Owned by the [`PeerSet`](crate::PeerSet); the distributor and pool hold
/// references. The wire connection itself lives in the transport layer, this
/// object only tracks the protocol-level state the retrieval core needs.
#[derive(Debug)]
pub struct LightPeer {
    id: PeerId,
    version: u32,
    capabilities: Capabilities,
    /// Message ids must be unique per peer lifetime.
    next_request_id: AtomicU64,
    closed: AtomicBool,
    /// Rolling estimate of this peer's response latency, updated on every
    /// completed round trip.
    response_time: Mutex<Duration>,
}

impl LightPeer {
    /// Creates a peer record for a freshly established connection.
    pub fn new(id: PeerId, version: u32, capabilities: Capabilities) -> Self {
        Self {
            id,
            version,
            capabilities,
            next_request_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            response_time: Mutex::new(DEFAULT_RESPONSE_TIME),
        }
    }

    /// The peer's network identity.
    pub const fn id(&self) -> PeerId {
        self.id
    }

    /// Negotiated protocol version.
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Advertised capability set.
    pub const fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Returns `true` if the peer advertises support for `kind`.
    pub const fn serves(&self, kind: RequestKind) -> bool {
        self.capabilities.serves(kind)
    }

    /// Reserves the next request id on this connection.
    pub fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Marks the connection as closed. Idempotent.
    pub fn set_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Whether the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Folds an observed round-trip time into the rolling estimate.
    pub fn observe_response_time(&self, observed: Duration) {
        let mut estimate = self.response_time.lock();
        // weighted 3:1 toward history, like a classic RTT estimator
        *estimate = (*estimate * 3 + observed) / 4;
    }

    /// Current response-time estimate.
    pub fn response_time_estimate(&self) -> Duration {
        *self.response_time.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_monotonic() {
        let peer = LightPeer::new(PeerId::random(), PROTOCOL_VERSION, Capabilities::full());
        let a = peer.next_request_id();
        let b = peer.next_request_id();
        let c = peer.next_request_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn response_time_moves_toward_observations() {
        let peer = LightPeer::new(PeerId::random(), PROTOCOL_VERSION, Capabilities::full());
        let initial = peer.response_time_estimate();

        for _ in 0..8 {
            peer.observe_response_time(Duration::from_millis(100));
        }
        let fast = peer.response_time_estimate();
        assert!(fast < initial);

        for _ in 0..8 {
            peer.observe_response_time(Duration::from_secs(2));
        }
        assert!(peer.response_time_estimate() > fast);
    }

    #[test]
    fn closed_flag_is_sticky() {
        let peer = LightPeer::new(PeerId::random(), PROTOCOL_VERSION, Capabilities::full());
        assert!(!peer.is_closed());
        peer.set_closed();
        peer.set_closed();
        assert!(peer.is_closed());
    }
}
