use crate::LightPeer;
use lantern_primitives::PeerId;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use tracing::trace;

/// Errors returned when mutating the [`PeerSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PeerSetError {
    /// A peer with the same id is already registered.
    #[error("peer is already registered")]
    AlreadyRegistered,
    /// The peer was marked closed before registration completed.
    #[error("peer connection is closed")]
    Closed,
}

/// Registry of currently connected peers.
///
/// Internally synchronized; handles are cheap to clone. Members are
/// reference counted so in-flight requests can outlive unregistration
/// without keeping the peer selectable.
#[derive(Debug, Default, Clone)]
pub struct PeerSet {
    inner: Arc<RwLock<HashMap<PeerId, Arc<LightPeer>>>>,
}

impl PeerSet {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connected peer to the registry.
    pub fn register(&self, peer: Arc<LightPeer>) -> Result<(), PeerSetError> {
        if peer.is_closed() {
            return Err(PeerSetError::Closed)
        }
        let mut inner = self.inner.write();
        if inner.contains_key(&peer.id()) {
            return Err(PeerSetError::AlreadyRegistered)
        }
        trace!(target: "net::peers", peer = %peer.id(), "registered peer");
        inner.insert(peer.id(), peer);
        Ok(())
    }

    /// Removes a peer, marking it closed, and returns it if it was present.
    pub fn unregister(&self, id: &PeerId) -> Option<Arc<LightPeer>> {
        let peer = self.inner.write().remove(id)?;
        peer.set_closed();
        trace!(target: "net::peers", peer = %id, "unregistered peer");
        Some(peer)
    }

    /// Looks up a peer by id.
    pub fn peer(&self, id: &PeerId) -> Option<Arc<LightPeer>> {
        self.inner.read().get(id).cloned()
    }

    /// Number of registered peers.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns `true` if no peers are connected.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Snapshot of all peers matching `predicate`.
    pub fn filtered(&self, predicate: impl Fn(&LightPeer) -> bool) -> Vec<Arc<LightPeer>> {
        self.inner.read().values().filter(|peer| predicate(peer)).cloned().collect()
    }

    /// Snapshot of all registered peers.
    pub fn all(&self) -> Vec<Arc<LightPeer>> {
        self.inner.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Capabilities, PROTOCOL_VERSION};

    fn peer() -> Arc<LightPeer> {
        Arc::new(LightPeer::new(PeerId::random(), PROTOCOL_VERSION, Capabilities::full()))
    }

    #[test]
    fn register_is_exclusive_per_id() {
        let set = PeerSet::new();
        let p = peer();
        set.register(p.clone()).unwrap();

        let dup = Arc::new(LightPeer::new(p.id(), PROTOCOL_VERSION, Capabilities::full()));
        assert_eq!(set.register(dup), Err(PeerSetError::AlreadyRegistered));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn unregister_closes_the_peer() {
        let set = PeerSet::new();
        let p = peer();
        set.register(p.clone()).unwrap();

        let removed = set.unregister(&p.id()).unwrap();
        assert!(removed.is_closed());
        assert!(set.is_empty());
        assert!(set.unregister(&p.id()).is_none());
    }

    #[test]
    fn closed_peers_are_rejected() {
        let set = PeerSet::new();
        let p = peer();
        p.set_closed();
        assert_eq!(set.register(p), Err(PeerSetError::Closed));
    }
}
