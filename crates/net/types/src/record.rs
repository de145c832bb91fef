use lantern_primitives::PeerId;
use std::net::SocketAddr;

/// A dialable peer candidate: identity plus network address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeRecord {
    /// The candidate's network identity.
    pub id: PeerId,
    /// Address the candidate listens on.
    pub addr: SocketAddr,
}

impl NodeRecord {
    /// Creates a record from its parts.
    pub const fn new(id: PeerId, addr: SocketAddr) -> Self {
        Self { id, addr }
    }
}

impl std::fmt::Display for NodeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.addr)
    }
}
