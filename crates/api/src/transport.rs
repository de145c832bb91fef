use crate::RequestResult;
use alloy_primitives::Bytes;
use futures::stream::BoxStream;
use lantern_network_types::{LightPeer, NodeRecord, RequestKind};
use std::sync::Arc;

/// A wire request as handed to the transport layer.
///
/// The id is unique for the lifetime of the peer connection; responses are
/// matched on `(peer, id)`, never on arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    /// Per-peer unique request id.
    pub id: u64,
    /// The kind tag the peer routes on.
    pub kind: RequestKind,
    /// RLP payload of the request body.
    pub payload: Bytes,
}

/// A raw answer delivered by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// Id of the request this answers.
    pub id: u64,
    /// RLP payload of the response body. Unverified at this point.
    pub payload: Bytes,
}

/// Outbound half of the wire protocol.
///
/// The transport serializes concurrent sends on one connection internally;
/// callers may dispatch from any task. Responses flow back through the
/// distributor's delivery entry point, not through this trait.
#[async_trait::async_trait]
#[auto_impl::auto_impl(&, Arc)]
pub trait PeerTransport: Send + Sync {
    /// Sends a request on the peer's connection.
    ///
    /// Resolves once the message is handed to the connection, not when the
    /// peer answers.
    async fn send_request(&self, peer: Arc<LightPeer>, request: RawRequest) -> RequestResult<()>;
}

/// Initiates outbound connections for the pool's discovery loop.
#[async_trait::async_trait]
#[auto_impl::auto_impl(&, Arc)]
pub trait Dialer: Send + Sync {
    /// Attempts to establish a connection to the candidate.
    ///
    /// Success or failure is reported back to the pool through its
    /// `connected`/`disconnected` entry points by the session layer; this
    /// only kicks off the attempt.
    async fn dial(&self, record: NodeRecord) -> Result<(), std::io::Error>;
}

/// Stream of candidate peers from the discovery layer.
pub type DiscoveryStream = BoxStream<'static, NodeRecord>;
