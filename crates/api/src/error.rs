use lantern_primitives::PeerId;
use tokio::sync::{mpsc, oneshot};

/// Result alias for a single wire request.
pub type RequestResult<T> = Result<T, RequestError>;

/// Result of a wire request with the answering peer attached.
pub type PeerRequestResult<T> = RequestResult<WithPeer<T>>;

/// A value annotated with the peer it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithPeer<T> {
    peer: PeerId,
    value: T,
}

impl<T> WithPeer<T> {
    /// Wraps a value with its originating peer.
    pub const fn new(peer: PeerId, value: T) -> Self {
        Self { peer, value }
    }

    /// The peer the value came from.
    pub const fn peer(&self) -> PeerId {
        self.peer
    }

    /// A reference to the wrapped value.
    pub const fn value(&self) -> &T {
        &self.value
    }

    /// Splits into peer and value.
    pub fn split(self) -> (PeerId, T) {
        (self.peer, self.value)
    }
}

/// Errors that can happen on a single dispatched request.
///
/// These are internal to the distributor/retrieval loop; the retryable
/// variants never reach callers individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// The peer did not answer within the deadline.
    #[error("request timed out while awaiting response")]
    Timeout,
    /// The connection dropped while the request was in flight.
    #[error("connection to the peer dropped while handling the request")]
    Disconnected,
    /// The channel to the peer's session is gone.
    #[error("closed channel to the peer")]
    ChannelClosed,
    /// The peer does not serve this request kind.
    #[error("request kind is not supported by the remote peer")]
    UnsupportedCapability,
    /// The response failed validation against the trusted commitment.
    #[error("response failed verification")]
    InvalidResponse,
    /// No eligible peer was available within the patience window.
    #[error("no eligible peer available")]
    NoPeers,
}

impl RequestError {
    /// Whether the request may transparently be redistributed to another
    /// peer.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Disconnected | Self::InvalidResponse)
    }
}

impl<T> From<mpsc::error::SendError<T>> for RequestError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        Self::ChannelClosed
    }
}

impl From<oneshot::error::RecvError> for RequestError {
    fn from(_: oneshot::error::RecvError) -> Self {
        Self::ChannelClosed
    }
}

/// Terminal outcomes of a retrieval, the only errors `retrieve` surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RetrievalError {
    /// Retries were exhausted across all eligible peers.
    ///
    /// This means no honest reachable peer could supply verifiable data; it
    /// is absence of an answer, not proof of absence on chain.
    #[error("no reachable peer could supply verifiable data")]
    NotAvailable,
    /// The commitment for the requested height is not processed yet and the
    /// height is outside the live window. Callers may wait and re-request.
    #[error("index commitment for the requested height is not available yet")]
    IndexUnavailable,
    /// The request itself is malformed. Programming error, never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
}

/// Failures of the persistent key/value store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backend failed to read or write.
    #[error("store backend failure: {0}")]
    Backend(String),
    /// A stored value could not be decoded.
    #[error("corrupt value under key {key}")]
    Corrupt {
        /// Hex encoding of the offending key.
        key: String,
    },
}
