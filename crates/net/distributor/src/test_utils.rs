//! A loopback transport for driving the distributor in tests.

use lantern_api::{PeerTransport, RawRequest, RequestError, RequestResult};
use lantern_network_types::LightPeer;
use lantern_primitives::PeerId;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receiving side of a [`TestTransport`]: every dispatched request shows up
/// here tagged with the peer it was sent to.
pub type RequestRx = mpsc::UnboundedReceiver<(PeerId, RawRequest)>;

/// Creates a transport that forwards dispatched requests to the returned
/// channel. Tests answer by calling the distributor's response entry point.
pub fn test_transport() -> (TestTransport, RequestRx) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TestTransport { tx }, rx)
}

/// A [`PeerTransport`] that hands requests to the test instead of a wire.
#[derive(Debug, Clone)]
pub struct TestTransport {
    tx: mpsc::UnboundedSender<(PeerId, RawRequest)>,
}

#[async_trait::async_trait]
impl PeerTransport for TestTransport {
    async fn send_request(&self, peer: Arc<LightPeer>, request: RawRequest) -> RequestResult<()> {
        self.tx.send((peer.id(), request)).map_err(|_| RequestError::Disconnected)?;
        Ok(())
    }
}
