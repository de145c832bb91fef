//! Interfaces between the retrieval core and its collaborators.
//!
//! The core never talks to a database, a wire protocol, or a discovery
//! mechanism directly; it consumes them through the traits defined here.
//! The error taxonomy lives here too, since it is the contract between the
//! distributor, the retrieval front end, and callers.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod chain;
mod error;
mod store;
mod transport;

pub use chain::ChainReader;
pub use error::{
    PeerRequestResult, RequestError, RequestResult, RetrievalError, StoreError, WithPeer,
};
pub use store::{KeyValueStore, MemoryStore};
pub use transport::{Dialer, DiscoveryStream, PeerTransport, RawRequest, RawResponse};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
