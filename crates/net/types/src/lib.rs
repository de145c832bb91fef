//! Types describing connected peers and how interactions with them are
//! scored.
//!
//! The [`PeerSet`] is the shared registry the distributor selects from and
//! the pool scores against; it owns the connected [`LightPeer`] objects,
//! everything else holds [`std::sync::Arc`] references.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod capabilities;
mod peer;
mod record;
mod score;
mod set;

pub use capabilities::{Capabilities, RequestKind};
pub use peer::{LightPeer, PROTOCOL_VERSION};
pub use record::NodeRecord;
pub use score::{DisconnectCause, ScoreWeights, SCORE_FLOOR};
pub use set::{PeerSet, PeerSetError};
