//! Reputation-scored pool of candidate and connected peers.
//!
//! The [`ServerPool`] remembers every candidate address it has ever seen,
//! scores each one by an exponential moving average of interaction rewards,
//! and answers "which connected peer should serve this request" through
//! [`ServerPool::select_peer`]. Entries persist across restarts and are
//! never deleted, only decayed; a floor with cooldown-based re-entry keeps
//! unlucky peers recoverable.
//!
//! Discovery runs as a separate background task ([`run_discovery`]) that
//! registers candidates from the discovery layer and dials under-explored
//! ones at a capped rate.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod config;
mod discovery;
mod entry;
mod metrics;
mod pool;

pub use config::PoolConfig;
pub use discovery::run_discovery;
pub use pool::{PoolStatus, ServerPool};
