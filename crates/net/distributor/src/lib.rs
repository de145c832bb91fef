//! Scheduling of wire requests onto connected peers.
//!
//! The [`RequestDistributor`] turns a logical request into a dispatched
//! wire message on the best eligible peer, tracks it in flight, and
//! redistributes on timeout or disconnect until the attempt bound is
//! exhausted. Responses are matched by `(peer, request id)`, never by
//! arrival order; a withdrawn request drops out of the in-flight table and
//! its late response is discarded without touching any score.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod config;
mod distributor;
mod inflight;
mod metrics;

pub use config::DistributorConfig;
pub use distributor::{Delivered, Distribution, RequestDistributor};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
