//! Incremental chain indexing in fixed-size sections.
//!
//! A [`ChainIndexer`] walks the canonical header chain once it is
//! sufficiently confirmed and derives one commitment root per section
//! through a pluggable [`IndexerBackend`]. Committed sections are durably
//! checkpointed and survive restarts; a reorg below a committed section
//! invalidates it and everything above it.
//!
//! Two backends ship with the crate: [`ChtBackend`] commits to the canonical
//! block hashes of a section, [`BloomBackend`] commits to the per-block log
//! blooms and keeps an aggregated section bloom for cheap skip checks.
//!
//! Readers never see partial state: the [`IndexerHandle`] only serves
//! sections after their checkpoint write returned.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod backend;
mod indexer;
mod metrics;

pub use backend::{
    bloom_value, cht_value, decode_section_bloom, section_key, BloomBackend, ChtBackend,
    IndexerBackend, SectionOutput,
};
pub use indexer::{ChainIndexer, IndexerConfig, IndexerError, IndexerHandle, SectionHead};
