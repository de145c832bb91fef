//! Primitive types for the lantern light client.
//!
//! Everything here is a plain data type: headers and their sealed form,
//! receipts, the account leaf stored in the state trie, and the trie-root
//! helpers that commitments are computed with. No networking or storage
//! concerns leak into this crate.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod account;
mod header;
mod receipt;
pub mod proofs;

pub use account::{StateAccount, KECCAK_EMPTY};
pub use header::{BlockHashOrNumber, Header, SealedHeader};
pub use receipt::{Log, Receipt};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use alloy_primitives::{self, keccak256, Address, Bloom, Bytes, B256, B512, U256};

/// A block height on the canonical chain.
pub type BlockNumber = u64;

/// Network-wide unique identifier of a peer, derived from its public key.
pub type PeerId = alloy_primitives::B512;
