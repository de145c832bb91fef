use alloy_primitives::{b256, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use alloy_trie::EMPTY_ROOT_HASH;

/// Keccak-256 hash of the empty byte string, the code hash of accounts
/// without code.
pub const KECCAK_EMPTY: B256 =
    b256!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470");

/// The account representation stored as a state-trie leaf, keyed by the
/// keccak256 hash of the account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateAccount {
    /// Number of transactions sent from this account.
    pub nonce: u64,
    /// Balance in the smallest denomination.
    pub balance: U256,
    /// Root of the account's storage trie.
    pub storage_root: B256,
    /// Hash of the account's bytecode.
    pub code_hash: B256,
}

impl Default for StateAccount {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::ZERO,
            storage_root: EMPTY_ROOT_HASH,
            code_hash: KECCAK_EMPTY,
        }
    }
}

impl StateAccount {
    /// Returns `true` if the account has no associated bytecode.
    pub fn is_code_empty(&self) -> bool {
        self.code_hash == KECCAK_EMPTY
    }
}
