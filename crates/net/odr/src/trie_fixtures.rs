//! Real Merkle tries for validator tests.
//!
//! Proofs are produced with the same builder the indexer commits sections
//! with, so fixture roots line up with indexer section roots by
//! construction.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_trie::{proof::ProofRetainer, HashBuilder, Nibbles};
use lantern_indexer::{bloom_value, cht_value, section_key};
use lantern_primitives::{SealedHeader, StateAccount};

fn build_with_proof(leaves: Vec<(Nibbles, Vec<u8>)>, target: Nibbles) -> (B256, Vec<Bytes>) {
    let mut leaves = leaves;
    leaves.sort_by(|a, b| a.0.cmp(&b.0));

    let retainer = ProofRetainer::new(vec![target]);
    let mut hb = HashBuilder::default().with_proof_retainer(retainer);
    for (key, value) in &leaves {
        hb.add_leaf(key.clone(), value);
    }
    let root = hb.root();
    let proof =
        hb.take_proof_nodes().into_nodes_sorted().into_iter().map(|(_, node)| node).collect();
    (root, proof)
}

/// Builds a state trie over `accounts` and proves `target`.
pub(crate) fn account_trie(
    accounts: &[(Address, StateAccount)],
    target: Address,
) -> (B256, Vec<Bytes>) {
    let leaves = accounts
        .iter()
        .map(|(address, account)| {
            (Nibbles::unpack(keccak256(address)), alloy_rlp::encode(account))
        })
        .collect();
    build_with_proof(leaves, Nibbles::unpack(keccak256(target)))
}

/// Builds a storage trie over `slots` and proves `target`.
pub(crate) fn storage_trie(slots: &[(B256, U256)], target: B256) -> (B256, Vec<Bytes>) {
    let leaves = slots
        .iter()
        .map(|(slot, value)| {
            (Nibbles::unpack(keccak256(slot)), alloy_rlp::encode_fixed_size(value).to_vec())
        })
        .collect();
    build_with_proof(leaves, Nibbles::unpack(keccak256(target)))
}

/// Builds the CHT trie of one section and proves the entry at `number`.
pub(crate) fn cht_trie(headers: &[SealedHeader], number: u64) -> (B256, Vec<Bytes>) {
    let leaves = headers
        .iter()
        .map(|header| (Nibbles::unpack(section_key(header.number)), cht_value(&header.hash())))
        .collect();
    build_with_proof(leaves, Nibbles::unpack(section_key(number)))
}

/// Builds the bloom trie of one section and proves the entry at `number`.
pub(crate) fn bloom_trie(headers: &[SealedHeader], number: u64) -> (B256, Vec<Bytes>) {
    let leaves = headers
        .iter()
        .map(|header| {
            (Nibbles::unpack(section_key(header.number)), bloom_value(&header.logs_bloom))
        })
        .collect();
    build_with_proof(leaves, Nibbles::unpack(section_key(number)))
}
