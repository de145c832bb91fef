//! Helpers for building header chains in tests.

use crate::{Header, SealedHeader};

/// Returns a sealed header that is the child of `parent`.
pub fn child_header(parent: &SealedHeader) -> SealedHeader {
    let mut child = parent.header().clone();
    child.number = parent.number + 1;
    child.parent_hash = parent.hash();
    child.timestamp = parent.timestamp + 12;
    child.seal_slow()
}

/// Builds a chain of `len` sealed headers starting from (and including) the
/// sealed genesis of `genesis`.
pub fn header_chain(genesis: Header, len: usize) -> Vec<SealedHeader> {
    let mut chain = Vec::with_capacity(len);
    chain.push(genesis.seal_slow());
    while chain.len() < len {
        let next = child_header(chain.last().unwrap());
        chain.push(next);
    }
    chain
}
