//! In-memory collaborator implementations for tests.

use crate::ChainReader;
use lantern_primitives::{BlockNumber, SealedHeader, B256};
use parking_lot::RwLock;

/// An in-memory canonical chain starting at block 0.
///
/// Supports truncate-and-extend reorgs so indexer and retrieval tests can
/// exercise invalidation paths.
#[derive(Debug, Default)]
pub struct MemoryChain {
    headers: RwLock<Vec<SealedHeader>>,
}

impl MemoryChain {
    /// Creates a chain from contiguous headers starting at block 0.
    pub fn new(headers: Vec<SealedHeader>) -> Self {
        for (i, header) in headers.iter().enumerate() {
            assert_eq!(header.number, i as u64, "headers must be contiguous from 0");
        }
        Self { headers: RwLock::new(headers) }
    }

    /// Appends headers on top of the current head.
    pub fn extend(&self, headers: impl IntoIterator<Item = SealedHeader>) {
        let mut chain = self.headers.write();
        for header in headers {
            assert_eq!(header.number, chain.len() as u64, "non-contiguous extension");
            chain.push(header);
        }
    }

    /// Reorganizes the chain: drops everything above `ancestor` and appends
    /// `fork` on top of it.
    pub fn reorg(&self, ancestor: BlockNumber, fork: impl IntoIterator<Item = SealedHeader>) {
        let mut chain = self.headers.write();
        chain.truncate(ancestor as usize + 1);
        for header in fork {
            assert_eq!(header.number, chain.len() as u64, "non-contiguous fork");
            chain.push(header);
        }
    }
}

impl ChainReader for MemoryChain {
    fn header_by_number(&self, number: BlockNumber) -> Option<SealedHeader> {
        self.headers.read().get(number as usize).cloned()
    }

    fn header_by_hash(&self, hash: &B256) -> Option<SealedHeader> {
        self.headers.read().iter().find(|h| h.hash() == *hash).cloned()
    }

    fn current_head(&self) -> Option<SealedHeader> {
        self.headers.read().last().cloned()
    }
}
