use lantern_primitives::{BlockNumber, SealedHeader, B256};

/// Read access to the locally maintained canonical header chain.
///
/// Provided by the light chain; the retrieval core uses it for trusted
/// commitments inside the live window and the indexer walks it to build
/// sections. Implementations must answer from canonical state only.
#[auto_impl::auto_impl(&, Arc)]
pub trait ChainReader: Send + Sync {
    /// The canonical header at `number`, if the chain has reached it.
    fn header_by_number(&self, number: BlockNumber) -> Option<SealedHeader>;

    /// The canonical header with the given hash, if it is on the canonical
    /// chain.
    fn header_by_hash(&self, hash: &B256) -> Option<SealedHeader>;

    /// The current chain head.
    fn current_head(&self) -> Option<SealedHeader>;

    /// Height of the current head, zero for an empty chain.
    fn head_number(&self) -> BlockNumber {
        self.current_head().map(|h| h.number).unwrap_or_default()
    }
}
