use metrics::{counter, gauge, Counter, Gauge};

/// Metrics for one indexer instance, labeled by index name.
pub(crate) struct IndexerMetrics {
    /// Sections committed since startup.
    pub(crate) sections_committed: Counter,
    /// Sections invalidated by reorgs.
    pub(crate) sections_invalidated: Counter,
    /// Processing attempts that failed and were retried.
    pub(crate) retries: Counter,
    /// First block height not covered by a committed section.
    pub(crate) frontier: Gauge,
}

impl std::fmt::Debug for IndexerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexerMetrics").finish_non_exhaustive()
    }
}

impl IndexerMetrics {
    pub(crate) fn new(indexer: &'static str) -> Self {
        Self {
            sections_committed: counter!("lantern_indexer_sections_committed", "indexer" => indexer),
            sections_invalidated: counter!("lantern_indexer_sections_invalidated", "indexer" => indexer),
            retries: counter!("lantern_indexer_retries", "indexer" => indexer),
            frontier: gauge!("lantern_indexer_frontier", "indexer" => indexer),
        }
    }
}
