use metrics::{counter, gauge, Counter, Gauge};

/// Pool-wide metrics.
pub(crate) struct PoolMetrics {
    /// Known candidate addresses.
    pub(crate) candidates: Gauge,
    /// Currently connected peers.
    pub(crate) connected: Gauge,
    /// Dials started by the discovery loop.
    pub(crate) dials: Counter,
    /// Dials that failed to establish a connection.
    pub(crate) dial_failures: Counter,
}

impl std::fmt::Debug for PoolMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolMetrics").finish_non_exhaustive()
    }
}

impl Default for PoolMetrics {
    fn default() -> Self {
        Self {
            candidates: gauge!("lantern_pool_candidates"),
            connected: gauge!("lantern_pool_connected_peers"),
            dials: counter!("lantern_pool_dials"),
            dial_failures: counter!("lantern_pool_dial_failures"),
        }
    }
}
