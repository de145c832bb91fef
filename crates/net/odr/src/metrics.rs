use metrics::{counter, Counter};

/// Retrieval-level metrics.
pub(crate) struct OdrMetrics {
    /// Retrievals that returned verified data.
    pub(crate) served: Counter,
    /// Responses rejected by a validator.
    pub(crate) invalid_responses: Counter,
    /// Retrievals that failed terminally.
    pub(crate) failed: Counter,
}

impl std::fmt::Debug for OdrMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OdrMetrics").finish_non_exhaustive()
    }
}

impl Default for OdrMetrics {
    fn default() -> Self {
        Self {
            served: counter!("lantern_odr_retrievals_served"),
            invalid_responses: counter!("lantern_odr_invalid_responses"),
            failed: counter!("lantern_odr_retrievals_failed"),
        }
    }
}
