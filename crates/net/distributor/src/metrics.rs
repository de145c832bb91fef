use metrics::{counter, gauge, Counter, Gauge};

/// Distributor-wide metrics.
pub(crate) struct DistributorMetrics {
    /// Wire requests handed to the transport.
    pub(crate) dispatched: Counter,
    /// Requests whose deadline expired.
    pub(crate) timeouts: Counter,
    /// Responses that matched no in-flight request.
    pub(crate) unsolicited: Counter,
    /// Requests currently awaiting a response.
    pub(crate) in_flight: Gauge,
}

impl std::fmt::Debug for DistributorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributorMetrics").finish_non_exhaustive()
    }
}

impl Default for DistributorMetrics {
    fn default() -> Self {
        Self {
            dispatched: counter!("lantern_distributor_requests_dispatched"),
            timeouts: counter!("lantern_distributor_request_timeouts"),
            unsolicited: counter!("lantern_distributor_unsolicited_responses"),
            in_flight: gauge!("lantern_distributor_requests_in_flight"),
        }
    }
}
