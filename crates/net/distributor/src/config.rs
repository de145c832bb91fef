use std::time::Duration;

/// Tuning knobs of the [`RequestDistributor`](crate::RequestDistributor).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistributorConfig {
    /// Peers tried per logical request before a terminal failure.
    pub max_attempts: u32,
    /// Outstanding requests allowed per peer and request kind.
    pub pipeline_depth: usize,
    /// Deadline as a multiple of the peer's response-time estimate.
    pub deadline_scale: f64,
    /// Lower bound of the per-request deadline.
    pub soft_deadline: Duration,
    /// Upper bound of the per-request deadline.
    pub hard_deadline: Duration,
    /// Total time to wait for an eligible peer to appear.
    pub selection_patience: Duration,
    /// Re-check interval while waiting for an eligible peer.
    pub selection_interval: Duration,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            pipeline_depth: 2,
            deadline_scale: 3.0,
            soft_deadline: Duration::from_secs(1),
            hard_deadline: Duration::from_secs(10),
            selection_patience: Duration::from_secs(5),
            selection_interval: Duration::from_millis(100),
        }
    }
}

impl DistributorConfig {
    /// Sets the attempt bound.
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the per-(peer, kind) pipelining bound.
    pub const fn with_pipeline_depth(mut self, pipeline_depth: usize) -> Self {
        self.pipeline_depth = pipeline_depth;
        self
    }

    /// Sets the deadline clamp.
    pub const fn with_deadlines(mut self, soft: Duration, hard: Duration) -> Self {
        self.soft_deadline = soft;
        self.hard_deadline = hard;
        self
    }

    /// Sets the eligible-peer wait bound.
    pub const fn with_selection_patience(mut self, patience: Duration) -> Self {
        self.selection_patience = patience;
        self
    }

    /// Deadline for a peer with the given response-time estimate.
    pub(crate) fn deadline(&self, estimate: Duration) -> Duration {
        estimate.mul_f64(self.deadline_scale).clamp(self.soft_deadline, self.hard_deadline)
    }
}
