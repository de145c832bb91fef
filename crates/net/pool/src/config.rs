use lantern_network_types::ScoreWeights;
use std::time::Duration;

/// Tuning knobs of the [`ServerPool`](crate::ServerPool).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolConfig {
    /// Weight of the newest interaction in the moving average.
    pub ema_weight: f64,
    /// Reward magnitudes per interaction outcome.
    pub weights: ScoreWeights,
    /// Score below which an entry is only retried after a cooldown.
    pub cooldown_threshold: f64,
    /// How long a below-threshold entry sits out before re-entry.
    pub cooldown: Duration,
    /// Factor applied to persisted scores when loading them at startup.
    pub restart_decay: f64,
    /// Interval between discovery dial rounds.
    pub dial_interval: Duration,
    /// Connection attempts started per dial round.
    pub dials_per_round: usize,
    /// Minimum time between two dials of the same candidate.
    pub redial_interval: Duration,
    /// Interval between persistence flushes of the entry table.
    pub persist_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            ema_weight: 1.0 / 8.0,
            weights: ScoreWeights::default(),
            cooldown_threshold: -0.9,
            cooldown: Duration::from_secs(60),
            restart_decay: 0.75,
            dial_interval: Duration::from_secs(1),
            dials_per_round: 2,
            redial_interval: Duration::from_secs(30),
            persist_interval: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    /// Sets the reward magnitudes.
    pub const fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Sets the cooldown applied to below-threshold entries.
    pub const fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Sets the dial rate of the discovery loop.
    pub const fn with_dial_rate(mut self, interval: Duration, dials_per_round: usize) -> Self {
        self.dial_interval = interval;
        self.dials_per_round = dials_per_round;
        self
    }
}
