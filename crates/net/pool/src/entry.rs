use lantern_network_types::NodeRecord;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Everything the pool remembers about one candidate address.
///
/// Entries are created on first discovery and never deleted; misbehavior
/// decays the score toward the floor instead.
#[derive(Debug, Clone)]
pub(crate) struct PoolEntry {
    pub(crate) record: NodeRecord,
    /// Moving average of interaction rewards in `[-1, +1]`.
    pub(crate) score: f64,
    /// Connection attempts started toward this candidate.
    pub(crate) attempts: u64,
    /// Connections that completed a handshake.
    pub(crate) successes: u64,
    /// Failed dials and for-cause disconnects.
    pub(crate) failures: u64,
    pub(crate) last_success: Option<SystemTime>,
    pub(crate) last_attempt: Option<Instant>,
    /// Set while the entry sits out a below-threshold cooldown.
    pub(crate) cooldown_until: Option<Instant>,
}

impl PoolEntry {
    pub(crate) fn new(record: NodeRecord) -> Self {
        Self {
            record,
            score: 0.0,
            attempts: 0,
            successes: 0,
            failures: 0,
            last_success: None,
            last_attempt: None,
            cooldown_until: None,
        }
    }

    /// Whether the entry may be selected or dialed right now.
    pub(crate) fn eligible(&self, threshold: f64, now: Instant) -> bool {
        if self.score > threshold {
            return true
        }
        self.cooldown_until.map_or(true, |until| now >= until)
    }

    /// Whether the discovery loop may dial this candidate again.
    pub(crate) fn dialable(&self, threshold: f64, redial_interval: Duration, now: Instant) -> bool {
        self.eligible(threshold, now) &&
            self.last_attempt.map_or(true, |at| now.duration_since(at) >= redial_interval)
    }
}

/// The JSON shape one entry is stored as.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct PersistedEntry {
    pub(crate) record: NodeRecord,
    pub(crate) score: f64,
    pub(crate) attempts: u64,
    pub(crate) successes: u64,
    pub(crate) failures: u64,
    /// Unix seconds of the last successful interaction.
    pub(crate) last_success: Option<u64>,
}

impl PersistedEntry {
    pub(crate) fn from_entry(entry: &PoolEntry) -> Self {
        Self {
            record: entry.record,
            score: entry.score,
            attempts: entry.attempts,
            successes: entry.successes,
            failures: entry.failures,
            last_success: entry
                .last_success
                .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
                .map(|since| since.as_secs()),
        }
    }

    /// Rebuilds the in-memory entry, fading the stored score.
    pub(crate) fn into_entry(self, restart_decay: f64) -> PoolEntry {
        PoolEntry {
            record: self.record,
            score: self.score * restart_decay,
            attempts: self.attempts,
            successes: self.successes,
            failures: self.failures,
            last_success: self
                .last_success
                .map(|secs| UNIX_EPOCH + Duration::from_secs(secs)),
            last_attempt: None,
            cooldown_until: None,
        }
    }
}
