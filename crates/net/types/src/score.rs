//! Reward weights for pool scoring.
//!
//! The pool keeps an exponential moving average of per-interaction rewards
//! in `[-1, +1]`. The exact magnitudes are tunable policy; the invariant
//! the rest of the system relies on is only that misbehavior is strictly
//! negative and verified service is strictly positive.

/// Lower bound of a pool score.
pub const SCORE_FLOOR: f64 = -1.0;

/// Why a peer connection ended, as far as scoring is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    /// The peer violated the protocol or served provably bad data.
    ProtocolViolation,
    /// The peer repeatedly failed to answer within deadlines.
    Unresponsive,
    /// Orderly shutdown, idle timeout, or the peer being full.
    Graceful,
    /// The connection attempt never completed.
    DialFailed,
}

/// How each interaction outcome is weighted when folded into a pool score.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ScoreWeights {
    /// Reward for a verified response, before latency scaling.
    pub verified_response: f64,
    /// Penalty for a response that failed validation.
    pub invalid_proof: f64,
    /// Penalty for a request deadline expiring.
    pub timeout: f64,
    /// Penalty for a protocol violation or bad-data disconnect.
    pub protocol_violation: f64,
    /// Penalty for a graceful or idle disconnect.
    pub graceful_disconnect: f64,
    /// Penalty for a failed connection attempt.
    pub dial_failure: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            verified_response: 1.0,
            invalid_proof: -1.0,
            timeout: -0.4,
            protocol_violation: -1.0,
            graceful_disconnect: -0.1,
            dial_failure: -0.25,
        }
    }
}

impl ScoreWeights {
    /// The reward to apply for a disconnect with the given cause.
    pub fn for_disconnect(&self, cause: DisconnectCause) -> f64 {
        match cause {
            DisconnectCause::ProtocolViolation => self.protocol_violation,
            DisconnectCause::Unresponsive => self.timeout,
            DisconnectCause::Graceful => self.graceful_disconnect,
            DisconnectCause::DialFailed => self.dial_failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_keep_the_sign_invariant() {
        let weights = ScoreWeights::default();
        assert!(weights.verified_response > 0.0);
        for cause in [
            DisconnectCause::ProtocolViolation,
            DisconnectCause::Unresponsive,
            DisconnectCause::Graceful,
            DisconnectCause::DialFailed,
        ] {
            assert!(weights.for_disconnect(cause) < 0.0, "{cause:?} must be negative");
        }
        assert!(weights.invalid_proof <= weights.timeout);
    }
}
