//! Queue admission policy
//!
//! Full sessions are preferred for symmetric play; the wait-based partial
//! flush bounds worst-case queue latency at the cost of uneven session
//! sizes. The policy is a pure function of observed queue state so it can
//! be tested without any store.

use crate::config::MatchmakingSettings;
use std::time::Duration;

/// What to do with the queue after an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushDecision {
    /// Keep the player queued.
    Hold,
    /// Flush exactly the full session size, oldest first.
    FlushFull(usize),
    /// Flush the entire current queue length as a partial session.
    FlushPartial(usize),
}

/// When to flush a batch of players into a new session.
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    /// Players per full session
    pub full_size: usize,
    /// Minimum players for a wait-based partial flush
    pub min_partial_size: usize,
    /// Oldest-wait threshold that triggers a partial flush
    pub flush_wait: Duration,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            full_size: 12,
            min_partial_size: 2,
            flush_wait: Duration::from_secs(15),
        }
    }
}

impl AdmissionPolicy {
    pub fn from_settings(settings: &MatchmakingSettings) -> Self {
        Self {
            full_size: settings.full_session_size,
            min_partial_size: settings.min_partial_session_size,
            flush_wait: Duration::from_secs(settings.flush_wait_seconds),
        }
    }

    /// Evaluate the policy against the queue state observed after an enqueue.
    pub fn evaluate(&self, queue_length: usize, oldest_wait: Duration) -> FlushDecision {
        if queue_length >= self.full_size {
            return FlushDecision::FlushFull(self.full_size);
        }
        if queue_length >= self.min_partial_size && oldest_wait >= self.flush_wait {
            return FlushDecision::FlushPartial(queue_length);
        }
        FlushDecision::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AdmissionPolicy {
        AdmissionPolicy::default()
    }

    #[test]
    fn test_full_queue_flushes_full_size() {
        assert_eq!(
            policy().evaluate(12, Duration::ZERO),
            FlushDecision::FlushFull(12)
        );
        // Overfull still flushes exactly the full size.
        assert_eq!(
            policy().evaluate(17, Duration::ZERO),
            FlushDecision::FlushFull(12)
        );
    }

    #[test]
    fn test_waiting_pair_flushes_partially() {
        assert_eq!(
            policy().evaluate(2, Duration::from_secs(15)),
            FlushDecision::FlushPartial(2)
        );
        assert_eq!(
            policy().evaluate(7, Duration::from_secs(120)),
            FlushDecision::FlushPartial(7)
        );
    }

    #[test]
    fn test_holds_below_thresholds() {
        // Not enough players, no matter the wait.
        assert_eq!(
            policy().evaluate(1, Duration::from_secs(3600)),
            FlushDecision::Hold
        );
        // Enough players but not waiting long enough.
        assert_eq!(
            policy().evaluate(2, Duration::from_secs(14)),
            FlushDecision::Hold
        );
        assert_eq!(policy().evaluate(0, Duration::ZERO), FlushDecision::Hold);
    }

    #[test]
    fn test_full_flush_wins_over_partial() {
        // Both conditions hold: the full flush takes precedence.
        assert_eq!(
            policy().evaluate(12, Duration::from_secs(100)),
            FlushDecision::FlushFull(12)
        );
    }
}
