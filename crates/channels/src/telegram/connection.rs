//! Reconnect policy for the long-poll session.
//!
//! A session conflict means another process holds the same bot token and the
//! platform will keep rejecting us until the stale session expires, so
//! conflicts back off from a much higher floor than ordinary transient
//! failures.

use std::time::Duration;

/// How a failed poll session should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Another getUpdates session is bound to the same token.
    Conflict,
    /// Network error, timeout, or server-side failure.
    Transient,
}

/// Conflict backoff floor in seconds.
const CONFLICT_BASE_SECS: u64 = 30;
/// Conflict backoff ceiling in seconds.
const CONFLICT_CAP_SECS: u64 = 600;
/// Transient backoff ceiling in seconds.
const TRANSIENT_CAP_SECS: u64 = 300;

/// Counts consecutive failed sessions; reset once polling succeeds again.
#[derive(Debug, Default)]
pub struct RetryState {
    consecutive_failures: u32,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failed session and returns the new failure count.
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_failures
    }

    /// Resets the counter after a successful poll cycle.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Returns how long to wait before the next connection attempt.
///
/// Conflicts wait `30 * 2^(n-1)` seconds capped at 600; transient failures
/// wait `2^n` seconds capped at 300, where `n` is the consecutive failure
/// count starting at 1.
pub fn backoff_delay(kind: FailureKind, consecutive_failures: u32) -> Duration {
    let n = consecutive_failures.max(1).min(20);
    let secs = match kind {
        FailureKind::Conflict => {
            (CONFLICT_BASE_SECS.saturating_mul(1u64 << (n - 1))).min(CONFLICT_CAP_SECS)
        }
        FailureKind::Transient => (1u64 << n).min(TRANSIENT_CAP_SECS),
    };
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_backoff_starts_at_thirty_seconds() {
        assert_eq!(
            backoff_delay(FailureKind::Conflict, 1),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn consecutive_conflicts_increase_strictly_below_cap() {
        let mut retry = RetryState::new();
        let first = backoff_delay(FailureKind::Conflict, retry.record_failure());
        let second = backoff_delay(FailureKind::Conflict, retry.record_failure());
        assert!(second > first);
        assert!(second < Duration::from_secs(CONFLICT_CAP_SECS));
    }

    #[test]
    fn conflict_backoff_caps_at_ten_minutes() {
        assert_eq!(
            backoff_delay(FailureKind::Conflict, 10),
            Duration::from_secs(600)
        );
        assert_eq!(
            backoff_delay(FailureKind::Conflict, 20),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn transient_backoff_doubles_and_caps() {
        assert_eq!(
            backoff_delay(FailureKind::Transient, 1),
            Duration::from_secs(2)
        );
        assert_eq!(
            backoff_delay(FailureKind::Transient, 3),
            Duration::from_secs(8)
        );
        assert_eq!(
            backoff_delay(FailureKind::Transient, 9),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn conflict_waits_at_least_as_long_as_transient() {
        for n in 1..=12 {
            assert!(
                backoff_delay(FailureKind::Conflict, n) >= backoff_delay(FailureKind::Transient, n)
            );
        }
    }

    #[test]
    fn success_resets_failure_count() {
        let mut retry = RetryState::new();
        retry.record_failure();
        retry.record_failure();
        retry.record_success();
        assert_eq!(retry.failures(), 0);
        assert_eq!(retry.record_failure(), 1);
    }
}
