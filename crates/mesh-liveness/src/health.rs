//! Per-peer liveness bookkeeping: last contact, reconnection backoff state,
//! and the rolling counters behind a [`crate::stats::NetworkStats`] snapshot.

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// A peer is considered unhealthy once this many seconds pass without
/// activity.
pub const HEALTH_TIMEOUT_SECS: i64 = 30;

/// Reconnection attempts beyond this many cause `RecoveryFailed` instead of
/// a further dial.
pub const MAX_RECONNECTION_ATTEMPTS: u32 = 5;

/// Liveness state for one known peer.
#[derive(Debug, Clone)]
pub struct PeerHealth {
    last_seen: DateTime<Utc>,
    reconnection_attempts: u32,
    observed_latency_ms: f64,
    message_count: u64,
    error_count: u64,
    pub(crate) recovery_failed: bool,
    next_attempt_at: DateTime<Utc>,
}

impl PeerHealth {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            last_seen: now,
            reconnection_attempts: 0,
            observed_latency_ms: 0.0,
            message_count: 0,
            error_count: 0,
            recovery_failed: false,
            next_attempt_at: now,
        }
    }

    /// `last-seen` only ever moves forward, even under minor clock skew.
    fn touch(&mut self) {
        let now = Utc::now();
        if now > self.last_seen {
            self.last_seen = now;
        }
    }

    pub fn is_healthy(&self) -> bool {
        (Utc::now() - self.last_seen).num_seconds() < HEALTH_TIMEOUT_SECS
    }

    pub fn record_message(&mut self, latency: Duration) {
        self.touch();
        self.message_count += 1;
        self.observed_latency_ms = latency.as_secs_f64() * 1000.0;
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    /// Reset reconnection state on a successful (re)authentication.
    pub fn on_reconnected(&mut self) {
        self.reconnection_attempts = 0;
        self.recovery_failed = false;
        self.touch();
    }

    pub fn exhausted(&self) -> bool {
        self.reconnection_attempts >= MAX_RECONNECTION_ATTEMPTS
    }

    pub fn ready_for_attempt(&self) -> bool {
        Utc::now() >= self.next_attempt_at
    }

    /// Record a reconnection attempt, schedule the next one at
    /// `1000 * 2^attempts` ms out, and return the 1-based attempt number.
    pub fn record_attempt(&mut self) -> u32 {
        self.reconnection_attempts += 1;
        let backoff_ms = 1000u64 * 2u64.pow(self.reconnection_attempts);
        self.next_attempt_at = Utc::now() + ChronoDuration::milliseconds(backoff_ms as i64);
        self.reconnection_attempts
    }

    pub fn reconnection_attempts(&self) -> u32 {
        self.reconnection_attempts
    }

    pub fn observed_latency_ms(&self) -> f64 {
        self.observed_latency_ms
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }
}

impl Default for PeerHealth {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_peer_is_healthy() {
        let health = PeerHealth::new();
        assert!(health.is_healthy());
    }

    #[test]
    fn record_message_advances_last_seen_and_counts() {
        let mut health = PeerHealth::new();
        health.record_message(Duration::from_millis(42));
        assert_eq!(health.message_count(), 1);
        assert_eq!(health.observed_latency_ms(), 42.0);
    }

    #[test]
    fn backoff_matches_the_documented_schedule() {
        let mut health = PeerHealth::new();
        let expected_ms = [2000i64, 4000, 8000, 16000, 32000];
        for &expected in &expected_ms {
            let before = Utc::now();
            health.record_attempt();
            let delta = (health.next_attempt_at - before).num_milliseconds();
            assert!((delta - expected).abs() < 50, "expected ~{expected}ms, got {delta}ms");
        }
        assert!(health.exhausted());
    }

    #[test]
    fn on_reconnected_clears_attempts_and_failure_flag() {
        let mut health = PeerHealth::new();
        for _ in 0..5 {
            health.record_attempt();
        }
        health.recovery_failed = true;
        health.on_reconnected();
        assert_eq!(health.reconnection_attempts(), 0);
        assert!(!health.recovery_failed);
        assert!(!health.exhausted());
    }

    #[test]
    fn ready_for_attempt_is_false_immediately_after_scheduling_one() {
        let mut health = PeerHealth::new();
        health.record_attempt();
        assert!(!health.ready_for_attempt());
    }
}
