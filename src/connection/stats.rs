//! Decision statistics
//!
//! Counters are updated with relaxed atomics on the decision path.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic decision counters
#[derive(Debug, Default)]
pub struct DecisionStats {
    /// Flows run through the evaluator
    evaluated: AtomicU64,
    /// Flows blocked
    blocked: AtomicU64,
    /// Flows allowed (evaluated or exempt)
    allowed: AtomicU64,
    /// Flows to the tunnel resolver, never evaluated
    exempt: AtomicU64,
    /// Flows that failed evaluation
    failed: AtomicU64,
    /// Close reports received
    closed: AtomicU64,
    /// DNS queries answered with a transport id
    queries: AtomicU64,
    /// Bytes received by closed flows
    bytes_in: AtomicU64,
    /// Bytes sent by closed flows
    bytes_out: AtomicU64,
}

impl DecisionStats {
    /// Create zeroed statistics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an evaluated flow
    pub fn record_evaluated(&self, blocked: bool) {
        self.evaluated.fetch_add(1, Ordering::Relaxed);
        if blocked {
            self.blocked.fetch_add(1, Ordering::Relaxed);
        } else {
            self.allowed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a flow passed without evaluation
    pub fn record_exempt(&self) {
        self.exempt.fetch_add(1, Ordering::Relaxed);
        self.allowed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an evaluation that failed closed
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a closed flow
    pub fn record_closed(&self, bytes_in: u64, bytes_out: u64) {
        self.closed.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(bytes_in, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes_out, Ordering::Relaxed);
    }

    /// Record a DNS query
    pub fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    /// Get evaluated flows
    #[must_use]
    pub fn evaluated(&self) -> u64 {
        self.evaluated.load(Ordering::Relaxed)
    }

    /// Get blocked flows
    #[must_use]
    pub fn blocked(&self) -> u64 {
        self.blocked.load(Ordering::Relaxed)
    }

    /// Get allowed flows
    #[must_use]
    pub fn allowed(&self) -> u64 {
        self.allowed.load(Ordering::Relaxed)
    }

    /// Get exempt flows
    #[must_use]
    pub fn exempt(&self) -> u64 {
        self.exempt.load(Ordering::Relaxed)
    }

    /// Get failed evaluations
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Get closed flows
    #[must_use]
    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::Relaxed)
    }

    /// Get DNS queries
    #[must_use]
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all statistics
    #[must_use]
    pub fn snapshot(&self) -> DecisionStatsSnapshot {
        DecisionStatsSnapshot {
            evaluated: self.evaluated(),
            blocked: self.blocked(),
            allowed: self.allowed(),
            exempt: self.exempt(),
            failed: self.failed(),
            closed: self.closed(),
            queries: self.queries(),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            timestamp_ms: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }

    /// Reset all statistics
    pub fn reset(&self) {
        for counter in [
            &self.evaluated,
            &self.blocked,
            &self.allowed,
            &self.exempt,
            &self.failed,
            &self.closed,
            &self.queries,
            &self.bytes_in,
            &self.bytes_out,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Snapshot of decision statistics at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionStatsSnapshot {
    /// Flows run through the evaluator
    pub evaluated: u64,
    /// Flows blocked
    pub blocked: u64,
    /// Flows allowed
    pub allowed: u64,
    /// Flows exempt from evaluation
    pub exempt: u64,
    /// Evaluations that failed closed
    pub failed: u64,
    /// Close reports received
    pub closed: u64,
    /// DNS queries
    pub queries: u64,
    /// Bytes received
    pub bytes_in: u64,
    /// Bytes sent
    pub bytes_out: u64,
    /// Timestamp in milliseconds
    pub timestamp_ms: u64,
}

impl DecisionStatsSnapshot {
    /// Get total bytes transferred (both directions)
    #[must_use]
    pub const fn total_bytes(&self) -> u64 {
        self.bytes_in + self.bytes_out
    }

    /// Get the share of decided flows that were blocked, as a percentage (0-100)
    #[must_use]
    pub fn block_rate(&self) -> f64 {
        let total = self.blocked + self.allowed;
        if total == 0 {
            0.0
        } else {
            (self.blocked as f64 / total as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_stats() {
        let stats = DecisionStats::new();

        stats.record_evaluated(true);
        stats.record_evaluated(false);
        stats.record_evaluated(false);
        stats.record_exempt();

        assert_eq!(stats.evaluated(), 3);
        assert_eq!(stats.blocked(), 1);
        assert_eq!(stats.allowed(), 3);
        assert_eq!(stats.exempt(), 1);

        stats.record_failure();
        assert_eq!(stats.failed(), 1);

        stats.record_query();
        assert_eq!(stats.queries(), 1);
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = DecisionStats::new();
        stats.record_closed(100, 200);
        stats.record_closed(1, 2);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.closed, 2);
        assert_eq!(snapshot.total_bytes(), 303);
    }

    #[test]
    fn test_block_rate() {
        let mut snapshot = DecisionStats::new().snapshot();

        // No flows yet
        assert!(snapshot.block_rate().abs() < f64::EPSILON);

        // 25% blocked
        snapshot.blocked = 25;
        snapshot.allowed = 75;
        assert!((snapshot.block_rate() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stats_reset() {
        let stats = DecisionStats::new();
        stats.record_evaluated(true);
        stats.record_closed(100, 200);

        stats.reset();

        assert_eq!(stats.evaluated(), 0);
        assert_eq!(stats.closed(), 0);
        assert_eq!(stats.snapshot().bytes_in, 0);
    }
}
