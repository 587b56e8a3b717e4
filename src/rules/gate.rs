//! Bounded retry gate with jittered exponential backoff
//!
//! Some rules depend on a fact that is expected to become true shortly
//! (an app being classified, an app reaching the foreground). The gate
//! re-tests such a predicate until a polling budget is spent, then stalls
//! before reporting a timeout so that a misbehaving app cannot hammer the
//! tunnel with retries.
//!
//! # Timing
//!
//! ```text
//! attempt n: test predicate, then sleep uniform[base, 2^n * base]
//!            (capped by the budget left)
//! budget spent: sleep stall, report TimedOut
//! ```
//!
//! With the defaults (50ms base, 10s budget, 20s stall) a timeout costs 30
//! seconds. All waiting goes through a [`Clock`], so tests use
//! [`ManualClock`] and pay no wall time.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, trace};

use crate::config::GateConfig;

/// Highest backoff exponent; keeps `2^n * base` from overflowing
const MAX_EXPONENT: u32 = 16;

/// Monotonic time source that can block the caller
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> Instant;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only advances when slept on
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset_nanos: AtomicU64,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Create a clock frozen at the current instant
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_nanos: AtomicU64::new(0),
        }
    }

    /// Move the clock forward without sleeping
    pub fn advance(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Time passed since the clock was created
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Result of waiting on the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Predicate became true within the budget
    Satisfied,
    /// Budget spent and stall served
    TimedOut,
}

impl GateOutcome {
    /// Whether the predicate was observed true
    #[must_use]
    pub const fn is_satisfied(self) -> bool {
        matches!(self, Self::Satisfied)
    }
}

impl fmt::Display for GateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Satisfied => write!(f, "satisfied"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Retry gate
#[derive(Clone)]
pub struct RetryGate {
    stall: Duration,
    budget: Duration,
    base_delay: Duration,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for RetryGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryGate")
            .field("stall", &self.stall)
            .field("budget", &self.budget)
            .field("base_delay", &self.base_delay)
            .finish_non_exhaustive()
    }
}

impl RetryGate {
    /// Create a gate from configuration
    #[must_use]
    pub fn new(config: &GateConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            stall: config.stall(),
            budget: config.budget(),
            base_delay: config.base_delay(),
            clock,
        }
    }

    /// Builder method to override the stall
    #[must_use]
    pub fn with_stall(mut self, stall: Duration) -> Self {
        self.stall = stall;
        self
    }

    /// Builder method to override the polling budget
    #[must_use]
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Poll `predicate` until it holds or the budget is spent.
    ///
    /// Blocks the calling thread. The predicate is tested at least once.
    pub fn wait(&self, mut predicate: impl FnMut() -> bool) -> GateOutcome {
        let mut remaining = self.budget;
        let mut attempt = 0u32;

        loop {
            if predicate() {
                debug!("gate satisfied after {} attempts", attempt + 1);
                return GateOutcome::Satisfied;
            }
            if remaining.is_zero() {
                break;
            }

            let delay = self.backoff(attempt).min(remaining);
            trace!("gate attempt {} failed, sleeping {:?}", attempt, delay);
            self.clock.sleep(delay);
            remaining = remaining.saturating_sub(delay);
            attempt = attempt.saturating_add(1);
        }

        debug!("gate budget spent after {} attempts, stalling {:?}", attempt, self.stall);
        self.clock.sleep(self.stall);
        GateOutcome::TimedOut
    }

    /// Random delay in `[base, 2^attempt * base]`
    fn backoff(&self, attempt: u32) -> Duration {
        let base = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let ceiling = base.saturating_mul(1u64 << attempt.min(MAX_EXPONENT));
        let ms = if ceiling > base {
            rand::thread_rng().gen_range(base..=ceiling)
        } else {
            base
        };
        Duration::from_millis(ms)
    }
}
