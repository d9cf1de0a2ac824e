//! Token-bucket admission gate.
//!
//! One gate guards the whole process. Tokens refill lazily from elapsed time whenever
//! the gate is consulted; there is no background timer.

use crate::clock::{Clock, MonotonicClock};
use crate::config::GateConfig;
use crate::error::GateConfigError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

#[derive(Debug)]
struct BucketState {
    available: f64,
    last_refill_nanos: u64,
}

/// A token bucket admission gate.
///
/// Holds at most `capacity` tokens and replenishes them at `refill_rate` tokens per second
/// of elapsed time. Starts full. Share one instance across handlers with `Arc`.
///
/// # Examples
/// ```
/// use faqgate::AdmissionGate;
/// let gate = AdmissionGate::new(2.0, 1.0).unwrap();
/// assert!(gate.try_acquire());
/// assert!(gate.try_acquire());
/// assert!(!gate.try_acquire());
/// ```
#[derive(Debug)]
pub struct AdmissionGate {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
    clock: Arc<dyn Clock>,
}

impl AdmissionGate {
    /// Create a full gate. Errors if either parameter is not positive and finite.
    pub fn new(capacity: f64, refill_rate_per_second: f64) -> Result<Self, GateConfigError> {
        if !(capacity.is_finite() && capacity > 0.0) {
            return Err(GateConfigError::InvalidCapacity(capacity));
        }
        if !(refill_rate_per_second.is_finite() && refill_rate_per_second > 0.0) {
            return Err(GateConfigError::InvalidRefillRate(refill_rate_per_second));
        }

        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::default());
        Ok(Self {
            capacity,
            refill_rate: refill_rate_per_second,
            state: Mutex::new(BucketState {
                available: capacity,
                last_refill_nanos: clock.now_nanos(),
            }),
            clock,
        })
    }

    pub fn from_config(config: &GateConfig) -> Result<Self, GateConfigError> {
        Self::new(config.capacity, config.refill_rate_per_second)
    }

    /// Override the clock (useful for deterministic tests).
    ///
    /// The last refill instant is re-anchored to the new clock's current reading.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        let now = clock.now_nanos();
        self.clock = Arc::new(clock);
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner).last_refill_nanos = now;
        self
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Refill from elapsed time, then take `cost` tokens if they are all there.
    ///
    /// Returns `true` when the caller now owns `cost` tokens. A rejected call still
    /// records the refill; only the deduction is skipped. Costs that are not positive
    /// and finite are rejected without touching the bucket.
    pub fn try_consume(&self, cost: f64) -> bool {
        if !(cost.is_finite() && cost > 0.0) {
            tracing::warn!(cost, "admission gate: invalid cost rejected");
            return false;
        }

        let mut state = self.lock();
        self.refill(&mut state);
        if state.available >= cost {
            state.available -= cost;
            true
        } else {
            false
        }
    }

    /// Shorthand for `try_consume(1.0)`.
    pub fn try_acquire(&self) -> bool {
        self.try_consume(1.0)
    }

    /// Current token count, after applying the refill owed for elapsed time.
    pub fn available(&self) -> f64 {
        let mut state = self.lock();
        self.refill(&mut state);
        state.available
    }

    fn refill(&self, state: &mut BucketState) {
        let now = self.clock.now_nanos();
        // A clock reading behind the last refill counts as zero elapsed time, and the
        // bookkeeping instant stays put so it never decreases.
        let elapsed_nanos = now.saturating_sub(state.last_refill_nanos);
        let elapsed_secs = elapsed_nanos as f64 / NANOS_PER_SEC;
        state.available = (state.available + self.refill_rate * elapsed_secs).min(self.capacity);
        state.last_refill_nanos = state.last_refill_nanos.max(now);
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        // The state is two plain fields written by assignment, so a poisoned guard still
        // holds a consistent bucket.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn last_refill_nanos(&self) -> u64 {
        self.lock().last_refill_nanos
    }
}
