// ABOUTME: Per-target circuit breaker and the process-wide registry that owns them.
// ABOUTME: State changes happen under one mutex per breaker; an atomic mirrors the state for cheap reads.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::BreakerConfig;

use super::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn to_u8(self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A call the breaker refused to let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected {
    /// Time until the circuit will admit a trial call. Zero while half-open
    /// trial slots are all taken.
    pub retry_in: Duration,
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub target: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<Instant>,
    pub next_retry_eligible: Option<Instant>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    half_open_in_flight: u32,
    last_failure_at: Option<Instant>,
    next_retry_eligible: Option<Instant>,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            half_open_in_flight: 0,
            last_failure_at: None,
            next_retry_eligible: None,
        }
    }
}

/// Failure gate for one downstream target.
///
/// Callers pair every successful [`acquire`](Self::acquire) with exactly one
/// [`record_success`](Self::record_success),
/// [`record_failure`](Self::record_failure) or
/// [`record_cancelled`](Self::record_cancelled). [`admit`](Self::admit) does
/// the pairing through a guard.
pub struct CircuitBreaker {
    target: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerState>,
    mirror: AtomicU8,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("target", &self.target)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(target: impl Into<String>, config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            target: target.into(),
            config,
            clock,
            inner: Mutex::new(BreakerState::closed()),
            mirror: AtomicU8::new(CircuitState::Closed.to_u8()),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Last published state, read without locking. An Open circuit whose
    /// cooldown has elapsed still reads Open until the next `acquire`.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.mirror.load(Ordering::Acquire))
    }

    /// Ask permission to make one call.
    pub fn acquire(&self) -> Result<(), Rejected> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open {
            match inner.next_retry_eligible {
                Some(eligible) if now < eligible => {
                    return Err(Rejected {
                        retry_in: eligible - now,
                    });
                }
                _ => {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    inner.half_open_in_flight = 0;
                    self.publish(CircuitState::HalfOpen);
                    tracing::info!(downstream = %self.target, "circuit half-open, admitting trial calls");
                }
            }
        }

        if inner.state == CircuitState::HalfOpen {
            if inner.half_open_in_flight >= self.config.half_open_max_calls {
                return Err(Rejected {
                    retry_in: Duration::ZERO,
                });
            }
            inner.half_open_in_flight += 1;
        }

        Ok(())
    }

    /// [`acquire`](Self::acquire) wrapped in a guard that gives the slot
    /// back if it is dropped without a verdict.
    pub fn admit(&self) -> Result<Permit<'_>, Rejected> {
        self.acquire()?;
        Ok(Permit {
            breaker: self,
            settled: false,
        })
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    *inner = BreakerState::closed();
                    self.publish(CircuitState::Closed);
                    tracing::info!(downstream = %self.target, "circuit closed");
                }
            }
            // A call admitted before the circuit opened; the cooldown stands.
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.last_failure_at = Some(now);

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.open(&mut inner, now);
                }
            }
            CircuitState::HalfOpen => {
                inner.consecutive_failures += 1;
                self.open(&mut inner, now);
            }
            CircuitState::Open => inner.consecutive_failures += 1,
        }
    }

    /// The admitted call was abandoned before it produced an outcome. Frees a
    /// half-open trial slot without counting for or against the target.
    pub fn record_cancelled(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
            tracing::debug!(downstream = %self.target, "half-open trial abandoned");
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            target: self.target.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            last_failure_at: inner.last_failure_at,
            next_retry_eligible: inner.next_retry_eligible,
        }
    }

    fn open(&self, inner: &mut BreakerState, now: Instant) {
        inner.state = CircuitState::Open;
        inner.next_retry_eligible = Some(now + self.config.reset_timeout);
        inner.half_open_successes = 0;
        inner.half_open_in_flight = 0;
        self.publish(CircuitState::Open);
        tracing::warn!(
            downstream = %self.target,
            failures = inner.consecutive_failures,
            cooldown = ?self.config.reset_timeout,
            "circuit opened"
        );
    }

    fn publish(&self, state: CircuitState) {
        self.mirror.store(state.to_u8(), Ordering::Release);
    }
}

/// One admitted call. Settle it with [`success`](Self::success) or
/// [`failure`](Self::failure); dropping it unsettled records a cancellation.
#[must_use = "an unsettled permit is recorded as cancelled"]
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl Permit<'_> {
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.record_cancelled();
        }
    }
}

/// Breakers keyed by target name, created on first use.
pub struct BreakerRegistry {
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("targets", &self.breakers.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub fn breaker(&self, target: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().get(target) {
            return Arc::clone(existing);
        }

        let mut breakers = self.breakers.write();
        Arc::clone(breakers.entry(target.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(
                target,
                self.config.clone(),
                Arc::clone(&self.clock),
            ))
        }))
    }

    /// Snapshots of every breaker created so far, sorted by target.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut all: Vec<_> = self.breakers.read().values().map(|b| b.snapshot()).collect();
        all.sort_by(|a, b| a.target.cmp(&b.target));
        all
    }
}
