// ABOUTME: Resilience layer around external calls: circuit breakers, retry policy and clock.
// ABOUTME: RetryingExecutor is the only way the orchestrator reaches the network CLI.

mod breaker;
mod clock;
mod error;
mod retry;

pub use breaker::{BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitState, Permit, Rejected};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CallError;
pub use retry::{Backoff, CallSuccess, RetryPolicy, RetryingExecutor};
