// ABOUTME: Retry policy and the executor wrapper that applies breaker, timeout and bounded retry.
// ABOUTME: Every attempt outcome is reported to the target's breaker; backoff sleeps hold no locks.

use snafu::ResultExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{BackoffConfig, RetryConfig};
use crate::executor::{CommandExecutor, CommandFailure, CommandOutput, CommandSpec};

use super::breaker::BreakerRegistry;
use super::clock::Clock;
use super::error::{CallError, CircuitOpenSnafu, ExhaustedSnafu, PermanentSnafu};

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base * 2^(n-1)` before retry `n`, never more than `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay before retry number `retry` (1 for the first retry).
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let exponent = retry.saturating_sub(1).min(31);
                base.checked_mul(1u32 << exponent).unwrap_or(max).min(max)
            }
        }
    }
}

impl From<BackoffConfig> for Backoff {
    fn from(config: BackoffConfig) -> Self {
        match config {
            BackoffConfig::Fixed { delay } => Backoff::Fixed(delay),
            BackoffConfig::Exponential { base, max } => Backoff::Exponential { base, max },
        }
    }
}

type TransientPredicate = Arc<dyn Fn(&CommandFailure) -> bool + Send + Sync>;

/// How one call is retried.
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub call_timeout: Duration,
    is_transient: TransientPredicate,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Retries the failures [`CommandFailure::is_transient`] classifies as transient.
    pub fn new(max_attempts: u32, backoff: Backoff, call_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            call_timeout,
            is_transient: Arc::new(CommandFailure::is_transient),
        }
    }

    pub fn from_config(config: &RetryConfig, call_timeout: Duration) -> Self {
        Self::new(config.max_attempts, config.backoff.into(), call_timeout)
    }

    pub fn with_transient_predicate(
        mut self,
        predicate: impl Fn(&CommandFailure) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.is_transient = Arc::new(predicate);
        self
    }

    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn is_transient(&self, failure: &CommandFailure) -> bool {
        (self.is_transient)(failure)
    }
}

/// A call that eventually succeeded.
#[derive(Debug, Clone)]
pub struct CallSuccess {
    pub output: CommandOutput,
    pub attempts: u32,
}

/// Runs commands through the breaker for their target, with timeout and retry.
#[derive(Clone)]
pub struct RetryingExecutor {
    executor: Arc<dyn CommandExecutor>,
    breakers: Arc<BreakerRegistry>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for RetryingExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingExecutor")
            .field("breakers", &self.breakers)
            .finish_non_exhaustive()
    }
}

impl RetryingExecutor {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        breakers: Arc<BreakerRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            executor,
            breakers,
            clock,
        }
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Run `spec` against `target` until it succeeds, fails permanently,
    /// exhausts the policy, or the breaker refuses.
    pub async fn call(
        &self,
        target: &str,
        spec: &CommandSpec,
        policy: &RetryPolicy,
    ) -> Result<CallSuccess, CallError> {
        let breaker = self.breakers.breaker(target);
        let mut attempts = 0;

        loop {
            let permit = match breaker.admit() {
                Ok(permit) => permit,
                Err(rejected) => {
                    tracing::warn!(
                        downstream = target,
                        command = %spec.command_line(),
                        "circuit open, call not attempted"
                    );
                    return CircuitOpenSnafu {
                        target,
                        retry_in: rejected.retry_in,
                        attempts,
                    }
                    .fail();
                }
            };

            attempts += 1;
            tracing::debug!(downstream = target, attempt = attempts, command = %spec.command_line(), "calling");

            // Dropping this future mid-call drops the permit unsettled.
            match self.attempt(spec, policy.call_timeout).await {
                Ok(output) => {
                    permit.success();
                    return Ok(CallSuccess { output, attempts });
                }
                Err(failure) => {
                    permit.failure();

                    if !policy.is_transient(&failure) {
                        return Err(failure).context(PermanentSnafu { target, attempts });
                    }
                    if attempts >= policy.max_attempts {
                        return Err(failure).context(ExhaustedSnafu { target, attempts });
                    }

                    let delay = policy.backoff.delay(attempts);
                    tracing::warn!(
                        downstream = target,
                        attempt = attempts,
                        max_attempts = policy.max_attempts,
                        error = %failure,
                        "transient failure, retrying in {:?}",
                        delay
                    );
                    self.clock.sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(&self, spec: &CommandSpec, timeout: Duration) -> Result<CommandOutput, CommandFailure> {
        match tokio::time::timeout(timeout, self.executor.execute(spec, timeout)).await {
            Ok(Ok(output)) if output.success() => Ok(output),
            Ok(Ok(output)) => Err(CommandFailure::from_output(&output)),
            Ok(Err(failure)) => Err(failure),
            Err(_) => Err(CommandFailure::Timeout(timeout)),
        }
    }
}
