//! Bounded retry of a unit of work.

use std::{borrow::Cow, future::Future, time::Instant};

use opwait_core::Timer;

use crate::{
    backoff::Backoff,
    classify::Classifier,
    error::{Error, Result},
    options::{RetryBudget, RetryOptions},
};

/// Repeats work on retryable failure, sleeping through the injected timer.
#[derive(Debug, Clone)]
pub struct RetryRunner<T> {
    timer: T,
}

impl<T> RetryRunner<T>
where
    T: Timer,
{
    pub fn new(timer: T) -> Self {
        Self { timer }
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Begin a retry loop by hand, for work that cannot be expressed as a
    /// single closure.
    pub fn start(&self, options: RetryOptions) -> Result<RetryState<'_, T>> {
        options.budget.validate()?;
        Ok(RetryState {
            timer: &self.timer,
            budget: options.budget,
            backoff: options.schedule.start(),
            started: self.timer.now(),
            attempt: 0,
        })
    }

    /// Run `work` until it succeeds, `should_retry` declines an error, or the
    /// budget runs out. `should_retry` returns the reason an error is
    /// retryable, which is logged.
    pub async fn run<W, Fut, R, P>(&self, mut work: W, should_retry: P, options: RetryOptions) -> Result<R>
    where
        W: FnMut() -> Fut,
        Fut: Future<Output = Result<R>>,
        P: Fn(&Error) -> Option<Cow<'static, str>>,
    {
        let mut state = self.start(options)?;
        loop {
            match work().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let reason = should_retry(&err);
                    state.failed(err, reason).await?;
                }
            }
        }
    }
}

/// Attempt count and backoff of one retry loop.
#[derive(Debug)]
pub struct RetryState<'a, T> {
    timer: &'a T,
    budget: RetryBudget,
    backoff: Backoff,
    started: Instant,
    attempt: u32,
}

impl<T> RetryState<'_, T>
where
    T: Timer,
{
    /// Failed attempts so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record a failed attempt. Returns `Ok(())` after the backoff delay when
    /// another attempt may be made. Otherwise returns `err` itself when it is
    /// not retryable, or [`Error::RetriesExhausted`] wrapping it when the
    /// budget is spent.
    pub async fn failed(&mut self, err: Error, reason: Option<Cow<'static, str>>) -> Result<()> {
        self.attempt = self.attempt.saturating_add(1);
        let Some(reason) = reason else {
            return Err(err);
        };

        let delay = self.backoff.next_delay();
        let delay = match self.budget {
            RetryBudget::Attempts(max) if self.attempt < max => Some(delay),
            RetryBudget::Attempts(_) => None,
            RetryBudget::Elapsed(limit) => {
                let elapsed = self.timer.now().saturating_duration_since(self.started);
                limit
                    .checked_sub(elapsed)
                    .filter(|left| !left.is_zero())
                    .map(|left| delay.min(left))
            }
        };

        let Some(delay) = delay else {
            tracing::warn!(
                attempts = self.attempt,
                reason = %reason,
                error = %err,
                "retry budget exhausted"
            );
            return Err(Error::RetriesExhausted {
                attempts: self.attempt,
                source: Box::new(err),
            });
        };

        tracing::debug!(
            attempt = self.attempt,
            reason = %reason,
            delay = ?delay,
            error = %err,
            "retrying after retryable error"
        );
        self.timer.sleep(delay).await;
        Ok(())
    }
}

/// Retry `work` against `classifier` until it succeeds, fails with a
/// non-retryable error, or `timeout` has passed. Uses the capped exponential
/// schedule.
pub async fn retry_time_duration<T, W, Fut, R>(
    timer: T,
    classifier: &Classifier,
    timeout: std::time::Duration,
    work: W,
) -> Result<R>
where
    T: Timer,
    W: FnMut() -> Fut,
    Fut: Future<Output = Result<R>>,
{
    RetryRunner::new(timer)
        .run(
            work,
            |err| classifier.retry_reason(err),
            RetryOptions::for_duration(timeout),
        )
        .await
}
