use std::time::Duration;

use crate::{
    backoff::{BackoffPolicy, BackoffSchedule, PollBackoff},
    error::{Error, Result},
};

/// Knobs for [`OperationPoller`](crate::OperationPoller).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollOptions {
    /// Overall budget for one wait.
    pub timeout: Duration,
    /// Ceiling the poll delay grows toward.
    pub poll_interval: Duration,
    /// First poll delay.
    pub min_poll_interval: Duration,
    /// Growth factor applied after every non-terminal refresh.
    pub multiplier: f64,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20 * 60),
            poll_interval: Duration::from_secs(2),
            min_poll_interval: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl PollOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_min_poll_interval(mut self, min_poll_interval: Duration) -> Self {
        self.min_poll_interval = min_poll_interval;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::configuration("poll timeout must be positive"));
        }
        if self.min_poll_interval.is_zero() {
            return Err(Error::configuration("minimum poll interval must be positive"));
        }
        if self.min_poll_interval > self.poll_interval {
            return Err(Error::configuration(format!(
                "minimum poll interval {:?} exceeds poll interval {:?}",
                self.min_poll_interval, self.poll_interval
            )));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::configuration(format!(
                "poll multiplier must be a finite value >= 1.0, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }

    pub(crate) fn backoff(&self) -> PollBackoff {
        PollBackoff::new(self.min_poll_interval, self.poll_interval, self.multiplier)
    }
}

/// How long a [`RetryRunner`](crate::RetryRunner) keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBudget {
    /// At most this many attempts.
    Attempts(u32),
    /// Keep retrying until this much time has passed since the first attempt.
    Elapsed(Duration),
}

impl RetryBudget {
    pub fn validate(&self) -> Result<()> {
        match self {
            RetryBudget::Attempts(0) => Err(Error::configuration(
                "retry budget must allow at least one attempt",
            )),
            RetryBudget::Elapsed(d) if d.is_zero() => {
                Err(Error::configuration("retry duration must be positive"))
            }
            _ => Ok(()),
        }
    }
}

/// Budget and schedule for one retried call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOptions {
    pub budget: RetryBudget,
    pub schedule: BackoffSchedule,
}

impl RetryOptions {
    /// Time-bounded retry with the capped exponential schedule.
    pub fn for_duration(timeout: Duration) -> Self {
        Self {
            budget: RetryBudget::Elapsed(timeout),
            schedule: BackoffSchedule::Exponential(BackoffPolicy::default()),
        }
    }

    /// Budget used for fingerprint conflicts: ten attempts, 100ms apart.
    pub fn fingerprint() -> Self {
        Self {
            budget: RetryBudget::Attempts(10),
            schedule: BackoffSchedule::FINGERPRINT,
        }
    }

    pub fn with_budget(mut self, budget: RetryBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_schedule(mut self, schedule: BackoffSchedule) -> Self {
        self.schedule = schedule;
        self
    }
}
