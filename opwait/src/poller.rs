use std::time::{Duration, Instant};

use opwait_core::Timer;

use crate::{
    classify::Classifier,
    error::{Error, Result, TransportError},
    operation::OperationHandle,
    options::PollOptions,
};

/// Drives one [`OperationHandle`] to a terminal state.
///
/// Each call to [`wait`](Self::wait) is one strictly sequential loop: a
/// refresh is never issued before the previous one returned. Waiting on many
/// operations means running many `wait` futures; they share nothing but the
/// timer.
#[derive(Debug, Clone)]
pub struct OperationPoller<T> {
    timer: T,
    options: PollOptions,
    classifier: Classifier,
}

impl<T> OperationPoller<T>
where
    T: Timer,
{
    /// Fails with a configuration error when `options` are invalid.
    pub fn new(timer: T, options: PollOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            timer,
            options,
            classifier: Classifier::default(),
        })
    }

    /// Classifier deciding which refresh failures are retried.
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn options(&self) -> &PollOptions {
        &self.options
    }

    /// Whether the poll loop would retry this refresh failure.
    pub fn would_retry(&self, err: &TransportError) -> bool {
        err.status() != Some(404) && self.classifier.transport_retry_reason(err).is_some()
    }

    /// Wait until `handle` is terminal and return the final handle.
    ///
    /// `activity` names what is being waited for ("Creating Disk") and shows
    /// up in logs and errors.
    pub async fn wait<H>(&self, handle: H, activity: &str) -> Result<H>
    where
        H: OperationHandle,
    {
        let started = self.timer.now();
        if handle.is_terminal() {
            return finish(handle, activity);
        }

        let mut backoff = self.options.backoff();
        let mut handle = handle;
        let mut last_error = None;
        loop {
            let remaining = self.remaining(started, &handle, activity, &mut last_error)?;
            tracing::trace!(
                activity,
                operation = handle.name(),
                remaining = ?remaining,
                "refreshing operation"
            );

            match handle.refresh().await {
                Ok(next) => {
                    handle = next;
                    last_error = None;
                    if handle.is_terminal() {
                        return finish(handle, activity);
                    }
                    tracing::debug!(
                        activity,
                        operation = handle.name(),
                        status = handle.raw_status(),
                        "operation still in progress"
                    );
                    self.pause(started, &handle, activity, &mut last_error, backoff.current())
                        .await?;
                    backoff.grow();
                }
                Err(err) if err.status() == Some(404) => {
                    tracing::warn!(
                        activity,
                        operation = handle.name(),
                        "operation disappeared while polling"
                    );
                    return Err(Error::OperationNotFound {
                        name: handle.name().to_owned(),
                        source: err,
                    });
                }
                Err(err) => {
                    let Some(reason) = self.classifier.transport_retry_reason(&err) else {
                        return Err(Error::Transport(err));
                    };
                    tracing::debug!(
                        activity,
                        operation = handle.name(),
                        reason = %reason,
                        error = %err,
                        "dismissed retryable error while polling"
                    );
                    last_error = Some(err);
                    self.pause(started, &handle, activity, &mut last_error, backoff.current())
                        .await?;
                }
            }
        }
    }

    fn remaining<H>(
        &self,
        started: Instant,
        handle: &H,
        activity: &str,
        last_error: &mut Option<TransportError>,
    ) -> Result<Duration>
    where
        H: OperationHandle,
    {
        let elapsed = self.timer.now().saturating_duration_since(started);
        match self.options.timeout.checked_sub(elapsed) {
            Some(remaining) if !remaining.is_zero() => Ok(remaining),
            _ => {
                tracing::warn!(
                    activity,
                    operation = handle.name(),
                    status = handle.raw_status(),
                    elapsed = ?elapsed,
                    last_error = last_error.as_ref().map(tracing::field::display),
                    "timed out waiting for operation"
                );
                Err(Error::Timeout {
                    activity: activity.to_owned(),
                    name: handle.name().to_owned(),
                    last_status: handle.raw_status().to_owned(),
                    elapsed,
                    last_error: last_error.take(),
                })
            }
        }
    }

    /// Sleep `delay`, never past the deadline.
    async fn pause<H>(
        &self,
        started: Instant,
        handle: &H,
        activity: &str,
        last_error: &mut Option<TransportError>,
        delay: Duration,
    ) -> Result<()>
    where
        H: OperationHandle,
    {
        let remaining = self.remaining(started, handle, activity, last_error)?;
        self.timer.sleep(delay.min(remaining)).await;
        Ok(())
    }
}

fn finish<H>(handle: H, activity: &str) -> Result<H>
where
    H: OperationHandle,
{
    if let Some(errors) = handle.result_error() {
        return Err(Error::OperationFailed {
            activity: activity.to_owned(),
            name: handle.name().to_owned(),
            errors,
        });
    }
    tracing::info!(activity, operation = handle.name(), "operation finished");
    Ok(handle)
}
