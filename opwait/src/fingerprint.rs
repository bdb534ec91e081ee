//! Read-modify-write updates guarded by a fingerprint.
//!
//! The server rejects a write whose fingerprint is stale. On such a rejection
//! the whole cycle starts over from a fresh read; the previous state and its
//! fingerprint are never resubmitted.

use std::{borrow::Cow, fmt, future::Future};

use opwait_core::Timer;

use crate::{
    classify::Classifier,
    error::Result,
    options::RetryOptions,
    retry::RetryRunner,
};

/// Opaque concurrency token. Only compared for equality, never inspected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for Fingerprint {
    fn from(token: &str) -> Self {
        Self(token.to_owned())
    }
}

/// A value paired with the fingerprint of the read it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub fingerprint: Fingerprint,
}

impl<T> Versioned<T> {
    pub fn new(value: T, fingerprint: impl Into<Fingerprint>) -> Self {
        Self {
            value,
            fingerprint: fingerprint.into(),
        }
    }
}

/// Retries a read-modify-write cycle while the server reports a stale
/// fingerprint.
#[derive(Debug, Clone)]
pub struct FingerprintRetryWrapper<T> {
    runner: RetryRunner<T>,
    classifier: Classifier,
    options: RetryOptions,
}

impl<T> FingerprintRetryWrapper<T>
where
    T: Timer,
{
    /// Ten attempts, 100ms apart, default conflict patterns.
    pub fn new(timer: T) -> Self {
        Self {
            runner: RetryRunner::new(timer),
            classifier: Classifier::default(),
            options: RetryOptions::fingerprint(),
        }
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_options(mut self, options: RetryOptions) -> Self {
        self.options = options;
        self
    }

    /// Read the current state, merge the change into it, and submit the
    /// result together with the fingerprint of that same read.
    ///
    /// Only fingerprint conflicts from `submit` are retried, each time from a
    /// fresh `read_current`. Any other error, including failures of the read
    /// or of `compute_delta`, is returned as is.
    pub async fn update_with_retry<S, D, R, Rd, RdFut, Cd, Sb, SbFut>(
        &self,
        mut read_current: Rd,
        mut compute_delta: Cd,
        mut submit: Sb,
    ) -> Result<R>
    where
        Rd: FnMut() -> RdFut,
        RdFut: Future<Output = Result<Versioned<S>>>,
        Cd: FnMut(S) -> Result<D>,
        Sb: FnMut(Versioned<D>) -> SbFut,
        SbFut: Future<Output = Result<R>>,
    {
        let mut state = self.runner.start(self.options)?;
        loop {
            let Versioned { value, fingerprint } = read_current().await?;
            let desired = compute_delta(value)?;
            match submit(Versioned {
                value: desired,
                fingerprint: fingerprint.clone(),
            })
            .await
            {
                Ok(out) => return Ok(out),
                Err(err) => {
                    let reason = if self.classifier.is_fingerprint_conflict(&err) {
                        tracing::warn!(
                            attempt = state.attempt() + 1,
                            fingerprint = %fingerprint,
                            "fingerprint conflict, re-reading"
                        );
                        Some(Cow::Borrowed("fingerprint conflict"))
                    } else {
                        None
                    };
                    state.failed(err, reason).await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, time::Duration};

    use futures_executor::block_on;
    use opwait_core::ManualTimer;

    use super::*;
    use crate::error::{Error, ErrorKind, TransportError};

    fn conflict() -> Error {
        Error::Transport(TransportError::from_reply(
            http::StatusCode::PRECONDITION_FAILED,
            r#"{"error": {"code": 412, "message": "Supplied fingerprint does not match current metadata fingerprint."}}"#.into(),
        ))
    }

    #[test]
    fn read_or_merge_failures_abort() {
        let timer = ManualTimer::new();
        let wrapper = FingerprintRetryWrapper::new(timer.clone());
        let submits = RefCell::new(0);
        let err = block_on(wrapper.update_with_retry(
            || async { Ok(Versioned::new(1u32, "fp")) },
            |_| Err::<u32, _>(Error::configuration("cannot merge")),
            |_| {
                *submits.borrow_mut() += 1;
                async { Ok(()) }
            },
        ))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(*submits.borrow(), 0);
        assert!(timer.sleeps().is_empty());
    }

    #[test]
    fn conflicts_back_off_between_cycles() {
        let timer = ManualTimer::new();
        let wrapper = FingerprintRetryWrapper::new(timer.clone());
        let remaining = RefCell::new(2);
        block_on(wrapper.update_with_retry(
            || async { Ok(Versioned::new((), "fp")) },
            Ok,
            |_| {
                let fail = {
                    let mut left = remaining.borrow_mut();
                    let fail = *left > 0;
                    *left -= i32::from(fail);
                    fail
                };
                async move {
                    if fail {
                        Err(conflict())
                    } else {
                        Ok(())
                    }
                }
            },
        ))
        .unwrap();
        assert_eq!(timer.sleeps(), vec![Duration::from_millis(100); 2]);
    }
}
