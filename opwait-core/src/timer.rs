use core::{pin::Pin, time::Duration};
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use crate::{MaybeSend, MaybeSendFuture, MaybeSync};

/// Minimal timer abstraction to decouple the wait loops from concrete runtimes.
pub trait Timer: MaybeSend + MaybeSync + 'static {
    /// Sleep for the given duration and yield back to the runtime.
    fn sleep(&self, dur: Duration) -> Pin<Box<dyn MaybeSendFuture<Output = ()>>>;

    /// Monotonic "now" according to this timer. Deadlines are computed from it.
    fn now(&self) -> Instant;
}

impl<T> Timer for Arc<T>
where
    T: Timer + ?Sized,
{
    fn sleep(&self, dur: Duration) -> Pin<Box<dyn MaybeSendFuture<Output = ()>>> {
        (**self).sleep(dur)
    }

    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Parks the calling thread. Driving a wait with `block_on` and this timer
/// occupies exactly one thread for the whole wait.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockingSleeper;

impl Timer for BlockingSleeper {
    fn sleep(&self, dur: Duration) -> Pin<Box<dyn MaybeSendFuture<Output = ()>>> {
        Box::pin(async move { std::thread::sleep(dur) })
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Timer that never sleeps and always reports the current time.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTimer;

impl Timer for NoopTimer {
    fn sleep(&self, _dur: Duration) -> Pin<Box<dyn MaybeSendFuture<Output = ()>>> {
        Box::pin(async move {})
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(feature = "tokio")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimer;

#[cfg(feature = "tokio")]
impl Timer for TokioTimer {
    fn sleep(&self, dur: Duration) -> Pin<Box<dyn MaybeSendFuture<Output = ()>>> {
        Box::pin(async move {
            tokio::time::sleep(dur).await;
        })
    }

    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

/// Virtual clock. Sleeping advances the clock instantly and records the
/// requested duration, so loops can be inspected without waiting.
#[derive(Debug, Clone)]
pub struct ManualTimer {
    origin: Instant,
    state: Arc<Mutex<ManualState>>,
}

impl Default for ManualTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualTimer {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Arc::new(Mutex::new(ManualState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the clock forward without recording a sleep, e.g. to model the
    /// latency of a remote call.
    pub fn advance(&self, dur: Duration) {
        let mut state = self.state();
        state.elapsed = state.elapsed.saturating_add(dur);
    }

    /// Virtual time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        self.state().elapsed
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state().sleeps.clone()
    }
}

impl Timer for ManualTimer {
    fn sleep(&self, dur: Duration) -> Pin<Box<dyn MaybeSendFuture<Output = ()>>> {
        {
            let mut state = self.state();
            state.elapsed = state.elapsed.saturating_add(dur);
            state.sleeps.push(dur);
        }
        Box::pin(async move {})
    }

    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }
}
