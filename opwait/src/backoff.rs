use core::time::Duration;

/// Exponential backoff policy with jitter, in integer fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
    pub multiplier_times_100: u64, // store as integer: e.g., 200 for 2.0
    pub jitter_frac_times_100: u64, // e.g., 25 for 0.25
}

impl BackoffPolicy {
    /// Capped exponential used for general transient-error retries:
    /// 500ms doubling up to 10s.
    pub const fn default() -> Self {
        Self {
            base_ms: 500,
            max_ms: 10_000,
            multiplier_times_100: 200, // 2.0x
            jitter_frac_times_100: 0,
        }
    }

    pub const fn with_jitter(mut self, jitter_frac_times_100: u64) -> Self {
        self.jitter_frac_times_100 = jitter_frac_times_100;
        self
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::default()
    }
}

/// Delay schedule between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffSchedule {
    Constant(Duration),
    /// `initial`, `initial + step`, ... capped at `max`.
    Linear {
        initial: Duration,
        step: Duration,
        max: Duration,
    },
    Exponential(BackoffPolicy),
}

impl BackoffSchedule {
    /// Short near-constant delay used between fingerprint conflict retries.
    pub const FINGERPRINT: BackoffSchedule = BackoffSchedule::Constant(Duration::from_millis(100));

    pub fn start(&self) -> Backoff {
        match *self {
            BackoffSchedule::Constant(delay) => Backoff::Constant(delay),
            BackoffSchedule::Linear { initial, step, max } => Backoff::Linear {
                next: initial.min(max),
                step,
                max,
            },
            BackoffSchedule::Exponential(pol) => Backoff::Exponential(ExponentialBackoff::new(pol)),
        }
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        BackoffSchedule::Exponential(BackoffPolicy::default())
    }
}

/// Running state of a [`BackoffSchedule`].
#[derive(Debug, Clone)]
pub enum Backoff {
    Constant(Duration),
    Linear {
        next: Duration,
        step: Duration,
        max: Duration,
    },
    Exponential(ExponentialBackoff),
}

impl Backoff {
    /// Compute the next delay and advance.
    pub fn next_delay(&mut self) -> Duration {
        match self {
            Backoff::Constant(delay) => *delay,
            Backoff::Linear { next, step, max } => {
                let out = *next;
                *next = next.saturating_add(*step).min(*max);
                out
            }
            Backoff::Exponential(exp) => exp.next_delay(),
        }
    }
}

/// Runtime-agnostic exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pol: BackoffPolicy,
    attempt: u32,
    rng: u64,
}

impl ExponentialBackoff {
    pub fn new(pol: BackoffPolicy) -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        Self {
            pol,
            attempt: 0,
            rng: seed ^ 0x9e3779b97f4a7c15,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Compute the next delay and advance the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let a = self.attempt as u64;
        self.attempt = self.attempt.saturating_add(1);
        // multiplier^a with integer math in x100 fixed point, stopping once
        // the cap is reached so large attempt counts stay cheap
        let mut mult_scaled = 100u64; // 1.00
        for _ in 0..a {
            if self.pol.base_ms.saturating_mul(mult_scaled) / 100 >= self.pol.max_ms {
                break;
            }
            mult_scaled = mult_scaled
                .saturating_mul(self.pol.multiplier_times_100)
                .saturating_div(100);
        }
        let base = self
            .pol
            .base_ms
            .saturating_mul(mult_scaled)
            .saturating_div(100);
        let unclamped = core::cmp::min(base, self.pol.max_ms);
        if self.pol.jitter_frac_times_100 == 0 {
            return Duration::from_millis(core::cmp::max(unclamped, 1));
        }
        // jitter in [1 - j .. 1 + j]
        let jitter = self.next_unit(); // in [0,1)
        let jf = self.pol.jitter_frac_times_100 as f64 / 100.0;
        let low = (1.0 - jf).max(0.0);
        let high = 1.0 + jf;
        let factor = low + (high - low) * jitter;
        let out = (unclamped as f64 * factor) as u64;
        Duration::from_millis(core::cmp::max(out, 1))
    }

    fn next_unit(&mut self) -> f64 {
        // xorshift64*
        let mut x = self.rng;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng = x;
        let y = x.wrapping_mul(0x2545F4914F6CDD1D);
        // scale to [0,1)
        (y >> 11) as f64 / ((u64::MAX >> 11) as f64)
    }
}

/// Poll cadence: starts at the minimum interval and grows geometrically
/// toward the ceiling. Never shrinks.
#[derive(Debug, Clone)]
pub struct PollBackoff {
    current: Duration,
    ceiling: Duration,
    multiplier: f64,
}

impl PollBackoff {
    pub fn new(min_interval: Duration, ceiling: Duration, multiplier: f64) -> Self {
        Self {
            current: min_interval.min(ceiling),
            ceiling,
            multiplier,
        }
    }

    /// Delay to use for the upcoming sleep.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn grow(&mut self) {
        let next = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.ceiling);
        self.current = next.clamp(self.current, self.ceiling);
    }
}
