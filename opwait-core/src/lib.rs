//! Runtime-agnostic building blocks for the opwait operation engine.
//!
//! Nothing in here knows about remote operations: this crate only provides the
//! marker traits used to stay executor neutral and the [`Timer`] seam through
//! which every poll and retry loop suspends.

#![cfg_attr(docsrs, feature(doc_cfg))]

mod maybe;
pub mod timer;

pub use maybe::{MaybeSend, MaybeSendFuture, MaybeSync};
pub use timer::{BlockingSleeper, ManualTimer, NoopTimer, Timer};
#[cfg(feature = "tokio")]
pub use timer::TokioTimer;

pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;
