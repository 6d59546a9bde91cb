//! Batch dispatch: a bounded worker pool behind a shared rate limiter.
//!
//! # Flow
//!
//! ```text
//! batch ──► Dispatcher ──► [slot] ──► RateLimiter::acquire ──► unit_fn(item)
//!                                                                  │
//!              BatchReport ◄── classify ◄── ProgressStore (flush) ◄┘
//! ```
//!
//! A unit's outcome is a [`UnitResult`]: records on success, no records for
//! an empty result, or a [`UnitFailure`] tagged with a [`FailureKind`].
//! Failures never abort the batch.
//!
//! # Cancellation
//!
//! The [`RunContext`] carries a cancellation token. It is checked before each
//! item is dispatched and before each unit starts. Running units finish.

mod context;
mod dispatcher;
mod outcome;


pub use context::{FailureBreakdown, RunContext};
pub use dispatcher::{DEFAULT_MAX_WORKERS, Dispatcher, DispatcherConfig};
pub use outcome::{BatchReport, FailureKind, UnitFailure, UnitResult};
