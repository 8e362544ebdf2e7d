//! # MMU
//!
//! Minimum mutator utilization analysis for garbage collector traces.
//!
//! Given the scheduling events of a garbage-collected runtime, this crate
//! derives the mutator utilization function (the fraction of processors
//! running application code at every instant) and answers, exactly, the
//! question "what is the lowest mean utilization over any window of a given
//! duration?".
//!
//! The pipeline is:
//!
//! 1. [`mutator_utilization`] turns an ordered slice of [`Event`]s into a
//!    step function of [`MutatorUtil`] breakpoints.
//! 2. [`MmuCurve::new`] indexes that function into bands.
//! 3. [`MmuCurve::mmu`] answers queries for arbitrary window sizes.
//!
//! ```
//! use mmu::{mutator_utilization, Event, EventKind, MmuCurve};
//!
//! let events = vec![
//!     Event::new(0, EventKind::ProcessorCountChanged { procs: 1 }),
//!     Event::new(1_000, EventKind::StwStart),
//!     Event::new(1_100, EventKind::StwEnd),
//!     Event::new(10_000, EventKind::StwStart),
//! ];
//! let util = mutator_utilization(&events);
//! let curve = MmuCurve::new(util).unwrap();
//!
//! assert_eq!(curve.mmu(50), 0.0);
//! assert!((curve.mmu(1_000) - 0.9).abs() < 1e-12);
//! ```

mod band;
pub mod curve;
pub mod event;
pub mod integrator;
pub mod utilization;

pub use curve::{MmuCurve, DEFAULT_MAX_BANDS};
pub use event::{is_background_mark_worker, Event, EventId, EventKind, GoroutineId};
pub use integrator::{Integrator, TotalUtil};
pub use utilization::{mutator_utilization, MutatorUtil};

use thiserror::Error;

/// Errors that can occur while building an [`MmuCurve`]
#[derive(Error, Debug, PartialEq)]
pub enum Error {
    /// The utilization function has no points, so it has no span to index
    #[error("utilization function is empty")]
    EmptyUtilization,

    /// The band index needs at least one band
    #[error("band count must be at least 1")]
    ZeroBands,

    /// Utilization points must be sorted by time
    #[error("non-monotonic utilization time at index {index}: previous={prev}, time={time}")]
    NonMonotonicTime { index: usize, prev: i64, time: i64 },

    /// Utilization values are fractions of the available processors
    #[error("utilization {util} at index {index} is outside [0, 1]")]
    UtilizationOutOfRange { index: usize, util: f64 },
}
