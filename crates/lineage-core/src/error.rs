//! Typed errors for the public API, per the error-handling design: most
//! variants here are developer-facing (a caller violated a contract), not
//! things a user-facing dialog should explain on their own. `UserError` is
//! the one variant meant to be shown to a human as-is.

use thiserror::Error;

/// Errors raised by the lineage graph, spatial stores and comparison/linker
/// algorithms.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LineageError {
    /// A link was requested (or implied) between positions that are not in
    /// consecutive time points.
    #[error("cannot link position at t={t1} to position at t={t2}: links require consecutive time points")]
    BadLink { t1: i32, t2: i32 },

    /// Two positions were required to be in different time points, but
    /// weren't (e.g. linking a position to itself).
    #[error("positions are both at t={t}, but must be at different time points")]
    SameTimePoint { t: i32 },

    /// An operation required two positions (or two resolutions, experiments,
    /// ...) to share a time point / scale, and they didn't.
    #[error("time point mismatch: expected t={expected}, got t={actual}")]
    TimePointMismatch { expected: i32, actual: i32 },

    /// [`crate::experiment::Experiment::merge`] was asked to combine two
    /// experiments whose time scales disagree by more than 10%.
    #[error(
        "cannot merge experiments: time point interval differs by more than 10% ({ours} min vs {theirs} min)"
    )]
    ScaleMismatch { ours: f64, theirs: f64 },

    /// A caller tried to use a reserved position/link data name.
    #[error("data name '{0}' is reserved and cannot be used")]
    ReservedDataName(String),

    /// A user-facing error: not a programmer mistake, something that should
    /// be surfaced to a human as a dialog with a title and an explanation.
    #[error("{title}: {body}")]
    UserError { title: String, body: String },
}

pub type Result<T> = std::result::Result<T, LineageError>;
