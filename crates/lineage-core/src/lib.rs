//! In-memory data model and algorithms for cell-lineage tracking in
//! time-lapse 3D microscopy: a lineage graph of tracks and divisions, the
//! spatial stores and neighbor queries that feed it, a constraint-based
//! link selector, a biological-implausibility error detector, a
//! ground-truth comparison engine, and an undo/redo layer for interactive
//! correction.

mod ext;

pub mod geometry;
pub mod position_store;
pub mod metadata;
pub mod track;
pub mod links;
pub mod connections;
pub mod neighbor;
pub mod image;
pub mod experiment;
pub mod linker;
pub mod error_detector;
pub mod compare;
pub mod undo;
pub mod postprocess;
pub mod fate;

pub mod error;

#[cfg(feature = "tracing")]
pub mod logging;
#[cfg(feature = "tracing")]
pub use tracing;

#[cfg(feature = "pbar")]
pub mod progress;
#[cfg(feature = "pbar")]
pub use indicatif;

#[cfg(feature = "worker")]
pub mod worker;

pub use error::{LineageError, Result};
pub use experiment::Experiment;
pub use geometry::{ImageResolution, Position};
