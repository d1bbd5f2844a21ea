//! # terraclass parallel
//!
//! Execution strategies shared by the raster pipeline.
//!
//! This crate provides:
//! - `ProcessingMode`: sequential, rayon, or bounded-pool execution of index ranges
//! - `ProgressCounter`: monotonic fraction-complete reporting
//! - `CancelToken`: cooperative cancellation flag

pub mod cancel;
pub mod progress;
pub mod strategy;

pub use cancel::CancelToken;
pub use progress::{ignore_progress, ProgressCounter};
pub use strategy::{num_cpus, ParallelStrategy, ProcessingMode};
