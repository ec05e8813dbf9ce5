//! Image management module
//!
//! This module provides build-context packaging, build progress
//! interpretation and tag resolution against engine image snapshots.

pub mod builder;
pub mod progress;
pub mod resolve;

pub use builder::{package, BuildContext, DOCKERFILE_NAME};
pub use progress::{decode_records, interpret, BuildOutcome, BuildProgress, ProgressRecord};
pub use resolve::{resolve, ImageDescriptor};
