//! Dockyard - image and container orchestration
//!
//! Dockyard builds container images from local directories and drives
//! containers through their lifecycle on a Docker-compatible engine.
//! It provides:
//!
//! - Build context packaging and build progress interpretation
//! - Tag resolution against engine image listings
//! - Container lifecycle management
//! - An HTTP request surface (the daemon)

pub mod container;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod image;
pub mod orchestrator;

pub use error::{DockyardError, Result};
