//! Container management module
//!
//! This module provides the container data model and the lifecycle manager
//! that drives containers through create, start, pause, stop and removal.

pub mod config;
pub mod lifecycle;

pub use config::{ContainerDescriptor, ContainerSpec, ContainerStatus, PortBinding, Protocol};
pub use lifecycle::ContainerManager;
