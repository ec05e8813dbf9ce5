//! Container engine abstraction
//!
//! Every operation Dockyard performs against the outside world goes through
//! the [`Engine`] trait. Two implementations exist:
//!
//! - [`DockerEngine`] talks to a Docker-compatible daemon over its Engine API
//! - [`MemoryEngine`] keeps images and containers in process, for dry runs and tests
//!
//! A single engine handle is created at process start and shared as
//! `Arc<dyn Engine>` by every request.

mod docker;
mod memory;

pub use docker::DockerEngine;
pub use memory::MemoryEngine;

use crate::container::{ContainerDescriptor, ContainerSpec};
use crate::error::{DockyardError, Result};
use crate::image::{ImageDescriptor, ProgressRecord};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Default timeout for engine requests, in seconds
pub const DEFAULT_ENGINE_TIMEOUT: u64 = 120;

/// Errors reported at the engine boundary
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Error response from daemon: {0}")]
    NotFound(String),

    #[error("Error response from daemon: {message}")]
    Api { status: u16, message: String },

    #[error("Malformed engine response: {0}")]
    Decode(String),

    #[error("Engine unreachable: {0}")]
    Unavailable(String),

    #[error("Engine error: {0}")]
    Other(String),
}

impl EngineError {
    /// Build an engine rejection with an HTTP-style status
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether the engine reported that the target does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_)) || matches!(self, Self::Api { status: 404, .. })
    }
}

/// Stream of decoded build progress records
pub type ProgressStream = BoxStream<'static, std::result::Result<ProgressRecord, EngineError>>;

/// Parameters for an image build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Tag applied to the resulting image
    pub tag: String,
    /// Build file path inside the context
    pub dockerfile: String,
    /// Remove intermediate containers after a successful build
    pub remove_intermediate: bool,
}

impl BuildOptions {
    /// Options for building `tag` from the context's root Dockerfile
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            dockerfile: crate::image::DOCKERFILE_NAME.to_string(),
            remove_intermediate: true,
        }
    }
}

/// Parameters for an image removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveImageOptions {
    /// Remove the image even if stopped containers reference it
    pub force: bool,
    /// Delete untagged parent images
    pub prune_children: bool,
}

impl Default for RemoveImageOptions {
    fn default() -> Self {
        Self {
            force: true,
            prune_children: true,
        }
    }
}

/// Operations Dockyard needs from a container engine
#[async_trait]
pub trait Engine: Send + Sync {
    /// Check that the engine is reachable
    async fn ping(&self) -> std::result::Result<(), EngineError>;

    /// Submit a build context and stream back the engine's progress records
    fn build_image(&self, context: Bytes, options: BuildOptions) -> ProgressStream;

    /// Snapshot of the images known to the engine
    async fn list_images(&self) -> std::result::Result<Vec<ImageDescriptor>, EngineError>;

    /// Remove an image, returning the number of entries the engine reports removed
    async fn remove_image(
        &self,
        id: &str,
        options: RemoveImageOptions,
    ) -> std::result::Result<usize, EngineError>;

    /// Create a container and return its identifier
    async fn create_container(&self, spec: &ContainerSpec)
        -> std::result::Result<String, EngineError>;

    /// Snapshot of all containers, including stopped ones
    async fn list_containers(&self) -> std::result::Result<Vec<ContainerDescriptor>, EngineError>;

    async fn start_container(&self, id: &str) -> std::result::Result<(), EngineError>;

    async fn stop_container(&self, id: &str) -> std::result::Result<(), EngineError>;

    async fn pause_container(&self, id: &str) -> std::result::Result<(), EngineError>;

    async fn unpause_container(&self, id: &str) -> std::result::Result<(), EngineError>;

    async fn remove_container(&self, id: &str, force: bool)
        -> std::result::Result<(), EngineError>;

    /// Short description for log lines
    fn describe(&self) -> String;
}

/// Which engine implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum EngineKind {
    /// Docker-compatible daemon
    #[default]
    Docker,
    /// In-process engine with no external daemon
    Memory,
}

/// Engine connection configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Engine implementation
    pub kind: EngineKind,
    /// Daemon address; platform default socket when unset
    pub docker_host: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Docker,
            docker_host: None,
            timeout: Duration::from_secs(DEFAULT_ENGINE_TIMEOUT),
        }
    }
}

/// Create the shared engine handle and verify it responds
pub async fn connect(config: &EngineConfig) -> Result<Arc<dyn Engine>> {
    let engine: Arc<dyn Engine> = match config.kind {
        EngineKind::Docker => Arc::new(DockerEngine::connect(config)?),
        EngineKind::Memory => Arc::new(MemoryEngine::new()),
    };

    engine
        .ping()
        .await
        .map_err(|e| DockyardError::EngineUnavailable(e.to_string()))?;

    info!("Connected to {}", engine.describe());
    Ok(engine)
}
