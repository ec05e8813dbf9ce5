//! Container lifecycle management
//!
//! Every transition is a single engine call. Legality of a transition is the
//! engine's decision; nothing here checks a container's state before acting,
//! and nothing is retried.

use super::config::{ContainerDescriptor, ContainerSpec, PortBinding};
use crate::engine::{Engine, RemoveImageOptions};
use crate::error::{DockyardError, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Container manager for driving containers through their lifecycle
#[derive(Clone)]
pub struct ContainerManager {
    engine: Arc<dyn Engine>,
}

impl ContainerManager {
    /// Create a new container manager on a shared engine handle
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    /// Create a container from `image` publishing `port`/tcp on `address:port`
    pub async fn create(&self, image: &str, address: &str, port: &str) -> Result<String> {
        let port_number: u16 = port
            .parse()
            .map_err(|_| DockyardError::InvalidPort(port.to_string()))?;

        let spec = ContainerSpec::new(image).bind(PortBinding::tcp(address, port_number));

        let id = self
            .engine
            .create_container(&spec)
            .await
            .map_err(DockyardError::CreateFailed)?;

        info!("Created container {} from {} on {}:{}", id, image, address, port_number);
        Ok(id)
    }

    /// Start a container
    pub async fn start(&self, id: &str) -> Result<()> {
        self.engine
            .start_container(id)
            .await
            .map_err(|source| DockyardError::StartFailed {
                id: id.to_string(),
                source,
            })?;
        info!("Started container {}", id);
        Ok(())
    }

    /// Stop a container
    pub async fn stop(&self, id: &str) -> Result<()> {
        self.engine
            .stop_container(id)
            .await
            .map_err(|source| DockyardError::StopFailed {
                id: id.to_string(),
                source,
            })?;
        info!("Stopped container {}", id);
        Ok(())
    }

    /// Pause a container
    pub async fn pause(&self, id: &str) -> Result<()> {
        self.engine
            .pause_container(id)
            .await
            .map_err(|source| DockyardError::PauseFailed {
                id: id.to_string(),
                source,
            })?;
        info!("Paused container {}", id);
        Ok(())
    }

    /// Unpause a container
    pub async fn unpause(&self, id: &str) -> Result<()> {
        self.engine
            .unpause_container(id)
            .await
            .map_err(|source| DockyardError::UnpauseFailed {
                id: id.to_string(),
                source,
            })?;
        info!("Unpaused container {}", id);
        Ok(())
    }

    /// Remove a container, killing it first if it is running
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.engine
            .remove_container(id, true)
            .await
            .map_err(|source| DockyardError::RemoveFailed {
                id: id.to_string(),
                source,
            })?;
        info!("Removed container {}", id);
        Ok(())
    }

    /// Force-delete an image and its untagged parents
    ///
    /// An engine that reports nothing removed is treated as a failure.
    pub async fn delete_image(&self, image_id: &str) -> Result<usize> {
        let removed = self
            .engine
            .remove_image(image_id, RemoveImageOptions::default())
            .await
            .map_err(|source| DockyardError::DeleteImageFailed {
                id: image_id.to_string(),
                source,
            })?;

        if removed == 0 {
            warn!("Engine removed nothing for image {}", image_id);
            return Err(DockyardError::NoImagesDeleted(image_id.to_string()));
        }

        info!("Deleted image {} ({} entries)", image_id, removed);
        Ok(removed)
    }

    /// List all containers, including stopped ones
    pub async fn list(&self) -> Result<Vec<ContainerDescriptor>> {
        self.engine
            .list_containers()
            .await
            .map_err(|source| DockyardError::ListFailed {
                what: "containers",
                source,
            })
    }

    /// Whether `id` appears in the full container listing
    pub async fn exists(&self, id: &str) -> Result<bool> {
        let containers = self.list().await?;
        Ok(containers.iter().any(|c| c.id == id))
    }

    /// Find a container by identifier, failing with `ContainerNotFound` when absent
    pub async fn get(&self, id: &str) -> Result<ContainerDescriptor> {
        self.list()
            .await?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| DockyardError::ContainerNotFound(id.to_string()))
    }

    /// Stop every container created from `image_id`, in listing order
    ///
    /// The first failure aborts the sweep. Containers already stopped stay
    /// stopped and containers not yet reached are left alone.
    pub async fn stop_by_image(&self, image_id: &str) -> Result<usize> {
        let targets: Vec<String> = self
            .list()
            .await?
            .into_iter()
            .filter(|c| c.image_id == image_id)
            .map(|c| c.id)
            .collect();

        debug!("{} containers use image {}", targets.len(), image_id);

        for id in &targets {
            self.stop(id).await?;
        }

        Ok(targets.len())
    }
}
