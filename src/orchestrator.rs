//! Image and container orchestration
//!
//! Composes packaging, building, tag resolution and the container lifecycle
//! into the operations exposed by the CLI and the HTTP daemon. Verification
//! steps re-query the engine, so concurrent requests may interleave with them.

use crate::container::{ContainerDescriptor, ContainerManager};
use crate::engine::{BuildOptions, Engine};
use crate::error::{DockyardError, Result};
use crate::image::{self, ImageDescriptor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Orchestrator holding the shared engine handle
#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<dyn Engine>,
    containers: ContainerManager,
}

impl Orchestrator {
    /// Create a new orchestrator on a shared engine handle
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        let containers = ContainerManager::new(engine.clone());
        Self { engine, containers }
    }

    /// The engine this orchestrator drives
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Build `source_dir` as `tag` and confirm the tag is present afterwards
    pub async fn create_image(&self, tag: &str, source_dir: &Path) -> Result<String> {
        let source: PathBuf = source_dir.to_path_buf();
        let context = tokio::task::spawn_blocking(move || image::package(&source))
            .await
            .map_err(|e| DockyardError::Internal(e.to_string()))??;

        if !context.has_dockerfile() {
            warn!("No {} at the root of {}", image::DOCKERFILE_NAME, context.root.display());
        }

        info!(
            "Building {} from {} ({} entries)",
            tag,
            context.root.display(),
            context.entries
        );

        let progress = self
            .engine
            .build_image(context.into_archive(), BuildOptions::new(tag));
        image::interpret(progress).await?.into_result()?;

        let images = self.list_images().await?;
        image::resolve(&images, tag)?;

        info!("Built image {}", tag);
        Ok(tag.to_string())
    }

    /// Confirm an image with exactly `tag` exists
    pub async fn find_image(&self, tag: &str) -> Result<String> {
        let images = self.list_images().await?;
        image::resolve(&images, tag)?;
        Ok(tag.to_string())
    }

    /// Resolve `tag` to an image identifier
    pub async fn image_id(&self, tag: &str) -> Result<String> {
        let images = self.list_images().await?;
        image::resolve(&images, tag)
    }

    /// Delete the image tagged `tag` and confirm the tag no longer resolves
    pub async fn delete_image(&self, tag: &str) -> Result<()> {
        let id = self.image_id(tag).await?;
        self.containers.delete_image(&id).await?;

        let images = self.list_images().await?;
        match image::resolve(&images, tag) {
            Err(DockyardError::ImageNotFound(_)) => Ok(()),
            Err(e) => Err(e),
            Ok(still) => {
                warn!("Image {} still resolves to {} after deletion", tag, still);
                Err(DockyardError::DeleteNotConfirmed(tag.to_string()))
            }
        }
    }

    pub async fn create_container(
        &self,
        image: &str,
        address: &str,
        port: &str,
    ) -> Result<String> {
        self.containers.create(image, address, port).await
    }

    pub async fn start_container(&self, id: &str) -> Result<()> {
        self.containers.start(id).await
    }

    pub async fn stop_container(&self, id: &str) -> Result<()> {
        self.containers.stop(id).await
    }

    pub async fn pause_container(&self, id: &str) -> Result<()> {
        self.containers.pause(id).await
    }

    pub async fn unpause_container(&self, id: &str) -> Result<()> {
        self.containers.unpause(id).await
    }

    /// Stop every container created from `image_id`
    pub async fn stop_containers_by_image(&self, image_id: &str) -> Result<usize> {
        self.containers.stop_by_image(image_id).await
    }

    /// Remove a container and confirm it is no longer listed
    pub async fn delete_container(&self, id: &str) -> Result<()> {
        self.containers.remove(id).await?;

        if self.containers.exists(id).await? {
            warn!("Container {} still listed after removal", id);
            return Err(DockyardError::ContainerStillListed(id.to_string()));
        }
        Ok(())
    }

    pub async fn container_exists(&self, id: &str) -> Result<bool> {
        self.containers.exists(id).await
    }

    pub async fn get_container(&self, id: &str) -> Result<ContainerDescriptor> {
        self.containers.get(id).await
    }

    async fn list_images(&self) -> Result<Vec<ImageDescriptor>> {
        self.engine
            .list_images()
            .await
            .map_err(|source| DockyardError::ListFailed {
                what: "images",
                source,
            })
    }
}
