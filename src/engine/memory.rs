//! In-process engine
//!
//! Images and containers live in memory and no process is ever run. Builds
//! only check that the context is a readable archive carrying the requested
//! build file; the image id is derived from the context bytes.

use super::{BuildOptions, Engine, EngineError, ProgressStream, RemoveImageOptions};
use crate::container::{ContainerDescriptor, ContainerSpec, ContainerStatus};
use crate::image::{decode_records, ImageDescriptor};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{stream, StreamExt};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Default)]
struct State {
    images: Vec<ImageDescriptor>,
    containers: Vec<ContainerDescriptor>,
}

/// Engine keeping all state in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    state: Arc<RwLock<State>>,
}

impl MemoryEngine {
    /// Create an empty engine
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> EngineResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| EngineError::Other("Failed to acquire read lock".to_string()))
    }

    fn write(&self) -> EngineResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| EngineError::Other("Failed to acquire write lock".to_string()))
    }

    /// Apply `transition` to the container `id` under the write lock
    fn transition<F>(&self, id: &str, transition: F) -> EngineResult<()>
    where
        F: FnOnce(&mut ContainerDescriptor) -> EngineResult<()>,
    {
        let mut state = self.write()?;
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| no_such_container(id))?;
        transition(container)
    }

    /// Run a build against the current state and return its raw output
    fn run_build(&self, context: &[u8], options: &BuildOptions) -> EngineResult<Vec<Value>> {
        let mut output = Vec::new();

        match has_build_file(context, &options.dockerfile) {
            Err(e) => {
                output.push(failure(&format!("Error processing tar file: {}", e)));
                return Ok(output);
            }
            Ok(false) => {
                output.push(failure(&format!(
                    "Cannot locate specified Dockerfile: {}",
                    options.dockerfile
                )));
                return Ok(output);
            }
            Ok(true) => {}
        }

        let id = format!("sha256:{:x}", Sha256::digest(context));
        let short = &id["sha256:".len().."sha256:".len() + 12];

        output.push(json!({ "stream": format!("Step 1/1 : FROM {}\n", options.dockerfile) }));
        output.push(json!({ "aux": { "ID": id } }));
        output.push(json!({ "stream": format!("Successfully built {}\n", short) }));
        output.push(json!({ "stream": format!("Successfully tagged {}\n", options.tag) }));

        let mut state = self.write()?;
        for image in state.images.iter_mut() {
            image.tags.retain(|t| t != &options.tag);
        }
        match state.images.iter_mut().find(|i| i.id == id) {
            Some(image) => image.tags.push(options.tag.clone()),
            None => state.images.push(ImageDescriptor {
                id: id.clone(),
                tags: vec![options.tag.clone()],
                created: Some(Utc::now()),
            }),
        }

        debug!("Memory engine built {} as {}", options.tag, id);
        Ok(output)
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn ping(&self) -> EngineResult<()> {
        self.read().map(|_| ())
    }

    fn build_image(&self, context: Bytes, options: BuildOptions) -> ProgressStream {
        let output = match self.run_build(&context, &options) {
            Ok(output) => output,
            Err(e) => return stream::iter(vec![Err(e)]).boxed(),
        };

        let mut raw = Vec::new();
        for value in &output {
            raw.extend_from_slice(value.to_string().as_bytes());
            raw.push(b'\n');
        }

        let records: Vec<_> = decode_records(&raw)
            .map(|r| r.map_err(|e| EngineError::Decode(e.to_string())))
            .collect();

        stream::iter(records).boxed()
    }

    async fn list_images(&self) -> EngineResult<Vec<ImageDescriptor>> {
        Ok(self.read()?.images.clone())
    }

    async fn remove_image(&self, id: &str, options: RemoveImageOptions) -> EngineResult<usize> {
        let mut state = self.write()?;

        let position = state
            .images
            .iter()
            .position(|i| i.id == id || i.has_tag(id))
            .ok_or_else(|| EngineError::NotFound(format!("No such image: {}", id)))?;
        let image_id = state.images[position].id.clone();

        if let Some(user) = state.containers.iter().find(|c| c.image_id == image_id) {
            let short = &user.id[..user.id.len().min(12)];
            if user.status.is_running() || user.status == ContainerStatus::Paused {
                return Err(EngineError::api(
                    409,
                    format!(
                        "conflict: unable to delete {} (cannot be forced) - image is being used by running container {}",
                        id, short
                    ),
                ));
            }
            if !options.force {
                return Err(EngineError::api(
                    409,
                    format!(
                        "conflict: unable to delete {} (must be forced) - image is being used by stopped container {}",
                        id, short
                    ),
                ));
            }
        }

        let image = state.images.remove(position);
        debug!("Memory engine removed image {}", image.id);
        Ok(image.tags.len() + 1)
    }

    async fn create_container(&self, spec: &ContainerSpec) -> EngineResult<String> {
        let mut state = self.write()?;

        let image_id = state
            .images
            .iter()
            .find(|i| i.id == spec.image || i.has_tag(&spec.image))
            .map(|i| i.id.clone())
            .ok_or_else(|| EngineError::NotFound(format!("No such image: {}", spec.image)))?;

        let id = format!("{:x}", Sha256::digest(uuid::Uuid::new_v4().as_bytes()));
        state.containers.push(ContainerDescriptor {
            id: id.clone(),
            image_id,
            ports: spec.port_bindings().to_vec(),
            status: ContainerStatus::Created,
        });

        Ok(id)
    }

    async fn list_containers(&self) -> EngineResult<Vec<ContainerDescriptor>> {
        Ok(self.read()?.containers.clone())
    }

    async fn start_container(&self, id: &str) -> EngineResult<()> {
        self.transition(id, |c| match c.status {
            ContainerStatus::Running => Ok(()),
            ContainerStatus::Paused => Err(EngineError::api(
                409,
                "cannot start a paused container, try unpause instead",
            )),
            _ => {
                c.status = ContainerStatus::Running;
                Ok(())
            }
        })
    }

    async fn stop_container(&self, id: &str) -> EngineResult<()> {
        self.transition(id, |c| {
            if c.status.is_running() || c.status == ContainerStatus::Paused {
                c.status = ContainerStatus::Stopped;
            }
            Ok(())
        })
    }

    async fn pause_container(&self, id: &str) -> EngineResult<()> {
        self.transition(id, |c| match c.status {
            ContainerStatus::Running => {
                c.status = ContainerStatus::Paused;
                Ok(())
            }
            ContainerStatus::Paused => Err(EngineError::api(
                409,
                format!("Container {} is already paused", c.id),
            )),
            _ => Err(EngineError::api(
                409,
                format!("Container {} is not running", c.id),
            )),
        })
    }

    async fn unpause_container(&self, id: &str) -> EngineResult<()> {
        self.transition(id, |c| match c.status {
            ContainerStatus::Paused => {
                c.status = ContainerStatus::Running;
                Ok(())
            }
            _ => Err(EngineError::api(
                409,
                format!("Container {} is not paused", c.id),
            )),
        })
    }

    async fn remove_container(&self, id: &str, force: bool) -> EngineResult<()> {
        let mut state = self.write()?;
        let position = state
            .containers
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| no_such_container(id))?;

        let status = state.containers[position].status;
        if !force && (status.is_running() || status == ContainerStatus::Paused) {
            return Err(EngineError::api(
                409,
                format!(
                    "You cannot remove a {} container {}. Stop the container before attempting removal or force remove",
                    status, id
                ),
            ));
        }

        state.containers.remove(position);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory engine".to_string()
    }
}

fn no_such_container(id: &str) -> EngineError {
    EngineError::NotFound(format!("No such container: {}", id))
}

fn failure(message: &str) -> Value {
    json!({
        "errorDetail": { "message": message },
        "error": message,
    })
}

fn has_build_file(context: &[u8], dockerfile: &str) -> std::io::Result<bool> {
    let mut archive = tar::Archive::new(context);
    for entry in archive.entries()? {
        let entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        if entry.path()? == Path::new(dockerfile) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::PortBinding;
    use crate::image::{interpret, BuildOutcome};

    fn context(files: &[(&str, &str)]) -> Bytes {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, contents.as_bytes())
                .unwrap();
        }
        Bytes::from(builder.into_inner().unwrap())
    }

    async fn build(engine: &MemoryEngine, tag: &str, files: &[(&str, &str)]) -> BuildOutcome {
        interpret(engine.build_image(context(files), BuildOptions::new(tag)))
            .await
            .unwrap()
    }

    async fn image_with_container(engine: &MemoryEngine) -> (String, String) {
        build(engine, "web:1", &[("Dockerfile", "FROM scratch\n")]).await;
        let image_id = engine.list_images().await.unwrap()[0].id.clone();
        let spec = ContainerSpec::new("web:1").bind(PortBinding::tcp("0.0.0.0", 8080));
        let id = engine.create_container(&spec).await.unwrap();
        (image_id, id)
    }

    #[tokio::test]
    async fn test_build_registers_tagged_image() {
        let engine = MemoryEngine::new();
        let outcome = build(&engine, "web:1", &[("Dockerfile", "FROM scratch\n")]).await;
        assert!(outcome.is_success());

        let images = engine.list_images().await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].tags, vec!["web:1".to_string()]);
        assert!(images[0].id.starts_with("sha256:"));
        assert_eq!(images[0].id.len(), "sha256:".len() + 64);
    }

    #[tokio::test]
    async fn test_build_without_dockerfile_fails() {
        let engine = MemoryEngine::new();
        let outcome = build(&engine, "web:1", &[("README", "hi")]).await;
        assert_eq!(
            outcome,
            BuildOutcome::Failure {
                message: "Cannot locate specified Dockerfile: Dockerfile".to_string()
            }
        );
        assert!(engine.list_images().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_with_garbage_context_fails() {
        let engine = MemoryEngine::new();
        let stream = engine.build_image(Bytes::from_static(b"not a tar"), BuildOptions::new("x"));
        let outcome = interpret(stream).await.unwrap();
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_retag_moves_tag_to_new_image() {
        let engine = MemoryEngine::new();
        build(&engine, "web:1", &[("Dockerfile", "FROM a\n")]).await;
        build(&engine, "web:1", &[("Dockerfile", "FROM b\n")]).await;

        let images = engine.list_images().await.unwrap();
        assert_eq!(images.len(), 2);
        assert!(images[0].tags.is_empty());
        assert_eq!(images[1].tags, vec!["web:1".to_string()]);
    }

    #[tokio::test]
    async fn test_create_from_unknown_image_is_not_found() {
        let engine = MemoryEngine::new();
        let err = engine
            .create_container(&ContainerSpec::new("missing"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_container_state_machine() {
        let engine = MemoryEngine::new();
        let (image_id, id) = image_with_container(&engine).await;

        let listed = engine.list_containers().await.unwrap();
        assert_eq!(listed[0].status, ContainerStatus::Created);
        assert_eq!(listed[0].image_id, image_id);
        assert_eq!(listed[0].ports.len(), 1);

        assert!(engine.pause_container(&id).await.is_err());
        engine.start_container(&id).await.unwrap();
        engine.start_container(&id).await.unwrap();
        engine.pause_container(&id).await.unwrap();
        assert!(matches!(
            engine.start_container(&id).await,
            Err(EngineError::Api { status: 409, .. })
        ));
        engine.unpause_container(&id).await.unwrap();
        assert!(engine.unpause_container(&id).await.is_err());
        engine.stop_container(&id).await.unwrap();
        engine.stop_container(&id).await.unwrap();

        let listed = engine.list_containers().await.unwrap();
        assert_eq!(listed[0].status, ContainerStatus::Stopped);

        engine.remove_container(&id, false).await.unwrap();
        assert!(engine.list_containers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_container_is_not_found() {
        let engine = MemoryEngine::new();
        let err = engine.stop_container("1234").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "Error response from daemon: No such container: 1234"
        );
    }

    #[tokio::test]
    async fn test_running_container_needs_force_to_remove() {
        let engine = MemoryEngine::new();
        let (_, id) = image_with_container(&engine).await;
        engine.start_container(&id).await.unwrap();

        assert!(engine.remove_container(&id, false).await.is_err());
        engine.remove_container(&id, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_image_in_use_by_running_container() {
        let engine = MemoryEngine::new();
        let (image_id, id) = image_with_container(&engine).await;
        engine.start_container(&id).await.unwrap();

        let err = engine
            .remove_image(&image_id, RemoveImageOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("being used by running container"));

        engine.stop_container(&id).await.unwrap();
        assert!(engine
            .remove_image(&image_id, RemoveImageOptions { force: false, prune_children: true })
            .await
            .is_err());
        assert_eq!(
            engine
                .remove_image(&image_id, RemoveImageOptions::default())
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_remove_unknown_image() {
        let engine = MemoryEngine::new();
        let err = engine
            .remove_image("sha256:nope", RemoveImageOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
