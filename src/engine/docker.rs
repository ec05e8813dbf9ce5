//! Docker Engine API backend

use super::{BuildOptions, Engine, EngineConfig, EngineError, ProgressStream, RemoveImageOptions};
use crate::container::{ContainerDescriptor, ContainerSpec, ContainerStatus, PortBinding, Protocol};
use crate::error::{DockyardError, Result};
use crate::image::{ImageDescriptor, ProgressRecord};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::{BuildImageOptions, ListImagesOptions};
use bollard::models::{BuildInfo, HostConfig, Port, PortTypeEnum};
use bollard::{Docker, API_DEFAULT_VERSION};
use bytes::Bytes;
use chrono::DateTime;
use futures::{stream, StreamExt};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

/// Progress records buffered between the build task and its consumer
const PROGRESS_BUFFER: usize = 32;

/// Engine backed by a Docker-compatible daemon
#[derive(Debug, Clone)]
pub struct DockerEngine {
    client: Docker,
    host: String,
}

impl DockerEngine {
    /// Open a client for the configured daemon
    ///
    /// The client is lazy: no request is issued until the first operation.
    pub fn connect(config: &EngineConfig) -> Result<Self> {
        let timeout = config.timeout.as_secs();

        let client = match config.docker_host.as_deref() {
            None => Docker::connect_with_local_defaults(),
            Some(host) if host.starts_with("tcp://") || host.starts_with("http://") => {
                Docker::connect_with_http(host, timeout, API_DEFAULT_VERSION)
            }
            Some(host) => Docker::connect_with_unix(host, timeout, API_DEFAULT_VERSION),
        }
        .map_err(|e| DockyardError::EngineUnavailable(e.to_string()))?
        .with_timeout(config.timeout);

        let host = config
            .docker_host
            .clone()
            .unwrap_or_else(|| "local defaults".to_string());

        debug!("Docker client configured for {}", host);
        Ok(Self { client, host })
    }
}

#[async_trait]
impl Engine for DockerEngine {
    async fn ping(&self) -> std::result::Result<(), EngineError> {
        self.client.ping().await?;
        Ok(())
    }

    fn build_image(&self, context: Bytes, options: BuildOptions) -> ProgressStream {
        let client = self.client.clone();
        let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);

        tokio::spawn(async move {
            let build_options = BuildImageOptions {
                dockerfile: options.dockerfile,
                t: options.tag,
                rm: options.remove_intermediate,
                ..Default::default()
            };

            let progress = client.build_image(build_options, None, Some(context));
            futures::pin_mut!(progress);

            while let Some(item) = progress.next().await {
                let record = match item {
                    Ok(info) => Ok(progress_record(info)),
                    Err(BollardError::DockerStreamError { error }) => {
                        Ok(stream_error_record(error))
                    }
                    Err(err) => Err(EngineError::from(err)),
                };
                if tx.send(record).await.is_err() {
                    debug!("Build progress receiver dropped");
                    break;
                }
            }
        });

        stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed()
    }

    async fn list_images(&self) -> std::result::Result<Vec<ImageDescriptor>, EngineError> {
        let options = ListImagesOptions::<String> {
            all: false,
            ..Default::default()
        };

        let images = self.client.list_images(Some(options)).await?;

        Ok(images
            .into_iter()
            .map(|image| ImageDescriptor {
                id: image.id,
                tags: image.repo_tags,
                created: DateTime::from_timestamp(image.created, 0),
            })
            .collect())
    }

    async fn remove_image(
        &self,
        id: &str,
        options: RemoveImageOptions,
    ) -> std::result::Result<usize, EngineError> {
        let options = bollard::image::RemoveImageOptions {
            force: options.force,
            noprune: !options.prune_children,
        };

        let removed = self.client.remove_image(id, Some(options), None).await?;
        Ok(removed.len())
    }

    async fn create_container(
        &self,
        spec: &ContainerSpec,
    ) -> std::result::Result<String, EngineError> {
        let port_bindings: HashMap<_, _> = spec
            .port_bindings()
            .iter()
            .map(|binding| {
                let host = bollard::models::PortBinding {
                    host_ip: Some(binding.host_ip.clone()),
                    host_port: Some(binding.host_port.to_string()),
                };
                (binding.container_key(), Some(vec![host]))
            })
            .collect();

        let config = Config {
            image: Some(spec.image.clone()),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await?;

        for warning in &response.warnings {
            debug!("Engine warning for {}: {}", response.id, warning);
        }

        Ok(response.id)
    }

    async fn list_containers(
        &self,
    ) -> std::result::Result<Vec<ContainerDescriptor>, EngineError> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };

        let containers = self.client.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .map(|summary| ContainerDescriptor {
                id: summary.id.unwrap_or_default(),
                image_id: summary.image_id.unwrap_or_default(),
                ports: summary
                    .ports
                    .unwrap_or_default()
                    .iter()
                    .filter_map(port_binding)
                    .collect(),
                status: summary
                    .state
                    .as_deref()
                    .and_then(|state| state.parse().ok())
                    .unwrap_or(ContainerStatus::Dead),
            })
            .collect())
    }

    async fn start_container(&self, id: &str) -> std::result::Result<(), EngineError> {
        self.client
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> std::result::Result<(), EngineError> {
        self.client
            .stop_container(id, None::<StopContainerOptions>)
            .await?;
        Ok(())
    }

    async fn pause_container(&self, id: &str) -> std::result::Result<(), EngineError> {
        self.client.pause_container(id).await?;
        Ok(())
    }

    async fn unpause_container(&self, id: &str) -> std::result::Result<(), EngineError> {
        self.client.unpause_container(id).await?;
        Ok(())
    }

    async fn remove_container(
        &self,
        id: &str,
        force: bool,
    ) -> std::result::Result<(), EngineError> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.client.remove_container(id, Some(options)).await?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("docker engine ({})", self.host)
    }
}

/// Re-encode a typed build message as the generic record the interpreter folds
///
/// Only fields the daemon actually sent are inserted. A `null` would overwrite
/// an earlier error when records are merged.
fn progress_record(info: BuildInfo) -> ProgressRecord {
    let mut record = ProgressRecord::new();

    for (key, value) in [
        ("stream", info.stream),
        ("status", info.status),
        ("id", info.id),
    ] {
        if let Some(value) = value {
            record.insert(key.to_string(), Value::String(value));
        }
    }

    if let Some(message) = info.error.clone() {
        record.insert("error".to_string(), Value::String(message));
    }

    if let Some(detail) = info.error_detail {
        let message = detail
            .message
            .or(info.error)
            .unwrap_or_else(|| "build failed".to_string());
        let mut map = Map::new();
        map.insert("message".to_string(), Value::String(message));
        record.insert("errorDetail".to_string(), Value::Object(map));
    }

    if let Some(id) = info.aux.and_then(|aux| aux.id) {
        let mut aux = Map::new();
        aux.insert("ID".to_string(), Value::String(id));
        record.insert("aux".to_string(), Value::Object(aux));
    }

    record
}

/// An error the daemon reported inside a successful build response
fn stream_error_record(message: String) -> ProgressRecord {
    let mut detail = Map::new();
    detail.insert("message".to_string(), Value::String(message.clone()));

    let mut record = ProgressRecord::new();
    record.insert("errorDetail".to_string(), Value::Object(detail));
    record.insert("error".to_string(), Value::String(message));
    record
}

/// Published ports only; unpublished ports have no host side
fn port_binding(port: &Port) -> Option<PortBinding> {
    let host_port = port.public_port?;
    let protocol = match port.typ {
        Some(PortTypeEnum::UDP) => Protocol::Udp,
        Some(PortTypeEnum::SCTP) => Protocol::Sctp,
        _ => Protocol::Tcp,
    };

    Some(PortBinding {
        host_ip: port.ip.clone().unwrap_or_default(),
        host_port,
        container_port: port.private_port,
        protocol,
    })
}

impl From<BollardError> for EngineError {
    fn from(err: BollardError) -> Self {
        match err {
            BollardError::DockerResponseServerError {
                status_code: 404,
                message,
            } => EngineError::NotFound(message),
            BollardError::DockerResponseServerError {
                status_code,
                message,
            } => EngineError::Api {
                status: status_code,
                message,
            },
            BollardError::JsonDataError { .. } | BollardError::JsonSerdeError { .. } => {
                EngineError::Decode(err.to_string())
            }
            BollardError::SocketNotFoundError(_)
            | BollardError::IOError { .. }
            | BollardError::RequestTimeoutError => EngineError::Unavailable(err.to_string()),
            other => EngineError::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{ErrorDetail, ImageId};
    use std::time::Duration;

    #[test]
    fn test_server_errors_map_by_status() {
        let err = EngineError::from(BollardError::DockerResponseServerError {
            status_code: 404,
            message: "No such container: 1234".to_string(),
        });
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "Error response from daemon: No such container: 1234"
        );

        let err = EngineError::from(BollardError::DockerResponseServerError {
            status_code: 409,
            message: "image is being used by running container".to_string(),
        });
        assert!(matches!(err, EngineError::Api { status: 409, .. }));
    }

    #[test]
    fn test_progress_record_uses_wire_field_names() {
        let info = BuildInfo {
            stream: Some("Step 1/2 : FROM scratch\n".to_string()),
            ..Default::default()
        };
        let record = progress_record(info);
        assert_eq!(
            record.get("stream").and_then(|v| v.as_str()),
            Some("Step 1/2 : FROM scratch\n")
        );
        assert_eq!(record.len(), 1);
        assert!(!record.contains_key("errorDetail"));
    }

    #[tokio::test]
    async fn test_error_survives_later_stream_records() {
        let failed = BuildInfo {
            error: Some("COPY failed".to_string()),
            error_detail: Some(ErrorDetail {
                message: Some("COPY failed: no such file".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let later = BuildInfo {
            stream: Some("Removing intermediate container\n".to_string()),
            ..Default::default()
        };

        let records = futures::stream::iter(
            vec![failed, later]
                .into_iter()
                .map(|info| Ok::<_, EngineError>(progress_record(info)))
                .collect::<Vec<_>>(),
        );

        let outcome = crate::image::interpret(records).await.unwrap();
        assert_eq!(
            outcome,
            crate::image::BuildOutcome::Failure {
                message: "COPY failed: no such file".to_string()
            }
        );
    }

    #[test]
    fn test_aux_record_carries_image_id() {
        let info = BuildInfo {
            aux: Some(ImageId {
                id: Some("sha256:abc".to_string()),
            }),
            ..Default::default()
        };
        let record = progress_record(info);
        assert_eq!(
            record.get("aux").and_then(|a| a.get("ID")).and_then(|v| v.as_str()),
            Some("sha256:abc")
        );
    }

    #[test]
    fn test_stream_error_becomes_failure_record() {
        let record = stream_error_record("COPY failed".to_string());
        assert_eq!(
            record
                .get("errorDetail")
                .and_then(|d| d.get("message"))
                .and_then(|m| m.as_str()),
            Some("COPY failed")
        );
    }

    #[test]
    fn test_unpublished_ports_are_skipped() {
        let published = Port {
            ip: Some("127.0.0.1".to_string()),
            private_port: 9000,
            public_port: Some(9000),
            typ: Some(PortTypeEnum::TCP),
        };
        let unpublished = Port {
            ip: None,
            private_port: 9001,
            public_port: None,
            typ: Some(PortTypeEnum::TCP),
        };

        let binding = port_binding(&published).unwrap();
        assert_eq!(binding.container_key(), "9000/tcp");
        assert_eq!(binding.host_ip, "127.0.0.1");
        assert!(port_binding(&unpublished).is_none());
    }

    #[test]
    fn test_connect_over_http_is_lazy() {
        let config = EngineConfig {
            docker_host: Some("tcp://127.0.0.1:2375".to_string()),
            timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let engine = DockerEngine::connect(&config).unwrap();
        assert_eq!(engine.describe(), "docker engine (tcp://127.0.0.1:2375)");
    }
}
