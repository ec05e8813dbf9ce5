//! Request handling for the Dockyard daemon
//!
//! Every endpoint decodes into one [`ApiRequest`] variant before any engine
//! call is made. Parameter names are kebab-case; absent and empty values are
//! both treated as missing, and unknown names are rejected.

use crate::error::{DockyardError, Result};
use crate::orchestrator::Orchestrator;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Body returned by the greeting endpoint
pub const GREETING: &str = "Hello, I'm dockyard!";

/// Parameters naming an image by tag
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ImageParams {
    pub image_name: Option<String>,
}

/// Parameters for an image build
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BuildParams {
    pub image_name: Option<String>,
    pub source_dir: Option<String>,
}

/// Parameters for container creation
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ContainerParams {
    pub image_name: Option<String>,
    pub address: Option<String>,
    pub port: Option<String>,
}

/// Parameters naming a container (or, for the by-image sweep, an image) by id
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct IdParams {
    pub id: Option<String>,
}

fn required(value: Option<String>, name: &'static str) -> Result<String> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(DockyardError::ParameterMissing(name)),
    }
}

/// One validated request per endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    Greeting,
    CreateImage { image_name: String, source_dir: PathBuf },
    FindImage { image_name: String },
    ImageId { image_name: String },
    DeleteImage { image_name: String },
    CreateContainer { image_name: String, address: String, port: String },
    GetContainer { id: String },
    StartContainer { id: String },
    StopContainer { id: String },
    PauseContainer { id: String },
    UnpauseContainer { id: String },
    StopContainersByImage { image_id: String },
    DeleteContainer { id: String },
    ContainerExists { id: String },
}

impl ApiRequest {
    pub fn create_image(params: BuildParams) -> Result<Self> {
        Ok(Self::CreateImage {
            image_name: required(params.image_name, "image-name")?,
            source_dir: PathBuf::from(required(params.source_dir, "source-dir")?),
        })
    }

    pub fn find_image(params: ImageParams) -> Result<Self> {
        Ok(Self::FindImage {
            image_name: required(params.image_name, "image-name")?,
        })
    }

    pub fn image_id(params: ImageParams) -> Result<Self> {
        Ok(Self::ImageId {
            image_name: required(params.image_name, "image-name")?,
        })
    }

    pub fn delete_image(params: ImageParams) -> Result<Self> {
        Ok(Self::DeleteImage {
            image_name: required(params.image_name, "image-name")?,
        })
    }

    pub fn create_container(params: ContainerParams) -> Result<Self> {
        Ok(Self::CreateContainer {
            image_name: required(params.image_name, "image-name")?,
            address: required(params.address, "address")?,
            port: required(params.port, "port")?,
        })
    }

    pub fn get_container(params: IdParams) -> Result<Self> {
        Ok(Self::GetContainer {
            id: required(params.id, "id")?,
        })
    }

    pub fn start_container(params: IdParams) -> Result<Self> {
        Ok(Self::StartContainer {
            id: required(params.id, "id")?,
        })
    }

    pub fn stop_container(params: IdParams) -> Result<Self> {
        Ok(Self::StopContainer {
            id: required(params.id, "id")?,
        })
    }

    pub fn pause_container(params: IdParams) -> Result<Self> {
        Ok(Self::PauseContainer {
            id: required(params.id, "id")?,
        })
    }

    pub fn unpause_container(params: IdParams) -> Result<Self> {
        Ok(Self::UnpauseContainer {
            id: required(params.id, "id")?,
        })
    }

    pub fn stop_containers_by_image(params: IdParams) -> Result<Self> {
        Ok(Self::StopContainersByImage {
            image_id: required(params.id, "id")?,
        })
    }

    pub fn delete_container(params: IdParams) -> Result<Self> {
        Ok(Self::DeleteContainer {
            id: required(params.id, "id")?,
        })
    }

    pub fn container_exists(params: IdParams) -> Result<Self> {
        Ok(Self::ContainerExists {
            id: required(params.id, "id")?,
        })
    }

    /// Operation name used in log lines
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::CreateImage { .. } => "create-image",
            Self::FindImage { .. } => "get-image",
            Self::ImageId { .. } => "get-image-id-by-tag",
            Self::DeleteImage { .. } => "delete-image",
            Self::CreateContainer { .. } => "create-container",
            Self::GetContainer { .. } => "get-container",
            Self::StartContainer { .. } => "start-container",
            Self::StopContainer { .. } => "stop-container",
            Self::PauseContainer { .. } => "pause-container",
            Self::UnpauseContainer { .. } => "unpause-container",
            Self::StopContainersByImage { .. } => "stop-container-by-image-id",
            Self::DeleteContainer { .. } => "delete-container",
            Self::ContainerExists { .. } => "container-exists",
        }
    }
}

/// Status code and plain-text body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn created(body: impl Into<String>) -> Self {
        Self::new(StatusCode::CREATED, body)
    }
}

impl From<DockyardError> for ApiResponse {
    fn from(err: DockyardError) -> Self {
        let status = err.status_code();
        if err.is_client_error() {
            warn!("Rejected request: {}", err);
        } else {
            error!("Request failed: {}", err);
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.status, self.body).into_response()
    }
}

/// API handler shared by every route
#[derive(Clone)]
pub struct ApiHandler {
    orchestrator: Orchestrator,
}

impl ApiHandler {
    /// Create a new API handler
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Run a validated request to completion
    pub async fn handle(&self, request: ApiRequest) -> ApiResponse {
        info!("API request: {}", request.operation());

        match self.execute(request).await {
            Ok(response) => response,
            Err(err) => ApiResponse::from(err),
        }
    }

    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let orchestrator = &self.orchestrator;

        let response = match request {
            ApiRequest::Greeting => ApiResponse::ok(GREETING),
            ApiRequest::CreateImage {
                image_name,
                source_dir,
            } => ApiResponse::created(orchestrator.create_image(&image_name, &source_dir).await?),
            ApiRequest::FindImage { image_name } => {
                ApiResponse::ok(orchestrator.find_image(&image_name).await?)
            }
            ApiRequest::ImageId { image_name } => {
                ApiResponse::ok(orchestrator.image_id(&image_name).await?)
            }
            ApiRequest::DeleteImage { image_name } => {
                orchestrator.delete_image(&image_name).await?;
                ApiResponse::ok("Delete completed")
            }
            ApiRequest::CreateContainer {
                image_name,
                address,
                port,
            } => {
                let id = orchestrator
                    .create_container(&image_name, &address, &port)
                    .await?;
                ApiResponse::created(format!("Container created: {}", id))
            }
            ApiRequest::GetContainer { id } => {
                orchestrator.get_container(&id).await?;
                ApiResponse::ok("Container found")
            }
            ApiRequest::StartContainer { id } => {
                orchestrator.start_container(&id).await?;
                ApiResponse::ok("Container started")
            }
            ApiRequest::StopContainer { id } => {
                orchestrator.stop_container(&id).await?;
                ApiResponse::ok("Container stopped")
            }
            ApiRequest::PauseContainer { id } => {
                orchestrator.pause_container(&id).await?;
                ApiResponse::ok("Container paused")
            }
            ApiRequest::UnpauseContainer { id } => {
                orchestrator.unpause_container(&id).await?;
                ApiResponse::ok("Container unpaused")
            }
            ApiRequest::StopContainersByImage { image_id } => {
                orchestrator.stop_containers_by_image(&image_id).await?;
                ApiResponse::ok("Container stopped")
            }
            ApiRequest::DeleteContainer { id } => {
                orchestrator.delete_container(&id).await?;
                ApiResponse::ok("Container deleted")
            }
            ApiRequest::ContainerExists { id } => {
                if orchestrator.container_exists(&id).await? {
                    ApiResponse::ok("Container exists")
                } else {
                    ApiResponse::new(StatusCode::ACCEPTED, "Container not found")
                }
            }
        };

        Ok(response)
    }
}
