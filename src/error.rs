//! Error types for Dockyard

use crate::engine::EngineError;
use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for Dockyard operations
pub type Result<T> = std::result::Result<T, DockyardError>;

/// Dockyard error types
#[derive(Error, Debug)]
pub enum DockyardError {
    #[error("Missing '{0}'")]
    ParameterMissing(&'static str),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to get port: invalid port '{0}'")]
    InvalidPort(String),

    #[error("Failed to package build context {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode build output: {0}")]
    StreamDecode(String),

    #[error("{0}")]
    Build(String),

    #[error("Image not found")]
    ImageNotFound(String),

    #[error("Container not found")]
    ContainerNotFound(String),

    #[error("No images deleted for {0}")]
    NoImagesDeleted(String),

    #[error("Failed to create docker container: {0}")]
    CreateFailed(#[source] EngineError),

    #[error("Failed to start container: {source}")]
    StartFailed {
        id: String,
        #[source]
        source: EngineError,
    },

    #[error("Failed to stop container: {source}")]
    StopFailed {
        id: String,
        #[source]
        source: EngineError,
    },

    #[error("Failed to pause container: {source}")]
    PauseFailed {
        id: String,
        #[source]
        source: EngineError,
    },

    #[error("Failed to unpause container: {source}")]
    UnpauseFailed {
        id: String,
        #[source]
        source: EngineError,
    },

    #[error("Failed to remove container: {source}")]
    RemoveFailed {
        id: String,
        #[source]
        source: EngineError,
    },

    #[error("Failed to delete image: {source}")]
    DeleteImageFailed {
        id: String,
        #[source]
        source: EngineError,
    },

    #[error("Failed to list {what}: {source}")]
    ListFailed {
        what: &'static str,
        #[source]
        source: EngineError,
    },

    #[error("Failed to delete")]
    DeleteNotConfirmed(String),

    #[error("Container not deleted")]
    ContainerStillListed(String),

    #[error("Unable to create docker client: {0}")]
    EngineUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DockyardError {
    /// HTTP status reported to callers of the request surface
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ParameterMissing(_) | Self::InvalidRequest(_) | Self::InvalidPort(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::EngineUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error came from the caller rather than the engine
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_errors_are_client_errors() {
        assert_eq!(
            DockyardError::ParameterMissing("image-name").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert!(DockyardError::InvalidPort("abc".to_string()).is_client_error());
        assert!(!DockyardError::ImageNotFound("x".to_string()).is_client_error());
    }

    #[test]
    fn test_engine_wrappers_keep_daemon_message() {
        let err = DockyardError::StartFailed {
            id: "1234".to_string(),
            source: EngineError::NotFound("No such container: 1234".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Failed to start container: Error response from daemon: No such container: 1234"
        );
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_missing_parameter_message() {
        assert_eq!(
            DockyardError::ParameterMissing("source-dir").to_string(),
            "Missing 'source-dir'"
        );
    }
}
