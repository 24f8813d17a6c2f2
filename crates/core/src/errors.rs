use thiserror::Error;

use crate::wire::StatusError;

/// Status attached to backend failures that carry no status of their own.
pub const FAILED_REQUEST_STATUS: &str = "FailedOllamaRequest";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend answered with its own API error convention.
    #[error("{status}: {message}")]
    Status {
        status_code: u32,
        status: String,
        message: String,
    },
    #[error("canceled")]
    Canceled,
    #[error("{0}")]
    Network(String),
    #[error("decode: {0}")]
    Decode(String),
    /// Backend-reported failure text, passed through as is.
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    pub fn status(
        status_code: u32,
        status: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        BackendError::Status {
            status_code,
            status: status.into(),
            message: message.into(),
        }
    }
}

impl From<BackendError> for StatusError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Status {
                status_code,
                status,
                message,
            } => StatusError {
                status_code,
                status,
                error: message,
            },
            other => StatusError {
                status_code: 0,
                status: FAILED_REQUEST_STATUS.to_string(),
                error: other.to_string(),
            },
        }
    }
}

/// Maps an adaptor error onto the wire error shape; `None` means success.
pub fn check_response_error(err: Option<BackendError>) -> Option<StatusError> {
    err.map(StatusError::from)
}
