use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    NotFound,
    Validation,
    Network,
    Internal,
}

/// Failure reported by a remote service. A read that finds no document
/// is `Ok(None)`, never a `RemoteError`.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct RemoteError {
    pub code: ErrorCode,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unavailable(service: &str) -> Self {
        Self::new(
            ErrorCode::Internal,
            format!("{service} service is unavailable"),
        )
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;
