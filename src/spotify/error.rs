use thiserror::Error;

use crate::spotify::{payload::ErrorPayload, transport::ApiResponse};

/// Uniform failure of any provider call.
///
/// Carries a description of the operation that failed so callers can report
/// it without knowing about HTTP or payload details.
#[derive(Debug, Error)]
#[error("failed to {operation}: {failure}")]
pub struct ProviderError {
    pub operation: String,
    pub failure: ProviderFailure,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderFailure {
    #[error("not authorized, access token missing or expired")]
    Unauthorized,

    #[error("rate limited{}", .retry_after.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    #[error("resource not found")]
    NotFound,

    #[error("provider responded with status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn new(operation: impl Into<String>, failure: ProviderFailure) -> Self {
        Self {
            operation: operation.into(),
            failure,
        }
    }

    pub fn malformed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(operation, ProviderFailure::Malformed(reason.into()))
    }

    pub fn transport(operation: impl Into<String>, err: anyhow::Error) -> Self {
        Self::new(operation, ProviderFailure::Transport(format!("{err:#}")))
    }
}

impl ProviderFailure {
    /// Classifies a non-success response. Returns `None` for 2xx.
    pub fn from_response(response: &ApiResponse) -> Option<Self> {
        if response.is_success() {
            return None;
        }
        Some(match response.status {
            401 => ProviderFailure::Unauthorized,
            404 => ProviderFailure::NotFound,
            429 => ProviderFailure::RateLimited {
                retry_after: response.retry_after,
            },
            code => {
                let message = serde_json::from_str::<ErrorPayload>(&response.body)
                    .map(|p| p.error.message)
                    .unwrap_or_else(|_| response.body.trim().to_string());
                ProviderFailure::Status { code, message }
            }
        })
    }
}
