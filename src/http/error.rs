use log::{error, warn};
use rouille::Response;
use serde::Serialize;
use thiserror::Error;

use crate::{mirror::MirrorError, spotify::error::ProviderError, storage::error::StorageError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    /// The music provider failed or could not be reached.
    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        error!("Storage failure: {err}");
        ApiError::Internal("internal server error".into())
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        warn!("Provider failure: {err}");
        ApiError::Upstream(err.to_string())
    }
}

impl From<MirrorError> for ApiError {
    fn from(err: MirrorError) -> Self {
        match err {
            MirrorError::Provider(e) => e.into(),
            MirrorError::Storage(e) => e.into(),
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::BadRequest(_) => 400,
            ApiError::Conflict(_) => 409,
            ApiError::Upstream(_) => 502,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn into_response(self) -> Response {
        let detail = self.to_string();
        Response::json(&ErrorBody { detail: &detail }).with_status_code(self.status_code())
    }
}
