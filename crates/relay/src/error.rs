use axum::{
    http::{header::HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tandem_common::protocol::Envelope;
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Invalid action.")]
    InvalidAction(String),

    #[error("document {fingerprint} is busy, retry the sync")]
    LockUnavailable { fingerprint: String },

    #[error("{collaborator} is not registered to document {fingerprint}")]
    NotRegistered {
        fingerprint: String,
        collaborator: String,
    },

    #[error("record store failure: {0}")]
    Storage(#[from] StoreError),

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("working copy i/o failed: {0}")]
    WorkingCopy(#[from] std::io::Error),

    #[error("response encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl SyncError {
    pub fn invalid(name: &'static str, reason: impl ToString) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.to_string(),
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingParameter(_) => "MISSING_PARAMETER",
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
            Self::InvalidAction(_) => "INVALID_ACTION",
            Self::LockUnavailable { .. } => "LOCK_UNAVAILABLE",
            Self::NotRegistered { .. } => "NOT_REGISTERED",
            Self::Storage(_) | Self::StorageFailure(_) => "STORAGE_FAILURE",
            Self::WorkingCopy(_) => "WORKING_COPY_FAILED",
            Self::Encoding(_) => "ENCODING_FAILED",
        }
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingParameter(_) | Self::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidAction(_) => StatusCode::NOT_FOUND,
            Self::LockUnavailable { .. } | Self::NotRegistered { .. } => StatusCode::CONFLICT,
            Self::Storage(_)
            | Self::StorageFailure(_)
            | Self::WorkingCopy(_)
            | Self::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the client should simply try again on its next tick.
    pub const fn retryable(&self) -> bool {
        matches!(self, Self::LockUnavailable { .. })
    }

    pub fn to_envelope(&self) -> Envelope {
        Envelope {
            data: Some(json!({
                "code": self.code(),
                "retryable": self.retryable(),
            })),
            ..Envelope::error(self.to_string())
        }
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_envelope())).into_response()
    }
}

pub fn request_id_from_headers_or_generate(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub fn attach_request_id_header(response: &mut Response, request_id: &str) {
    if let Ok(header) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header);
    }
}
