//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::domains::entities::WriteError;
use crate::kernel::CollaboratorError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,

    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Write(err) => match err {
                WriteError::Identity(_) => StatusCode::BAD_REQUEST,
                WriteError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
                WriteError::Collaborator(CollaboratorError::Rejected { status, .. }) => {
                    StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
                }
                WriteError::Collaborator(CollaboratorError::Unavailable { .. }) => {
                    StatusCode::BAD_GATEWAY
                }
                WriteError::Publish(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
                WriteError::Publish(_)
                | WriteError::Encode(_)
                | WriteError::OwnershipNotRecorded { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "request rejected");
        }
        let body = match &self {
            // Written already: name the entity so a retry does not create a second one.
            ApiError::Write(WriteError::OwnershipNotRecorded { id, .. }) => {
                json!({ "error": self.to_string(), "id": id, "written": true })
            }
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
