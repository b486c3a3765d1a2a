use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use hashreg_core::RegistryError;
use hashreg_journal::JournalError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    /// HTTP status and machine-readable error kind.
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            Self::AuthFailed(_) => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            Self::Journal(JournalError::Registry(e)) => {
                let status = match e {
                    RegistryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                    RegistryError::DuplicateEntry(_) => StatusCode::CONFLICT,
                    RegistryError::Unauthorized { .. } => StatusCode::FORBIDDEN,
                    RegistryError::Integrity { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.kind())
            }
            Self::Journal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "journal"),
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        }
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ServerError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, kind) = self.classify();
        if status.is_server_error() {
            tracing::error!(kind, error = %self, "request failed");
        } else {
            tracing::debug!(kind, status = status.as_u16(), error = %self, "request refused");
        }
        let body = json!({ "error": kind, "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashreg_core::InputRejection;
    use hashreg_types::{ActorId, Fingerprint};

    fn registry(e: RegistryError) -> ServerError {
        ServerError::Journal(JournalError::Registry(e))
    }

    #[test]
    fn registry_errors_map_to_status_codes() {
        assert_eq!(
            registry(InputRejection::EmptyBatch.into()).classify(),
            (StatusCode::BAD_REQUEST, "invalid_input")
        );
        assert_eq!(
            registry(RegistryError::DuplicateEntry(Fingerprint::from_hash([1; 32]))).classify(),
            (StatusCode::CONFLICT, "duplicate_entry")
        );
        assert_eq!(
            registry(RegistryError::Unauthorized {
                caller: ActorId::derive("x")
            })
            .classify(),
            (StatusCode::FORBIDDEN, "unauthorized")
        );
        assert_eq!(
            registry(RegistryError::Integrity {
                seq: 3,
                reason: "gap".into()
            })
            .classify()
            .0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn other_errors() {
        assert_eq!(
            ServerError::AuthFailed("missing".into()).classify().0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServerError::Journal(JournalError::LockPoisoned).classify(),
            (StatusCode::INTERNAL_SERVER_ERROR, "journal")
        );
    }

    #[test]
    fn registry_message_passes_through() {
        let err = registry(InputRejection::ZeroFingerprint.into());
        assert_eq!(err.to_string(), "invalid input: invalid hash");
    }
}
