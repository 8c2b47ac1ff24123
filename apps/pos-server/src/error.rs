//! API error type: one status, one machine code, one message.
//!
//! Domain errors keep their message verbatim (`"already paid"`); storage
//! failures are logged here and answered with a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tavola_core::{CoreError, ErrorKind};
use tavola_db::{DbError, EngineError};
use tracing::{error, warn};

/// Machine-readable error codes for the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    Conflict,
    StoreResolutionFailed,
    DatabaseError,
    Internal,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: ErrorCode,
    /// Finer reason from the domain, e.g. `ALREADY_PAID`.
    pub reason: Option<&'static str>,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            code,
            reason: None,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::ValidationError, message)
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    message: &'a str,
    code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            message: &self.message,
            code: self.code,
            reason: self.reason,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let (status, code) = match err.kind() {
            ErrorKind::Validation => (StatusCode::BAD_REQUEST, ErrorCode::ValidationError),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, ErrorCode::NotFound),
            ErrorKind::Conflict => (StatusCode::CONFLICT, ErrorCode::Conflict),
            ErrorKind::StoreResolution => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorCode::StoreResolutionFailed,
            ),
            ErrorKind::Internal => {
                error!(error = %err, "Internal domain error");
                return ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Internal,
                    "Internal error",
                );
            }
        };
        ApiError {
            status,
            code,
            reason: Some(err.code()),
            message: err.to_string(),
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::new(
                StatusCode::NOT_FOUND,
                ErrorCode::NotFound,
                format!("{entity} not found: {id}"),
            ),
            busy @ (DbError::Busy(_) | DbError::PoolExhausted) => {
                warn!(error = %busy, "Database busy after retries");
                ApiError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorCode::DatabaseError,
                    "Database busy, try again",
                )
            }
            other => {
                error!(error = %other, "Database error");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::DatabaseError,
                    "Database operation failed",
                )
            }
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Domain(e) => e.into(),
            EngineError::Db(e) => e.into(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tavola_core::ValidationError;

    #[test]
    fn test_domain_kinds_map_to_status() {
        let err: ApiError = CoreError::AlreadyPaid {
            bill: "session s1".to_string(),
        }
        .into();
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.code, ErrorCode::Conflict);
        assert_eq!(err.reason, Some("ALREADY_PAID"));

        let err: ApiError = CoreError::from(ValidationError::Required {
            field: "items".to_string(),
        })
        .into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: ApiError = CoreError::SessionNotFound("t9".to_string()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_db_internals_are_not_leaked() {
        let err: ApiError = EngineError::Db(DbError::QueryFailed("near \"SELEC\"".into())).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(!err.message.contains("SELEC"));
    }
}
