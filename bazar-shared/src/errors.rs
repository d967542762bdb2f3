use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{service}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Auth errors
/// - E4xxx: Chat errors
///
/// E2xxx (catalog), E3xxx (orders) and E5xxx (notification) are reserved
/// for services that carry their own variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    Unauthorized,
    Forbidden,
    ServiceUnavailable,
    BadRequest,

    // Auth (E1xxx)
    TokenExpired,
    TokenInvalid,

    // Chat (E4xxx)
    RoomNotFound,
    NotRoomParticipant,
    MessageNotFound,
    MessageRecalled,
    EditConflict,
    SearchQueryTooShort,
    InvalidCursor,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::Unauthorized => "E0004",
            Self::Forbidden => "E0005",
            Self::ServiceUnavailable => "E0006",
            Self::BadRequest => "E0007",

            // Auth
            Self::TokenExpired => "E1001",
            Self::TokenInvalid => "E1002",

            // Chat
            Self::RoomNotFound => "E4001",
            Self::NotRoomParticipant => "E4002",
            Self::MessageNotFound => "E4003",
            Self::MessageRecalled => "E4004",
            Self::EditConflict => "E4005",
            Self::SearchQueryTooShort => "E4006",
            Self::InvalidCursor => "E4007",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::ValidationError | Self::BadRequest | Self::MessageRecalled
            | Self::SearchQueryTooShort | Self::InvalidCursor => StatusCode::BAD_REQUEST,
            Self::NotFound | Self::RoomNotFound | Self::MessageNotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized | Self::TokenExpired | Self::TokenInvalid => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::NotRoomParticipant => StatusCode::FORBIDDEN,
            Self::EditConflict => StatusCode::CONFLICT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Stable error code string for the socket `error` payload and logs.
    pub fn code_str(&self) -> &'static str {
        match self {
            Self::Known { code, .. } => code.code(),
            Self::Internal(_) => ErrorCode::InternalError.code(),
            Self::Database(diesel::result::Error::NotFound) => ErrorCode::NotFound.code(),
            Self::Database(_) => ErrorCode::InternalError.code(),
            Self::Validation(_) => ErrorCode::ValidationError.code(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known { code, message, details } => {
                let status = code.status_code();
                let mut resp = ApiErrorResponse::new(code.code(), message);
                if let Some(d) = details {
                    resp = resp.with_details(d.clone());
                }
                (status, resp)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", "internal server error"),
                )
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                match err {
                    diesel::result::Error::NotFound => (
                        StatusCode::NOT_FOUND,
                        ApiErrorResponse::new("E0003", "resource not found"),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiErrorResponse::new("E0001", "database error"),
                    ),
                }
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorResponse::new("E0002", msg),
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_codes_are_stable() {
        assert_eq!(ErrorCode::RoomNotFound.code(), "E4001");
        assert_eq!(ErrorCode::NotRoomParticipant.code(), "E4002");
        assert_eq!(ErrorCode::MessageNotFound.code(), "E4003");
        assert_eq!(ErrorCode::MessageRecalled.code(), "E4004");
        assert_eq!(ErrorCode::EditConflict.code(), "E4005");
        assert_eq!(ErrorCode::SearchQueryTooShort.code(), "E4006");
        assert_eq!(ErrorCode::InvalidCursor.code(), "E4007");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(ErrorCode::RoomNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::NotRoomParticipant.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::EditConflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::MessageRecalled.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::TokenExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::ServiceUnavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn code_str_covers_non_known_variants() {
        let db = AppError::Database(diesel::result::Error::NotFound);
        assert_eq!(db.code_str(), "E0003");

        let validation = AppError::Validation("bad".into());
        assert_eq!(validation.code_str(), "E0002");

        let known = AppError::new(ErrorCode::EditConflict, "stale version");
        assert_eq!(known.code_str(), "E4005");
    }
}
