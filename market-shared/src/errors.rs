use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::store::StoreError;
use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{area}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Session and sign-up errors
/// - E2xxx: Listing errors
/// - E3xxx: Interaction (likes, saves, comments) errors
/// - E4xxx: Photo upload errors
/// - E5xxx: Profile, review and messaging errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    Unauthorized,
    Forbidden,
    StoreUnavailable,
    BadRequest,

    // Session (E1xxx)
    SessionExpired,
    SessionInvalid,
    EmailDomainNotAllowed,
    PasswordMismatch,
    OneTimeCodeInvalid,

    // Listing (E2xxx)
    MissingTradeTag,
    PhotoRequiredForSale,
    ContentRequired,
    TooManyPhotos,
    NotAuthor,
    ListingNotFound,

    // Interaction (E3xxx)
    EmptyComment,
    DisplayNameRequired,
    CommentNotFound,
    ListingSold,

    // Upload (E4xxx)
    PhotoTooLarge,
    PhotoTypeInvalid,
    PhotoUploadFailed,

    // Social (E5xxx)
    InvalidDisplayName,
    AboutTooLong,
    EmptyReview,
    CannotReviewSelf,
    EmptyMessage,
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
            Self::StoreUnavailable => "E0006",
            Self::BadRequest => "E0007",

            // Session
            Self::SessionExpired => "E1001",
            Self::SessionInvalid => "E1002",
            Self::EmailDomainNotAllowed => "E1003",
            Self::PasswordMismatch => "E1004",
            Self::OneTimeCodeInvalid => "E1005",

            // Listing
            Self::MissingTradeTag => "E2001",
            Self::PhotoRequiredForSale => "E2002",
            Self::ContentRequired => "E2003",
            Self::TooManyPhotos => "E2004",
            Self::NotAuthor => "E2005",
            Self::ListingNotFound => "E2006",

            // Interaction
            Self::EmptyComment => "E3001",
            Self::DisplayNameRequired => "E3002",
            Self::CommentNotFound => "E3003",
            Self::ListingSold => "E3004",

            // Upload
            Self::PhotoTooLarge => "E4001",
            Self::PhotoTypeInvalid => "E4002",
            Self::PhotoUploadFailed => "E4003",

            // Social
            Self::InvalidDisplayName => "E5001",
            Self::AboutTooLong => "E5002",
            Self::EmptyReview => "E5003",
            Self::CannotReviewSelf => "E5004",
            Self::EmptyMessage => "E5005",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::StoreUnavailable => StatusCode::BAD_GATEWAY,
            Self::NotFound | Self::ListingNotFound | Self::CommentNotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized | Self::SessionExpired | Self::SessionInvalid => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::NotAuthor | Self::CannotReviewSelf => StatusCode::FORBIDDEN,
            Self::ListingSold => StatusCode::CONFLICT,
            Self::PhotoTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::PhotoTypeInvalid => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::ValidationError | Self::BadRequest | Self::EmailDomainNotAllowed
            | Self::PasswordMismatch | Self::OneTimeCodeInvalid | Self::MissingTradeTag
            | Self::PhotoRequiredForSale | Self::ContentRequired | Self::TooManyPhotos
            | Self::EmptyComment | Self::DisplayNameRequired | Self::PhotoUploadFailed
            | Self::InvalidDisplayName | Self::AboutTooLong | Self::EmptyReview
            | Self::EmptyMessage => StatusCode::BAD_REQUEST,
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

    #[error("internal error")]
    Internal(#[from] anyhow::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

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

    /// The code carried by a known error, if any.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            AppError::Known { code, .. } => Some(*code),
            AppError::Validation(_) => Some(ErrorCode::ValidationError),
            _ => None,
        }
    }

    /// Rejected locally, before any call to the store.
    pub fn is_validation(&self) -> bool {
        match self {
            AppError::Validation(_) => true,
            AppError::Known { code, .. } => code.status_code().is_client_error(),
            _ => false,
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
                tracing::error!(error = %err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", "internal error"),
                )
            }
            AppError::Store(err) => {
                tracing::error!(error = %err, "store error");
                (
                    StatusCode::BAD_GATEWAY,
                    ApiErrorResponse::new("E0006", "store unavailable"),
                )
            }
            AppError::Decode(err) => {
                tracing::error!(error = %err, "decode error");
                (
                    StatusCode::BAD_GATEWAY,
                    ApiErrorResponse::new("E0006", "unexpected store response"),
                )
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
    fn validation_codes_are_client_errors() {
        let err = AppError::new(ErrorCode::EmptyComment, "comment is empty");
        assert!(err.is_validation());
        assert_eq!(err.error_code(), Some(ErrorCode::EmptyComment));

        let err = AppError::Store(StoreError::Unavailable("offline".into()));
        assert!(!err.is_validation());
        assert_eq!(err.error_code(), None);
    }

    #[test]
    fn codes_are_unique() {
        let all = [
            ErrorCode::InternalError, ErrorCode::ValidationError, ErrorCode::NotFound,
            ErrorCode::Unauthorized, ErrorCode::Forbidden, ErrorCode::StoreUnavailable,
            ErrorCode::BadRequest, ErrorCode::SessionExpired, ErrorCode::SessionInvalid,
            ErrorCode::EmailDomainNotAllowed, ErrorCode::PasswordMismatch,
            ErrorCode::OneTimeCodeInvalid, ErrorCode::MissingTradeTag,
            ErrorCode::PhotoRequiredForSale, ErrorCode::ContentRequired, ErrorCode::TooManyPhotos,
            ErrorCode::NotAuthor, ErrorCode::ListingNotFound, ErrorCode::EmptyComment,
            ErrorCode::DisplayNameRequired, ErrorCode::CommentNotFound, ErrorCode::PhotoTooLarge,
            ErrorCode::PhotoTypeInvalid, ErrorCode::PhotoUploadFailed,
            ErrorCode::InvalidDisplayName, ErrorCode::AboutTooLong, ErrorCode::EmptyReview,
            ErrorCode::CannotReviewSelf, ErrorCode::EmptyMessage,
        ];
        let mut codes: Vec<&str> = all.iter().map(|c| c.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }
}
