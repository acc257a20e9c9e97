use std::fmt;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::session::clear_session_cookie;

/// Why a request could not be bound to an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingToken,
    ExpiredToken,
    InvalidToken,
    /// Token was valid but its user no longer exists.
    UnknownUser,
}

impl AuthFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFailure::MissingToken => "missing_token",
            AuthFailure::ExpiredToken => "expired_token",
            AuthFailure::InvalidToken => "invalid_token",
            AuthFailure::UnknownUser => "unknown_user",
        }
    }

    /// Whether the client is holding a token it should discard.
    pub fn clears_token(&self) -> bool {
        !matches!(self, AuthFailure::MissingToken)
    }

    fn message(&self) -> &'static str {
        match self {
            AuthFailure::MissingToken => "Please log in to continue",
            AuthFailure::ExpiredToken => "Your session has expired, please log in again",
            AuthFailure::InvalidToken => "Your session is invalid, please log in again",
            AuthFailure::UnknownUser => "Your account no longer exists",
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Post,
    Comment,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Post => f.write_str("Post"),
            Resource::Comment => f.write_str("Comment"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    EmptyField(&'static str),

    #[error("Title cannot be empty")]
    EmptyTitle,

    #[error("Content cannot be empty")]
    EmptyContent,

    #[error("That name is already taken")]
    DuplicateName,

    #[error("That email is already registered")]
    DuplicateEmail,

    /// Body or path that could not be read at all.
    #[error("{0}")]
    MalformedRequest(String),
}

/// Low-level storage failures. Logged, never shown to clients.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Database error: {0}")]
    Sql(#[from] rusqlite::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(AuthFailure),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(Resource),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage unavailable")]
    StorageUnavailable(#[source] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::StorageUnavailable(StorageError::Sql(e))
    }
}

impl From<r2d2::Error> for AppError {
    fn from(e: r2d2::Error) -> Self {
        AppError::StorageUnavailable(StorageError::Pool(e))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        ValidationError::MalformedRequest(rejection.body_text()).into()
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        ValidationError::MalformedRequest(rejection.body_text()).into()
    }
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::Forbidden => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation",
            AppError::StorageUnavailable(_) => "storage_unavailable",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) | AppError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(
                ValidationError::DuplicateName | ValidationError::DuplicateEmail,
            ) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Unauthenticated(reason) => reason.message().to_string(),
            AppError::InvalidCredentials => "Invalid email or password".to_string(),
            AppError::Forbidden => "You can only change your own content".to_string(),
            AppError::NotFound(resource) => format!("{} not found", resource),
            AppError::Validation(e) => e.to_string(),
            AppError::StorageUnavailable(e) => {
                tracing::error!("Storage error: {}", e);
                "The service is temporarily unavailable, please try again".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
        };

        let mut body = json!({ "error": self.kind(), "message": message });
        if let AppError::Unauthenticated(reason) = &self {
            body["reason"] = json!(reason.as_str());
        }

        let mut response = (status, Json(body)).into_response();
        if let AppError::Unauthenticated(reason) = &self {
            if reason.clears_token() {
                if let Ok(value) = clear_session_cookie().parse() {
                    response.headers_mut().insert(header::SET_COOKIE, value);
                }
            }
        }
        response
    }
}

pub type AppResult<T> = Result<T, AppError>;
