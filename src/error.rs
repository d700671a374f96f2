use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use chrono::TimeDelta;
use serde::Serialize;

use crate::models::Id;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

/// Coarse classification callers map to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    ParentNotFound,
    IoFailure,
    ValidationFailure,
    Banned,
    RateLimited,
    Unauthorized,
    AdminDisabled,
}

#[derive(thiserror::Error, Debug)]
pub enum BoardError {
    #[error("unknown post {0}")]
    UnknownPost(Id),
    #[error("unknown poster")]
    UnknownPoster,
    #[error("page {0} out of range")]
    PageOutOfRange(usize),
    #[error("unknown parent thread {0}")]
    ParentNotFound(Id),
    #[error("invalid {0}")]
    Validation(String),
    #[error("you are banned")]
    Banned,
    #[error("you are being rate limited, retry in {}s", .retry_after.num_seconds().max(1))]
    RateLimited { retry_after: TimeDelta },
    #[error("incorrect password")]
    Unauthorized,
    #[error("admin password not set")]
    AdminDisabled,
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode store: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("failed to encode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("identity hashing failed: {0}")]
    Hash(argon2::Error),
}

impl BoardError {
    pub fn invalid(what: impl Into<String>) -> Self {
        BoardError::Validation(what.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BoardError::UnknownPost(_) | BoardError::UnknownPoster | BoardError::PageOutOfRange(_) => {
                ErrorKind::NotFound
            }
            BoardError::ParentNotFound(_) => ErrorKind::ParentNotFound,
            BoardError::Validation(_) => ErrorKind::ValidationFailure,
            BoardError::Banned => ErrorKind::Banned,
            BoardError::RateLimited { .. } => ErrorKind::RateLimited,
            BoardError::Unauthorized => ErrorKind::Unauthorized,
            BoardError::AdminDisabled => ErrorKind::AdminDisabled,
            BoardError::Io(_) | BoardError::Encoding(_) | BoardError::Image(_) | BoardError::Hash(_) => {
                ErrorKind::IoFailure
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, BoardError>;

impl ResponseError for BoardError {
    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound | ErrorKind::ParentNotFound => StatusCode::NOT_FOUND,
            ErrorKind::ValidationFailure => StatusCode::BAD_REQUEST,
            ErrorKind::Banned | ErrorKind::AdminDisabled => StatusCode::FORBIDDEN,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::IoFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // internal details stay in the logs
        let error = match self.kind() {
            ErrorKind::IoFailure => "internal error".to_string(),
            _ => self.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ApiErrorBody { error })
    }
}
