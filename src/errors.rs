use actix_web::{HttpResponse, http::StatusCode, ResponseError};
use thiserror::Error;
use serde::Serialize;
use std::path::PathBuf;
use crate::imaging::TrimMargins;
use crate::models::camera::Side;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ApiErrBody {
    error: String
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiErrBody { error: self.to_string() })
    }
}

/// Failures of the temporary-image session store.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("image {image} not found in session {session}")]
    ImageNotFound { session: String, image: String },
    #[error("invalid identifier: {0:?}")]
    InvalidId(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Why an image stage fell back to its input. Never surfaced as an HTTP error.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("failed to decode {path}: {source}")]
    Decode { path: PathBuf, source: image::ImageError },
    #[error("failed to write {path}: {source}")]
    Encode { path: PathBuf, source: image::ImageError },
    #[error("trim {margins:?} leaves nothing of a {width}x{height} image")]
    EmptyCrop { width: u32, height: u32, margins: TrimMargins },
    #[error("thumbnail bounds {max_w}x{max_h} must be non-zero")]
    InvalidBounds { max_w: u32, max_h: u32 },
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("no active scanning session")]
    NoActiveSession,
    #[error("scanning session not found: {0}")]
    SessionNotFound(String),
    #[error("spread {0} not found")]
    SpreadNotFound(usize),
}

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("{0}")]
    InvalidSide(String),
    #[error("{} camera not configured", .0.title())]
    NotConfigured(Side),
}

impl From<ScanError> for ApiError {
    fn from(e: ScanError) -> Self {
        ApiError::NotFound(e.to_string())
    }
}

impl From<CameraError> for ApiError {
    fn from(e: CameraError) -> Self {
        match e {
            CameraError::NotConfigured(_) => ApiError::NotFound(e.to_string()),
            CameraError::MissingField(_) | CameraError::InvalidSide(_) => ApiError::BadRequest(e.to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::SessionNotFound(_) | SessionError::ImageNotFound { .. } => {
                ApiError::NotFound(e.to_string())
            }
            SessionError::InvalidId(_) => ApiError::BadRequest(e.to_string()),
            SessionError::Io(io) => {
                log::error!("session storage error: {io:?}");
                ApiError::Internal(io.to_string())
            }
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        log::error!("io error: {e:?}");
        ApiError::Internal(e.to_string())
    }
}

impl From<actix_web::error::BlockingError> for ApiError {
    fn from(e: actix_web::error::BlockingError) -> Self {
        log::error!("blocking pool error: {e}");
        ApiError::Internal(e.to_string())
    }
}

impl From<actix::MailboxError> for ApiError {
    fn from(e: actix::MailboxError) -> Self {
        log::error!("actor mailbox error: {e}");
        ApiError::Internal(e.to_string())
    }
}
