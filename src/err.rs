use axum::http::header::InvalidHeaderValue;
use axum::http::{StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};

use crate::views;

pub async fn handler404(path: Uri) -> Error {
    log::debug!("No route for {}", path);
    Error::NotFound
}

/// Failure of a single request. Nothing here is ever retried; the request
/// that hit it gets the matching error page and the next one starts clean.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("record not found")]
    NotFound,
    #[error("{kind}: {message}")]
    Internal { kind: &'static str, message: String },
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::NotFound => (StatusCode::NOT_FOUND, Html(views::not_found())).into_response(),
            Error::Internal { kind, message } => {
                log::error!("{}: {}", kind, message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html(views::server_error()),
                )
                    .into_response()
            }
        }
    }
}

impl Error {
    pub fn internal<S: Into<String>>(kind: &'static str, msg: S) -> Error {
        Error::Internal {
            kind,
            message: msg.into(),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal {
            kind: "DatabaseError",
            message: err.to_string(),
        }
    }
}

impl From<uuid::Error> for Error {
    fn from(_: uuid::Error) -> Self {
        // ids only ever arrive from clients, a malformed one names no record
        Self::NotFound
    }
}

impl From<postcard::Error> for Error {
    fn from(err: postcard::Error) -> Self {
        Self::Internal {
            kind: "SerializationError",
            message: err.to_string(),
        }
    }
}

impl From<pbkdf2::password_hash::Error> for Error {
    fn from(err: pbkdf2::password_hash::Error) -> Self {
        Self::Internal {
            kind: "PasswordHashError",
            message: err.to_string(),
        }
    }
}

impl From<InvalidHeaderValue> for Error {
    fn from(err: InvalidHeaderValue) -> Self {
        Self::Internal {
            kind: "HeaderError",
            message: err.to_string(),
        }
    }
}
