use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("track fetch failed: {0}")]
    TrackFetch(String),

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("index missing: {0}")]
    IndexMissing(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

impl Error {
    fn kind(&self) -> &'static str {
        match self {
            Error::CatalogUnavailable(_) => "CatalogUnavailable",
            Error::TrackFetch(_) => "TrackFetchFailed",
            Error::MalformedRecord(_) => "MalformedRecord",
            Error::IndexMissing(_) => "IndexMissing",
            Error::InvalidInput(_) => "InvalidInput",
            Error::InvalidRange(_) => "InvalidRange",
            Error::Io(_) | Error::Json(_) | Error::Store(_) | Error::Internal(_) => {
                "InternalError"
            }
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidInput(_) | Error::InvalidRange(_) => StatusCode::BAD_REQUEST,
            Error::CatalogUnavailable(_) | Error::IndexMissing(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::TrackFetch(_) => StatusCode::BAD_GATEWAY,
            Error::MalformedRecord(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::Store(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                kind: self.kind(),
                message: self.to_string(),
            },
        };
        (self.status_code(), axum::Json(body)).into_response()
    }
}
