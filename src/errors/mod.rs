pub mod events;
pub mod queue;
pub mod websockets;

use actix_web::error::{JsonPayloadError, PathError, ResponseError};
use actix_web::{HttpResponse, http::StatusCode};

use crate::models::responses::ApiResponse;

/// Top-level error for the HTTP/WebSocket adapter layer. Every route returns
/// this so actix renders a consistent JSON envelope.
#[derive(Debug, thiserror::Error)]
pub enum RemitError {
    #[error(transparent)]
    Queue(#[from] queue::QueueError),

    #[error(transparent)]
    Event(#[from] events::EventError),

    #[error(transparent)]
    WebSocket(#[from] websockets::WebSocketError),

    #[error("Route not found")]
    NotFound,

    #[error(transparent)]
    JsonPayload(#[from] JsonPayloadError),

    #[error(transparent)]
    Path(#[from] PathError),
}

impl RemitError {
    fn code(&self) -> &'static str {
        match self {
            Self::Queue(err) => err.code(),
            Self::Event(err) => err.code(),
            Self::WebSocket(err) => err.code(),
            Self::NotFound => "not_found",
            Self::JsonPayload(_) => "invalid_json",
            Self::Path(_) => "invalid_path",
        }
    }
}

impl ResponseError for RemitError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Queue(err) => err.status_code(),
            Self::Event(err) => err.status_code(),
            Self::WebSocket(err) => err.status_code(),
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::JsonPayload(_) => StatusCode::BAD_REQUEST,
            Self::Path(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(ApiResponse::error(self.code(), self.to_string()))
    }
}
