use actix_web::{error, http::StatusCode};

#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    #[error("Queued transaction is missing required fields: {0}")]
    InvalidItem(&'static str),

    #[error("Invalid queue configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("No transaction found with id '{0}'")]
    NotFound(String),

    #[error("The queue is shutting down and no longer accepts work")]
    ShutdownInProgress,
}

impl QueueError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidItem(_) => "invalid_item",
            Self::InvalidConfig(_) => "invalid_config",
            Self::NotFound(_) => "not_found",
            Self::ShutdownInProgress => "shutting_down",
        }
    }
}

impl error::ResponseError for QueueError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidItem(_) => StatusCode::BAD_REQUEST,
            Self::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ShutdownInProgress => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}
