use actix_web::{error, http::StatusCode};

#[derive(Debug, Clone, thiserror::Error)]
pub enum EventError {
    #[error("'{0}' is not a valid event type")]
    InvalidEventType(String),

    #[error("'{0}' is not a transaction lifecycle event type")]
    NotTransactionEvent(String),

    #[error("'{0}' is not a valid priority")]
    InvalidPriority(String),
}

impl EventError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidEventType(_) => "invalid_event_type",
            Self::NotTransactionEvent(_) => "invalid_event_type",
            Self::InvalidPriority(_) => "invalid_priority",
        }
    }
}

impl error::ResponseError for EventError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}
