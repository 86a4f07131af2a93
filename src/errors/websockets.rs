use actix_web::{error, http::StatusCode};

#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum WebSocketError {
    #[error("userId must not be empty")]
    InvalidUserId,

    #[error("The provided gateway token does not exist or has expired")]
    TokenNotFound,

    #[error("Gateway token was issued for a different user")]
    TokenMismatch,

    #[error("No connection found with the given id")]
    ConnectionNotFound,

    #[error("Connection must authenticate before managing subscriptions")]
    NotAuthenticated,

    #[error("Failed to deliver message to connection")]
    SendFailed,

    #[error("Server websocket URL is not configured")]
    ServerConfigError,
}

impl WebSocketError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidUserId => "invalid_user_id",
            Self::TokenNotFound => "token_not_found",
            Self::TokenMismatch => "token_mismatch",
            Self::ConnectionNotFound => "connection_not_found",
            Self::NotAuthenticated => "not_authenticated",
            Self::SendFailed => "send_failed",
            Self::ServerConfigError => "server_config_error",
        }
    }
}

impl error::ResponseError for WebSocketError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidUserId => StatusCode::BAD_REQUEST,
            Self::TokenNotFound => StatusCode::UNAUTHORIZED,
            Self::TokenMismatch => StatusCode::UNAUTHORIZED,
            Self::ConnectionNotFound => StatusCode::NOT_FOUND,
            Self::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Self::SendFailed => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServerConfigError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
