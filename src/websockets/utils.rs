use std::env;

use uuid::Uuid;

use crate::errors::RemitError;
use crate::errors::websockets::WebSocketError;

/// Builds the public gateway URL handed back from the start endpoint.
pub fn make_gateway_url(token: Uuid) -> Result<String, RemitError> {
    let force_insecure = env::var("FORCE_WS_INSECURE").unwrap_or("true".to_owned());
    let schema = if force_insecure == "true" {
        "ws"
    } else {
        "wss"
    };

    let server_url = env::var("PUBLIC_URL")
        .map_err(|_| RemitError::WebSocket(WebSocketError::ServerConfigError))?;

    Ok(format!(
        "{schema}://{server_url}/api/realtime/ws/gateway/{token}"
    ))
}
