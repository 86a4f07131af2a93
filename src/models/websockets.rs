use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::events::{Event, EventType};
use crate::models::filters::SubscriptionFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum WsMessageType {
    Event,
    Subscribe,
    Unsubscribe,
    Ping,
    Pong,
    Error,
    Auth,
}

/// The framed message delivered over a connection. Events ride in `payload`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WsMessage {
    pub r#type: WsMessageType,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub message_id: Uuid,
}

impl WsMessage {
    pub fn new(r#type: WsMessageType, payload: Value) -> Self {
        Self {
            r#type,
            payload,
            timestamp: Utc::now(),
            message_id: Uuid::new_v4(),
        }
    }

    pub fn event(event: &Event) -> Self {
        let payload = serde_json::to_value(event).unwrap_or(Value::Null);
        Self::new(WsMessageType::Event, payload)
    }

    pub fn ping() -> Self {
        Self::new(WsMessageType::Ping, Value::Null)
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::new(
            WsMessageType::Error,
            json!({ "error": code, "message": message.into() }),
        )
    }
}

/// A frame received from a client. Payload shape depends on `type`; the hub's
/// message handler does the second-stage parse.
#[derive(Debug, Clone, Deserialize)]
pub struct WsIncoming {
    pub r#type: WsMessageType,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthPayload {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribePayload {
    #[serde(default)]
    pub event_types: Vec<EventType>,
    #[serde(default)]
    pub filters: Option<Vec<SubscriptionFilter>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribePayload {
    #[serde(default)]
    pub event_types: Vec<EventType>,
}

/// Response containing the count of active connections.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionCountResponse {
    pub count: usize,
}

/// Issued by `POST /api/realtime/ws/start`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GatewayTokenResponse {
    pub url: String,
    pub token: Uuid,
    /// Seconds until the token expires.
    pub expires: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_carry_wire_casing() {
        let frame = WsMessage::ping();
        let value = serde_json::to_value(&frame).expect("frame must serialize");

        assert_eq!(value["type"], json!("ping"));
        assert!(value.get("messageId").is_some());
    }

    #[test]
    fn incoming_frames_tolerate_missing_payload() {
        let parsed: WsIncoming =
            serde_json::from_value(json!({ "type": "pong" })).expect("pong without payload");

        assert_eq!(parsed.r#type, WsMessageType::Pong);
        assert_eq!(parsed.payload, Value::Null);
    }
}
