//! Second-stage handling for frames received from a client. The gateway
//! hands raw text here; the reply frame (if any) goes back over the same
//! socket.

use serde_json::json;
use uuid::Uuid;

use crate::models::websockets::{
    AuthPayload, SubscribePayload, UnsubscribePayload, WsIncoming, WsMessage, WsMessageType,
};
use crate::websockets::ConnectionHub;

/// Processes one inbound frame. Returns the frame to send back, or [None]
/// when the message needs no reply (a `pong`).
pub fn process_incoming(hub: &ConnectionHub, connection: Uuid, raw: &str) -> Option<WsMessage> {
    let incoming: WsIncoming = match serde_json::from_str(raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::debug!("Failed to parse inbound frame: {err}");
            return Some(WsMessage::error(
                "invalid_message",
                "Message was not a valid frame",
            ));
        }
    };

    match incoming.r#type {
        WsMessageType::Auth => {
            let payload: AuthPayload = match serde_json::from_value(incoming.payload) {
                Ok(payload) => payload,
                Err(_) => {
                    return Some(WsMessage::error("invalid_payload", "auth requires a token"));
                }
            };
            let Ok(token) = Uuid::parse_str(&payload.token) else {
                return Some(WsMessage::error("token_not_found", "Malformed token"));
            };

            match hub.authenticate(connection, token) {
                Ok(user_id) => Some(WsMessage::new(
                    WsMessageType::Auth,
                    json!({ "ok": true, "authenticated": true, "userId": user_id }),
                )),
                Err(err) => Some(WsMessage::error(err.code(), err.to_string())),
            }
        }

        WsMessageType::Subscribe => {
            let payload: SubscribePayload = match serde_json::from_value(incoming.payload) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::debug!("Bad subscribe payload: {err}");
                    return Some(WsMessage::error("invalid_payload", "Bad subscribe payload"));
                }
            };

            match hub.subscribe(connection, payload.event_types, payload.filters) {
                Ok(subscription_id) => Some(WsMessage::new(
                    WsMessageType::Subscribe,
                    json!({
                        "ok": true,
                        "subscriptionId": subscription_id,
                        "subscribedEvents": hub.subscribed_events(&connection),
                    }),
                )),
                Err(err) => Some(WsMessage::error(err.code(), err.to_string())),
            }
        }

        WsMessageType::Unsubscribe => {
            let payload: UnsubscribePayload = match serde_json::from_value(incoming.payload) {
                Ok(payload) => payload,
                Err(_) => {
                    return Some(WsMessage::error("invalid_payload", "Bad unsubscribe payload"));
                }
            };

            match hub.unsubscribe(connection, &payload.event_types) {
                Ok(()) => Some(WsMessage::new(
                    WsMessageType::Unsubscribe,
                    json!({
                        "ok": true,
                        "subscribedEvents": hub.subscribed_events(&connection),
                    }),
                )),
                Err(err) => Some(WsMessage::error(err.code(), err.to_string())),
            }
        }

        WsMessageType::Ping => Some(WsMessage::new(WsMessageType::Pong, json!({ "ok": true }))),

        WsMessageType::Pong => {
            hub.record_pong(&connection);
            None
        }

        WsMessageType::Event | WsMessageType::Error => Some(WsMessage::error(
            "unsupported_message_type",
            "Clients cannot send this frame type",
        )),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    use super::*;
    use crate::config::HubConfig;
    use crate::models::events::EventType;

    fn authed_connection(hub: &ConnectionHub) -> Uuid {
        let token = hub.obtain_token("u1".to_string(), Value::Null);
        let (tx, rx) = mpsc::unbounded_channel();
        let id = hub.add_connection("peer".to_string(), "u1".to_string(), Value::Null, tx);
        hub.authenticate(id, token).unwrap();
        std::mem::forget(rx); // keep the channel open for the test

        id
    }

    #[tokio::test]
    async fn malformed_frames_get_an_error_reply() {
        let hub = ConnectionHub::new(HubConfig::default());
        let id = authed_connection(&hub);

        let reply = process_incoming(&hub, id, "not json").expect("must reply");
        assert_eq!(reply.r#type, WsMessageType::Error);
    }

    #[tokio::test]
    async fn subscribe_over_the_socket_registers_interest() {
        let hub = ConnectionHub::new(HubConfig::default());
        let id = authed_connection(&hub);

        let raw = json!({
            "type": "subscribe",
            "payload": { "eventTypes": ["balance_updated"] }
        })
        .to_string();
        let reply = process_incoming(&hub, id, &raw).expect("must reply");

        assert_eq!(reply.r#type, WsMessageType::Subscribe);
        assert_eq!(reply.payload["ok"], json!(true));
        assert_eq!(hub.subscribed_events(&id), vec![EventType::BalanceUpdated]);
    }

    #[tokio::test]
    async fn pong_frames_refresh_liveness_silently() {
        let hub = ConnectionHub::new(HubConfig::default());
        let id = authed_connection(&hub);

        let reply = process_incoming(&hub, id, &json!({ "type": "pong" }).to_string());
        assert!(reply.is_none());
    }
}
