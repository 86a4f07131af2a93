use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::models::events::EventType;
use crate::models::websockets::WsMessage;

/// State the hub keeps per connection. The `sender` feeds the transport
/// task owning the actual socket; the hub never touches the wire itself.
#[derive(Debug, Clone)]
pub struct ConnectionData {
    pub id: Uuid,
    pub user_id: String,
    /// Transport-level handle (peer address or socket label); opaque here.
    pub connection_id: String,
    pub is_authenticated: bool,
    pub subscribed_events: HashSet<EventType>,
    pub last_ping: DateTime<Utc>,
    pub connection_started: DateTime<Utc>,
    pub metadata: Value,
    pub sender: UnboundedSender<WsMessage>,
}

impl ConnectionData {
    /// A connection is alive while `now - last_ping <= timeout`; exactly on
    /// the boundary still counts as alive.
    pub fn is_alive(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        match (now - self.last_ping).to_std() {
            Ok(idle) => idle <= timeout,
            Err(_) => true, // ping recorded in the future, clock skew
        }
    }
}

/// A single-use gateway token binding an upcoming connection to a user.
#[derive(Debug, Clone)]
pub struct GatewayToken {
    pub user_id: String,
    pub issued_at: DateTime<Utc>,
    pub metadata: Value,
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn liveness_boundary_is_inclusive() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let now = Utc::now();
        let conn = ConnectionData {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            connection_id: "peer".to_string(),
            is_authenticated: true,
            subscribed_events: HashSet::new(),
            last_ping: now - TimeDelta::seconds(30),
            connection_started: now,
            metadata: Value::Null,
            sender: tx,
        };

        assert!(conn.is_alive(Duration::from_secs(30), now), "exactly at the boundary");
        assert!(!conn.is_alive(Duration::from_secs(29), now), "strictly past it");
    }
}
