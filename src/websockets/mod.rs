//! The connection hub: tracks persistent client connections, their
//! subscriptions, and per-user offline buffers, and fans incoming events out
//! to everyone entitled to them.
//!
//! The hub is transport-agnostic. Each connection registers an unbounded
//! outbound channel; the websocket gateway (see `routes::ws`) owns the actual
//! socket and forwards frames from that channel. Sends are fire-and-forget:
//! a dead channel gets the connection cleaned up, nothing else blocks.

pub mod buffer;
pub mod handler;
pub mod metrics;
pub mod types;
pub mod utils;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time;
use uuid::Uuid;

use buffer::OfflineBuffer;
use metrics::{HubMetrics, HubMetricsSnapshot};
use types::{ConnectionData, GatewayToken};

use crate::config::HubConfig;
use crate::errors::websockets::WebSocketError;
use crate::models::events::{Event, EventType};
use crate::models::filters::SubscriptionFilter;
use crate::models::subscriptions::Subscription;
use crate::models::websockets::WsMessage;

#[derive(Clone)]
pub struct ConnectionHub {
    connections: Arc<DashMap<Uuid, ConnectionData>>,
    subscriptions: Arc<DashMap<Uuid, Subscription>>,
    offline_buffers: Arc<DashMap<String, OfflineBuffer>>,
    pending_tokens: Arc<DashMap<Uuid, GatewayToken>>,
    config: Arc<HubConfig>,
    metrics: Arc<HubMetrics>,
    shutting_down: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
    started: Arc<AtomicBool>,
}

impl ConnectionHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            connections: Arc::new(DashMap::with_capacity(100)),
            subscriptions: Arc::new(DashMap::with_capacity(100)),
            offline_buffers: Arc::new(DashMap::new()),
            pending_tokens: Arc::new(DashMap::with_capacity(50)),
            config: Arc::new(config),
            metrics: Arc::new(HubMetrics::default()),
            shutting_down: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns the heartbeat, reaper, and buffer-cleaner loops. Idempotent.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let hub = self.clone();
        tokio::spawn(async move { hub.run_heartbeat().await });
        let hub = self.clone();
        tokio::spawn(async move { hub.run_reaper().await });
        let hub = self.clone();
        tokio::spawn(async move { hub.run_buffer_cleaner().await });
    }

    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_waiters();
    }

    // ---- token handshake -------------------------------------------------

    /// Issues a single-use gateway token bound to `user_id`. The token
    /// removes itself from the cache once its TTL lapses.
    #[tracing::instrument(skip_all, fields(user_id = %user_id))]
    pub fn obtain_token(&self, user_id: String, metadata: Value) -> Uuid {
        let token = Uuid::new_v4();

        tracing::debug!("Issuing gateway token {token}");
        self.pending_tokens.insert(
            token,
            GatewayToken {
                user_id,
                issued_at: Utc::now(),
                metadata,
            },
        );

        let pending_tokens = self.pending_tokens.clone();
        let ttl = self.config.token_ttl;
        tokio::spawn(async move {
            time::sleep(ttl).await;

            if pending_tokens.remove(&token).is_some() {
                tracing::debug!("Removed expired gateway token {token}");
            }
        });

        token
    }

    /// Peeks at a token without consuming it; the gateway uses this to bind
    /// the connection to the right user before authentication completes.
    pub fn token_user(&self, token: &Uuid) -> Option<String> {
        self.pending_tokens
            .get(token)
            .map(|entry| entry.user_id.clone())
    }

    // ---- connection lifecycle --------------------------------------------

    /// Registers a new connection in the unauthenticated state. Buffered
    /// events for the user stay put until authentication succeeds.
    #[tracing::instrument(skip_all, fields(user_id = %user_id, connection_id = %connection_id))]
    pub fn add_connection(
        &self,
        connection_id: String,
        user_id: String,
        metadata: Value,
        sender: UnboundedSender<WsMessage>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();

        tracing::debug!("Inserting new connection into the registry");
        self.connections.insert(
            id,
            ConnectionData {
                id,
                user_id,
                connection_id,
                is_authenticated: false,
                subscribed_events: HashSet::new(),
                last_ping: now,
                connection_started: now,
                metadata,
                sender,
            },
        );

        id
    }

    /// Consumes `token` and flips the connection to authenticated. On
    /// success, any buffered events for the user are delivered in their
    /// original order and the buffer is cleared.
    #[tracing::instrument(skip_all, fields(connection = %id))]
    pub fn authenticate(&self, id: Uuid, token: Uuid) -> Result<String, WebSocketError> {
        let (_, data) = self
            .pending_tokens
            .remove(&token)
            .ok_or(WebSocketError::TokenNotFound)?;

        let expired = (Utc::now() - data.issued_at)
            .to_std()
            .is_ok_and(|age| age > self.config.token_ttl);
        if expired {
            return Err(WebSocketError::TokenNotFound);
        }

        let mut conn = self
            .connections
            .get_mut(&id)
            .ok_or(WebSocketError::ConnectionNotFound)?;
        if conn.user_id != data.user_id {
            return Err(WebSocketError::TokenMismatch);
        }

        conn.is_authenticated = true;
        let user_id = conn.user_id.clone();
        let sender = conn.sender.clone();
        drop(conn);

        tracing::info!("Connection authenticated for {user_id}");

        if let Some((_, mut buffered)) = self.offline_buffers.remove(&user_id) {
            let backlog = buffered.drain();
            tracing::debug!("Flushing {} buffered events to {user_id}", backlog.len());
            for event in backlog {
                if sender.send(WsMessage::event(&event)).is_ok() {
                    self.metrics.record_sent();
                } else {
                    self.metrics.record_send_failure();
                }
            }
        }

        Ok(user_id)
    }

    #[tracing::instrument(skip(self))]
    pub fn remove_connection(&self, id: &Uuid) {
        if self.connections.remove(id).is_some() {
            tracing::info!("Cleaned up connection");
        }
    }

    // ---- subscriptions ---------------------------------------------------

    /// Records a subscription for the connection's user. Requires an
    /// authenticated connection.
    #[tracing::instrument(skip_all, fields(connection = %id))]
    pub fn subscribe(
        &self,
        id: Uuid,
        event_types: Vec<EventType>,
        filters: Option<Vec<SubscriptionFilter>>,
    ) -> Result<Uuid, WebSocketError> {
        let mut conn = self
            .connections
            .get_mut(&id)
            .ok_or(WebSocketError::ConnectionNotFound)?;
        if !conn.is_authenticated {
            return Err(WebSocketError::NotAuthenticated);
        }

        conn.subscribed_events.extend(event_types.iter().copied());
        let user_id = conn.user_id.clone();
        drop(conn);

        let subscription = Subscription::new(user_id, event_types.into_iter().collect(), filters);
        let subscription_id = subscription.id;
        self.subscriptions.insert(subscription_id, subscription);

        tracing::info!("Connection subscribed, subscription {subscription_id}");
        Ok(subscription_id)
    }

    /// Removes event types from the connection and from any subscriptions
    /// owned by its user; subscriptions left with no types are dropped.
    #[tracing::instrument(skip_all, fields(connection = %id))]
    pub fn unsubscribe(&self, id: Uuid, event_types: &[EventType]) -> Result<(), WebSocketError> {
        let mut conn = self
            .connections
            .get_mut(&id)
            .ok_or(WebSocketError::ConnectionNotFound)?;
        for r#type in event_types {
            conn.subscribed_events.remove(r#type);
        }
        let user_id = conn.user_id.clone();
        drop(conn);

        self.subscriptions.retain(|_, subscription| {
            if subscription.user_id != user_id {
                return true;
            }
            for r#type in event_types {
                subscription.event_types.remove(r#type);
            }
            subscription.touch();
            !subscription.event_types.is_empty()
        });

        tracing::info!("Connection unsubscribed from {} event types", event_types.len());
        Ok(())
    }

    pub fn subscribed_events(&self, id: &Uuid) -> Vec<EventType> {
        self.connections
            .get(id)
            .map(|conn| conn.subscribed_events.iter().copied().collect())
            .unwrap_or_default()
    }

    // ---- event fan-out ---------------------------------------------------

    /// Delivers `event` to every matching subscription's live connections,
    /// buffering a copy for users who are offline. Called by the event bus.
    ///
    /// Returns the number of live deliveries. Buffering counts as success;
    /// the error case is reserved for "every live send failed", which the
    /// bus uses to decide on redelivery.
    #[tracing::instrument(skip_all, fields(event = %event.r#type, user_id = %event.user_id))]
    pub async fn process_event(&self, event: &Event) -> Result<usize, WebSocketError> {
        self.metrics.record_event_processed();

        let mut matched: Vec<Uuid> = Vec::new();
        let mut targets: HashSet<String> = HashSet::new();
        let mut subscribed_users: HashSet<String> = HashSet::new();
        for entry in self.subscriptions.iter() {
            subscribed_users.insert(entry.value().user_id.clone());
            if entry.value().matches_event(event) {
                matched.push(*entry.key());
                targets.insert(entry.value().user_id.clone());
            }
        }
        for id in &matched {
            if let Some(mut subscription) = self.subscriptions.get_mut(id) {
                subscription.touch();
            }
        }

        let now = Utc::now();
        let frame = WsMessage::event(event);
        let mut delivered = 0usize;
        let mut attempted = 0usize;
        let mut dead: Vec<Uuid> = Vec::new();

        for user in &targets {
            let live = self.live_connections(user, now);
            if live.is_empty() {
                self.buffer_event(user, event);
                continue;
            }

            for (id, sender) in live {
                attempted += 1;
                if sender.send(frame.clone()).is_ok() {
                    delivered += 1;
                    self.metrics.record_sent();
                } else {
                    self.metrics.record_send_failure();
                    tracing::warn!("Send to connection {id} failed, cleaning it up");
                    dead.push(id);
                }
            }
        }

        // The addressed user keeps an offline copy, but only before their
        // first subscription exists. Once they have subscription records,
        // those decide everything; a non-matching event must not sneak into
        // the buffer and past the filters on reconnect.
        if !event.is_system()
            && !subscribed_users.contains(&event.user_id)
            && self.live_connections(&event.user_id, now).is_empty()
        {
            self.buffer_event(&event.user_id, event);
        }

        for id in dead {
            self.remove_connection(&id);
        }

        if attempted > 0 && delivered == 0 {
            Err(WebSocketError::SendFailed)
        } else {
            Ok(delivered)
        }
    }

    fn live_connections(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Vec<(Uuid, UnboundedSender<WsMessage>)> {
        self.connections
            .iter()
            .filter(|entry| {
                let conn = entry.value();
                conn.user_id == user_id
                    && conn.is_authenticated
                    && conn.is_alive(self.config.liveness_timeout, now)
            })
            .map(|entry| (*entry.key(), entry.value().sender.clone()))
            .collect()
    }

    fn buffer_event(&self, user_id: &str, event: &Event) {
        self.offline_buffers
            .entry(user_id.to_string())
            .or_default()
            .push(event.clone(), self.config.buffer_capacity);
        self.metrics.record_buffered();
        tracing::debug!("Buffered event for offline user {user_id}");
    }

    // ---- send primitives -------------------------------------------------

    /// Sends `message` to every connection the predicate accepts. Dead
    /// connections found along the way are cleaned up.
    pub fn broadcast(
        &self,
        message: &WsMessage,
        predicate: impl Fn(&ConnectionData) -> bool,
    ) -> usize {
        let recipients: Vec<(Uuid, UnboundedSender<WsMessage>)> = self
            .connections
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| (*entry.key(), entry.value().sender.clone()))
            .collect();

        let mut sent = 0usize;
        let mut dead: Vec<Uuid> = Vec::new();
        for (id, sender) in recipients {
            if sender.send(message.clone()).is_ok() {
                sent += 1;
                self.metrics.record_sent();
            } else {
                self.metrics.record_send_failure();
                dead.push(id);
            }
        }
        for id in dead {
            tracing::warn!("Got an unexpected closed connection {id}");
            self.remove_connection(&id);
        }

        sent
    }

    /// Sends to the user's live authenticated connections. Returns how many
    /// received it.
    pub fn send_to_user(&self, user_id: &str, message: &WsMessage) -> usize {
        let now = Utc::now();
        self.broadcast(message, |conn| {
            conn.user_id == user_id
                && conn.is_authenticated
                && conn.is_alive(self.config.liveness_timeout, now)
        })
    }

    pub fn send_to_connection(&self, id: &Uuid, message: &WsMessage) -> Result<(), WebSocketError> {
        let sender = self
            .connections
            .get(id)
            .map(|conn| conn.sender.clone())
            .ok_or(WebSocketError::ConnectionNotFound)?;

        if sender.send(message.clone()).is_err() {
            self.metrics.record_send_failure();
            self.remove_connection(id);
            return Err(WebSocketError::SendFailed);
        }

        self.metrics.record_sent();
        Ok(())
    }

    pub fn record_pong(&self, id: &Uuid) {
        if let Some(mut conn) = self.connections.get_mut(id) {
            conn.last_ping = Utc::now();
        }
    }

    // ---- maintenance -----------------------------------------------------

    async fn run_heartbeat(&self) {
        loop {
            tokio::select! {
                _ = time::sleep(self.config.heartbeat_interval) => {}
                _ = self.shutdown_notify.notified() => {}
            }
            if self.shutting_down.load(Ordering::SeqCst) {
                break;
            }

            let sent = self.broadcast(&WsMessage::ping(), |conn| conn.is_authenticated);
            tracing::trace!("Heartbeat pinged {sent} connections");
        }
    }

    async fn run_reaper(&self) {
        loop {
            tokio::select! {
                _ = time::sleep(self.config.reap_interval) => {}
                _ = self.shutdown_notify.notified() => {}
            }
            if self.shutting_down.load(Ordering::SeqCst) {
                break;
            }

            self.reap_stale(Utc::now());
        }
    }

    async fn run_buffer_cleaner(&self) {
        loop {
            tokio::select! {
                _ = time::sleep(self.config.buffer_clean_interval) => {}
                _ = self.shutdown_notify.notified() => {}
            }
            if self.shutting_down.load(Ordering::SeqCst) {
                break;
            }

            self.clean_buffers(Utc::now());
        }
    }

    /// Removes connections whose last ping is older than the reap timeout,
    /// and subscriptions idle past the stale threshold.
    pub fn reap_stale(&self, now: DateTime<Utc>) {
        let stale: Vec<Uuid> = self
            .connections
            .iter()
            .filter(|entry| !entry.value().is_alive(self.config.reap_timeout, now))
            .map(|entry| *entry.key())
            .collect();
        for id in &stale {
            tracing::info!("Reaping stale connection {id}");
            self.connections.remove(id);
        }

        let before = self.subscriptions.len();
        self.subscriptions
            .retain(|_, sub| !sub.is_stale(self.config.stale_subscription_threshold, now));
        let reaped = before.saturating_sub(self.subscriptions.len());
        if reaped > 0 {
            tracing::debug!("Reaped {reaped} stale subscriptions");
        }
    }

    /// Drops aged buffer entries and empty buffers.
    pub fn clean_buffers(&self, now: DateTime<Utc>) {
        self.offline_buffers.retain(|_, buffer| {
            buffer.prune(self.config.buffer_ttl, now);
            !buffer.is_empty()
        });
    }

    // ---- introspection ---------------------------------------------------

    pub fn session_count(&self) -> usize {
        self.connections.len()
    }

    pub fn buffered_event_count(&self, user_id: &str) -> usize {
        self.offline_buffers
            .get(user_id)
            .map(|buffer| buffer.len())
            .unwrap_or(0)
    }

    pub fn metrics(&self) -> HubMetricsSnapshot {
        let authenticated = self
            .connections
            .iter()
            .filter(|entry| entry.value().is_authenticated)
            .count();
        let buffered_events: usize = self
            .offline_buffers
            .iter()
            .map(|entry| entry.value().len())
            .sum();

        self.metrics.snapshot(
            self.connections.len(),
            authenticated,
            self.subscriptions.len(),
            self.offline_buffers.len(),
            buffered_events,
        )
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }
}
