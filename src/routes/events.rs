use std::str::FromStr;

use actix_web::{HttpResponse, get, post, web};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::{
    AppState,
    bus::history::EventHistoryQuery,
    errors::RemitError,
    models::{
        events::{Event, EventPriority, EventType},
        responses::ApiResponse,
    },
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmitEventRequest {
    pub r#type: EventType,
    pub user_id: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub priority: Option<EventPriority>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AlertRequest {
    pub message: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub affected_users: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    /// Comma-separated event type names.
    pub event_types: Option<String>,
    /// Comma-separated user ids.
    pub user_ids: Option<String>,
    /// Comma-separated priority names.
    pub priorities: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub source: Option<String>,
    /// Comma-separated tags; all must be present on the event.
    pub tags: Option<String>,
    pub limit: Option<usize>,
}

/// Emit a generic event. Unknown types are rejected before they reach the
/// bus.
#[utoipa::path(
    post,
    path = "/api/realtime/events",
    request_body = EmitEventRequest,
    responses(
        (status = 200, description = "The emitted event", body = ApiResponse<Event>),
        (status = 400, description = "Unknown event type"),
    )
)]
#[post("/events")]
pub async fn emit_event(
    state: web::Data<AppState>,
    body: web::Json<EmitEventRequest>,
) -> Result<HttpResponse, RemitError> {
    let body = body.into_inner();

    let event = Event::new(body.r#type, body.user_id, body.data)
        .with_priority(body.priority.unwrap_or(EventPriority::Medium))
        .with_source("api");
    state.bus.emit(event.clone());

    Ok(HttpResponse::Ok().json(ApiResponse {
        data: Some(event),
        ..Default::default()
    }))
}

/// Emit a transaction lifecycle event. 400 unless the type is one of the
/// `transaction_*` lifecycle types.
#[utoipa::path(
    post,
    path = "/api/realtime/events/transaction",
    request_body = EmitEventRequest,
    responses(
        (status = 200, description = "The emitted event", body = ApiResponse<Event>),
        (status = 400, description = "Not a transaction lifecycle type"),
    )
)]
#[post("/events/transaction")]
pub async fn emit_transaction_event(
    state: web::Data<AppState>,
    body: web::Json<EmitEventRequest>,
) -> Result<HttpResponse, RemitError> {
    let body = body.into_inner();

    let event =
        state
            .bus
            .emit_transaction_event(body.r#type, body.user_id, body.data, body.priority)?;

    Ok(HttpResponse::Ok().json(ApiResponse {
        data: Some(event),
        ..Default::default()
    }))
}

/// Emit a system alert, broadcast or targeted.
#[utoipa::path(
    post,
    path = "/api/realtime/events/alert",
    request_body = AlertRequest,
    responses(
        (status = 200, description = "The emitted alert events", body = ApiResponse<Vec<Event>>),
    )
)]
#[post("/events/alert")]
pub async fn emit_alert(
    state: web::Data<AppState>,
    body: web::Json<AlertRequest>,
) -> Result<HttpResponse, RemitError> {
    let body = body.into_inner();

    let events = state.bus.emit_system_alert(
        &body.message,
        body.severity.as_deref().unwrap_or("info"),
        &body.affected_users.unwrap_or_default(),
    );

    Ok(HttpResponse::Ok().json(ApiResponse {
        data: Some(events),
        ..Default::default()
    }))
}

/// Query event history, newest first.
#[utoipa::path(
    get,
    path = "/api/realtime/events/history",
    params(HistoryParams),
    responses(
        (status = 200, description = "Matching events", body = ApiResponse<Vec<Event>>),
        (status = 400, description = "Bad filter value"),
    )
)]
#[get("/events/history")]
pub async fn event_history(
    state: web::Data<AppState>,
    params: web::Query<HistoryParams>,
) -> Result<HttpResponse, RemitError> {
    let params = params.into_inner();
    let query = build_query(params)?;

    let events = state.bus.query(&query);
    Ok(HttpResponse::Ok().json(ApiResponse {
        data: Some(events),
        ..Default::default()
    }))
}

fn build_query(params: HistoryParams) -> Result<EventHistoryQuery, RemitError> {
    let event_types = params
        .event_types
        .map(|raw| {
            raw.split(',')
                .map(|part| EventType::from_str(part.trim()))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    let priorities = params
        .priorities
        .map(|raw| {
            raw.split(',')
                .map(|part| EventPriority::from_str(part.trim()))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    let split_plain = |raw: String| {
        raw.split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
    };

    Ok(EventHistoryQuery {
        event_types,
        user_ids: params.user_ids.map(split_plain),
        priorities,
        start_time: params.start_time,
        end_time: params.end_time,
        source: params.source,
        tags: params.tags.map(split_plain),
        limit: params.limit,
    })
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(emit_event)
        .service(emit_transaction_event)
        .service(emit_alert)
        .service(event_history);
}
