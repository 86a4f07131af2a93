use std::str::FromStr;

use actix_web::{HttpRequest, HttpResponse, get, post, web};
use actix_ws::AggregatedMessage;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    AppState,
    errors::{RemitError, websockets::WebSocketError},
    models::{
        responses::ApiResponse,
        websockets::{GatewayTokenResponse, SessionCountResponse, WsMessage, WsMessageType},
    },
    websockets::{handler, metrics::HubMetricsSnapshot, utils},
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub user_id: String,
}

/// Hub status and metrics snapshot.
#[utoipa::path(
    get,
    path = "/api/realtime/websocket",
    responses(
        (status = 200, description = "Connection hub status", body = ApiResponse<HubMetricsSnapshot>),
    )
)]
#[get("/websocket")]
pub async fn websocket_status(state: web::Data<AppState>) -> Result<HttpResponse, RemitError> {
    Ok(HttpResponse::Ok().json(ApiResponse {
        data: Some(state.hub.metrics()),
        ..Default::default()
    }))
}

/// Count of currently tracked connections.
#[utoipa::path(
    get,
    path = "/api/realtime/ws/session/count",
    responses(
        (status = 200, description = "Total connected websockets", body = ApiResponse<SessionCountResponse>),
    )
)]
#[get("/ws/session/count")]
pub async fn ws_session_get_count(state: web::Data<AppState>) -> Result<HttpResponse, RemitError> {
    Ok(HttpResponse::Ok().json(ApiResponse {
        data: Some(SessionCountResponse {
            count: state.hub.session_count(),
        }),
        ..Default::default()
    }))
}

/// Issue a single-use gateway token for the given user. Credential checks
/// happen upstream of this adapter; the token just binds the upcoming
/// connection to an identity.
#[utoipa::path(
    post,
    path = "/api/realtime/ws/start",
    request_body = StartSessionRequest,
    responses(
        (status = 200, description = "Gateway URL and token", body = ApiResponse<GatewayTokenResponse>),
    )
)]
#[post("/ws/start")]
pub async fn start_session(
    state: web::Data<AppState>,
    body: web::Json<StartSessionRequest>,
) -> Result<HttpResponse, RemitError> {
    let body = body.into_inner();
    if body.user_id.trim().is_empty() {
        return Err(WebSocketError::InvalidUserId.into());
    }

    let token = state.hub.obtain_token(body.user_id, Value::Null);
    let url = utils::make_gateway_url(token)?;
    let expires = state.hub.config().token_ttl.as_secs();

    Ok(HttpResponse::Ok().json(ApiResponse {
        data: Some(GatewayTokenResponse { url, token, expires }),
        ..Default::default()
    }))
}

#[get("/ws/gateway/{token}")]
#[tracing::instrument(name = "ws_gateway_route", level = "info", fields(token = *token), skip_all)]
pub async fn gateway(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<AppState>,
    token: web::Path<String>,
) -> Result<HttpResponse, actix_web::Error> {
    let token = Uuid::from_str(&token.into_inner())
        .map_err(|_| RemitError::WebSocket(WebSocketError::TokenNotFound))?;

    let hub = state.hub.clone();
    let user_id = hub
        .token_user(&token)
        .ok_or(RemitError::WebSocket(WebSocketError::TokenNotFound))?;

    let (response, mut session, stream) = actix_ws::handle(&req, body)?;
    let mut stream = stream
        .max_frame_size(64 * 1024)
        .aggregate_continuations()
        .max_continuation_size(2 * 1024 * 1024);

    let connection_id = req
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = hub.add_connection(connection_id, user_id, Value::Null, tx);

    actix_web::rt::spawn(async move {
        // Connections start unauthenticated; the client finishes the
        // handshake with an in-band auth frame carrying its token.
        let hello = WsMessage::new(
            WsMessageType::Auth,
            json!({
                "ok": true,
                "authenticated": false,
                "message": "authenticate to begin receiving events",
            }),
        );
        if let Ok(raw) = serde_json::to_string(&hello) {
            let _ = session.text(raw).await;
        }

        loop {
            tokio::select! {
                frame = rx.recv() => {
                    let Some(frame) = frame else { break };
                    let Ok(raw) = serde_json::to_string(&frame) else { continue };
                    if session.text(raw).await.is_err() {
                        tracing::debug!("Outbound send failed, closing session");
                        break;
                    }
                }

                msg = stream.next() => {
                    match msg {
                        Some(Ok(AggregatedMessage::Ping(bytes))) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }

                        Some(Ok(AggregatedMessage::Pong(_))) => hub.record_pong(&id),

                        Some(Ok(AggregatedMessage::Text(text))) => {
                            let reply = if text.chars().count() > 512 {
                                tracing::info!("Inbound frame over the 512 character cap");
                                Some(WsMessage::error(
                                    "message_too_long",
                                    "Message larger than 512 characters",
                                ))
                            } else {
                                handler::process_incoming(&hub, id, &text)
                            };

                            if let Some(reply) = reply
                                && let Ok(raw) = serde_json::to_string(&reply)
                                && session.text(raw).await.is_err()
                            {
                                break;
                            }
                        }

                        Some(Ok(AggregatedMessage::Close(reason))) => {
                            let _ = session.close(reason).await;
                            tracing::info!("Got close, cleaning up");
                            break;
                        }

                        Some(Ok(_)) => (), // binary frames are ignored

                        Some(Err(err)) => {
                            tracing::debug!("Websocket protocol error: {err}");
                            break;
                        }

                        None => break,
                    }
                }
            }
        }

        hub.remove_connection(&id);
    });

    Ok(response)
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(websocket_status)
        .service(ws_session_get_count)
        .service(start_session)
        .service(gateway);
}
