use actix_web::{HttpResponse, get, post, web};

use crate::{
    AppState,
    errors::{RemitError, queue::QueueError},
    models::{responses::ApiResponse, transactions::QueuedTransaction},
    queue::metrics::QueueMetricsSnapshot,
};

/// Queue status and metrics snapshot.
#[utoipa::path(
    get,
    path = "/api/realtime/queue",
    responses(
        (status = 200, description = "Queue status and metrics", body = ApiResponse<QueueMetricsSnapshot>),
    )
)]
#[get("/queue")]
pub async fn queue_status(state: web::Data<AppState>) -> Result<HttpResponse, RemitError> {
    Ok(HttpResponse::Ok().json(ApiResponse {
        data: Some(state.queue.metrics()),
        ..Default::default()
    }))
}

/// Pause the queue dispatcher; in-flight work finishes naturally.
#[utoipa::path(
    post,
    path = "/api/realtime/queue/pause",
    responses(
        (status = 200, description = "Dispatcher paused", body = ApiResponse<QueueMetricsSnapshot>),
    )
)]
#[post("/queue/pause")]
pub async fn queue_pause(state: web::Data<AppState>) -> Result<HttpResponse, RemitError> {
    state.queue.pause();

    Ok(HttpResponse::Ok().json(ApiResponse {
        data: Some(state.queue.metrics()),
        message: Some("Queue paused".to_string()),
        ..Default::default()
    }))
}

/// Resume the queue dispatcher.
#[utoipa::path(
    post,
    path = "/api/realtime/queue/resume",
    responses(
        (status = 200, description = "Dispatcher resumed", body = ApiResponse<QueueMetricsSnapshot>),
    )
)]
#[post("/queue/resume")]
pub async fn queue_resume(state: web::Data<AppState>) -> Result<HttpResponse, RemitError> {
    state.queue.resume();

    Ok(HttpResponse::Ok().json(ApiResponse {
        data: Some(state.queue.metrics()),
        message: Some("Queue resumed".to_string()),
        ..Default::default()
    }))
}

/// Look up one transaction across all partitions.
#[utoipa::path(
    get,
    path = "/api/realtime/queue/{id}",
    responses(
        (status = 200, description = "Transaction snapshot", body = ApiResponse<QueuedTransaction>),
        (status = 404, description = "No such transaction"),
    )
)]
#[get("/queue/{id}")]
pub async fn queue_get(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, RemitError> {
    let id = id.into_inner();

    let transaction = state
        .queue
        .get(&id)
        .ok_or(QueueError::NotFound(id))?;

    Ok(HttpResponse::Ok().json(ApiResponse {
        data: Some(transaction),
        ..Default::default()
    }))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    // pause/resume registered ahead of the {id} matcher
    cfg.service(queue_status)
        .service(queue_pause)
        .service(queue_resume)
        .service(queue_get);
}
