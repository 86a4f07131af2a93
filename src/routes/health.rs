use actix_web::{HttpResponse, get, web};

use crate::{
    AppState,
    errors::RemitError,
    models::{health::HealthResponse, responses::ApiResponse},
};

/// Composite health across the queue, the bus, and the hub.
#[utoipa::path(
    get,
    path = "/api/realtime/health",
    responses(
        (status = 200, description = "Composite system health", body = ApiResponse<HealthResponse>),
    )
)]
#[get("/health")]
pub async fn health_get(state: web::Data<AppState>) -> Result<HttpResponse, RemitError> {
    let response = HealthResponse::from_snapshots(
        state.queue.metrics(),
        state.bus.metrics(),
        state.hub.metrics(),
    );

    Ok(HttpResponse::Ok().json(ApiResponse {
        data: Some(response),
        ..Default::default()
    }))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(health_get);
}
