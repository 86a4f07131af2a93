pub mod events;
pub mod health;
pub mod not_found;
pub mod queue;
pub mod ws;

use actix_web::{HttpResponse, get, middleware, web};

use crate::errors::RemitError;

#[get("/")]
pub async fn index_get() -> Result<HttpResponse, RemitError> {
    Ok(HttpResponse::Ok().body("remit realtime core"))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    let json_cfg = web::JsonConfig::default()
        .error_handler(|err, _req| RemitError::JsonPayload(err).into());

    let path_cfg =
        web::PathConfig::default().error_handler(|err, _req| RemitError::Path(err).into());

    cfg.service(
        web::scope("/api/realtime")
            .wrap(middleware::NormalizePath::trim())
            .app_data(json_cfg)
            .app_data(path_cfg)
            .configure(health::config)
            .configure(events::config)
            .configure(queue::config)
            .configure(ws::config),
    );
    cfg.service(web::scope("").service(index_get));
}
