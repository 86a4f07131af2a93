use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use std::env;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use remit::{
    AppState,
    bus::EventBus,
    config::{BusConfig, HubConfig, QueueConfig},
    queue::TransactionQueue,
    routes,
    websockets::ConnectionHub,
};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();

    let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind_addr = format!("0.0.0.0:{port}");

    let hub = ConnectionHub::new(HubConfig::default());
    hub.start();

    let bus = EventBus::new(BusConfig::default(), hub.clone());
    bus.start();

    let queue = TransactionQueue::new(QueueConfig::default(), bus.clone())?;
    queue.start();

    let state = web::Data::new(AppState {
        queue: queue.clone(),
        bus: bus.clone(),
        hub: hub.clone(),
    });

    #[derive(OpenApi)]
    #[openapi(
        paths(
            routes::health::health_get,
            routes::events::emit_event,
            routes::events::emit_transaction_event,
            routes::events::emit_alert,
            routes::events::event_history,
            routes::queue::queue_status,
            routes::queue::queue_pause,
            routes::queue::queue_resume,
            routes::queue::queue_get,
            routes::ws::websocket_status,
            routes::ws::ws_session_get_count,
            routes::ws::start_session,
        ),
        components(schemas(
            remit::models::events::Event,
            remit::models::events::EventType,
            remit::models::events::EventPriority,
            remit::models::events::EventMetadata,
            remit::models::filters::SubscriptionFilter,
            remit::models::filters::FilterOperator,
            remit::models::transactions::QueuedTransaction,
            remit::models::transactions::TransactionPriority,
            remit::models::transactions::TransactionStatus,
            remit::models::health::HealthResponse,
            remit::models::health::SystemGrade,
            remit::models::responses::Empty,
            remit::models::responses::ApiErrorBody,
            remit::models::websockets::WsMessage,
            remit::models::websockets::WsMessageType,
            remit::models::websockets::SessionCountResponse,
            remit::models::websockets::GatewayTokenResponse,
            remit::queue::metrics::QueueMetricsSnapshot,
            remit::bus::metrics::BusMetricsSnapshot,
            remit::bus::metrics::TypeMetricsSnapshot,
            remit::websockets::metrics::HubMetricsSnapshot,
            remit::routes::events::EmitEventRequest,
            remit::routes::events::AlertRequest,
            remit::routes::ws::StartSessionRequest,
        )),
    )]
    struct ApiDocs;

    let http_server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(["GET", "POST", "PUT"])
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::new(
                r#"%a "%r" %s %b "%{Referer}i" "%{User-Agent}i" %T"#,
            ))
            .wrap(cors)
            .service(web::redirect("/swagger-ui", "/swagger-ui/"))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDocs::openapi()),
            )
            .configure(routes::config)
            .default_service(web::route().to(routes::not_found::not_found))
    })
    .bind(&bind_addr)?
    .run();

    tracing::info!("Realtime core listening on {bind_addr}");
    http_server.await?;

    tracing::info!("Server stopped, draining in-flight work");
    queue.shutdown().await;
    bus.shutdown();
    hub.shutdown();

    Ok(())
}
