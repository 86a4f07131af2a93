pub mod bus;
pub mod config;
pub mod errors;
pub mod models;
pub mod queue;
pub mod routes;
pub mod websockets;

use bus::EventBus;
use queue::TransactionQueue;
use websockets::ConnectionHub;

/// Shared handles to the three realtime components. Everything inside is
/// cheaply cloneable (Arc-backed), so this can live in `web::Data` directly.
pub struct AppState {
    pub queue: TransactionQueue,
    pub bus: EventBus,
    pub hub: ConnectionHub,
}
