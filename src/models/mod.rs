pub mod events;
pub mod filters;
pub mod health;
pub mod responses;
pub mod subscriptions;
pub mod transactions;
pub mod websockets;
