//! # MediNotify Gateway
//! HTTP surface over the notification service.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
