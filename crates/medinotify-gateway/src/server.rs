//! HTTP server implementation using Axum.

use axum::{
    Router,
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use medinotify_core::config::GatewayConfig;
use medinotify_scheduler::NotificationService;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub gateway_config: GatewayConfig,
    pub service: Arc<NotificationService>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(gateway_config: GatewayConfig, service: Arc<NotificationService>) -> Self {
        Self {
            gateway_config,
            service,
            start_time: Instant::now(),
        }
    }
}

fn cors_layer() -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    // Example: MEDINOTIFY_CORS_ORIGINS=https://portal.hospital.org,https://staff.hospital.org
    if let Ok(origins_str) = std::env::var("MEDINOTIFY_CORS_ORIGINS") {
        let origins: Vec<_> = origins_str
            .split(',')
            .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
            .collect();
        cors.allow_origin(origins)
    } else {
        cors.allow_origin(Any)
    }
}

pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);
    Router::new()
        .route("/health", get(super::routes::health_check))
        .route("/api/v1/create-notification", post(super::routes::create_notification))
        .route("/api/v1/list-notifications", get(super::routes::list_notifications))
        .route(
            "/api/v1/notification/{id}",
            get(super::routes::get_notification).delete(super::routes::cancel_notification),
        )
        .route(
            "/api/v1/notification/{id}/reenqueue",
            post(super::routes::reenqueue_notification),
        )
        .route("/api/v1/queue/jobs", get(super::routes::list_jobs))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer()),
        )
        .with_state(shared)
}

/// Start the HTTP server; returns once `shutdown` resolves and in-flight requests finish.
pub async fn start<F>(state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", state.gateway_config.host, state.gateway_config.port);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 Gateway server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("🌐 Gateway server stopped");
    Ok(())
}
