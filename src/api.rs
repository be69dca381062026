use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{clients::health::HealthChecker, config::Config, models::health::HealthStatus};

struct ApiState {
    health_checker: HealthChecker,
    started_at: Instant,
}

/// Serves the operational surface of the worker: `/health/live` answers as
/// long as the process runs, `/health` probes the dependencies and reports
/// readiness.
pub async fn run_api_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(ApiState {
        health_checker: HealthChecker::new(config.clone()),
        started_at: Instant::now(),
    });

    let app = Router::new()
        .route("/health", get(readiness))
        .route("/health/live", get(liveness))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "Health check server started");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn liveness() -> impl IntoResponse {
    StatusCode::OK
}

async fn readiness(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let report = state
        .health_checker
        .check_all(state.started_at.elapsed())
        .await;

    let status_code = match report.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(report))
}
