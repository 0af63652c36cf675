//! HTTP endpoints for health, metrics and performance data.

use crate::metrics::MetricsRegistry;
use axum::{
    Json, Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use healthcheck::{HealthCheckSystem, HealthStatus};
use perf_monitor::{PerformanceMonitor, track_performance};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub health: Arc<HealthCheckSystem>,
    pub monitor: Arc<PerformanceMonitor>,
    pub metrics: Arc<MetricsRegistry>,
}

/// Build the router with every route wrapped in request metrics, the
/// performance middleware and an HTTP trace span.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(live_handler))
        .route("/health/last", get(last_report_handler))
        .route("/health/metrics", get(health_metrics_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/performance", get(performance_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(
                    state.metrics.clone(),
                    record_http_metrics,
                ))
                .layer(middleware::from_fn_with_state(
                    state.monitor.clone(),
                    track_performance,
                )),
        )
        .with_state(state)
}

/// HTTP server for the telemetry endpoints
pub struct TelemetryHttpServer {
    state: AppState,
}

impl TelemetryHttpServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Serve on `listener` until `shutdown` resolves, then drain in-flight requests
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(listen_addr = %addr, "Telemetry HTTP server listening");
        }
        let app = router(self.state);
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
    }
}

/// Count every response by method and status class
async fn record_http_metrics(
    State(metrics): State<Arc<MetricsRegistry>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().as_str().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    metrics.record_request(&method, response.status().as_u16(), started.elapsed());
    response
}

/// Run all probes now; 503 when the overall status is critical
async fn health_handler(State(state): State<AppState>) -> Response {
    let report = state.health.run_health_checks().await;
    state.metrics.record_health_report(&report);

    let status = if report.overall_status == HealthStatus::Critical {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(report)).into_response()
}

/// Liveness only; never runs probes
async fn live_handler(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "alive",
        "timestamp": Utc::now(),
        "uptime": state.health.uptime_ms(),
    }))
    .into_response()
}

async fn last_report_handler(State(state): State<AppState>) -> Response {
    match state.health.get_last_report().await {
        Some(report) => Json(report).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no health report yet" })),
        )
            .into_response(),
    }
}

async fn health_metrics_handler(State(state): State<AppState>) -> Response {
    Json(state.health.get_metrics().await).into_response()
}

async fn performance_handler(State(state): State<AppState>) -> Response {
    Json(state.monitor.get_metrics()).into_response()
}

/// Prometheus text exposition, refreshed from the latest health and
/// performance state
async fn metrics_handler(State(state): State<AppState>) -> Response {
    if let Some(report) = state.health.get_last_report().await {
        state.metrics.record_health_report(&report);
    }
    state
        .metrics
        .record_health_metrics(&state.health.get_metrics().await);
    state.metrics.record_performance(&state.monitor.get_metrics());

    match state.metrics.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            buffer,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}
