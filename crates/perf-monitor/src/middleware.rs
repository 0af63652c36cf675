//! axum middleware that feeds every request through the monitor.

use crate::monitor::{PerformanceMonitor, attach_headers};
use crate::types::{AdditionalMetrics, RequestInfo, ResponseInfo};
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use futures::FutureExt;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::Instant;

/// Instrument a request.
///
/// Install with `axum::middleware::from_fn_with_state(monitor, track_performance)`.
/// A panicking handler is recorded as a 500 before the panic continues.
pub async fn track_performance(
    State(monitor): State<Arc<PerformanceMonitor>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let info = RequestInfo::from_http(request.method(), request.uri(), request.headers(), peer);

    let request_id = monitor.start_request(info);
    let started = Instant::now();

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(mut response) => {
            monitor.end_request(
                &request_id,
                ResponseInfo::from_http(&response),
                AdditionalMetrics::default(),
            );
            attach_headers(&mut response, &request_id, started.elapsed());
            response
        }
        Err(panic) => {
            monitor.end_request(
                &request_id,
                ResponseInfo::new(500),
                AdditionalMetrics::error("handler panicked"),
            );
            std::panic::resume_unwind(panic)
        }
    }
}
