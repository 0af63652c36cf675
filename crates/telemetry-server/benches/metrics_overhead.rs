// Cost of per-request instrumentation: Prometheus recording, the performance
// monitor start/end pair, and a full pass through the router middleware.

use axum::body::Body;
use axum::http::Request;
use common::Environment;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use healthcheck::{HealthCheckConfig, HealthCheckSystem};
use perf_monitor::{AdditionalMetrics, PerformanceConfig, PerformanceMonitor, RequestInfo, ResponseInfo};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use structured_logger::{Logger, LoggerConfig, MemorySink};
use telemetry_server::{AppState, MetricsRegistry, router};
use tower::ServiceExt;

fn quiet_logger() -> Arc<Logger> {
    Arc::new(Logger::with_sinks(
        LoggerConfig::for_environment(Environment::Test),
        vec![Arc::new(MemorySink::new(16))],
    ))
}

fn bench_metrics_recording(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics_recording");
    let registry = MetricsRegistry::new();

    group.bench_function("record_request", |b| {
        b.iter(|| {
            registry.record_request(
                black_box("GET"),
                black_box(200),
                black_box(Duration::from_millis(10)),
            );
        });
    });

    group.bench_function("encode", |b| {
        b.iter(|| black_box(registry.encode()));
    });

    group.finish();
}

fn bench_monitor(c: &mut Criterion) {
    let mut group = c.benchmark_group("performance_monitor");
    let rt = tokio::runtime::Runtime::new().unwrap();

    for sample_rate in [0.0, 0.1, 1.0] {
        let monitor = PerformanceMonitor::new(
            PerformanceConfig {
                sample_rate,
                ..PerformanceConfig::for_environment(Environment::Test)
            },
            quiet_logger(),
        );

        group.bench_with_input(
            BenchmarkId::new("start_end", sample_rate),
            &sample_rate,
            |b, _| {
                b.iter(|| {
                    rt.block_on(async {
                        let id = monitor.start_request(RequestInfo::new("GET", "/api/menu"));
                        black_box(monitor.end_request(
                            &id,
                            ResponseInfo::new(200),
                            AdditionalMetrics::default(),
                        ))
                    })
                });
            },
        );
    }

    group.finish();
}

fn bench_router(c: &mut Criterion) {
    let mut group = c.benchmark_group("router");
    let rt = tokio::runtime::Runtime::new().unwrap();
    let logger = quiet_logger();
    let state = AppState {
        health: Arc::new(HealthCheckSystem::with_checkers(
            HealthCheckConfig::default(),
            Vec::new(),
            logger.clone(),
        )),
        monitor: Arc::new(PerformanceMonitor::new(
            PerformanceConfig::for_environment(Environment::Test),
            logger,
        )),
        metrics: Arc::new(MetricsRegistry::new()),
    };
    let app = router(state);

    group.bench_function("liveness", |b| {
        b.iter(|| {
            rt.block_on(async {
                let request = Request::builder()
                    .uri("/health/live")
                    .body(Body::empty())
                    .unwrap();
                black_box(app.clone().oneshot(request).await)
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_metrics_recording, bench_monitor, bench_router);
criterion_main!(benches);
