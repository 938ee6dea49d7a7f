//! Prometheus metrics for the book club bot.
//!
//! Exposes:
//! - `book_club_polls_total` (counter by poll kind and outcome)
//! - `book_club_suggestions_total` (counter by result)
//! - `book_club_platform_errors_total` (counter by operation)
//! - `book_club_active_cycles` (gauge)
//! - process metrics via `process` collector

use std::convert::Infallible;
use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_int_counter_vec, register_int_gauge, Encoder, IntCounterVec,
    IntGauge, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static POLLS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "book_club_polls_total",
        "Closed polls by kind and outcome",
        &["kind", "outcome"]
    )
    .expect("failed to register poll counter")
});

static SUGGESTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "book_club_suggestions_total",
        "Book suggestions by result",
        &["result"]
    )
    .expect("failed to register suggestion counter")
});

static PLATFORM_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "book_club_platform_errors_total",
        "Failed Telegram API calls by operation",
        &["operation"]
    )
    .expect("failed to register platform error counter")
});

static ACTIVE_CYCLES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "book_club_active_cycles",
        "Chats with a running book club cycle"
    )
    .expect("failed to register active cycles gauge")
});

/// Ensure collectors are registered.
fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&POLLS_TOTAL);
    Lazy::force(&SUGGESTIONS_TOTAL);
    Lazy::force(&PLATFORM_ERRORS_TOTAL);
    Lazy::force(&ACTIVE_CYCLES);
}

/// Record a closed poll (`outcome`: winner, tie, no_votes).
pub fn record_poll(kind: &'static str, outcome: &'static str) {
    POLLS_TOTAL.with_label_values(&[kind, outcome]).inc();
}

/// Record a suggestion (`result`: accepted or a rejection reason).
pub fn record_suggestion(result: &'static str) {
    SUGGESTIONS_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_platform_error(operation: &'static str) {
    PLATFORM_ERRORS_TOTAL.with_label_values(&[operation]).inc();
}

pub fn set_active_cycles(count: usize) {
    ACTIVE_CYCLES.set(count as i64);
}

async fn metrics_response() -> Result<Response<Full<Bytes>>, Infallible> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        let mut response = Response::new(Full::from("encode error"));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        return Ok(response);
    }

    let mut response = Response::new(Full::from(buffer));
    if let Ok(value) = encoder.format_type().parse::<hyper::header::HeaderValue>() {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, value);
    }
    Ok(response)
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => metrics_response().await,
        _ => {
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::NOT_FOUND;
            Ok(response)
        }
    }
}

async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Prometheus metrics endpoint started");

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service_fn(handle_request);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Spawn the metrics HTTP endpoint on the given address.
pub fn spawn_metrics_server(addr: SocketAddr) {
    init_collectors();
    tokio::spawn(async move {
        if let Err(err) = serve(addr).await {
            error!(%addr, "Metrics server failed: {}", err);
        }
    });
}
