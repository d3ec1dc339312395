use axum::{
    extract::Request,
    http::{header, HeaderValue},
    middleware::{self as axum_mw, Next},
    response::Response,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

use crate::metrics::stream::{self, LiveReports};

/// Builds the read-only metrics router.
pub fn create_router(live: Arc<LiveReports>) -> Router {
    Router::new()
        .route("/api/metrics", get(stream::get_metrics))
        .route("/api/metrics/stream", get(stream::metrics_stream))
        .with_state(live)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(fresh_metrics))
        .layer(CorsLayer::permissive())
}

/// Live figures are never cacheable. Also stamps handler time in µs
/// (for SSE, time to the first byte).
async fn fresh_metrics(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_owned();
    let start = Instant::now();
    let mut response = next.run(req).await;
    let us = start.elapsed().as_micros() as u64;

    debug!(status = response.status().as_u16(), path = %path, us, "metrics request");

    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert("x-response-time-us", HeaderValue::from(us));
    response
}

/// Binds `addr` and serves the metrics router on a background task.
/// Returns the bound address (useful with port 0) and the task, which the
/// caller aborts when the run is over.
pub async fn spawn(
    addr: SocketAddr,
    live: Arc<LiveReports>,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound = listener.local_addr()?;
    info!(%bound, "metrics endpoint listening");
    println!("Metrics JSON    → http://{bound}/api/metrics");
    println!("Metrics SSE     → http://{bound}/api/metrics/stream");

    let app = create_router(live);
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "metrics endpoint exited");
        }
    });
    Ok((bound, task))
}
