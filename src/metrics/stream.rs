use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    Json,
};
use parking_lot::RwLock;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use super::report::MetricsReport;

/// Latest report published by the driver, read by the HTTP handlers.
#[derive(Default)]
pub struct LiveReports {
    latest: RwLock<Option<MetricsReport>>,
}

impl LiveReports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, report: &MetricsReport) {
        *self.latest.write() = Some(report.clone());
    }

    pub fn latest(&self) -> Option<MetricsReport> {
        self.latest.read().clone()
    }
}

// ─── GET /api/metrics ────────────────────────────────────────────
/// Returns the latest report as JSON, or 204 before the first one.

pub async fn get_metrics(State(live): State<Arc<LiveReports>>) -> Response {
    match live.latest() {
        Some(report) => Json(report).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

// ─── GET /api/metrics/stream ─────────────────────────────────────
/// Server-Sent Events endpoint.
/// Pushes the latest `MetricsReport` as JSON every 500 ms once one exists.

pub async fn metrics_stream(
    State(live): State<Arc<LiveReports>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(Duration::from_millis(500));

    let stream = IntervalStream::new(interval).filter_map(move |_| {
        let report = live.latest()?;
        let json = serde_json::to_string(&report).unwrap_or_default();
        Some(Ok(Event::default().event("report").data(json)))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Aggregator, ReportKind, Sample};
    use tokio::time::Instant;
    use uuid::Uuid;

    #[tokio::test]
    async fn endpoint_is_empty_until_first_publish() {
        let live = Arc::new(LiveReports::new());
        let resp = get_metrics(State(live.clone())).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let t0 = Instant::now();
        let mut agg = Aggregator::new(Uuid::nil(), t0);
        agg.record(Sample::Committed(1.5));
        live.publish(&agg.snapshot(ReportKind::Interval, t0));

        let resp = get_metrics(State(live.clone())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(live.latest().unwrap().interval.attempted, 1);
    }
}
