use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::chart::SeriesRow;
use crate::metrics::stream::LiveReports;
use crate::metrics::{Aggregator, MetricsReport, ReportKind};

// ─── Sinks ───────────────────────────────────────────────────────

/// Somewhere a finished report goes. Sinks only observe; they never touch
/// the backend or the aggregator.
pub trait ReportSink {
    fn emit(&mut self, report: &MetricsReport) -> anyhow::Result<()>;
}

/// Human-readable summary on stdout.
pub struct ConsoleSink;

impl ReportSink for ConsoleSink {
    fn emit(&mut self, report: &MetricsReport) -> anyhow::Result<()> {
        println!("\n{report}\n");
        Ok(())
    }
}

/// One `time_elapsed,tps,p95_latency,p99_latency` row per report, the
/// format the `graph` command reads. An existing file is truncated.
pub struct CsvSink {
    writer: csv::Writer<File>,
}

impl CsvSink {
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            writer: csv::Writer::from_path(path)?,
        })
    }
}

impl ReportSink for CsvSink {
    fn emit(&mut self, report: &MetricsReport) -> anyhow::Result<()> {
        self.writer.serialize(SeriesRow::from(report))?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Hands the report to the HTTP endpoint.
pub struct LiveSink(pub Arc<LiveReports>);

impl ReportSink for LiveSink {
    fn emit(&mut self, report: &MetricsReport) -> anyhow::Result<()> {
        self.0.publish(report);
        Ok(())
    }
}

// ─── Reporter ────────────────────────────────────────────────────

/// Decides when an interval is over and fans the report out to its sinks.
pub struct Reporter {
    interval: Duration,
    last_report: Instant,
    sinks: Vec<Box<dyn ReportSink>>,
    emitted: u64,
}

impl Reporter {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_report: now,
            sinks: Vec::new(),
            emitted: 0,
        }
    }

    pub fn with_sink(mut self, sink: impl ReportSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_report) >= self.interval
    }

    /// Snapshot the aggregator (which resets its window) and emit.
    pub fn report(
        &mut self,
        aggregator: &mut Aggregator,
        kind: ReportKind,
        now: Instant,
    ) -> MetricsReport {
        let report = aggregator.snapshot(kind, now);
        self.last_report = now;
        self.emitted += 1;

        info!(
            kind = ?kind,
            attempted = report.interval.attempted,
            errors = report.interval.errors,
            tps = report.interval.tps,
            p99_ms = report.interval.latency.p99,
            "report"
        );

        for sink in &mut self.sinks {
            if let Err(e) = sink.emit(&report) {
                warn!(error = %e, "report sink failed");
            }
        }
        report
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}
