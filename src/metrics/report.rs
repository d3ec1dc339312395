use std::fmt;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::percentiles::PercentileSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Interval,
    Final,
}

/// Figures for the window that was just closed.
#[derive(Debug, Clone, Serialize)]
pub struct IntervalFigures {
    /// Wall-clock start of the window.
    pub started_at: DateTime<Utc>,
    pub window_secs: f64,
    pub attempted: u64,
    pub committed: u64,
    pub errors: u64,
    pub retries: u64,
    /// Committed transactions per second of window time.
    pub tps: f64,
    /// Attempted transactions per second, failures included.
    pub attempt_rate: f64,
    pub latency: PercentileSet,
}

/// Since-start figures. Never reset during a run.
#[derive(Debug, Clone, Serialize)]
pub struct CumulativeFigures {
    pub elapsed_secs: f64,
    pub attempted: u64,
    pub committed: u64,
    pub errors: u64,
    pub retries: u64,
    pub tps: f64,
    /// Histogram-backed, accurate to three significant figures.
    pub latency: PercentileSet,
}

/// Immutable snapshot shipped to every report sink.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub run_id: Uuid,
    pub kind: ReportKind,
    pub at: DateTime<Utc>,
    pub interval: IntervalFigures,
    pub cumulative: CumulativeFigures,
}

/// Rate helper that never divides by zero.
pub(crate) fn per_second(count: u64, secs: f64) -> f64 {
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

const RULE: &str = "======================================================================";
const THIN: &str = "----------------------------------------------------------------------";

impl fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.kind {
            ReportKind::Interval => "Interval Report",
            ReportKind::Final => "FINAL REPORT",
        };
        let i = &self.interval;
        let c = &self.cumulative;
        let stamp = self.at.with_timezone(&Local).format("%H:%M:%S");

        writeln!(f, "{RULE}")?;
        writeln!(f, "[{stamp}] {label}")?;
        writeln!(f, "{RULE}")?;
        writeln!(
            f,
            "Transactions:    {:6} (interval) | {:8} (total)",
            i.attempted, c.attempted
        )?;
        writeln!(
            f,
            "TPS:             {:6.1} (interval) | {:8.1} (total)",
            i.tps, c.tps
        )?;
        writeln!(
            f,
            "Errors:          {:6} (interval) | {:8} (total)",
            i.errors, c.errors
        )?;
        writeln!(
            f,
            "Retries:         {:6} (interval) | {:8} (total)",
            i.retries, c.retries
        )?;
        writeln!(f, "{THIN}")?;
        writeln!(f, "Latency (ms):    interval | total")?;
        for (name, a, b) in [
            ("p50", i.latency.p50, c.latency.p50),
            ("p95", i.latency.p95, c.latency.p95),
            ("p99", i.latency.p99, c.latency.p99),
            ("avg", i.latency.avg, c.latency.avg),
            ("min", i.latency.min, c.latency.min),
            ("max", i.latency.max, c.latency.max),
        ] {
            writeln!(f, "  {name}:           {a:8.2} | {b:8.2}")?;
        }
        if self.kind == ReportKind::Final {
            writeln!(f, "{THIN}")?;
            writeln!(f, "Total runtime:   {:.1} seconds", c.elapsed_secs)?;
        }
        write!(f, "{RULE}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(kind: ReportKind) -> MetricsReport {
        MetricsReport {
            run_id: Uuid::nil(),
            kind,
            at: Utc::now(),
            interval: IntervalFigures {
                started_at: Utc::now(),
                window_secs: 10.0,
                attempted: 12,
                committed: 10,
                errors: 2,
                retries: 1,
                tps: 1.0,
                attempt_rate: 1.2,
                latency: PercentileSet::from_sorted(&[1.0, 2.0]),
            },
            cumulative: CumulativeFigures {
                elapsed_secs: 42.0,
                attempted: 120,
                committed: 100,
                errors: 20,
                retries: 3,
                tps: 2.4,
                latency: PercentileSet::empty(),
            },
        }
    }

    #[test]
    fn console_rendering_shows_interval_and_total() {
        let text = report(ReportKind::Interval).to_string();
        assert!(text.contains("Interval Report"));
        assert!(text.contains("    12 (interval) |      120 (total)"));
        assert!(!text.contains("Total runtime"));
    }

    #[test]
    fn final_rendering_adds_runtime() {
        let text = report(ReportKind::Final).to_string();
        assert!(text.contains("FINAL REPORT"));
        assert!(text.contains("Total runtime:   42.0 seconds"));
    }

    #[test]
    fn json_uses_snake_case_kind() {
        let json = serde_json::to_value(report(ReportKind::Final)).unwrap();
        assert_eq!(json["kind"], "final");
        assert_eq!(json["interval"]["errors"], 2);
    }

    #[test]
    fn rates_tolerate_zero_time() {
        assert_eq!(per_second(10, 0.0), 0.0);
        assert_eq!(per_second(10, 2.0), 5.0);
    }
}
