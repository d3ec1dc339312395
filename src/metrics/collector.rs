use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use tokio::time::Instant;
use uuid::Uuid;

use super::percentiles::PercentileSet;
use super::report::{per_second, CumulativeFigures, IntervalFigures, MetricsReport, ReportKind};
use super::Sample;

// ─── Configuration ───────────────────────────────────────────────

/// HdrHistogram range: 1 μs → 60 s, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// Interval window plus since-start totals.
///
/// `snapshot()` reduces the window into a [`MetricsReport`] and empties it;
/// the cumulative side only ever grows.
pub struct Aggregator {
    run_id: Uuid,
    window: Window,
    totals: Totals,
    started: Instant,
}

/// Mutable state for the interval currently being accumulated.
#[derive(Debug)]
struct Window {
    latencies: Vec<f64>,
    attempted: u64,
    errors: u64,
    retries: u64,
    started: Instant,
    started_at: DateTime<Utc>,
}

struct Totals {
    attempted: u64,
    committed: u64,
    errors: u64,
    retries: u64,
    latency_us: Histogram<u64>,
}

// ─── Window impl ─────────────────────────────────────────────────

impl Window {
    fn new(started: Instant, started_at: DateTime<Utc>) -> Self {
        Self {
            latencies: Vec::with_capacity(1024),
            attempted: 0,
            errors: 0,
            retries: 0,
            started,
            started_at,
        }
    }
}

// ─── Aggregator impl ─────────────────────────────────────────────

impl Aggregator {
    pub fn new(run_id: Uuid, now: Instant) -> Self {
        Self {
            run_id,
            window: Window::new(now, Utc::now()),
            totals: Totals {
                attempted: 0,
                committed: 0,
                errors: 0,
                retries: 0,
                latency_us: Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
                    .expect("histogram creation"),
            },
            started: now,
        }
    }

    /// Append one outcome. Failures count as attempted and as errors but
    /// add no latency sample.
    pub fn record(&mut self, sample: Sample) {
        self.window.attempted += 1;
        self.totals.attempted += 1;

        match sample.latency_ms() {
            Some(ms) => {
                let ms = ms.max(0.0);
                self.window.latencies.push(ms);
                self.totals.committed += 1;
                let us = (ms * 1000.0).round() as u64;
                self.totals.latency_us.saturating_record(us.max(HIST_LOW));
            }
            None => {
                self.window.errors += 1;
                self.totals.errors += 1;
            }
        }
    }

    /// Transient conflicts absorbed by the executor. Not errors.
    pub fn record_retries(&mut self, retries: u32) {
        self.window.retries += u64::from(retries);
        self.totals.retries += u64::from(retries);
    }

    /// Reduce the current window into a report and start a fresh one at `now`.
    pub fn snapshot(&mut self, kind: ReportKind, now: Instant) -> MetricsReport {
        // one wall-clock reading closes this window and opens the next
        let wall = Utc::now();
        let window = std::mem::replace(&mut self.window, Window::new(now, wall));
        self.report_from(window, kind, now, wall)
    }

    /// Attempts recorded in the open window.
    pub fn window_attempted(&self) -> u64 {
        self.window.attempted
    }

    fn report_from(
        &self,
        mut window: Window,
        kind: ReportKind,
        now: Instant,
        at: DateTime<Utc>,
    ) -> MetricsReport {
        let window_secs = now.saturating_duration_since(window.started).as_secs_f64();
        let elapsed_secs = now.saturating_duration_since(self.started).as_secs_f64();

        window.latencies.sort_by(f64::total_cmp);
        let committed = window.latencies.len() as u64;

        MetricsReport {
            run_id: self.run_id,
            kind,
            at,
            interval: IntervalFigures {
                started_at: window.started_at,
                window_secs,
                attempted: window.attempted,
                committed,
                errors: window.errors,
                retries: window.retries,
                tps: per_second(committed, window_secs),
                attempt_rate: per_second(window.attempted, window_secs),
                latency: PercentileSet::from_sorted(&window.latencies),
            },
            cumulative: CumulativeFigures {
                elapsed_secs,
                attempted: self.totals.attempted,
                committed: self.totals.committed,
                errors: self.totals.errors,
                retries: self.totals.retries,
                tps: per_second(self.totals.committed, elapsed_secs),
                latency: PercentileSet::from_histogram(&self.totals.latency_us),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn aggregator() -> (Aggregator, Instant) {
        let t0 = Instant::now();
        (Aggregator::new(Uuid::nil(), t0), t0)
    }

    #[test]
    fn failures_count_but_carry_no_latency() {
        let (mut agg, t0) = aggregator();
        for ms in [5.0, 1.0, 3.0] {
            agg.record(Sample::Committed(ms));
        }
        agg.record(Sample::Failed);
        agg.record(Sample::Failed);

        let report = agg.snapshot(ReportKind::Interval, t0 + Duration::from_secs(1));
        let i = &report.interval;
        assert_eq!(i.attempted, 5);
        assert_eq!(i.errors, 2);
        assert_eq!(i.committed, 3);
        assert_eq!(i.latency.count, 3);
        assert_eq!(i.latency.min, 1.0);
        assert_eq!(i.latency.max, 5.0);
        assert_eq!(i.latency.avg, 3.0);
        assert_eq!(i.tps, 3.0);
        assert_eq!(i.attempt_rate, 5.0);
    }

    #[test]
    fn ten_sample_scenario_uses_floor_index() {
        let (mut agg, t0) = aggregator();
        for ms in [100.0, 90.0, 80.0, 70.0, 60.0, 50.0, 40.0, 30.0, 20.0, 10.0] {
            agg.record(Sample::Committed(ms));
        }
        let report = agg.snapshot(ReportKind::Interval, t0 + Duration::from_secs(10));
        assert_eq!(report.interval.latency.p50, 60.0);
        assert_eq!(report.interval.latency.p95, 100.0);
        assert_eq!(report.interval.latency.p99, 100.0);
    }

    #[test]
    fn empty_window_degrades_to_zero() {
        let (mut agg, t0) = aggregator();
        let report = agg.snapshot(ReportKind::Final, t0);
        assert_eq!(report.interval.attempted, 0);
        assert_eq!(report.interval.tps, 0.0);
        assert_eq!(report.interval.latency, PercentileSet::empty());
        assert_eq!(report.cumulative.tps, 0.0);
    }

    #[test]
    fn all_failures_report_zero_throughput() {
        let (mut agg, t0) = aggregator();
        agg.record(Sample::Failed);
        agg.record(Sample::Failed);
        let report = agg.snapshot(ReportKind::Interval, t0 + Duration::from_secs(2));
        assert_eq!(report.interval.attempted, 2);
        assert_eq!(report.interval.errors, 2);
        assert_eq!(report.interval.tps, 0.0);
        assert_eq!(report.interval.attempt_rate, 1.0);
        assert_eq!(report.interval.latency.p99, 0.0);
    }

    #[test]
    fn snapshot_resets_window_but_not_totals() {
        let (mut agg, t0) = aggregator();
        agg.record(Sample::Committed(2.0));
        agg.record(Sample::Failed);
        agg.record_retries(4);

        let first = agg.snapshot(ReportKind::Interval, t0 + Duration::from_secs(10));
        assert_eq!(agg.window_attempted(), 0);
        assert_eq!(first.interval.retries, 4);

        agg.record(Sample::Committed(3.0));
        let second = agg.snapshot(ReportKind::Interval, t0 + Duration::from_secs(20));

        assert_eq!(second.interval.attempted, 1);
        assert_eq!(second.interval.errors, 0);
        assert_eq!(second.interval.retries, 0);
        assert_eq!(second.interval.window_secs, 10.0);
        assert_eq!(second.cumulative.attempted, 3);
        assert_eq!(second.cumulative.errors, 1);
        assert_eq!(second.cumulative.retries, 4);
        assert_eq!(second.cumulative.elapsed_secs, 20.0);
        assert_eq!(second.cumulative.tps, 0.1);
        assert!(second.cumulative.attempted >= first.cumulative.attempted);
    }

    #[test]
    fn each_window_carries_its_own_wall_clock_start() {
        let (mut agg, t0) = aggregator();
        let first = agg.snapshot(ReportKind::Interval, t0 + Duration::from_secs(1));
        let second = agg.snapshot(ReportKind::Interval, t0 + Duration::from_secs(2));
        assert!(first.interval.started_at <= first.at);
        assert_eq!(first.at, second.interval.started_at);
        assert!(second.interval.started_at <= second.at);
    }

    #[test]
    fn window_never_holds_more_samples_than_attempts() {
        let (mut agg, _) = aggregator();
        for i in 0..50 {
            agg.record(if i % 3 == 0 { Sample::Failed } else { Sample::Committed(1.0) });
            assert!(agg.window.latencies.len() as u64 <= agg.window.attempted);
        }
        assert_eq!(agg.totals.attempted, 50);
        assert_eq!(agg.totals.errors, 17);
        assert_eq!(agg.totals.committed, 33);
    }

    #[test]
    fn cumulative_latency_comes_from_histogram() {
        let (mut agg, t0) = aggregator();
        agg.record(Sample::Committed(4.0));
        agg.snapshot(ReportKind::Interval, t0 + Duration::from_secs(1));
        agg.record(Sample::Committed(8.0));
        let report = agg.snapshot(ReportKind::Final, t0 + Duration::from_secs(2));
        assert_eq!(report.cumulative.latency.count, 2);
        assert!((report.cumulative.latency.max - 8.0).abs() < 0.01);
        assert_eq!(report.interval.latency.count, 1);
    }
}
