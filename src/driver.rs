use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::LoadConfig;
use crate::db::Backend;
use crate::executor::{Executor, TransactionRecord};
use crate::metrics::{Aggregator, MetricsReport, ReportKind, Sample};
use crate::reporter::{ReportSink, Reporter};

/// Why the loop left the running state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Deadline,
    Interrupted,
    ConnectionLost(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Running,
    Stopped(StopReason),
}

/// What a finished run hands back to the caller.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stop: StopReason,
    pub reports: u64,
    pub final_report: MetricsReport,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        !matches!(self.stop, StopReason::ConnectionLost(_))
    }
}

/// Executor → Aggregator → Reporter, one transaction at a time.
///
/// Owns the single backend connection for the whole run and closes it on
/// every exit path. The interrupt flag is read between iterations only, so
/// an in-flight transaction always finishes first.
pub struct Driver<B: Backend> {
    backend: B,
    executor: Executor,
    aggregator: Aggregator,
    reporter: Reporter,
    deadline: Option<Instant>,
    running: Arc<AtomicBool>,
    run_id: Uuid,
}

impl<B: Backend> Driver<B> {
    pub fn new(backend: B, config: &LoadConfig, running: Arc<AtomicBool>) -> Self {
        let run_id = Uuid::new_v4();
        let now = Instant::now();
        Self {
            backend,
            executor: Executor::new(
                run_id,
                config.key_space,
                config.read_limit,
                config.keys,
                config.seed,
            ),
            aggregator: Aggregator::new(run_id, now),
            reporter: Reporter::new(config.report_interval, now),
            deadline: config.duration.map(|d| now + d),
            running,
            run_id,
        }
    }

    pub fn with_sink(mut self, sink: impl ReportSink + 'static) -> Self {
        self.reporter = self.reporter.with_sink(sink);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn check_stop(&self, now: Instant) -> State {
        if !self.running.load(Ordering::SeqCst) {
            return State::Stopped(StopReason::Interrupted);
        }
        match self.deadline {
            Some(deadline) if now >= deadline => State::Stopped(StopReason::Deadline),
            _ => State::Running,
        }
    }

    pub async fn run(mut self) -> RunSummary {
        info!(run_id = %self.run_id, "load driver started");
        let mut seq = 0u64;
        // A record that hit a transient conflict waits here for its retry.
        let mut pending: Option<(TransactionRecord, u32)> = None;

        let stop = loop {
            if let State::Stopped(reason) = self.check_stop(Instant::now()) {
                if let Some((record, retries)) = pending.take() {
                    debug!(seq = record.seq, retries, "abandoning record mid-retry");
                }
                break reason;
            }

            let (record, retries) = pending.take().unwrap_or_else(|| {
                let record = self.executor.record(seq);
                seq += 1;
                (record, 0)
            });

            match self.executor.attempt(&mut self.backend, &record).await {
                Ok(attempt) => match attempt.sample() {
                    Some(sample) => self.aggregator.record(sample),
                    None => {
                        self.aggregator.record_retries(1);
                        pending = Some((record, retries + 1));
                    }
                },
                Err(e) => {
                    error!(seq = record.seq, error = %e, "connection lost, stopping");
                    self.aggregator.record(Sample::Failed);
                    break StopReason::ConnectionLost(e.message);
                }
            }

            let now = Instant::now();
            if self.reporter.is_due(now) {
                self.reporter
                    .report(&mut self.aggregator, ReportKind::Interval, now);
            }
        };

        info!(
            reason = ?stop,
            transactions = seq,
            unreported = self.aggregator.window_attempted(),
            "load driver stopping"
        );
        let final_report = self
            .reporter
            .report(&mut self.aggregator, ReportKind::Final, Instant::now());

        if let Err(e) = self.backend.close().await {
            warn!(error = %e, "closing connection failed");
        }

        RunSummary {
            stop,
            reports: self.reporter.emitted(),
            final_report,
        }
    }
}
