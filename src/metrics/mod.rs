pub mod collector;
pub mod percentiles;
pub mod report;
pub mod stream;

pub use collector::Aggregator;
pub use report::{MetricsReport, ReportKind};

/// A single timing observation produced by the executor.
/// This is the "write" side: the driver pushes these into the aggregator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    /// The unit of work committed after this many milliseconds.
    Committed(f64),
    /// The unit of work was rolled back. Counts as an error, carries no latency.
    Failed,
}

impl Sample {
    pub fn latency_ms(&self) -> Option<f64> {
        match *self {
            Self::Committed(ms) => Some(ms),
            Self::Failed => None,
        }
    }
}
