use hdrhistogram::Histogram;
use serde::Serialize;

/// Percentiles expressed in basis points so `floor(p × n)` is computed
/// in integers.
pub const P50: u64 = 5_000;
pub const P95: u64 = 9_500;
pub const P99: u64 = 9_900;

/// Latency breakdown in milliseconds.
/// Serialized straight into the JSON endpoint and rendered by the console sink.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PercentileSet {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub count: u64,
}

impl PercentileSet {
    /// Exact breakdown over an ascending slice.
    /// Returns zeroed values if the slice is empty.
    pub fn from_sorted(sorted: &[f64]) -> Self {
        if sorted.is_empty() {
            return Self::empty();
        }

        let sum: f64 = sorted.iter().sum();
        Self {
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            avg: sum / sorted.len() as f64,
            p50: floor_percentile(sorted, P50),
            p95: floor_percentile(sorted, P95),
            p99: floor_percentile(sorted, P99),
            count: sorted.len() as u64,
        }
    }

    /// Approximate breakdown from an HdrHistogram recorded in microseconds.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::empty();
        }

        let ms = |us: u64| us as f64 / 1000.0;
        Self {
            min: ms(hist.min()),
            max: ms(hist.max()),
            avg: hist.mean() / 1000.0,
            p50: ms(hist.value_at_quantile(0.50)),
            p95: ms(hist.value_at_quantile(0.95)),
            p99: ms(hist.value_at_quantile(0.99)),
            count: hist.len(),
        }
    }

    /// All-zero placeholder for windows without a committed transaction.
    pub fn empty() -> Self {
        Self {
            min: 0.0,
            max: 0.0,
            avg: 0.0,
            p50: 0.0,
            p95: 0.0,
            p99: 0.0,
            count: 0,
        }
    }
}

/// Element at index `floor(bp × n / 10_000)` of an ascending slice, no
/// interpolation. Small sets therefore report their maximum as p99.
pub fn floor_percentile(sorted: &[f64], basis_points: u64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len() as u64;
    let idx = (basis_points * n / 10_000).min(n - 1);
    sorted[idx as usize]
}
