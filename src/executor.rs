use std::fmt;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::KeyPattern;
use crate::db::Backend;
use crate::error::BackendError;
use crate::metrics::Sample;

// ─── Transaction records ─────────────────────────────────────────

/// Fixed-point money value stored as whole cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(pub i64);

impl Amount {
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// One unit of synthetic work as it is written to the backend.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub seq: u64,
    pub user_id: i64,
    pub amount: Amount,
    pub description: String,
    pub issued_at: DateTime<Utc>,
}

/// Outcome of a single attempt at a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Attempt {
    /// Committed after this many milliseconds.
    Committed(f64),
    /// Rolled back for a non-retryable reason.
    Failed,
    /// Serialization conflict or deadlock. The same record should be tried again.
    Conflict,
}

impl Attempt {
    /// The aggregator sample for a finished unit of work. `None` while the
    /// record is still waiting for a retry.
    pub fn sample(self) -> Option<Sample> {
        match self {
            Self::Committed(ms) => Some(Sample::Committed(ms)),
            Self::Failed => Some(Sample::Failed),
            Self::Conflict => None,
        }
    }
}

// ─── Executor ────────────────────────────────────────────────────

/// Builds records from the sequence number and runs them against a
/// [`Backend`], timing each one.
pub struct Executor {
    run_id: Uuid,
    key_space: u32,
    read_limit: i64,
    keys: KeyPattern,
    rng: StdRng,
}

impl Executor {
    pub fn new(run_id: Uuid, key_space: u32, read_limit: u32, keys: KeyPattern, seed: u64) -> Self {
        Self {
            run_id,
            key_space: key_space.max(1),
            read_limit: i64::from(read_limit),
            keys,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Derive the record for sequence number `seq`.
    pub fn record(&mut self, seq: u64) -> TransactionRecord {
        let (user_id, amount) = match self.keys {
            KeyPattern::Sequential => {
                let user_id = (seq % u64::from(self.key_space)) as i64;
                // (seq % 1000) × 0.99, kept exact in cents
                let cents = (seq % 1000) as i64 * 99;
                (user_id, Amount::from_cents(cents))
            }
            KeyPattern::Random => {
                let user_id = self.rng.gen_range(0..self.key_space) as i64;
                let units = self.rng.gen_range(0..=1000i64);
                (user_id, Amount::from_cents(units * 100))
            }
        };

        TransactionRecord {
            seq,
            user_id,
            amount,
            description: format!("Load test transaction {seq} [{}]", self.run_id),
            issued_at: Utc::now(),
        }
    }

    /// Run `record` once and time it.
    ///
    /// A transient conflict comes back as [`Attempt::Conflict`] so the caller
    /// can check its stop conditions before retrying the same record. Other
    /// failures are [`Attempt::Failed`]; only connection-level failures
    /// surface as `Err`.
    pub async fn attempt<B: Backend>(
        &self,
        backend: &mut B,
        record: &TransactionRecord,
    ) -> Result<Attempt, BackendError> {
        let t0 = Instant::now();
        match backend.write_then_read(record, self.read_limit).await {
            Ok(_rows) => Ok(Attempt::Committed(t0.elapsed().as_secs_f64() * 1000.0)),
            Err(err) if err.is_transient() => {
                debug!(seq = record.seq, error = %err, "transient conflict");
                Ok(Attempt::Conflict)
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                warn!(
                    seq = record.seq,
                    issued_at = %record.issued_at,
                    error = %err,
                    "transaction failed"
                );
                Ok(Attempt::Failed)
            }
        }
    }
}
