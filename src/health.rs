use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};

use crate::db::{Catalog, TABLE};
use crate::error::BackendError;

/// What `check` found. Only built when the table could be queried, so
/// holding one means the cluster is healthy.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub row_count: i64,
    pub secondary_indexes: Vec<String>,
    /// `None` when liveness was skipped or the internal view is unavailable.
    pub live_nodes: Option<i64>,
}

fn is_primary_index(table: &str, name: &str) -> bool {
    name == "primary" || name == format!("{table}_pkey")
}

/// Query row count, secondary indexes and (optionally) live nodes.
///
/// Row count and index listing failures make the cluster unhealthy;
/// a failed liveness query only leaves the node count unknown.
pub async fn check<C: Catalog>(
    catalog: &mut C,
    liveness_window: Option<Duration>,
) -> Result<HealthReport, BackendError> {
    let row_count = catalog.row_count(TABLE).await?;
    let secondary_indexes = catalog
        .indexes(TABLE)
        .await?
        .into_iter()
        .filter(|name| !is_primary_index(TABLE, name))
        .collect();

    let live_nodes = match liveness_window {
        Some(window) => match catalog.live_nodes(window).await {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(error = %e, "live node count unavailable");
                None
            }
        },
        None => {
            debug!("liveness check skipped");
            None
        }
    };

    Ok(HealthReport {
        row_count,
        secondary_indexes,
        live_nodes,
    })
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "DATABASE STATUS")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Total transactions in database: {}", self.row_count)?;
        if self.secondary_indexes.is_empty() {
            writeln!(f, "No secondary indexes on '{TABLE}' table")?;
        } else {
            writeln!(f, "Indexes on '{TABLE}' table:")?;
            for idx in &self.secondary_indexes {
                writeln!(f, "  - {idx}")?;
            }
        }
        match self.live_nodes {
            Some(n) => writeln!(f, "\nLive nodes: {n}")?,
            None => writeln!(f, "\nNode count: Unable to determine (requires cluster access)")?,
        }
        write!(f, "{rule}")
    }
}

/// Printed when the cluster cannot be reached at all.
pub const CONNECT_HINTS: &str = "\
Make sure:
  1. Docker containers are running: docker ps
  2. Cluster is initialized: docker exec -it roach1 ./cockroach init --insecure
  3. Database is set up: crdb-loadgen setup";
