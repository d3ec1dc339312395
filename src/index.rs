use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use crate::db::{Catalog, Ident, TABLE};
use crate::error::{BackendError, IdentError};

/// A secondary index on the transactions table.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub name: Ident,
    pub columns: Vec<Ident>,
}

impl IndexSpec {
    pub fn parse(name: &str, columns: &[String]) -> Result<Self, IdentError> {
        let columns = columns
            .iter()
            .map(|c| Ident::parse(c.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        if columns.is_empty() {
            return Err(IdentError::Empty);
        }
        Ok(Self {
            name: Ident::parse(name)?,
            columns,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexOutcome {
    Created {
        elapsed: Duration,
        /// Every index on the table afterwards, primary key included.
        all_indexes: Vec<String>,
    },
    AlreadyExists,
}

/// Create `def` unless an index of that name is already on the table.
/// Running it twice leaves one index and reports `AlreadyExists` the second time.
pub async fn ensure_index<C: Catalog>(
    catalog: &mut C,
    def: &IndexSpec,
) -> Result<IndexOutcome, BackendError> {
    let existing = catalog.indexes(TABLE).await?;
    if existing.iter().any(|i| i == def.name.as_str()) {
        info!(index = %def.name, "index already exists");
        return Ok(IndexOutcome::AlreadyExists);
    }

    let start = Instant::now();
    catalog.create_index(TABLE, &def.name, &def.columns).await?;
    let elapsed = start.elapsed();
    info!(index = %def.name, ms = elapsed.as_millis() as u64, "index created");

    Ok(IndexOutcome::Created {
        elapsed,
        all_indexes: catalog.indexes(TABLE).await?,
    })
}
