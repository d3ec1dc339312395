use std::fmt;
use std::time::Duration;

use chrono::NaiveDateTime;
use sqlx::{Connection, PgConnection};
use tracing::{info, warn};

use crate::error::{BackendError, IdentError};
use crate::executor::TransactionRecord;

/// Table every tool in this crate works against.
pub const TABLE: &str = "transactions";

// ─── Identifiers ─────────────────────────────────────────────────

/// A SQL identifier that is safe to splice into DDL text.
///
/// Postgres cannot bind identifiers as parameters, so anything taken from
/// the command line goes through here before it reaches a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident(String);

impl Ident {
    pub fn parse(raw: &str) -> Result<Self, IdentError> {
        let mut chars = raw.chars();
        let first = chars.next().ok_or(IdentError::Empty)?;
        if raw.len() > 63 {
            return Err(IdentError::TooLong(raw.to_owned()));
        }
        let head_ok = first.is_ascii_alphabetic() || first == '_';
        let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !(head_ok && tail_ok) {
            return Err(IdentError::Invalid(raw.to_owned()));
        }
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pulls the database name out of a `postgresql://host/dbname?...` URL.
pub fn database_name(url: &str) -> anyhow::Result<Ident> {
    let parsed = url::Url::parse(url)?;
    let name = parsed.path().trim_start_matches('/');
    Ok(Ident::parse(name)?)
}

// ─── Seams ───────────────────────────────────────────────────────

/// What the load driver needs from the database.
pub trait Backend {
    /// Insert `record`, read back up to `read_limit` recent rows for the
    /// same key and commit, all inside one explicit transaction. On any
    /// error the transaction is rolled back before returning.
    async fn write_then_read(
        &mut self,
        record: &TransactionRecord,
        read_limit: i64,
    ) -> Result<usize, BackendError>;

    /// Release the connection.
    async fn close(self) -> Result<(), BackendError>;
}

/// What the health check and index helper need from the database.
pub trait Catalog {
    async fn row_count(&mut self, table: &str) -> Result<i64, BackendError>;

    /// Every index on `table`, primary key included, in catalog order.
    async fn indexes(&mut self, table: &str) -> Result<Vec<String>, BackendError>;

    async fn create_index(
        &mut self,
        table: &str,
        name: &Ident,
        columns: &[Ident],
    ) -> Result<(), BackendError>;

    /// Cluster members whose liveness record was refreshed within `window`.
    async fn live_nodes(&mut self, window: Duration) -> Result<i64, BackendError>;
}

// ─── Postgres-wire implementation ────────────────────────────────

/// A single long-lived connection. No pool: the driver is sequential.
pub struct Database {
    conn: PgConnection,
}

impl Database {
    pub async fn connect(url: &str) -> Result<Self, BackendError> {
        let conn = PgConnection::connect(url).await?;
        info!("connected");
        Ok(Self { conn })
    }

    /// Raw access for autocommit administrative statements.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    async fn insert_and_select(
        conn: &mut PgConnection,
        record: &TransactionRecord,
        read_limit: i64,
    ) -> Result<usize, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO transactions (user_id, amount, description)
            VALUES ($1, CAST($2 AS DECIMAL(10, 2)), $3)
            "#,
        )
        .bind(record.user_id)
        .bind(record.amount.to_string())
        .bind(&record.description)
        .execute(&mut *conn)
        .await?;

        let rows: Vec<(i64, i64, String, NaiveDateTime)> = sqlx::query_as(
            r#"
            SELECT id::INT8, user_id::INT8, amount::TEXT, created_at
            FROM transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(record.user_id)
        .bind(read_limit)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.len())
    }
}

impl Backend for Database {
    async fn write_then_read(
        &mut self,
        record: &TransactionRecord,
        read_limit: i64,
    ) -> Result<usize, BackendError> {
        let mut tx = self.conn.begin().await?;

        match Self::insert_and_select(&mut *tx, record, read_limit).await {
            Ok(rows) => {
                tx.commit().await?;
                Ok(rows)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(err.into())
            }
        }
    }

    async fn close(self) -> Result<(), BackendError> {
        self.conn.close().await?;
        info!("connection closed");
        Ok(())
    }
}

impl Catalog for Database {
    async fn row_count(&mut self, table: &str) -> Result<i64, BackendError> {
        let table = Ident::parse(table)?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*)::INT8 FROM {table}"))
            .fetch_one(&mut self.conn)
            .await?;
        Ok(count)
    }

    async fn indexes(&mut self, table: &str) -> Result<Vec<String>, BackendError> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT indexname::TEXT FROM pg_indexes WHERE tablename = $1 ORDER BY indexname",
        )
        .bind(table)
        .fetch_all(&mut self.conn)
        .await?;
        Ok(names)
    }

    async fn create_index(
        &mut self,
        table: &str,
        name: &Ident,
        columns: &[Ident],
    ) -> Result<(), BackendError> {
        let table = Ident::parse(table)?;
        let cols = columns
            .iter()
            .map(Ident::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        sqlx::query(&format!("CREATE INDEX {name} ON {table} ({cols})"))
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn live_nodes(&mut self, window: Duration) -> Result<i64, BackendError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT count(*)::INT8
            FROM crdb_internal.gossip_liveness
            WHERE updated_at > now() - CAST($1 AS INTERVAL)
            "#,
        )
        .bind(format!("{} seconds", window.as_secs()))
        .fetch_one(&mut self.conn)
        .await?;
        Ok(count)
    }
}


/// Runs against a real cluster. `DATABASE_URL` and `DATABASE_ADMIN_URL`
/// default to the local insecure cluster; run with `cargo test -- --ignored`.
#[cfg(test)]
mod cluster_tests {
    use chrono::Utc;
    use tokio::sync::Mutex;

    use super::*;
    use crate::config::{DEFAULT_ADMIN_URL, DEFAULT_DATABASE_URL};
    use crate::error::ErrorClass;
    use crate::executor::Amount;
    use crate::index::{ensure_index, IndexOutcome, IndexSpec};
    use crate::setup;

    // every test resets the same table
    static CLUSTER: Mutex<()> = Mutex::const_new(());

    fn urls() -> (String, String) {
        let app = std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.into());
        let admin =
            std::env::var("DATABASE_ADMIN_URL").unwrap_or_else(|_| DEFAULT_ADMIN_URL.into());
        (admin, app)
    }

    async fn fresh_database() -> Database {
        let (admin, app) = urls();
        assert_eq!(setup::run(&admin, &app, 10).await.unwrap(), 10);
        Database::connect(&app).await.unwrap()
    }

    fn record(seq: u64, cents: i64) -> TransactionRecord {
        TransactionRecord {
            seq,
            user_id: 7,
            amount: Amount::from_cents(cents),
            description: format!("cluster test {seq}"),
            issued_at: Utc::now(),
        }
    }

    #[tokio::test]
    #[ignore = "needs a running cluster"]
    async fn failed_statement_rolls_back_and_connection_stays_usable() {
        let _guard = CLUSTER.lock().await;
        let mut db = fresh_database().await;

        // does not fit DECIMAL(10, 2)
        let err = db
            .write_then_read(&record(1, i64::MAX), 5)
            .await
            .unwrap_err();
        assert_eq!(err.class, ErrorClass::Transaction);
        assert_eq!(db.row_count(TABLE).await.unwrap(), 10);

        let rows = db.write_then_read(&record(2, 1050), 5).await.unwrap();
        assert!((1..=5).contains(&rows));
        assert_eq!(db.row_count(TABLE).await.unwrap(), 11);

        let stored: String = sqlx::query_scalar(
            "SELECT amount::TEXT FROM transactions WHERE description = 'cluster test 2'",
        )
        .fetch_one(db.conn())
        .await
        .unwrap();
        assert_eq!(stored, "10.50");

        db.close().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "needs a running cluster"]
    async fn ensure_index_twice_leaves_one_index() {
        let _guard = CLUSTER.lock().await;
        let mut db = fresh_database().await;
        let def =
            IndexSpec::parse("idx_user_amount", &["user_id".into(), "amount".into()]).unwrap();

        let first = ensure_index(&mut db, &def).await.unwrap();
        assert!(matches!(first, IndexOutcome::Created { .. }));
        let second = ensure_index(&mut db, &def).await.unwrap();
        assert_eq!(second, IndexOutcome::AlreadyExists);

        let indexes = db.indexes(TABLE).await.unwrap();
        let named = indexes.iter().filter(|i| *i == "idx_user_amount").count();
        assert_eq!(named, 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "needs a running cluster"]
    async fn live_node_query_runs() {
        let _guard = CLUSTER.lock().await;
        let (_, app) = urls();
        let mut db = Database::connect(&app).await.unwrap();
        assert!(db.live_nodes(Duration::from_secs(10)).await.unwrap() >= 1);
        db.close().await.unwrap();
    }
}
