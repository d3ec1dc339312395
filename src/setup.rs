use std::time::Instant;

use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::info;

use crate::db::{self, Backend, Catalog, Database, Ident, TABLE};
use crate::executor::Amount;

/// Rows per multi-row INSERT while seeding.
const BATCH: usize = 500;

/// A seed row as written by `setup`.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedRow {
    pub user_id: i64,
    pub amount: Amount,
    pub description: String,
}

/// Seed rows: `user_id = i % 10`, `amount = 10.50 × (i + 1)`.
pub fn seed_rows(count: u32) -> Vec<SeedRow> {
    (0..i64::from(count))
        .map(|i| SeedRow {
            user_id: i % 10,
            amount: Amount::from_cents(1050 * (i + 1)),
            description: format!("Initial transaction {i}"),
        })
        .collect()
}

pub const CREATE_TABLE: &str = r#"
    CREATE TABLE transactions (
        id SERIAL PRIMARY KEY,
        user_id INT NOT NULL,
        amount DECIMAL(10, 2) NOT NULL,
        description TEXT,
        created_at TIMESTAMP DEFAULT NOW()
    )
"#;

/// Create the database named in `app_url` (through `admin_url`), then drop,
/// recreate and seed the transactions table. Everything runs in autocommit.
pub async fn run(admin_url: &str, app_url: &str, rows: u32) -> anyhow::Result<i64> {
    let t0 = Instant::now();
    let name = db::database_name(app_url)?;

    let mut admin = Database::connect(admin_url).await?;
    create_database(admin.conn(), &name).await?;
    println!("✓ Database '{name}' created");
    admin.close().await?;

    let mut app = Database::connect(app_url).await?;
    reset_table(app.conn()).await?;
    println!("✓ Table '{TABLE}' created");

    let inserted = seed(app.conn(), &seed_rows(rows)).await?;
    println!("✓ Inserted {inserted} initial rows");

    let count = app.row_count(TABLE).await?;
    println!("✓ Total rows in {TABLE}: {count}");
    app.close().await?;

    info!(ms = t0.elapsed().as_millis() as u64, "setup complete");
    Ok(count)
}

async fn create_database(conn: &mut PgConnection, name: &Ident) -> Result<(), sqlx::Error> {
    sqlx::query(&format!("CREATE DATABASE IF NOT EXISTS {name}"))
        .execute(conn)
        .await?;
    Ok(())
}

async fn reset_table(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    sqlx::query("DROP TABLE IF EXISTS transactions CASCADE")
        .execute(&mut *conn)
        .await?;
    sqlx::query(CREATE_TABLE).execute(&mut *conn).await?;
    Ok(())
}

async fn seed(conn: &mut PgConnection, rows: &[SeedRow]) -> Result<u64, sqlx::Error> {
    let mut inserted = 0;
    for chunk in rows.chunks(BATCH) {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO transactions (user_id, amount, description) ");
        qb.push_values(chunk, |mut b, row| {
            b.push_bind(row.user_id)
                .push("CAST(")
                .push_bind_unseparated(row.amount.to_string())
                .push_unseparated(" AS DECIMAL(10, 2))")
                .push_bind(&row.description);
        });
        inserted += qb.build().execute(&mut *conn).await?.rows_affected();
    }
    Ok(inserted)
}
