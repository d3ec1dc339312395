use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod chart;
mod cli;
mod config;
mod db;
mod driver;
mod error;
mod executor;
mod health;
mod index;
mod metrics;
mod reporter;
mod server;
mod setup;

use cli::{AddIndexArgs, CheckArgs, Cli, Command, GraphArgs, SetupArgs};
use config::LoadConfig;
use db::{Backend, Database, TABLE};
use driver::{Driver, StopReason};
use index::{IndexOutcome, IndexSpec};
use metrics::stream::LiveReports;
use reporter::{ConsoleSink, CsvSink, LiveSink};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "crdb_loadgen=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Bad arguments exit here with a usage message and status 2.
    let cli = Cli::parse();
    let url = cli.database_url;

    let result = match cli.command {
        Command::Setup(args) => run_setup(&url, args).await,
        Command::Load(args) => run_load(args.into_config(url)).await,
        Command::Check(args) => run_check(&url, args).await,
        Command::AddIndex(args) => run_add_index(&url, args).await,
        Command::Graph(args) => run_graph(args),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("\n✗ {e:#}");
            ExitCode::FAILURE
        }
    }
}

// ─── setup ───────────────────────────────────────────────────────

async fn run_setup(url: &str, args: SetupArgs) -> anyhow::Result<ExitCode> {
    println!("Connecting to CockroachDB...");
    setup::run(&args.admin_url, url, args.seed_rows)
        .await
        .context("setup failed")?;
    println!("\n✓ Setup complete! Ready to run load tests.");
    Ok(ExitCode::SUCCESS)
}

// ─── load ────────────────────────────────────────────────────────

async fn run_load(cfg: LoadConfig) -> anyhow::Result<ExitCode> {
    println!("Starting load test...");
    println!("Report interval: {} seconds", cfg.report_interval.as_secs());
    match cfg.duration {
        Some(d) => println!("Duration: {} seconds", d.as_secs()),
        None => println!("Duration: Continuous (Ctrl+C to stop)"),
    }

    // Local resources first, so a bad path or busy port never leaves a
    // half-open database connection behind.
    let csv = cfg
        .csv_path
        .as_deref()
        .map(CsvSink::create)
        .transpose()
        .context("cannot create CSV output")?;

    let live = Arc::new(LiveReports::new());
    let server = match cfg.metrics_addr {
        Some(addr) => {
            let (_bound, task) = server::spawn(addr, live.clone())
                .await
                .with_context(|| format!("cannot serve metrics on {addr}"))?;
            Some(task)
        }
        None => None,
    };

    println!("\nConnecting to database...");
    let db = Database::connect(&cfg.database_url)
        .await
        .context("cannot connect to cluster")?;
    println!("✓ Connected to CockroachDB\n");

    let running = Arc::new(AtomicBool::new(true));
    spawn_interrupt_listener(running.clone());

    let mut driver = Driver::new(db, &cfg, running).with_sink(ConsoleSink);
    if let Some(csv) = csv {
        driver = driver.with_sink(csv);
    }
    if server.is_some() {
        driver = driver.with_sink(LiveSink(live));
    }
    info!(run_id = %driver.run_id(), "run id");

    let summary = driver.run().await;

    if let Some(handle) = server {
        handle.abort();
    }

    info!(
        reports = summary.reports,
        committed = summary.final_report.cumulative.committed,
        errors = summary.final_report.cumulative.errors,
        "load test finished"
    );
    if let StopReason::ConnectionLost(msg) = &summary.stop {
        eprintln!("\n✗ Load test failed: {msg}");
    }
    Ok(if summary.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// First Ctrl-C asks the driver to stop after the current transaction.
/// A second one exits immediately, for a backend that never answers.
fn spawn_interrupt_listener(running: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("cannot listen for Ctrl-C");
            return;
        }
        println!("\n\n✓ Load test stopped by user");
        running.store(false, Ordering::SeqCst);

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("second interrupt, exiting without final report");
            std::process::exit(130);
        }
    });
}

// ─── check ───────────────────────────────────────────────────────

async fn run_check(url: &str, args: CheckArgs) -> anyhow::Result<ExitCode> {
    println!("Connecting to CockroachDB cluster...");
    let mut db = match Database::connect(url).await {
        Ok(db) => db,
        Err(e) => {
            println!("\n✗ Cannot connect to cluster");
            println!("Error: {e}");
            println!("\n{}", health::CONNECT_HINTS);
            return Ok(ExitCode::FAILURE);
        }
    };

    let window = (!args.skip_liveness).then(|| Duration::from_secs(args.liveness_window));
    let result = health::check(&mut db, window).await;
    if let Err(e) = db.close().await {
        warn!(error = %e, "closing connection failed");
    }

    match result {
        Ok(report) => {
            println!("\n{report}");
            println!("\n✓ Cluster is healthy and accessible\n");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("\n✗ Cluster check failed: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

// ─── add-index ───────────────────────────────────────────────────

async fn run_add_index(url: &str, args: AddIndexArgs) -> anyhow::Result<ExitCode> {
    let def = IndexSpec::parse(&args.name, &args.columns).context("invalid index definition")?;
    let cols = def
        .columns
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    println!("Connecting to database...");
    let mut db = Database::connect(url)
        .await
        .context("cannot connect to cluster")?;

    let rule = "=".repeat(60);
    println!("\n{rule}");
    println!("ADDING INDEX: {} ON ({cols})", def.name);
    println!("{rule}");
    println!("\nThis operation will happen ONLINE while traffic continues...");
    println!("Monitor your load output for performance impact.\n");

    let outcome = index::ensure_index(&mut db, &def).await;
    if let Err(e) = db.close().await {
        warn!(error = %e, "closing connection failed");
    }

    match outcome.context("failed to add index")? {
        IndexOutcome::AlreadyExists => {
            println!("✗ Index '{}' already exists!", def.name);
            println!("\nTo drop it first, run:");
            println!("  docker exec -it roach1 ./cockroach sql --insecure -d study_db");
            println!("  DROP INDEX {};", def.name);
        }
        IndexOutcome::Created {
            elapsed,
            all_indexes,
        } => {
            println!("✓ Index created in {:.2} seconds", elapsed.as_secs_f64());
            println!("\nAll indexes on '{}' table:", TABLE);
            for idx in all_indexes {
                println!("  - {idx}");
            }
            println!("{rule}");
            println!("✓ Index addition complete!\n");
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ─── graph ───────────────────────────────────────────────────────

fn run_graph(args: GraphArgs) -> anyhow::Result<ExitCode> {
    let rows = chart::read_rows(&args.input)?;
    let out = args
        .output
        .unwrap_or_else(|| chart::default_output(&args.input));
    chart::render(&rows, &args.title, &out)?;
    println!("Graph saved to {} (Y-axis fixed to start at 0)", out.display());
    Ok(ExitCode::SUCCESS)
}
