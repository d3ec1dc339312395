use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::{
    KeyPattern, LoadConfig, DEFAULT_ADMIN_URL, DEFAULT_DATABASE_URL, DEFAULT_REPORT_INTERVAL_SECS,
};

#[derive(Parser, Debug)]
#[command(name = "crdb-loadgen")]
#[command(about = "Exercise and observe a CockroachDB cluster under synthetic load")]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "DATABASE_URL",
        default_value = DEFAULT_DATABASE_URL,
        help = "Application database URL"
    )]
    pub database_url: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database and a freshly seeded transactions table
    Setup(SetupArgs),
    /// Run the transaction loop and report latency/throughput
    Load(LoadArgs),
    /// Report row count, secondary indexes and live nodes
    Check(CheckArgs),
    /// Create a secondary index online, unless it already exists
    AddIndex(AddIndexArgs),
    /// Render a TPS/latency chart from a load CSV
    Graph(GraphArgs),
}

#[derive(Args, Debug)]
pub struct SetupArgs {
    #[arg(
        long,
        env = "DATABASE_ADMIN_URL",
        default_value = DEFAULT_ADMIN_URL,
        help = "URL used to create the application database"
    )]
    pub admin_url: String,

    #[arg(long, default_value = "100", help = "Rows inserted after the table is created")]
    pub seed_rows: u32,
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    #[arg(
        value_name = "DURATION",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Run duration in seconds; omit to run until Ctrl-C"
    )]
    pub duration: Option<u64>,

    #[arg(
        value_name = "INTERVAL",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Seconds between interval reports [default: 10]"
    )]
    pub interval: Option<u64>,

    #[arg(
        long,
        default_value = "5",
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Rows read back per transaction"
    )]
    pub read_limit: u32,

    #[arg(
        long,
        default_value = "100",
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Number of distinct user ids"
    )]
    pub key_space: u32,

    #[arg(long, value_enum, default_value_t = KeyPattern::Sequential)]
    pub keys: KeyPattern,

    #[arg(long, default_value = "1000", help = "Seed for the random key pattern")]
    pub seed: u64,

    #[arg(long, help = "Write one CSV row per report to this file, replacing its contents")]
    pub csv: Option<PathBuf>,

    #[arg(long, help = "Serve the latest report over HTTP on this address")]
    pub metrics_addr: Option<SocketAddr>,
}

impl LoadArgs {
    pub fn into_config(self, database_url: String) -> LoadConfig {
        LoadConfig {
            database_url,
            duration: self.duration.map(Duration::from_secs),
            report_interval: Duration::from_secs(
                self.interval.unwrap_or(DEFAULT_REPORT_INTERVAL_SECS),
            ),
            read_limit: self.read_limit,
            key_space: self.key_space,
            keys: self.keys,
            seed: self.seed,
            csv_path: self.csv,
            metrics_addr: self.metrics_addr,
        }
    }
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[arg(
        long,
        default_value = "10",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Seconds within which a node must have refreshed its liveness"
    )]
    pub liveness_window: u64,

    #[arg(long, help = "Do not query crdb_internal for live nodes")]
    pub skip_liveness: bool,
}

#[derive(Args, Debug)]
pub struct AddIndexArgs {
    #[arg(long, default_value = "idx_user_amount")]
    pub name: String,

    #[arg(long, value_delimiter = ',', default_value = "user_id,amount")]
    pub columns: Vec<String>,
}

#[derive(Args, Debug)]
pub struct GraphArgs {
    #[arg(value_name = "CSV")]
    pub input: PathBuf,

    #[arg(value_name = "TITLE")]
    pub title: String,

    #[arg(long, help = "Output path [default: input with .svg extension]")]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("crdb-loadgen").chain(args.iter().copied()))
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn load_defaults_to_continuous_run_with_ten_second_reports() {
        let Command::Load(args) = parse(&["load"]).unwrap().command else {
            panic!("expected load");
        };
        let cfg = args.into_config("postgresql://x/db".into());
        assert_eq!(cfg.duration, None);
        assert_eq!(cfg.report_interval, Duration::from_secs(10));
        assert_eq!(cfg.read_limit, 5);
        assert_eq!(cfg.key_space, 100);
        assert_eq!(cfg.keys, KeyPattern::Sequential);
    }

    #[test]
    fn positional_duration_and_interval() {
        let cli = parse(&["load", "60", "5", "--keys", "random"]).unwrap();
        let Command::Load(args) = cli.command else {
            panic!("expected load");
        };
        let cfg = args.into_config(cli.database_url);
        assert_eq!(cfg.duration, Some(Duration::from_secs(60)));
        assert_eq!(cfg.report_interval, Duration::from_secs(5));
        assert_eq!(cfg.keys, KeyPattern::Random);
    }

    #[test]
    fn non_numeric_or_zero_arguments_are_rejected() {
        assert!(parse(&["load", "sixty"]).is_err());
        assert!(parse(&["load", "60", "ten"]).is_err());
        assert!(parse(&["load", "60", "0"]).is_err());
        assert!(parse(&["load", "-5"]).is_err());
    }

    #[test]
    fn add_index_splits_columns() {
        let Command::AddIndex(args) = parse(&["add-index", "--columns", "a,b,c"]).unwrap().command
        else {
            panic!("expected add-index");
        };
        assert_eq!(args.name, "idx_user_amount");
        assert_eq!(args.columns, vec!["a", "b", "c"]);
    }

    #[test]
    fn graph_requires_csv_and_title() {
        assert!(parse(&["graph", "run.csv"]).is_err());
        assert!(parse(&["graph", "run.csv", "Baseline"]).is_ok());
    }
}
