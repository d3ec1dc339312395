use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

pub const DEFAULT_DATABASE_URL: &str = "postgresql://root@localhost:26257/study_db?sslmode=disable";
pub const DEFAULT_ADMIN_URL: &str = "postgresql://root@localhost:26257/defaultdb?sslmode=disable";
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 10;

/// How the executor picks the grouping key and amount for each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum KeyPattern {
    /// `user_id = seq % key_space`, amount derived from the sequence number.
    #[default]
    Sequential,
    /// Uniform key and amount from a seeded generator.
    Random,
}

/// Everything the load driver needs, resolved from the command line.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub database_url: String,
    /// `None` runs until interrupted.
    pub duration: Option<Duration>,
    pub report_interval: Duration,
    pub read_limit: u32,
    pub key_space: u32,
    pub keys: KeyPattern,
    pub seed: u64,
    pub csv_path: Option<PathBuf>,
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_owned(),
            duration: None,
            report_interval: Duration::from_secs(DEFAULT_REPORT_INTERVAL_SECS),
            read_limit: 5,
            key_space: 100,
            keys: KeyPattern::Sequential,
            seed: 1000,
            csv_path: None,
            metrics_addr: None,
        }
    }
}
