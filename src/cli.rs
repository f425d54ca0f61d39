use std::path::PathBuf;
use std::time::Duration;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Parser, Subcommand};

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

#[derive(Debug, Parser)]
#[command(name = "kmsd")]
#[command(bin_name = "kmsd")]
#[command(version)]
#[command(about = "Bidirectional sync daemon between a knowledge tree and its database")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(
        short = 'C',
        long,
        env = "KMS_ROOT",
        default_value = "/opt/kms",
        help = "Tree root containing categories/."
    )]
    pub root: PathBuf,

    #[arg(
        short = 'd',
        long,
        env = "KMS_DB_PATH",
        help = "Path to the SQLite database. Defaults to <root>/kms.sqlite."
    )]
    pub db: Option<String>,

    #[arg(
        long,
        env = "KMS_POLL_INTERVAL",
        default_value_t = 5,
        help = "Seconds between database poll passes."
    )]
    pub poll_interval: u64,

    #[arg(
        long,
        env = "KMS_LOG_FILE",
        help = "Append logs to this file in addition to stdout."
    )]
    pub log_file: Option<PathBuf>,

    #[arg(
        long,
        env = "KMS_LOCK_FILE",
        default_value = "/tmp/kmsd.lock",
        help = "Lock file guarding against a second daemon instance."
    )]
    pub lock_file: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Run the synchronization daemon.")]
    Run,
    #[command(about = "Run one database-to-file reconciliation pass and exit.")]
    Reconcile,
}

impl Cli {
    pub fn db_path(&self) -> String {
        match &self.db {
            Some(path) => path.clone(),
            None => self.root.join("kms.sqlite").display().to_string(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval.max(1))
    }
}
