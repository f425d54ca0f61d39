mod cli;
mod daemon;
mod db;
mod domain;
mod filetypes;
mod hashing;
mod ingest;
mod locks;
mod logging;
mod paths;
mod reconcile;
mod watcher;

use std::error::Error;
use std::fmt;

use clap::Parser;

use crate::daemon::{Daemon, DaemonConfig, DaemonError};
use crate::reconcile::{ReconcileError, ReconcileService};

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<(), RunError> {
    let cli = cli::Cli::parse();
    logging::init(cli.log_file.as_deref())?;

    match cli.command {
        cli::Commands::Run => {
            let daemon = Daemon::new(DaemonConfig {
                root: cli.root.clone(),
                db_path: cli.db_path(),
                poll_interval: cli.poll_interval(),
                lock_file: cli.lock_file.clone(),
            });
            daemon.run()?;
        }
        cli::Commands::Reconcile => {
            let conn = db::open_connection(&cli.db_path())?;
            let service = ReconcileService::new(&conn, &cli.root);
            let summary = service.run_pass()?;
            print_json(&summary);
        }
    }

    Ok(())
}

fn print_json(value: &impl serde::Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).expect("json serialization should work")
    );
}

#[derive(Debug)]
enum RunError {
    Logging(std::io::Error),
    Db(rusqlite::Error),
    Daemon(DaemonError),
    Reconcile(ReconcileError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Logging(err) => write!(f, "failed to initialize logging: {}", err),
            RunError::Db(err) => write!(f, "database error: {}", err),
            RunError::Daemon(err) => write!(f, "{}", err),
            RunError::Reconcile(err) => write!(f, "{}", err),
        }
    }
}

impl Error for RunError {}

impl From<std::io::Error> for RunError {
    fn from(value: std::io::Error) -> Self {
        RunError::Logging(value)
    }
}

impl From<rusqlite::Error> for RunError {
    fn from(value: rusqlite::Error) -> Self {
        RunError::Db(value)
    }
}

impl From<DaemonError> for RunError {
    fn from(value: DaemonError) -> Self {
        RunError::Daemon(value)
    }
}

impl From<ReconcileError> for RunError {
    fn from(value: ReconcileError) -> Self {
        RunError::Reconcile(value)
    }
}
