use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::db;
use crate::ingest::IngestService;
use crate::locks::{DaemonLock, LockError};
use crate::reconcile::{ReconcileError, ReconcileService};
use crate::watcher::{FsChange, TreeWatcher};

/// Everything flowing into the supervisor loop: filesystem changes, watcher
/// failures, and the shutdown signal. The signal travels the same channel as
/// watcher events, so one `recv_timeout` wait covers all of them.
#[derive(Debug)]
pub enum DaemonEvent {
    Fs(FsChange),
    WatcherError(String),
    Shutdown,
}

/// Upper bound on one blocking wait, so a shutdown signal never waits out a
/// full poll interval.
const SHUTDOWN_SLICE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub root: PathBuf,
    pub db_path: String,
    pub poll_interval: Duration,
    pub lock_file: PathBuf,
}

pub struct Daemon {
    config: DaemonConfig,
}

impl Daemon {
    pub fn new(config: DaemonConfig) -> Self {
        Self { config }
    }

    /// Drives the full lifecycle. Startup failures return an error (the
    /// process exits non-zero, no retry); a clean drain returns `Ok`.
    pub fn run(&self) -> Result<(), DaemonError> {
        let config = &self.config;
        info!(
            root = %config.root.display(),
            db = %config.db_path,
            "kms sync daemon starting"
        );

        let root = config.root.canonicalize()?;
        let categories_dir = root.join("categories");
        if !categories_dir.is_dir() {
            return Err(DaemonError::MissingCategoriesDir(categories_dir));
        }

        let conn = db::open_connection(&config.db_path)?;
        let _lock = DaemonLock::acquire(&config.lock_file)?;

        let (tx, rx) = mpsc::channel();
        let signal_tx = tx.clone();
        ctrlc::set_handler(move || {
            let _ = signal_tx.send(DaemonEvent::Shutdown);
        })?;
        let watcher = TreeWatcher::start(&categories_dir, tx)?;
        info!(path = %categories_dir.display(), "file watcher started");

        let ingest = IngestService::new(&conn, &root);
        let reconciler = ReconcileService::new(&conn, &root);
        reconciler.ensure_checkpoint()?;

        info!(
            poll_interval_secs = config.poll_interval.as_secs(),
            "daemon running"
        );

        let mut next_pass = Instant::now() + config.poll_interval;
        loop {
            let wait = next_pass
                .saturating_duration_since(Instant::now())
                .min(SHUTDOWN_SLICE);
            match rx.recv_timeout(wait) {
                Ok(DaemonEvent::Shutdown) => {
                    info!("shutdown signal received, draining");
                    break;
                }
                Ok(DaemonEvent::Fs(change)) => {
                    if let Err(err) = ingest.apply(&change) {
                        warn!(
                            path = %change.path().display(),
                            error = %err,
                            "failed to apply filesystem change"
                        );
                    }
                }
                Ok(DaemonEvent::WatcherError(message)) => {
                    warn!(error = %message, "watcher reported an error");
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    error!("event channel closed unexpectedly");
                    break;
                }
            }

            if Instant::now() >= next_pass {
                if let Err(err) = reconciler.run_pass() {
                    warn!(error = %err, "reconcile pass failed");
                }
                next_pass = Instant::now() + config.poll_interval;
            }
        }

        // Draining: no new watcher events, no new passes; the single-threaded
        // loop has no in-flight write to wait for.
        drop(watcher);
        drop(conn);
        info!("kms sync daemon stopped");
        Ok(())
    }
}

#[derive(Debug)]
pub enum DaemonError {
    Db(rusqlite::Error),
    Lock(LockError),
    Watch(notify::Error),
    Signal(ctrlc::Error),
    Reconcile(ReconcileError),
    MissingCategoriesDir(PathBuf),
    Io(std::io::Error),
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonError::Db(err) => write!(f, "database error: {}", err),
            DaemonError::Lock(err) => write!(f, "{}", err),
            DaemonError::Watch(err) => write!(f, "failed to watch the tree root: {}", err),
            DaemonError::Signal(err) => write!(f, "failed to install signal handler: {}", err),
            DaemonError::Reconcile(err) => write!(f, "{}", err),
            DaemonError::MissingCategoriesDir(path) => {
                write!(f, "categories directory '{}' does not exist", path.display())
            }
            DaemonError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl Error for DaemonError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DaemonError::Db(err) => Some(err),
            DaemonError::Lock(err) => Some(err),
            DaemonError::Watch(err) => Some(err),
            DaemonError::Signal(err) => Some(err),
            DaemonError::Reconcile(err) => Some(err),
            DaemonError::MissingCategoriesDir(_) => None,
            DaemonError::Io(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for DaemonError {
    fn from(value: rusqlite::Error) -> Self {
        DaemonError::Db(value)
    }
}

impl From<LockError> for DaemonError {
    fn from(value: LockError) -> Self {
        DaemonError::Lock(value)
    }
}

impl From<notify::Error> for DaemonError {
    fn from(value: notify::Error) -> Self {
        DaemonError::Watch(value)
    }
}

impl From<ctrlc::Error> for DaemonError {
    fn from(value: ctrlc::Error) -> Self {
        DaemonError::Signal(value)
    }
}

impl From<ReconcileError> for DaemonError {
    fn from(value: ReconcileError) -> Self {
        DaemonError::Reconcile(value)
    }
}

impl From<std::io::Error> for DaemonError {
    fn from(value: std::io::Error) -> Self {
        DaemonError::Io(value)
    }
}
