use std::error::Error;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db;
use crate::paths::{DocumentRef, Folder};

/// `sync_state` key holding the watermark of the last completed pass.
pub const CHECKPOINT_KEY: &str = "reconcile_checkpoint";

/// Mirrors database-side document edits back onto disk. One pass scans rows
/// changed since the checkpoint, rewrites files whose content drifted, and
/// advances the checkpoint once for the whole pass.
pub struct ReconcileService<'a> {
    conn: &'a Connection,
    root: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub examined: u64,
    pub written: u64,
}

impl<'a> ReconcileService<'a> {
    pub fn new(conn: &'a Connection, root: impl Into<PathBuf>) -> Self {
        Self {
            conn,
            root: root.into(),
        }
    }

    /// Loads the checkpoint, initializing it to "now" on the very first run
    /// so a fresh daemon does not replay the entire table onto disk.
    pub fn ensure_checkpoint(&self) -> Result<String, ReconcileError> {
        if let Some(checkpoint) = db::get_sync_state(self.conn, CHECKPOINT_KEY)? {
            return Ok(checkpoint);
        }
        let now = db::now_utc_timestamp();
        db::set_sync_state(self.conn, CHECKPOINT_KEY, &now)?;
        info!(checkpoint = %now, "initialized reconcile checkpoint");
        Ok(now)
    }

    pub fn run_pass(&self) -> Result<ReconcileSummary, ReconcileError> {
        let checkpoint = self.ensure_checkpoint()?;
        let changed = db::documents_updated_since(self.conn, &checkpoint)?;

        let mut summary = ReconcileSummary::default();
        for document in &changed {
            summary.examined += 1;
            if self.mirror_to_disk(document) {
                summary.written += 1;
            }
        }

        // Single watermark for the whole pass; a row touched mid-pass waits
        // for the next cycle.
        db::set_sync_state(self.conn, CHECKPOINT_KEY, &db::now_utc_timestamp())?;

        if summary.written > 0 {
            info!(
                examined = summary.examined,
                written = summary.written,
                "reconcile pass wrote database changes to disk"
            );
        }
        Ok(summary)
    }

    /// Returns whether the file was (re)written. Per-file failures are logged
    /// and skipped; the next pass retries because the checkpoint only bounds
    /// the query, not individual rows.
    fn mirror_to_disk(&self, document: &db::ChangedDocument) -> bool {
        let Some(folder) = Folder::from_db(&document.folder) else {
            warn!(
                folder = %document.folder,
                filepath = %document.filepath,
                "document row carries an unknown folder, skipping"
            );
            return false;
        };
        let Some(content) = document.content.as_deref() else {
            debug!(filepath = %document.filepath, "document row has no content, skipping");
            return false;
        };

        let reference = DocumentRef {
            category: document.category_slug.clone(),
            subcategory: document.subcategory_slug.clone(),
            object: document.object_slug.clone(),
            folder,
            filename: document.filename.clone(),
        };
        let absolute = self.root.join(reference.relative_path());

        let differs = match fs::read(&absolute) {
            Ok(existing) => existing != content.as_bytes(),
            Err(_) => true,
        };
        if !differs {
            return false;
        }

        if let Some(parent) = absolute.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!(path = %absolute.display(), error = %err, "failed to create parent directory");
                return false;
            }
        }
        match fs::write(&absolute, content) {
            Ok(()) => {
                info!(path = %absolute.display(), "wrote database content to disk");
                true
            }
            Err(err) => {
                warn!(path = %absolute.display(), error = %err, "failed to write document");
                false
            }
        }
    }
}

#[derive(Debug)]
pub enum ReconcileError {
    Db(rusqlite::Error),
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileError::Db(err) => write!(f, "database error: {}", err),
        }
    }
}

impl Error for ReconcileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReconcileError::Db(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for ReconcileError {
    fn from(value: rusqlite::Error) -> Self {
        ReconcileError::Db(value)
    }
}

#[cfg(test)]
mod tests;
