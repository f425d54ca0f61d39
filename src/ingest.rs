use std::error::Error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::db::{
    self, CategoryPatch, ObjectPatch, SubcategoryUpsert, UpsertDocument,
};
use crate::domain::metadata::{self, MetadataError, SidecarMetadata};
use crate::domain::status::ObjectStatus;
use crate::filetypes;
use crate::hashing;
use crate::paths::{self, DocumentRef, EntityRef, TreePath};
use crate::watcher::FsChange;

/// Fallback author recorded when a sidecar omits one.
const UNKNOWN_AUTHOR: &str = "Unknown";

/// Applies filesystem changes to the database: sidecar edits update entity
/// rows, document edits upsert document rows, deletions remove them.
pub struct IngestService<'a> {
    conn: &'a Connection,
    root: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Metadata,
    Document,
    Removed,
    Ignored,
}

impl<'a> IngestService<'a> {
    pub fn new(conn: &'a Connection, root: impl Into<PathBuf>) -> Self {
        Self {
            conn,
            root: root.into(),
        }
    }

    pub fn apply(&self, change: &FsChange) -> Result<Applied, IngestError> {
        let Some(relative) = self.relativize(change.path()) else {
            return Ok(Applied::Ignored);
        };

        match change {
            FsChange::Created(path) | FsChange::Modified(path) => {
                if path.is_dir() {
                    return Ok(Applied::Ignored);
                }
                match paths::classify(&relative) {
                    Some(TreePath::Metadata(entity)) => self.sync_metadata(&entity),
                    Some(TreePath::Document(document)) => {
                        if !filetypes::is_document_file(&relative) {
                            debug!(path = %relative.display(), "extension not allow-listed, skipping");
                            return Ok(Applied::Ignored);
                        }
                        self.sync_document(&document, &relative)
                    }
                    None => {
                        debug!(path = %relative.display(), "path outside the tracked hierarchy, skipping");
                        Ok(Applied::Ignored)
                    }
                }
            }
            FsChange::Deleted(_) => self.handle_deletion(&relative),
        }
    }

    /// Sidecar edit. Categories and objects are update-only; subcategories
    /// are created on first sight.
    pub fn sync_metadata(&self, entity: &EntityRef) -> Result<Applied, IngestError> {
        let sidecar = self.root.join(entity.sidecar_path());
        let parsed = metadata::read_sidecar(&sidecar)?;

        match entity {
            EntityRef::Category { category } => self.sync_category(category, &parsed),
            EntityRef::Subcategory {
                category,
                subcategory,
            } => self.sync_subcategory(category, subcategory, &parsed),
            EntityRef::Object {
                category,
                subcategory,
                object,
            } => self.sync_object(category, subcategory.as_deref(), object, &parsed),
        }
    }

    fn sync_category(
        &self,
        category: &str,
        sidecar: &SidecarMetadata,
    ) -> Result<Applied, IngestError> {
        let metadata_json = sidecar.metadata_json();
        let patch = CategoryPatch {
            name: sidecar.name.as_deref().unwrap_or(category),
            description: sidecar.description.as_deref().unwrap_or(""),
            metadata_json: &metadata_json,
        };
        if db::update_category_metadata(self.conn, category, &patch)? {
            info!(category, "updated category metadata");
            Ok(Applied::Metadata)
        } else {
            debug!(category, "no category row to update, skipping");
            Ok(Applied::Ignored)
        }
    }

    fn sync_subcategory(
        &self,
        category: &str,
        subcategory: &str,
        sidecar: &SidecarMetadata,
    ) -> Result<Applied, IngestError> {
        let Some(category_id) = db::category_id_by_slug(self.conn, category)? else {
            debug!(category, subcategory, "parent category missing, skipping");
            return Ok(Applied::Ignored);
        };
        db::upsert_subcategory(
            self.conn,
            &SubcategoryUpsert {
                category_id,
                slug: subcategory,
                name: sidecar.name.as_deref().unwrap_or(subcategory),
                description: sidecar.description.as_deref().unwrap_or(""),
                metadata_json: &sidecar.metadata_json(),
                is_active: sidecar.is_active(),
            },
        )?;
        info!(category, subcategory, "synced subcategory metadata");
        Ok(Applied::Metadata)
    }

    fn sync_object(
        &self,
        category: &str,
        subcategory: Option<&str>,
        object: &str,
        sidecar: &SidecarMetadata,
    ) -> Result<Applied, IngestError> {
        let Some((category_id, subcategory_id)) = self.resolve_scope(category, subcategory)? else {
            debug!(category, object, "parent category missing, skipping");
            return Ok(Applied::Ignored);
        };

        let status = sidecar
            .status
            .as_deref()
            .and_then(|raw| raw.parse::<ObjectStatus>().ok())
            .unwrap_or(ObjectStatus::Active);
        let metadata_json = sidecar.metadata_json();
        let patch = ObjectPatch {
            name: sidecar.name.as_deref().unwrap_or(object),
            description: sidecar.description.as_deref().unwrap_or(""),
            status: status.as_str(),
            author: sidecar.author.as_deref().unwrap_or(UNKNOWN_AUTHOR),
            metadata_json: &metadata_json,
        };
        if db::update_object_metadata(self.conn, category_id, subcategory_id, object, &patch)? {
            info!(category, object, "updated object metadata");
            Ok(Applied::Metadata)
        } else {
            debug!(category, object, "no object row to update, skipping");
            Ok(Applied::Ignored)
        }
    }

    /// Document create/modify. Stray files under unknown objects are left
    /// alone; objects are never auto-created from the filesystem.
    pub fn sync_document(
        &self,
        document: &DocumentRef,
        relative: &Path,
    ) -> Result<Applied, IngestError> {
        let Some((category_id, subcategory_id)) =
            self.resolve_scope(&document.category, document.subcategory.as_deref())?
        else {
            debug!(path = %relative.display(), "owning category missing, skipping");
            return Ok(Applied::Ignored);
        };
        let Some(object_id) =
            db::object_id_by_slug(self.conn, category_id, subcategory_id, &document.object)?
        else {
            debug!(path = %relative.display(), "owning object missing, skipping");
            return Ok(Applied::Ignored);
        };

        let absolute = self.root.join(relative);
        let bytes = fs::read(&absolute)?;
        let content = String::from_utf8_lossy(&bytes).into_owned();
        let digest = hashing::hash_file(&absolute)?;

        let Some(filepath) = relative.to_str() else {
            return Ok(Applied::Ignored);
        };
        db::upsert_document(
            self.conn,
            &UpsertDocument {
                object_id,
                folder: document.folder.as_str(),
                filename: &document.filename,
                filepath,
                content: Some(&content),
                content_type: filetypes::content_type_for(relative),
                size_bytes: digest.size_bytes as i64,
                checksum: &digest.checksum,
                updated_at: &db::now_utc_timestamp(),
            },
        )?;
        info!(path = %relative.display(), size = digest.size_bytes, "synced document");
        Ok(Applied::Document)
    }

    /// Removes the single document row matching the deleted path. Directory
    /// deletions have no row with that filepath and fall through to a no-op;
    /// entity rows are never cascaded.
    pub fn handle_deletion(&self, relative: &Path) -> Result<Applied, IngestError> {
        let Some(filepath) = relative.to_str() else {
            return Ok(Applied::Ignored);
        };
        let removed = db::delete_document_by_filepath(self.conn, filepath)?;
        if removed > 0 {
            info!(path = %relative.display(), "removed document row for deleted file");
            Ok(Applied::Removed)
        } else {
            debug!(path = %relative.display(), "deletion did not match a document row");
            Ok(Applied::Ignored)
        }
    }

    fn resolve_scope(
        &self,
        category: &str,
        subcategory: Option<&str>,
    ) -> Result<Option<(i64, Option<i64>)>, IngestError> {
        let Some(category_id) = db::category_id_by_slug(self.conn, category)? else {
            return Ok(None);
        };
        // A named but missing subcategory degrades to the unscoped lookup,
        // matching the row resolution the CRUD layer performs.
        let subcategory_id = match subcategory {
            Some(slug) => db::subcategory_id_by_slug(self.conn, category_id, slug)?,
            None => None,
        };
        Ok(Some((category_id, subcategory_id)))
    }

    fn relativize(&self, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(&self.root).ok().map(Path::to_path_buf)
    }
}

#[derive(Debug)]
pub enum IngestError {
    Db(rusqlite::Error),
    Io(std::io::Error),
    Metadata(MetadataError),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Db(err) => write!(f, "database error: {}", err),
            IngestError::Io(err) => write!(f, "I/O error: {}", err),
            IngestError::Metadata(err) => write!(f, "metadata error: {}", err),
        }
    }
}

impl Error for IngestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            IngestError::Db(err) => Some(err),
            IngestError::Io(err) => Some(err),
            IngestError::Metadata(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for IngestError {
    fn from(value: rusqlite::Error) -> Self {
        IngestError::Db(value)
    }
}

impl From<std::io::Error> for IngestError {
    fn from(value: std::io::Error) -> Self {
        IngestError::Io(value)
    }
}

impl From<MetadataError> for IngestError {
    fn from(value: MetadataError) -> Self {
        IngestError::Metadata(value)
    }
}
