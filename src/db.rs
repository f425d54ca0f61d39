use std::time::Duration;

use rusqlite::{params, Connection, DatabaseName, OptionalExtension, Result};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

pub const CURRENT_SCHEMA_VERSION: i64 = 1;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: [Migration; 1] = [Migration {
    version: 1,
    name: "baseline_kms_schema_v1",
    sql: r#"
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    type TEXT NOT NULL DEFAULT 'product',
    description TEXT,
    metadata TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subcategories (
    id INTEGER PRIMARY KEY,
    category_id INTEGER NOT NULL REFERENCES categories(id),
    slug TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    metadata TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (category_id, slug)
);

CREATE TABLE IF NOT EXISTS objects (
    id INTEGER PRIMARY KEY,
    category_id INTEGER NOT NULL REFERENCES categories(id),
    subcategory_id INTEGER REFERENCES subcategories(id),
    slug TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    author TEXT,
    file_path TEXT,
    metadata TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (category_id, subcategory_id, slug)
);

CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY,
    object_id INTEGER NOT NULL REFERENCES objects(id),
    folder TEXT NOT NULL,
    filename TEXT NOT NULL,
    filepath TEXT NOT NULL,
    content TEXT,
    content_type TEXT,
    size_bytes INTEGER,
    checksum TEXT,
    version INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (object_id, folder, filename)
);

CREATE TABLE IF NOT EXISTS sync_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_updated_at ON documents(updated_at);
CREATE INDEX IF NOT EXISTS idx_documents_filepath ON documents(filepath);
CREATE INDEX IF NOT EXISTS idx_objects_category ON objects(category_id, subcategory_id);
"#,
}];

pub fn open_connection(path: &str) -> Result<Connection> {
    let mut conn = Connection::open(path)?;
    configure_for_shared_access(&conn)?;
    apply_migrations(&mut conn)?;
    Ok(conn)
}

// The CRUD API and importer write the same file; WAL plus a busy timeout keep
// this connection from failing on their transactions.
fn configure_for_shared_access(conn: &Connection) -> Result<()> {
    conn.pragma_update(None::<DatabaseName>, "journal_mode", "WAL")?;
    conn.pragma_update(None::<DatabaseName>, "synchronous", "NORMAL")?;
    conn.pragma_update(None::<DatabaseName>, "foreign_keys", "ON")?;
    conn.pragma_update(None::<DatabaseName>, "busy_timeout", 5000i64)?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

fn apply_migrations(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
"#,
    )?;

    for migration in MIGRATIONS {
        let already_applied: Option<i64> = tx
            .query_row(
                "SELECT version FROM schema_migrations WHERE version = ?1",
                params![migration.version],
                |row| row.get(0),
            )
            .optional()?;

        if already_applied.is_some() {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, now_utc_timestamp()],
        )?;
    }

    tx.execute(
        r#"
INSERT INTO sync_state (key, value)
VALUES ('schema_version', ?1)
ON CONFLICT(key) DO UPDATE SET value = excluded.value
"#,
        params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;

    tx.commit()
}

// Fixed-width UTC timestamps: lexicographic order on the stored TEXT equals
// chronological order, which the checkpoint comparison relies on.
const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
);

pub fn now_utc_timestamp() -> String {
    format_timestamp(OffsetDateTime::now_utc())
}

pub fn format_timestamp(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(&TIMESTAMP_FORMAT)
        .expect("UTC timestamp formatting should never fail")
}

pub fn get_sync_state(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM sync_state WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_sync_state(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        r#"
INSERT INTO sync_state (key, value)
VALUES (?1, ?2)
ON CONFLICT(key) DO UPDATE SET value = excluded.value
"#,
        params![key, value],
    )?;
    Ok(())
}

pub fn category_id_by_slug(conn: &Connection, slug: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM categories WHERE slug = ?1",
        params![slug],
        |row| row.get(0),
    )
    .optional()
}

pub fn subcategory_id_by_slug(
    conn: &Connection,
    category_id: i64,
    slug: &str,
) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM subcategories WHERE category_id = ?1 AND slug = ?2",
        params![category_id, slug],
        |row| row.get(0),
    )
    .optional()
}

pub fn object_id_by_slug(
    conn: &Connection,
    category_id: i64,
    subcategory_id: Option<i64>,
    slug: &str,
) -> Result<Option<i64>> {
    conn.query_row(
        r#"
SELECT id FROM objects
WHERE category_id = ?1
  AND COALESCE(subcategory_id, 0) = COALESCE(?2, 0)
  AND slug = ?3
"#,
        params![category_id, subcategory_id, slug],
        |row| row.get(0),
    )
    .optional()
}

pub struct CategoryPatch<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub metadata_json: &'a str,
}

/// Update-only: categories are born through the CRUD layer, never from a
/// sidecar edit. Returns whether a row was touched.
pub fn update_category_metadata(
    conn: &Connection,
    slug: &str,
    patch: &CategoryPatch<'_>,
) -> Result<bool> {
    let updated = conn.execute(
        r#"
UPDATE categories
SET name = ?1,
    description = ?2,
    metadata = ?3,
    updated_at = ?4
WHERE slug = ?5
"#,
        params![
            patch.name,
            patch.description,
            patch.metadata_json,
            now_utc_timestamp(),
            slug
        ],
    )?;
    Ok(updated > 0)
}

pub struct SubcategoryUpsert<'a> {
    pub category_id: i64,
    pub slug: &'a str,
    pub name: &'a str,
    pub description: &'a str,
    pub metadata_json: &'a str,
    pub is_active: bool,
}

/// Create-or-update: subcategory directories may be authored on the
/// filesystem first. An existing row keeps its `is_active` flag.
pub fn upsert_subcategory(conn: &Connection, args: &SubcategoryUpsert<'_>) -> Result<()> {
    let now = now_utc_timestamp();
    conn.execute(
        r#"
INSERT INTO subcategories (
    category_id, slug, name, description, metadata, is_active, created_at, updated_at
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
ON CONFLICT(category_id, slug) DO UPDATE SET
    name = excluded.name,
    description = excluded.description,
    metadata = excluded.metadata,
    updated_at = excluded.updated_at
"#,
        params![
            args.category_id,
            args.slug,
            args.name,
            args.description,
            args.metadata_json,
            args.is_active,
            now
        ],
    )?;
    Ok(())
}

pub struct ObjectPatch<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub status: &'a str,
    pub author: &'a str,
    pub metadata_json: &'a str,
}

/// Update-only, like categories. Scope equality treats a missing subcategory
/// as the literal scope 0 so NULL matches NULL.
pub fn update_object_metadata(
    conn: &Connection,
    category_id: i64,
    subcategory_id: Option<i64>,
    slug: &str,
    patch: &ObjectPatch<'_>,
) -> Result<bool> {
    let updated = conn.execute(
        r#"
UPDATE objects
SET name = ?1,
    description = ?2,
    status = ?3,
    author = ?4,
    metadata = ?5,
    updated_at = ?6
WHERE category_id = ?7
  AND COALESCE(subcategory_id, 0) = COALESCE(?8, 0)
  AND slug = ?9
"#,
        params![
            patch.name,
            patch.description,
            patch.status,
            patch.author,
            patch.metadata_json,
            now_utc_timestamp(),
            category_id,
            subcategory_id,
            slug
        ],
    )?;
    Ok(updated > 0)
}

pub struct UpsertDocument<'a> {
    pub object_id: i64,
    pub folder: &'a str,
    pub filename: &'a str,
    pub filepath: &'a str,
    pub content: Option<&'a str>,
    pub content_type: &'a str,
    pub size_bytes: i64,
    pub checksum: &'a str,
    pub updated_at: &'a str,
}

pub fn upsert_document(conn: &Connection, args: &UpsertDocument<'_>) -> Result<()> {
    conn.execute(
        r#"
INSERT INTO documents (
    object_id, folder, filename, filepath, content, content_type,
    size_bytes, checksum, created_at, updated_at
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
ON CONFLICT(object_id, folder, filename) DO UPDATE SET
    filepath = excluded.filepath,
    content = excluded.content,
    content_type = excluded.content_type,
    size_bytes = excluded.size_bytes,
    checksum = excluded.checksum,
    version = version + 1,
    updated_at = excluded.updated_at
"#,
        params![
            args.object_id,
            args.folder,
            args.filename,
            args.filepath,
            args.content,
            args.content_type,
            args.size_bytes,
            args.checksum,
            args.updated_at
        ],
    )?;
    Ok(())
}

pub fn delete_document_by_filepath(conn: &Connection, filepath: &str) -> Result<usize> {
    conn.execute(
        "DELETE FROM documents WHERE filepath = ?1",
        params![filepath],
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub id: i64,
    pub object_id: i64,
    pub folder: String,
    pub filename: String,
    pub filepath: String,
    pub content: Option<String>,
    pub content_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub checksum: Option<String>,
    pub version: i64,
    pub updated_at: String,
}

pub fn get_document(
    conn: &Connection,
    object_id: i64,
    folder: &str,
    filename: &str,
) -> Result<Option<DocumentRecord>> {
    conn.query_row(
        r#"
SELECT id, object_id, folder, filename, filepath, content, content_type,
       size_bytes, checksum, version, updated_at
FROM documents
WHERE object_id = ?1 AND folder = ?2 AND filename = ?3
"#,
        params![object_id, folder, filename],
        |row| {
            Ok(DocumentRecord {
                id: row.get(0)?,
                object_id: row.get(1)?,
                folder: row.get(2)?,
                filename: row.get(3)?,
                filepath: row.get(4)?,
                content: row.get(5)?,
                content_type: row.get(6)?,
                size_bytes: row.get(7)?,
                checksum: row.get(8)?,
                version: row.get(9)?,
                updated_at: row.get(10)?,
            })
        },
    )
    .optional()
}

/// A document changed since the checkpoint, joined to the slug chain needed
/// to rebuild its canonical path. Rows whose object no longer resolves are
/// dropped by the join, mirroring the per-row lookup skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedDocument {
    pub id: i64,
    pub folder: String,
    pub filename: String,
    pub filepath: String,
    pub content: Option<String>,
    pub updated_at: String,
    pub object_slug: String,
    pub category_slug: String,
    pub subcategory_slug: Option<String>,
}

pub fn documents_updated_since(
    conn: &Connection,
    checkpoint: &str,
) -> Result<Vec<ChangedDocument>> {
    let mut stmt = conn.prepare(
        r#"
SELECT d.id, d.folder, d.filename, d.filepath, d.content, d.updated_at,
       o.slug, c.slug, sc.slug
FROM documents d
JOIN objects o ON o.id = d.object_id
JOIN categories c ON c.id = o.category_id
LEFT JOIN subcategories sc ON sc.id = o.subcategory_id
WHERE d.updated_at > ?1
ORDER BY d.updated_at ASC, d.id ASC
"#,
    )?;

    let mut rows = stmt.query(params![checkpoint])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(ChangedDocument {
            id: row.get(0)?,
            folder: row.get(1)?,
            filename: row.get(2)?,
            filepath: row.get(3)?,
            content: row.get(4)?,
            updated_at: row.get(5)?,
            object_slug: row.get(6)?,
            category_slug: row.get(7)?,
            subcategory_slug: row.get(8)?,
        });
    }

    Ok(result)
}
