use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::params;
use uuid::Uuid;

use crate::db::tests::{open_test_connection, seed_category, seed_object, seed_subcategory};
use crate::db::{self, UpsertDocument};
use crate::ingest::IngestService;
use crate::watcher::FsChange;

use super::{ReconcileService, CHECKPOINT_KEY};

fn temp_root() -> PathBuf {
    let root = std::env::temp_dir().join(format!("kmsd-reconcile-test-{}", Uuid::now_v7()));
    fs::create_dir_all(root.join("categories")).expect("temp tree should be creatable");
    root
}

fn write_tree_file(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let absolute = root.join(relative);
    fs::create_dir_all(absolute.parent().unwrap()).expect("parent directories should create");
    fs::write(&absolute, contents).expect("tree file should write");
    absolute
}

fn cleanup(root: &Path) {
    let _ = fs::remove_dir_all(root);
}

fn set_checkpoint(conn: &rusqlite::Connection, value: &str) {
    db::set_sync_state(conn, CHECKPOINT_KEY, value).unwrap();
}

#[test]
fn database_edit_lands_on_disk_byte_for_byte() {
    let conn = open_test_connection();
    let root = temp_root();
    let category = seed_category(&conn, "odoo");
    seed_object(&conn, category, None, "myproj");
    let ingest = IngestService::new(&conn, &root);
    let reconciler = ReconcileService::new(&conn, &root);

    let absolute = write_tree_file(&root, "categories/odoo/objects/myproj/docs/readme.md", "Hello");
    ingest.apply(&FsChange::Created(absolute.clone())).unwrap();
    set_checkpoint(&conn, "2000-01-01T00:00:00.000000Z");

    conn.execute(
        "UPDATE documents SET content = 'Hello world', updated_at = ?1 WHERE filename = 'readme.md'",
        params![db::now_utc_timestamp()],
    )
    .unwrap();

    let summary = reconciler.run_pass().unwrap();
    assert_eq!(summary.written, 1);
    assert_eq!(fs::read_to_string(&absolute).unwrap(), "Hello world");
    cleanup(&root);
}

#[test]
fn second_pass_writes_nothing() {
    let conn = open_test_connection();
    let root = temp_root();
    let category = seed_category(&conn, "odoo");
    seed_object(&conn, category, None, "myproj");
    let ingest = IngestService::new(&conn, &root);
    let reconciler = ReconcileService::new(&conn, &root);

    let absolute = write_tree_file(&root, "categories/odoo/objects/myproj/docs/readme.md", "Hello");
    ingest.apply(&FsChange::Created(absolute)).unwrap();
    set_checkpoint(&conn, "2000-01-01T00:00:00.000000Z");

    let first = reconciler.run_pass().unwrap();
    assert_eq!(first.examined, 1);
    assert_eq!(first.written, 0, "disk already matches the row");

    let second = reconciler.run_pass().unwrap();
    assert_eq!(second.examined, 0, "checkpoint advanced past the row");
    assert_eq!(second.written, 0);
    cleanup(&root);
}

#[test]
fn missing_file_is_regenerated() {
    let conn = open_test_connection();
    let root = temp_root();
    let category = seed_category(&conn, "infra");
    let subcategory = seed_subcategory(&conn, category, "network");
    let object = seed_object(&conn, category, Some(subcategory), "fw");
    let reconciler = ReconcileService::new(&conn, &root);
    set_checkpoint(&conn, "2000-01-01T00:00:00.000000Z");

    db::upsert_document(
        &conn,
        &UpsertDocument {
            object_id: object,
            folder: "plany",
            filename: "q3.md",
            filepath: "categories/infra/subcategories/network/objects/fw/plany/q3.md",
            content: Some("quarterly plan"),
            content_type: "text/markdown",
            size_bytes: 14,
            checksum: "c",
            updated_at: &db::now_utc_timestamp(),
        },
    )
    .unwrap();

    let summary = reconciler.run_pass().unwrap();
    assert_eq!(summary.written, 1);
    let regenerated =
        root.join("categories/infra/subcategories/network/objects/fw/plany/q3.md");
    assert_eq!(fs::read_to_string(regenerated).unwrap(), "quarterly plan");
    cleanup(&root);
}

#[test]
fn rows_at_the_checkpoint_boundary_are_not_reprocessed() {
    let conn = open_test_connection();
    let root = temp_root();
    let category = seed_category(&conn, "odoo");
    let object = seed_object(&conn, category, None, "myproj");
    let reconciler = ReconcileService::new(&conn, &root);

    // Two rows inside the same wall-clock second, one at the watermark and
    // one a microsecond later.
    for (filename, updated_at) in [
        ("at.md", "2026-03-01T09:15:30.000000Z"),
        ("after.md", "2026-03-01T09:15:30.000001Z"),
    ] {
        db::upsert_document(
            &conn,
            &UpsertDocument {
                object_id: object,
                folder: "docs",
                filename,
                filepath: &format!("categories/odoo/objects/myproj/docs/{}", filename),
                content: Some("content"),
                content_type: "text/markdown",
                size_bytes: 7,
                checksum: "c",
                updated_at,
            },
        )
        .unwrap();
    }
    set_checkpoint(&conn, "2026-03-01T09:15:30.000000Z");

    let summary = reconciler.run_pass().unwrap();
    assert_eq!(summary.examined, 1, "only the strictly-later row qualifies");
    assert!(!root.join("categories/odoo/objects/myproj/docs/at.md").exists());
    assert!(root.join("categories/odoo/objects/myproj/docs/after.md").exists());
    cleanup(&root);
}

#[test]
fn first_run_initializes_checkpoint_without_replaying_history() {
    let conn = open_test_connection();
    let root = temp_root();
    let category = seed_category(&conn, "odoo");
    let object = seed_object(&conn, category, None, "myproj");

    db::upsert_document(
        &conn,
        &UpsertDocument {
            object_id: object,
            folder: "docs",
            filename: "old.md",
            filepath: "categories/odoo/objects/myproj/docs/old.md",
            content: Some("ancient"),
            content_type: "text/markdown",
            size_bytes: 7,
            checksum: "c",
            updated_at: "2020-01-01T00:00:00.000000Z",
        },
    )
    .unwrap();

    let reconciler = ReconcileService::new(&conn, &root);
    let summary = reconciler.run_pass().unwrap();
    assert_eq!(summary.examined, 0);
    assert!(db::get_sync_state(&conn, CHECKPOINT_KEY).unwrap().is_some());
    assert!(!root.join("categories/odoo/objects/myproj/docs/old.md").exists());
    cleanup(&root);
}

#[test]
fn null_content_rows_are_skipped() {
    let conn = open_test_connection();
    let root = temp_root();
    let category = seed_category(&conn, "odoo");
    let object = seed_object(&conn, category, None, "myproj");
    let reconciler = ReconcileService::new(&conn, &root);
    set_checkpoint(&conn, "2000-01-01T00:00:00.000000Z");

    db::upsert_document(
        &conn,
        &UpsertDocument {
            object_id: object,
            folder: "docs",
            filename: "empty.md",
            filepath: "categories/odoo/objects/myproj/docs/empty.md",
            content: None,
            content_type: "text/markdown",
            size_bytes: 0,
            checksum: "c",
            updated_at: &db::now_utc_timestamp(),
        },
    )
    .unwrap();

    let summary = reconciler.run_pass().unwrap();
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.written, 0);
    cleanup(&root);
}

// Full lifecycle: file birth flows into the database, a database edit flows
// back to disk, and an external deletion removes the row.
#[test]
fn round_trip_scenario() {
    let conn = open_test_connection();
    let root = temp_root();
    let category = seed_category(&conn, "odoo");
    let object = seed_object(&conn, category, None, "myproj");
    let ingest = IngestService::new(&conn, &root);
    let reconciler = ReconcileService::new(&conn, &root);

    let absolute = write_tree_file(&root, "categories/odoo/objects/myproj/docs/readme.md", "Hello");
    ingest.apply(&FsChange::Created(absolute.clone())).unwrap();

    let record = db::get_document(&conn, object, "docs", "readme.md")
        .unwrap()
        .expect("document row should exist");
    assert_eq!(
        record.checksum.as_deref(),
        Some(crate::hashing::hash_bytes(b"Hello").as_str())
    );
    assert_eq!(record.size_bytes, Some(5));

    set_checkpoint(&conn, "2000-01-01T00:00:00.000000Z");
    conn.execute(
        "UPDATE documents SET content = 'Hello world', updated_at = ?1 WHERE id = ?2",
        params![db::now_utc_timestamp(), record.id],
    )
    .unwrap();
    reconciler.run_pass().unwrap();
    assert_eq!(fs::read_to_string(&absolute).unwrap(), "Hello world");

    fs::remove_file(&absolute).unwrap();
    ingest.apply(&FsChange::Deleted(absolute)).unwrap();
    assert!(db::get_document(&conn, object, "docs", "readme.md")
        .unwrap()
        .is_none());
    cleanup(&root);
}
