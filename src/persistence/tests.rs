use tempfile::NamedTempFile;

use super::sqlite::{BidStore, BidStoreConfig};
use super::{BidDraft, BidStatus, PersistenceError};
use crate::estimate::{LineItem, RoomDimensions};

fn item(description: &str, quantity: f64, unit_price: f64) -> LineItem {
    LineItem {
        description: description.to_string(),
        quantity,
        unit_price,
    }
}

fn sample_draft(user_id: &str) -> BidDraft {
    let mut draft = BidDraft::new(
        user_id,
        "Living Room Repaint",
        vec![
            item("Wall Painting (Standard)", 320.0, 2.50),
            item("Window Trim (x2)", 2.0, 45.0),
        ],
    );
    draft.address = Some("123 Main St".into());
    draft.dimensions = Some(RoomDimensions {
        length: 12.0,
        width: 10.0,
        height: 8.0,
    });
    draft
}

#[test]
fn bootstrap_runs_migrations() {
    let store = BidStore::bootstrap(BidStoreConfig::memory()).expect("bootstrap should succeed");
    let conn = store.connection().expect("connection available");

    let tables: i64 = conn
        .query_row(
            "SELECT count(*) FROM sqlite_master WHERE name IN ('bids', 'bid_items')",
            [],
            |row| row.get(0),
        )
        .expect("bid tables should exist");
    assert_eq!(tables, 2);
}

#[test]
fn migrations_are_idempotent() {
    let store = BidStore::bootstrap(BidStoreConfig::memory()).expect("bootstrap should succeed");
    let mut conn = store.connection().expect("connection available");
    BidStore::run_migrations_for_tests(&mut conn).expect("rerun migrations");
    BidStore::run_migrations_for_tests(&mut conn).expect("third run succeeds");

    let bid_cols: i64 = conn
        .query_row(
            "SELECT count(*) FROM pragma_table_info('bids')",
            [],
            |row| row.get(0),
        )
        .expect("schema introspection");
    assert!(bid_cols >= 9, "bids table should retain columns");
}

#[test]
fn save_bid_round_trips_header_and_items() {
    let store = BidStore::bootstrap(BidStoreConfig::memory()).expect("bootstrap should succeed");
    let draft = sample_draft("user-1");

    let saved = store.save_bid(&draft).expect("save should succeed");
    assert!(!saved.id.is_empty());
    assert!(saved.created_at_ms > 0);
    assert_eq!(saved.estimated_cost, 890.0);

    let loaded = store.load_bid(&saved.id).expect("bid should load");
    assert_eq!(loaded.project_name, "Living Room Repaint");
    assert_eq!(loaded.items.len(), 2);
    assert_eq!(loaded.items[0].description, "Wall Painting (Standard)");
    assert_eq!(loaded.items[1].total(), 90.0);
    assert_eq!(loaded.status, BidStatus::Generated);
    assert_eq!(
        loaded.dimensions,
        Some(RoomDimensions {
            length: 12.0,
            width: 10.0,
            height: 8.0,
        })
    );
}

#[test]
fn item_totals_are_derived_in_storage() {
    let store = BidStore::bootstrap(BidStoreConfig::memory()).expect("bootstrap should succeed");
    let saved = store
        .save_bid(&sample_draft("user-totals"))
        .expect("save should succeed");

    let conn = store.connection().expect("connection available");
    let stored_total: f64 = conn
        .query_row(
            "SELECT total FROM bid_items WHERE bid_id = ?1 AND description = 'Window Trim (x2)'",
            [&saved.id],
            |row| row.get(0),
        )
        .expect("generated total column readable");
    assert_eq!(stored_total, 90.0);
}

#[test]
fn failed_item_insert_rolls_back_header() {
    let store = BidStore::bootstrap(BidStoreConfig::memory()).expect("bootstrap should succeed");

    // The second item violates the quantity check constraint, so its insert
    // fails after the header and first item are already written.
    let bad_item = LineItem {
        description: "Ceiling Texture Repair".into(),
        quantity: -1.0,
        unit_price: 90.0,
    };
    let mut draft = BidDraft::new(
        "user-atomic",
        "Atomicity Check",
        vec![item("Wall Painting (Standard)", 320.0, 2.50), bad_item],
    );
    draft.estimated_cost = draft.items.iter().map(LineItem::total).sum();

    let err = store.save_bid(&draft).expect_err("save must fail");
    assert!(matches!(err, PersistenceError::Storage { .. }));
    assert_eq!(err.status_code(), 500);

    let bids = store.list_bids("user-atomic").expect("listing succeeds");
    assert!(bids.is_empty(), "no header row may survive the rollback");

    let conn = store.connection().expect("connection available");
    let orphans: i64 = conn
        .query_row("SELECT count(*) FROM bid_items", [], |row| row.get(0))
        .expect("orphan check");
    assert_eq!(orphans, 0, "no item rows may survive the rollback");
}

#[test]
fn validation_errors_map_to_client_status() {
    let store = BidStore::bootstrap(BidStoreConfig::memory()).expect("bootstrap should succeed");

    let missing_name = BidDraft::new("user-2", "  ", vec![item("Prep", 1.0, 10.0)]);
    let err = store.save_bid(&missing_name).expect_err("must reject");
    assert!(matches!(err, PersistenceError::Validation { .. }));
    assert_eq!(err.status_code(), 400);

    let mut drifted = sample_draft("user-2");
    drifted.estimated_cost += 50.0;
    let err = store.save_bid(&drifted).expect_err("must reject drift");
    assert_eq!(err.status_code(), 400);

    let bids = store.list_bids("user-2").expect("listing succeeds");
    assert!(bids.is_empty(), "rejected drafts leave no rows");
}

#[test]
fn list_bids_returns_newest_first() {
    let store = BidStore::bootstrap(BidStoreConfig::memory()).expect("bootstrap should succeed");

    let first = store
        .save_bid(&BidDraft::new(
            "user-list",
            "First Project",
            vec![item("Prep", 1.0, 10.0)],
        ))
        .expect("first save");
    let second = store
        .save_bid(&BidDraft::new(
            "user-list",
            "Second Project",
            vec![item("Prep", 1.0, 10.0)],
        ))
        .expect("second save");

    // Force distinct ordering even when both saves land in the same
    // millisecond.
    let conn = store.connection().expect("connection available");
    conn.execute(
        "UPDATE bids SET created_at_ms = created_at_ms + 10 WHERE id = ?1",
        [&second.id],
    )
    .expect("timestamp adjust");

    let bids = store.list_bids("user-list").expect("listing succeeds");
    assert_eq!(bids.len(), 2);
    assert_eq!(bids[0].id, second.id);
    assert_eq!(bids[1].id, first.id);
    assert_eq!(bids[0].items.len(), 1);

    let other = store.list_bids("someone-else").expect("listing succeeds");
    assert!(other.is_empty());
}

#[test]
fn load_bid_reports_missing_id() {
    let store = BidStore::bootstrap(BidStoreConfig::memory()).expect("bootstrap should succeed");
    let err = store.load_bid("no-such-bid").expect_err("must miss");
    assert!(matches!(err, PersistenceError::NotFound { .. }));
    assert_eq!(err.status_code(), 404);
}

#[test]
fn file_backed_store_survives_reopen() {
    let temp = NamedTempFile::new().expect("temp file");
    let config = BidStoreConfig::file(temp.path());

    let saved = {
        let store = BidStore::bootstrap(config.clone()).expect("bootstrap should succeed");
        store
            .save_bid(&sample_draft("user-file"))
            .expect("save should succeed")
    };

    let reopened = BidStore::bootstrap(config).expect("reopen should succeed");
    let loaded = reopened.load_bid(&saved.id).expect("bid should persist");
    assert_eq!(loaded.items.len(), 2);
    assert_eq!(loaded.estimated_cost, 890.0);
}
