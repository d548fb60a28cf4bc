use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use uuid::Uuid;

use crate::estimate::LineItem;
use crate::telemetry::events::{record_bid_save_failed, record_bid_saved};

use super::{Bid, BidDraft, BidStatus, PersistenceError};

/// Tolerance when comparing a draft's estimated cost to its item totals.
const COST_EPSILON: f64 = 0.005;

/// Storage location configuration for the bid database.
#[derive(Debug, Clone)]
pub enum SqlitePath {
    File(PathBuf),
    Memory,
}

impl SqlitePath {
    fn to_manager(&self) -> SqliteConnectionManager {
        match self {
            SqlitePath::File(path) => {
                SqliteConnectionManager::file(path).with_flags(Self::open_flags())
            }
            SqlitePath::Memory => SqliteConnectionManager::memory().with_flags(Self::open_flags()),
        }
    }

    fn open_flags() -> OpenFlags {
        OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX
    }

    fn as_path(&self) -> Option<&Path> {
        match self {
            SqlitePath::File(path) => Some(path.as_path()),
            SqlitePath::Memory => None,
        }
    }
}

/// Configuration required to bootstrap the bid store.
#[derive(Debug, Clone)]
pub struct BidStoreConfig {
    pub path: SqlitePath,
    pub pool_size: u32,
    pub busy_timeout: Duration,
}

impl BidStoreConfig {
    pub fn memory() -> Self {
        Self {
            path: SqlitePath::Memory,
            pool_size: 4,
            busy_timeout: Duration::from_millis(250),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: SqlitePath::File(path.into()),
            ..Self::memory()
        }
    }
}

/// Handle that manages SQLite backed bid persistence.
#[derive(Clone)]
pub struct BidStore {
    pool: Pool<SqliteConnectionManager>,
    db_path: Option<PathBuf>,
}

impl BidStore {
    /// Bootstraps a connection pool and runs the database migrations.
    pub fn bootstrap(config: BidStoreConfig) -> Result<Self> {
        let busy_timeout = config.busy_timeout;
        let manager = config
            .path
            .to_manager()
            .with_init(move |conn| Self::configure_connection(conn, busy_timeout));

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(Duration::from_secs(5))
            .build(manager)
            .context("failed to create bid store connection pool")?;

        {
            let mut conn = pool
                .get()
                .context("failed to acquire bid store bootstrap connection")?;
            Self::run_migrations(&mut conn)?;
        }

        Ok(Self {
            pool,
            db_path: config.path.as_path().map(Path::to_path_buf),
        })
    }

    /// Provides access to a pooled connection for custom commands.
    pub fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|err| anyhow!("failed to obtain bid store connection: {err}"))
    }

    fn configure_connection(conn: &mut Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
        Ok(())
    }

    fn run_migrations(conn: &mut Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS bids (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                client_id TEXT,
                project_name TEXT NOT NULL,
                address TEXT,
                dimensions TEXT,
                estimated_cost REAL NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'generated',
                created_at_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS bids_user_created
                ON bids(user_id, created_at_ms DESC);

            CREATE TABLE IF NOT EXISTS bid_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                bid_id TEXT NOT NULL REFERENCES bids(id) ON DELETE CASCADE,
                description TEXT NOT NULL,
                quantity REAL NOT NULL DEFAULT 1 CHECK (quantity > 0),
                unit_price REAL NOT NULL DEFAULT 0 CHECK (unit_price >= 0),
                total REAL GENERATED ALWAYS AS (quantity * unit_price) STORED
            );

            CREATE INDEX IF NOT EXISTS bid_items_bid ON bid_items(bid_id);
            "#,
        )
        .context("failed to run bid store migrations")?;

        Ok(())
    }

    /// Persists a bid header and its line items as one transaction. On any
    /// failure nothing is committed; readers never observe a header without
    /// its items or items without a header.
    pub fn save_bid(&self, draft: &BidDraft) -> Result<Bid, PersistenceError> {
        if let Err(err) = Self::validate_draft(draft) {
            record_bid_save_failed(err.status_code(), &err.to_string());
            return Err(err);
        }

        match self.save_bid_tx(draft) {
            Ok(bid) => {
                record_bid_saved(&bid.id, bid.items.len(), bid.estimated_cost);
                Ok(bid)
            }
            Err(err) => {
                let err = PersistenceError::from(err);
                record_bid_save_failed(err.status_code(), &err.to_string());
                Err(err)
            }
        }
    }

    fn save_bid_tx(&self, draft: &BidDraft) -> Result<Bid> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .context("failed to open transaction for bid save")?;

        let id = Uuid::new_v4().to_string();
        let created_at_ms = now_ms();
        let dimensions = draft
            .dimensions
            .map(|dims| serde_json::to_string(&dims))
            .transpose()
            .context("failed to serialize room dimensions")?;

        tx.execute(
            "INSERT INTO bids (
                id,
                user_id,
                client_id,
                project_name,
                address,
                dimensions,
                estimated_cost,
                status,
                created_at_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                draft.user_id,
                draft.client_id.as_deref(),
                draft.project_name,
                draft.address.as_deref(),
                dimensions.as_deref(),
                draft.estimated_cost,
                draft.status.as_str(),
                created_at_ms,
            ],
        )
        .context("failed to insert bid header")?;

        for item in &draft.items {
            tx.execute(
                "INSERT INTO bid_items (bid_id, description, quantity, unit_price)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, item.description, item.quantity, item.unit_price],
            )
            .with_context(|| format!("failed to insert bid line item '{}'", item.description))?;
        }

        tx.commit().context("failed to commit bid save")?;

        Ok(Bid {
            id,
            user_id: draft.user_id.clone(),
            client_id: draft.client_id.clone(),
            project_name: draft.project_name.clone(),
            address: draft.address.clone(),
            dimensions: draft.dimensions,
            items: draft.items.clone(),
            estimated_cost: draft.estimated_cost,
            status: draft.status,
            created_at_ms,
        })
    }

    fn validate_draft(draft: &BidDraft) -> Result<(), PersistenceError> {
        if draft.user_id.trim().is_empty() {
            return Err(PersistenceError::validation("user id is required"));
        }
        if draft.project_name.trim().is_empty() {
            return Err(PersistenceError::validation("project name is required"));
        }
        for item in &draft.items {
            if item.description.trim().is_empty() {
                return Err(PersistenceError::validation(
                    "line item description cannot be empty",
                ));
            }
        }

        let item_total: f64 = draft.items.iter().map(LineItem::total).sum();
        if (draft.estimated_cost - item_total).abs() > COST_EPSILON {
            return Err(PersistenceError::validation(format!(
                "estimated cost {:.2} does not match item totals {:.2}",
                draft.estimated_cost, item_total
            )));
        }

        Ok(())
    }

    /// Returns all bids for a user, newest first, items included.
    pub fn list_bids(&self, user_id: &str) -> Result<Vec<Bid>, PersistenceError> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, client_id, project_name, address, dimensions,
                    estimated_cost, status, created_at_ms
                 FROM bids WHERE user_id = ?1
                 ORDER BY created_at_ms DESC, id",
            )
            .context("failed to prepare bid listing query")?;

        let mut rows = stmt
            .query(params![user_id])
            .context("failed to run bid listing query")?;
        let mut bids = Vec::new();
        while let Some(row) = rows.next().context("failed to read bid row")? {
            bids.push(Self::read_bid_header(row).context("failed to decode bid row")?);
        }

        for bid in &mut bids {
            bid.items = Self::load_items(&conn, &bid.id)?;
        }

        Ok(bids)
    }

    /// Loads one bid with its items; `NotFound` when the id is unknown.
    pub fn load_bid(&self, id: &str) -> Result<Bid, PersistenceError> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, client_id, project_name, address, dimensions,
                    estimated_cost, status, created_at_ms
                 FROM bids WHERE id = ?1",
            )
            .context("failed to prepare bid load query")?;

        let header = stmt
            .query_row(params![id], |row| Self::read_bid_header(row))
            .optional()
            .context("failed to load bid header")?;

        let mut bid = header.ok_or_else(|| PersistenceError::NotFound { id: id.to_string() })?;
        bid.items = Self::load_items(&conn, &bid.id)?;
        Ok(bid)
    }

    fn load_items(conn: &Connection, bid_id: &str) -> Result<Vec<LineItem>, PersistenceError> {
        let mut stmt = conn
            .prepare(
                "SELECT description, quantity, unit_price
                 FROM bid_items WHERE bid_id = ?1 ORDER BY id",
            )
            .context("failed to prepare line item query")?;

        let mut rows = stmt
            .query(params![bid_id])
            .context("failed to run line item query")?;
        let mut items = Vec::new();
        while let Some(row) = rows.next().context("failed to read line item row")? {
            items.push(LineItem {
                description: row.get(0).context("line item description column")?,
                quantity: row.get(1).context("line item quantity column")?,
                unit_price: row.get(2).context("line item unit price column")?,
            });
        }
        Ok(items)
    }

    fn read_bid_header(row: &Row) -> rusqlite::Result<Bid> {
        let dimensions = row
            .get::<_, Option<String>>("dimensions")?
            .and_then(|json| serde_json::from_str(&json).ok());
        let status: String = row.get("status")?;

        Ok(Bid {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            client_id: row.get("client_id")?,
            project_name: row.get("project_name")?,
            address: row.get("address")?,
            dimensions,
            items: Vec::new(),
            estimated_cost: row.get("estimated_cost")?,
            status: BidStatus::from_db(&status),
            created_at_ms: row.get("created_at_ms")?,
        })
    }

    pub fn database_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
impl BidStore {
    pub fn run_migrations_for_tests(conn: &mut Connection) -> Result<()> {
        Self::run_migrations(conn)
    }
}
