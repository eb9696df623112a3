//! Storage layer for taskplan: a single SQLite database.
//!
//! The submodules are row-level stores that take a `&Connection`, so every
//! operation runs the same way against the live connection or inside a
//! `Transaction` (which derefs to `Connection`).

pub(crate) mod edges;
pub(crate) mod facts;
pub(crate) mod plans;
pub(crate) mod tasks;

use crate::search;
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, Transaction};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Storage directory name.
pub const STORE_DIR: &str = ".taskplan";

/// SQLite database file.
pub const DB_FILE: &str = "taskplan.db";

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS plans (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT '',
        content TEXT NOT NULL DEFAULT '',
        completed INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        plan_id INTEGER NOT NULL REFERENCES plans(id),
        parent_id INTEGER REFERENCES tasks(id),
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        content TEXT NOT NULL DEFAULT '',
        acceptance_criteria TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'in_progress', 'completed', 'failed', 'blocked', 'skipped')),
        priority INTEGER NOT NULL DEFAULT 100 CHECK (priority >= 0),
        completed INTEGER NOT NULL DEFAULT 0,
        status_changed_at TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (plan_id, name)
    );
    CREATE INDEX IF NOT EXISTS idx_tasks_plan_status ON tasks(plan_id, status, priority);
    CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_id);

    CREATE TABLE IF NOT EXISTS facts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        plan_id INTEGER NOT NULL REFERENCES plans(id),
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        content TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (plan_id, name)
    );

    CREATE TABLE IF NOT EXISTS dependencies (
        blocker_id INTEGER NOT NULL REFERENCES tasks(id),
        blocked_id INTEGER NOT NULL REFERENCES tasks(id),
        kind TEXT NOT NULL DEFAULT 'blocks' CHECK (kind IN ('blocks')),
        created_at TEXT NOT NULL,
        PRIMARY KEY (blocker_id, blocked_id),
        CHECK (blocker_id != blocked_id)
    );
    CREATE INDEX IF NOT EXISTS idx_dependencies_blocked ON dependencies(blocked_id);

    CREATE TABLE IF NOT EXISTS fact_links (
        fact_id INTEGER NOT NULL REFERENCES facts(id),
        task_id INTEGER NOT NULL REFERENCES tasks(id),
        kind TEXT NOT NULL
            CHECK (kind IN ('informs', 'discovered_during', 'blocks', 'required_context')),
        created_at TEXT NOT NULL,
        PRIMARY KEY (fact_id, task_id, kind)
    );
    CREATE INDEX IF NOT EXISTS idx_fact_links_task ON fact_links(task_id);

    CREATE TABLE IF NOT EXISTS status_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER NOT NULL REFERENCES tasks(id),
        from_status TEXT NOT NULL,
        to_status TEXT NOT NULL,
        changed_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_status_history_task ON status_history(task_id);
"#;

/// Storage handle owning the SQLite connection.
pub struct Storage {
    db: Connection,
}

impl Storage {
    /// Initialize storage in the given directory.
    pub fn init(root: &Path) -> Result<Self> {
        let store_dir = root.join(STORE_DIR);
        fs::create_dir_all(&store_dir).context("Failed to create .taskplan directory")?;

        let db = Connection::open(store_dir.join(DB_FILE)).context("Failed to open SQLite database")?;
        Self::with_connection(db)
    }

    /// Open existing storage.
    pub fn open(root: &Path) -> Result<Self> {
        let db_path = Self::db_path(root);
        if !db_path.exists() {
            eyre::bail!("No .taskplan store found in {}. Run 'tp init' first.", root.display());
        }

        let db = Connection::open(&db_path).context("Failed to open SQLite database")?;
        Self::with_connection(db)
    }

    /// Open a throwaway in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(db)
    }

    /// Location of the database file for a store rooted at `root`.
    pub fn db_path(root: &Path) -> PathBuf {
        root.join(STORE_DIR).join(DB_FILE)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        db.busy_timeout(BUSY_TIMEOUT)?;
        db.pragma_update(None, "foreign_keys", true)
            .context("Failed to enable foreign keys")?;

        let storage = Self { db };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Initialize SQLite schema, including the search index and its triggers.
    fn init_schema(&self) -> Result<()> {
        self.db.execute_batch(SCHEMA).context("Failed to initialize schema")?;
        self.db
            .execute_batch(search::SCHEMA)
            .context("Failed to initialize search index")?;
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.db
    }

    /// Begin a transaction. Dropping it without `commit` rolls back.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        self.db.transaction().context("Failed to begin transaction")
    }
}

/// Format a timestamp for storage.
pub(crate) fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Read an RFC 3339 timestamp column.
pub(crate) fn parse_timestamp(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a text column holding one of the crate's `FromStr` enums.
pub(crate) fn parse_enum<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
