//! SQLite Database
//!
//! Embedded database for persistent storage using rusqlite with r2d2
//! connection pooling. Owns the schema, the per-project writer locks and the
//! transaction protocol; entity operations live in the sibling modules
//! (`nodes`, `snapshots`, `baselines`) as further `impl Database` blocks.

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::models::{
    ChangeLogEntry, ChangeOperation, Metadata, NewChange, Project, ProjectPatch,
};
use crate::models::settings::{AppConfig, LimitSettings};
use crate::utils::deadline::Deadline;
use crate::utils::error::{AppError, AppResult};
use crate::utils::locks::{acquire, LockRegistry};
use crate::utils::paths::database_path;

/// Type alias for the connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database service for managing SQLite operations
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    writers: LockRegistry<String>,
    limits: LimitSettings,
}

/// Current time as an RFC 3339 UTC string.
pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Decode a `metadata` JSON column, reporting the owning row on failure.
pub(crate) fn decode_metadata(table: &str, id: &str, raw: &str) -> AppResult<Metadata> {
    serde_json::from_str(raw)
        .map_err(|e| AppError::corruption(format!("{}.metadata of {}: {}", table, id, e)))
}

pub(crate) fn encode_metadata(metadata: &Metadata) -> AppResult<String> {
    Ok(serde_json::to_string(metadata)?)
}

pub(crate) fn project_exists(conn: &Connection, project_id: &str) -> AppResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM projects WHERE id = ?1",
            params![project_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Append one change-log row and return its id.
pub(crate) fn append_change(conn: &Connection, change: &NewChange) -> AppResult<i64> {
    let old_value = change
        .old_value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let new_value = change
        .new_value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT INTO changes_log (project_id, node_id, operation, old_value, new_value, timestamp, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            change.project_id,
            change.node_id,
            change.operation.as_str(),
            old_value,
            new_value,
            now(),
            encode_metadata(&change.metadata)?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Raw change-log row from the database
struct ChangeRow {
    id: i64,
    project_id: String,
    node_id: Option<String>,
    operation: String,
    old_value: Option<String>,
    new_value: Option<String>,
    timestamp: String,
    metadata: String,
}

impl ChangeRow {
    fn into_entry(self) -> AppResult<ChangeLogEntry> {
        let decode = |raw: Option<String>, column: &str| -> AppResult<_> {
            raw.map(|s| {
                serde_json::from_str(&s).map_err(|e| {
                    AppError::corruption(format!("changes_log.{} of {}: {}", column, self.id, e))
                })
            })
            .transpose()
        };
        let old_value = decode(self.old_value.clone(), "old_value")?;
        let new_value = decode(self.new_value.clone(), "new_value")?;
        Ok(ChangeLogEntry {
            id: self.id,
            operation: ChangeOperation::parse(&self.operation)?,
            metadata: decode_metadata("changes_log", &self.id.to_string(), &self.metadata)?,
            project_id: self.project_id,
            node_id: self.node_id,
            old_value,
            new_value,
            timestamp: self.timestamp,
        })
    }
}

/// Raw project row from the database
struct ProjectRow {
    id: String,
    name: String,
    created_at: String,
    updated_at: String,
    metadata: String,
}

impl ProjectRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
            metadata: row.get(4)?,
        })
    }

    fn into_project(self) -> AppResult<Project> {
        Ok(Project {
            metadata: decode_metadata("projects", &self.id, &self.metadata)?,
            id: self.id,
            name: self.name,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn find_project(conn: &Connection, id: &str) -> AppResult<Option<Project>> {
    let row = conn
        .query_row(
            "SELECT id, name, created_at, updated_at, metadata FROM projects WHERE id = ?1",
            params![id],
            ProjectRow::from_row,
        )
        .optional()?;
    row.map(ProjectRow::into_project).transpose()
}

impl Database {
    /// Create an in-memory database for testing.
    ///
    /// Uses an in-memory SQLite database with the same schema as the
    /// production database. The pool holds exactly one connection that is
    /// never recycled, since each in-memory connection is its own database.
    pub fn new_in_memory() -> AppResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self {
            pool,
            writers: LockRegistry::new(),
            limits: LimitSettings::default(),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Create a new database instance at the default location (~/.codeviz/data.db)
    pub fn new() -> AppResult<Self> {
        Self::open(&database_path()?)
    }

    /// Open the database named by the configuration, or the default one.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let db = match &config.database_path {
            Some(path) => Self::open(path)?,
            None => Self::new()?,
        };
        Ok(db.with_limits(config.limits.clone()))
    }

    pub fn with_limits(mut self, limits: LimitSettings) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &LimitSettings {
        &self.limits
    }

    /// Deadline for snapshot capture and restore from `limits.snapshot_timeout_ms`
    pub fn snapshot_deadline(&self) -> Deadline {
        Deadline::from_millis(Some(self.limits.snapshot_timeout_ms))
    }

    /// Open (creating if needed) a file-backed database with connection pooling
    pub fn open(db_path: &Path) -> AppResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 PRAGMA journal_mode = WAL;
                 PRAGMA busy_timeout = 5000;",
            )
        });
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self {
            pool,
            writers: LockRegistry::new(),
            limits: LimitSettings::default(),
        };
        db.init_schema()?;
        tracing::info!("[Database] Opened {}", db_path.display());

        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> AppResult<()> {
        let conn = self.get_connection()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                parent_id TEXT,
                path TEXT NOT NULL,
                value TEXT NOT NULL,
                type TEXT,
                language TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                UNIQUE (project_id, path),
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
                FOREIGN KEY (parent_id) REFERENCES nodes(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_nodes_project_id ON nodes(project_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_nodes_parent_id ON nodes(parent_id)",
            [],
        )?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_nodes_path ON nodes(path)", [])?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS snapshots (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                data TEXT NOT NULL,
                node_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_snapshots_project_id ON snapshots(project_id)",
            [],
        )?;

        // project_id deliberately carries no foreign key: log rows outlive
        // their project for audit.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS changes_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                node_id TEXT,
                operation TEXT NOT NULL CHECK (operation IN ('CREATE', 'UPDATE', 'DELETE')),
                old_value TEXT,
                new_value TEXT,
                timestamp TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                FOREIGN KEY (node_id) REFERENCES nodes(id) ON DELETE SET NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_changes_log_project_id ON changes_log(project_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_changes_log_timestamp ON changes_log(timestamp)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_changes_log_node_id ON changes_log(node_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sync_baselines (
                project_id TEXT NOT NULL,
                file_path TEXT NOT NULL,
                node_path TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                language TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (project_id, file_path),
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
            )",
            [],
        )?;

        tracing::debug!("[Database] Schema initialized");
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> AppResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))
    }

    /// Get the connection pool
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Check if the database is healthy
    pub fn is_healthy(&self) -> bool {
        if let Ok(conn) = self.pool.get() {
            conn.query_row("SELECT 1", [], |_| Ok(())).is_ok()
        } else {
            false
        }
    }

    // ========================================================================
    // Transaction Protocol
    // ========================================================================

    /// Run `f` inside an IMMEDIATE transaction holding the project's writer
    /// lock.
    ///
    /// Any error returned by `f` drops the transaction, rolling it back; a
    /// failing commit becomes `AppError::Transaction`.
    pub(crate) fn transact<T, F>(&self, project_id: &str, f: F) -> AppResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> AppResult<T>,
    {
        let outcome = self.transact_or_rollback(project_id, |tx| f(tx).map(Some))?;
        outcome.ok_or_else(|| AppError::internal("transaction closure rolled back unexpectedly"))
    }

    /// Like [`Database::transact`], but `Ok(None)` from `f` rolls back
    /// instead of committing. Used by deadline-bounded writes.
    pub(crate) fn transact_or_rollback<T, F>(&self, project_id: &str, f: F) -> AppResult<Option<T>>
    where
        F: FnOnce(&Transaction<'_>) -> AppResult<Option<T>>,
    {
        let lock = self.writers.lock_for(&project_id.to_string());
        let _guard = acquire(&lock, "project writer")?;

        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        match f(&tx)? {
            Some(value) => {
                tx.commit().map_err(|e| {
                    AppError::transaction(format!(
                        "commit failed for project {}: {}",
                        project_id, e
                    ))
                })?;
                Ok(Some(value))
            }
            None => {
                tx.rollback()?;
                Ok(None)
            }
        }
    }

    // ========================================================================
    // Project Operations
    // ========================================================================

    /// Create a project and return its id
    pub fn create_project(&self, name: &str, metadata: Metadata) -> AppResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("project name cannot be empty"));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let metadata_json = encode_metadata(&metadata)?;
        self.transact(&id, |tx| {
            let ts = now();
            tx.execute(
                "INSERT INTO projects (id, name, created_at, updated_at, metadata)
                 VALUES (?1, ?2, ?3, ?3, ?4)",
                params![id, name, ts, metadata_json],
            )?;
            Ok(())
        })?;

        tracing::info!("[Database] Created project {} ({})", name, id);
        Ok(id)
    }

    /// Get a project by id
    pub fn get_project(&self, id: &str) -> AppResult<Project> {
        let conn = self.get_connection()?;
        find_project(&conn, id)?.ok_or_else(|| AppError::not_found(format!("project {}", id)))
    }

    /// List all projects, oldest first
    pub fn list_projects(&self) -> AppResult<Vec<Project>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, created_at, updated_at, metadata
             FROM projects ORDER BY created_at, id",
        )?;
        let rows = stmt
            .query_map([], ProjectRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(ProjectRow::into_project).collect()
    }

    /// Apply a partial update to a project
    pub fn update_project(&self, id: &str, patch: ProjectPatch) -> AppResult<Project> {
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(AppError::validation("project name cannot be empty"));
            }
        }

        self.transact(id, |tx| {
            let mut project = find_project(tx, id)?
                .ok_or_else(|| AppError::not_found(format!("project {}", id)))?;
            if patch.is_empty() {
                return Ok(project);
            }
            if let Some(name) = &patch.name {
                project.name = name.trim().to_string();
            }
            if let Some(metadata) = &patch.metadata {
                project.metadata = metadata.clone();
            }
            project.updated_at = now();
            tx.execute(
                "UPDATE projects SET name = ?2, metadata = ?3, updated_at = ?4 WHERE id = ?1",
                params![
                    id,
                    project.name,
                    encode_metadata(&project.metadata)?,
                    project.updated_at
                ],
            )?;
            Ok(project)
        })
    }

    /// Delete a project, cascading to its nodes, snapshots and baselines.
    ///
    /// Change-log rows survive; their `node_id` becomes null.
    pub fn delete_project(&self, id: &str) -> AppResult<()> {
        let removed = self.transact(id, |tx| {
            if !project_exists(tx, id)? {
                return Err(AppError::not_found(format!("project {}", id)));
            }
            let nodes: i64 = tx.query_row(
                "SELECT COUNT(*) FROM nodes WHERE project_id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            tx.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
            Ok(nodes)
        })?;

        tracing::info!("[Database] Deleted project {} ({} nodes)", id, removed);
        Ok(())
    }

    // ========================================================================
    // Change Log Operations
    // ========================================================================

    /// Change log of a project, most recent first
    pub fn get_changes(&self, project_id: &str, limit: u32) -> AppResult<Vec<ChangeLogEntry>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, node_id, operation, old_value, new_value, timestamp, metadata
             FROM changes_log
             WHERE project_id = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![project_id, limit], |row| {
                Ok(ChangeRow {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    node_id: row.get(2)?,
                    operation: row.get(3)?,
                    old_value: row.get(4)?,
                    new_value: row.get(5)?,
                    timestamp: row.get(6)?,
                    metadata: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(ChangeRow::into_entry).collect()
    }

    /// Latest page of the change log, sized by `limits.change_log_page`
    pub fn recent_changes(&self, project_id: &str) -> AppResult<Vec<ChangeLogEntry>> {
        self.get_changes(project_id, self.limits.change_log_page)
    }

    /// Total change-log rows recorded for a project
    pub fn count_changes(&self, project_id: &str) -> AppResult<usize> {
        let conn = self.get_connection()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM changes_log WHERE project_id = ?1",
            params![project_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("pool_size", &self.pool.state().connections)
            .finish()
    }
}
