//! Sync Baseline Persistence
//!
//! One row per synchronized repository file, keyed by `(project_id,
//! file_path)`. Deleted with the project.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::SyncBaseline;
use crate::storage::database::{now, project_exists, Database};
use crate::utils::error::{AppError, AppResult};

fn baseline_from_row(row: &Row) -> rusqlite::Result<SyncBaseline> {
    Ok(SyncBaseline {
        project_id: row.get(0)?,
        file_path: row.get(1)?,
        node_path: row.get(2)?,
        fingerprint: row.get(3)?,
        language: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub(crate) fn upsert_baseline_row(conn: &Connection, baseline: &SyncBaseline) -> AppResult<()> {
    conn.execute(
        "INSERT INTO sync_baselines (project_id, file_path, node_path, fingerprint, language, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(project_id, file_path) DO UPDATE SET
            node_path = excluded.node_path,
            fingerprint = excluded.fingerprint,
            language = excluded.language,
            updated_at = excluded.updated_at",
        params![
            baseline.project_id,
            baseline.file_path,
            baseline.node_path,
            baseline.fingerprint,
            baseline.language,
            baseline.updated_at,
        ],
    )?;
    Ok(())
}

impl Database {
    /// Baseline of one repository file
    pub fn get_baseline(&self, project_id: &str, file_path: &str) -> AppResult<Option<SyncBaseline>> {
        let conn = self.get_connection()?;
        let baseline = conn
            .query_row(
                "SELECT project_id, file_path, node_path, fingerprint, language, updated_at
                 FROM sync_baselines WHERE project_id = ?1 AND file_path = ?2",
                params![project_id, file_path],
                baseline_from_row,
            )
            .optional()?;
        Ok(baseline)
    }

    /// All baselines of a project, ordered by file path
    pub fn list_baselines(&self, project_id: &str) -> AppResult<Vec<SyncBaseline>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT project_id, file_path, node_path, fingerprint, language, updated_at
             FROM sync_baselines WHERE project_id = ?1 ORDER BY file_path",
        )?;
        let baselines = stmt
            .query_map(params![project_id], baseline_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(baselines)
    }

    /// Insert or replace a baseline; `updated_at` is stamped on write
    pub fn upsert_baseline(&self, baseline: &SyncBaseline) -> AppResult<SyncBaseline> {
        let mut stored = baseline.clone();
        stored.updated_at = now();
        self.transact(&baseline.project_id, |tx| {
            if !project_exists(tx, &stored.project_id)? {
                return Err(AppError::foreign_key(format!(
                    "project {} does not exist",
                    stored.project_id
                )));
            }
            upsert_baseline_row(tx, &stored)
        })?;
        Ok(stored)
    }

    /// Remove a baseline; returns whether one existed
    pub fn delete_baseline(&self, project_id: &str, file_path: &str) -> AppResult<bool> {
        let removed = self.transact(project_id, |tx| {
            Ok(tx.execute(
                "DELETE FROM sync_baselines WHERE project_id = ?1 AND file_path = ?2",
                params![project_id, file_path],
            )?)
        })?;
        Ok(removed > 0)
    }
}
