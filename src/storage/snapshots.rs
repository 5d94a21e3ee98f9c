//! Snapshot Persistence
//!
//! Point-in-time captures of a project's node set and atomic restore.

use std::collections::HashSet;

use rusqlite::{params, OptionalExtension};
use serde_json::json;

use crate::models::{
    ChangeOperation, Metadata, NewChange, Node, RestoreReport, Snapshot, SnapshotCapture,
    SnapshotSummary,
};
use crate::storage::database::{append_change, now, project_exists, Database};
use crate::storage::nodes::{insert_node_row, project_nodes};
use crate::utils::deadline::Deadline;
use crate::utils::error::{AppError, AppResult};

/// Raw snapshot row from the database
struct SnapshotRow {
    id: String,
    project_id: String,
    description: String,
    data: String,
    created_at: String,
}

impl SnapshotRow {
    fn into_snapshot(self) -> AppResult<Snapshot> {
        let nodes: Vec<Node> = serde_json::from_str(&self.data)
            .map_err(|e| AppError::corruption(format!("snapshots.data of {}: {}", self.id, e)))?;
        Ok(Snapshot {
            id: self.id,
            project_id: self.project_id,
            description: self.description,
            nodes,
            created_at: self.created_at,
        })
    }
}

impl Database {
    /// Capture the project's current node set and return the snapshot id
    pub fn create_snapshot(&self, project_id: &str, description: &str) -> AppResult<String> {
        let capture = self.create_snapshot_within(project_id, description, Deadline::none())?;
        capture
            .snapshot_id
            .ok_or_else(|| AppError::internal("unbounded snapshot capture did not complete"))
    }

    /// Capture with a deadline. On expiry nothing is persisted and the
    /// result is marked incomplete.
    pub fn create_snapshot_within(
        &self,
        project_id: &str,
        description: &str,
        deadline: Deadline,
    ) -> AppResult<SnapshotCapture> {
        let capture = self.transact(project_id, |tx| {
            if !project_exists(tx, project_id)? {
                return Err(AppError::not_found(format!("project {}", project_id)));
            }

            let nodes = project_nodes(tx, project_id, None)?;
            let mut captured = Vec::with_capacity(nodes.len());
            for node in nodes {
                if deadline.is_expired() {
                    return Ok(SnapshotCapture {
                        snapshot_id: None,
                        node_count: captured.len(),
                        complete: false,
                    });
                }
                captured.push(node);
            }

            let id = uuid::Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO snapshots (id, project_id, description, data, node_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    project_id,
                    description,
                    serde_json::to_string(&captured)?,
                    captured.len() as i64,
                    now(),
                ],
            )?;

            Ok(SnapshotCapture {
                snapshot_id: Some(id),
                node_count: captured.len(),
                complete: true,
            })
        })?;

        match &capture.snapshot_id {
            Some(id) => tracing::info!(
                "[Database] Snapshot {} of project {} ({} nodes)",
                id,
                project_id,
                capture.node_count
            ),
            None => tracing::warn!(
                "[Database] Snapshot of project {} timed out after {} nodes",
                project_id,
                capture.node_count
            ),
        }
        Ok(capture)
    }

    /// List a project's snapshots, newest first
    pub fn list_snapshots(&self, project_id: &str) -> AppResult<Vec<SnapshotSummary>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, description, node_count, created_at
             FROM snapshots WHERE project_id = ?1
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let summaries = stmt
            .query_map(params![project_id], |row| {
                Ok(SnapshotSummary {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    description: row.get(2)?,
                    node_count: row.get::<_, i64>(3)? as usize,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(summaries)
    }

    /// Get a snapshot with its captured rows
    pub fn get_snapshot(&self, id: &str) -> AppResult<Snapshot> {
        let conn = self.get_connection()?;
        let row = conn
            .query_row(
                "SELECT id, project_id, description, data, created_at FROM snapshots WHERE id = ?1",
                params![id],
                |row| {
                    Ok(SnapshotRow {
                        id: row.get(0)?,
                        project_id: row.get(1)?,
                        description: row.get(2)?,
                        data: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        row.ok_or_else(|| AppError::not_found(format!("snapshot {}", id)))?
            .into_snapshot()
    }

    /// Replace the project's node set with the snapshot's rows
    pub fn restore_from_snapshot(&self, snapshot_id: &str) -> AppResult<RestoreReport> {
        self.restore_from_snapshot_within(snapshot_id, Deadline::none())
    }

    /// Restore with a deadline. On expiry the transaction rolls back and the
    /// report is marked incomplete with zero rows restored.
    pub fn restore_from_snapshot_within(
        &self,
        snapshot_id: &str,
        deadline: Deadline,
    ) -> AppResult<RestoreReport> {
        let snapshot = self.get_snapshot(snapshot_id)?;
        let project_id = snapshot.project_id.clone();

        let restored = self.transact_or_rollback(&project_id, |tx| {
            // Deleting the live rows nulls their log links; remember them so
            // history of restored ids can be relinked.
            let linked: Vec<(i64, String)> = {
                let mut stmt = tx.prepare(
                    "SELECT id, node_id FROM changes_log
                     WHERE project_id = ?1 AND node_id IS NOT NULL",
                )?;
                let rows = stmt
                    .query_map(params![project_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };

            tx.execute("DELETE FROM nodes WHERE project_id = ?1", params![project_id])?;

            // Rows are in path order, so every parent precedes its children
            for node in &snapshot.nodes {
                if deadline.is_expired() {
                    return Ok(None);
                }
                insert_node_row(tx, node)?;
            }

            let restored_ids: HashSet<&str> =
                snapshot.nodes.iter().map(|n| n.id.as_str()).collect();
            for (log_id, node_id) in linked
                .iter()
                .filter(|(_, node_id)| restored_ids.contains(node_id.as_str()))
            {
                tx.execute(
                    "UPDATE changes_log SET node_id = ?2 WHERE id = ?1",
                    params![log_id, node_id],
                )?;
            }

            let mut metadata = Metadata::new();
            metadata.insert("event".to_string(), json!("snapshot_restore"));
            metadata.insert("snapshot_id".to_string(), json!(snapshot.id));
            metadata.insert("node_count".to_string(), json!(snapshot.nodes.len()));
            append_change(
                tx,
                &NewChange {
                    project_id: project_id.clone(),
                    node_id: None,
                    operation: ChangeOperation::Update,
                    old_value: None,
                    new_value: None,
                    metadata,
                },
            )?;
            Ok(Some(snapshot.nodes.len()))
        })?;

        let report = RestoreReport {
            snapshot_id: snapshot.id.clone(),
            project_id: project_id.clone(),
            nodes_restored: restored.unwrap_or(0),
            complete: restored.is_some(),
        };
        if report.complete {
            tracing::info!(
                "[Database] Restored snapshot {} into project {} ({} nodes)",
                snapshot.id,
                project_id,
                report.nodes_restored
            );
        } else {
            tracing::warn!(
                "[Database] Restore of snapshot {} timed out and was rolled back",
                snapshot.id
            );
        }
        Ok(report)
    }
}
