//! Node Persistence
//!
//! Node CRUD with change logging. Each mutation writes the node row and its
//! change-log row on the same connection, so callers that pass a
//! transaction get both or neither.

use codeviz_core::{NodePath, NodeValue};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::json;

use crate::models::{ChangeOperation, Metadata, NewChange, NewNode, Node, NodePatch};
use crate::storage::database::{
    append_change, decode_metadata, encode_metadata, now, project_exists, Database,
};
use crate::utils::error::{AppError, AppResult};

pub(crate) const NODE_COLUMNS: &str =
    "id, project_id, parent_id, path, value, type, language, metadata, created_at, updated_at";

/// Raw node row from the database
pub(crate) struct NodeRow {
    id: String,
    project_id: String,
    parent_id: Option<String>,
    path: String,
    value: String,
    node_type: Option<String>,
    language: Option<String>,
    metadata: String,
    created_at: String,
    updated_at: String,
}

impl NodeRow {
    pub(crate) fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            parent_id: row.get(2)?,
            path: row.get(3)?,
            value: row.get(4)?,
            node_type: row.get(5)?,
            language: row.get(6)?,
            metadata: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    pub(crate) fn into_node(self) -> AppResult<Node> {
        let value: NodeValue = serde_json::from_str(&self.value)
            .map_err(|e| AppError::corruption(format!("nodes.value of {}: {}", self.id, e)))?;
        let metadata = decode_metadata("nodes", &self.id, &self.metadata)?;
        Ok(Node {
            id: self.id,
            project_id: self.project_id,
            parent_id: self.parent_id,
            path: self.path,
            value,
            node_type: self.node_type,
            language: self.language,
            metadata,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn encode_value(value: &NodeValue) -> AppResult<String> {
    Ok(serde_json::to_string(value)?)
}

fn path_metadata(path: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("path".to_string(), json!(path));
    metadata
}

pub(crate) fn query_nodes<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> AppResult<Vec<Node>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, NodeRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(NodeRow::into_node).collect()
}

pub(crate) fn find_node(conn: &Connection, id: &str) -> AppResult<Option<Node>> {
    let sql = format!("SELECT {} FROM nodes WHERE id = ?1", NODE_COLUMNS);
    let row = conn
        .query_row(&sql, params![id], NodeRow::from_row)
        .optional()?;
    row.map(NodeRow::into_node).transpose()
}

pub(crate) fn find_node_by_path(
    conn: &Connection,
    project_id: &str,
    path: &str,
) -> AppResult<Option<Node>> {
    let sql = format!(
        "SELECT {} FROM nodes WHERE project_id = ?1 AND path = ?2",
        NODE_COLUMNS
    );
    let row = conn
        .query_row(&sql, params![project_id, path], NodeRow::from_row)
        .optional()?;
    row.map(NodeRow::into_node).transpose()
}

/// All nodes of a project ordered by path; `prefix` keeps the node at that
/// path and its descendants.
pub(crate) fn project_nodes(
    conn: &Connection,
    project_id: &str,
    prefix: Option<&NodePath>,
) -> AppResult<Vec<Node>> {
    match prefix.filter(|p| !p.is_root()) {
        None => query_nodes(
            conn,
            &format!(
                "SELECT {} FROM nodes WHERE project_id = ?1 ORDER BY path",
                NODE_COLUMNS
            ),
            params![project_id],
        ),
        Some(prefix) => {
            // substr comparisons stay byte-exact where LIKE would fold case
            let base = prefix.to_string();
            let width = base.chars().count() as i64 + 1;
            query_nodes(
                conn,
                &format!(
                    "SELECT {} FROM nodes
                     WHERE project_id = ?1
                       AND (path = ?2 OR substr(path, 1, ?3) IN (?4, ?5))
                     ORDER BY path",
                    NODE_COLUMNS
                ),
                params![
                    project_id,
                    base,
                    width,
                    format!("{}.", base),
                    format!("{}[", base)
                ],
            )
        }
    }
}

/// Insert a node and its CREATE log row.
///
/// Rejects dangling project or parent references before writing. When no
/// parent is given and a node exists at the path's immediate prefix, that
/// node becomes the parent.
pub(crate) fn insert_node(conn: &Connection, new: &NewNode) -> AppResult<Node> {
    new.value.validate()?;
    let path = NodePath::parse(&new.path)?;
    if path.is_root() {
        return Err(AppError::validation("node path cannot be empty"));
    }
    let canonical = path.to_string();

    if !project_exists(conn, &new.project_id)? {
        return Err(AppError::foreign_key(format!(
            "project {} does not exist",
            new.project_id
        )));
    }

    let parent_id = match &new.parent_id {
        Some(parent_id) => {
            let parent = find_node(conn, parent_id)?.ok_or_else(|| {
                AppError::foreign_key(format!("parent node {} does not exist", parent_id))
            })?;
            if parent.project_id != new.project_id {
                return Err(AppError::foreign_key(format!(
                    "parent node {} belongs to project {}",
                    parent_id, parent.project_id
                )));
            }
            let parent_path = NodePath::parse(&parent.path)?;
            if path.parent().as_ref() != Some(&parent_path) {
                return Err(AppError::validation(format!(
                    "parent node {} ({}) is not the immediate prefix of {}",
                    parent_id, parent.path, canonical
                )));
            }
            Some(parent.id)
        }
        None => match path.parent().filter(|p| !p.is_root()) {
            Some(parent_path) => {
                find_node_by_path(conn, &new.project_id, &parent_path.to_string())?.map(|n| n.id)
            }
            None => None,
        },
    };

    if find_node_by_path(conn, &new.project_id, &canonical)?.is_some() {
        return Err(AppError::validation(format!(
            "path {} already exists in project {}",
            canonical, new.project_id
        )));
    }

    let ts = now();
    let node = Node {
        id: new
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        project_id: new.project_id.clone(),
        parent_id,
        path: canonical,
        value: new.value.clone(),
        node_type: new.node_type.clone(),
        language: new.language.clone(),
        metadata: new.metadata.clone(),
        created_at: ts.clone(),
        updated_at: ts,
    };
    insert_node_row(conn, &node)?;

    append_change(
        conn,
        &NewChange {
            project_id: node.project_id.clone(),
            node_id: Some(node.id.clone()),
            operation: ChangeOperation::Create,
            old_value: None,
            new_value: Some(node.value.clone()),
            metadata: path_metadata(&node.path),
        },
    )?;

    Ok(node)
}

/// Write a node row verbatim (ids and timestamps included), without logging.
pub(crate) fn insert_node_row(conn: &Connection, node: &Node) -> AppResult<()> {
    conn.execute(
        "INSERT INTO nodes (id, project_id, parent_id, path, value, type, language, metadata, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            node.id,
            node.project_id,
            node.parent_id,
            node.path,
            encode_value(&node.value)?,
            node.node_type,
            node.language,
            encode_metadata(&node.metadata)?,
            node.created_at,
            node.updated_at,
        ],
    )?;
    Ok(())
}

/// Apply a patch and log an UPDATE row. Returns `(before, after)`.
pub(crate) fn update_node(conn: &Connection, id: &str, patch: &NodePatch) -> AppResult<(Node, Node)> {
    let before = find_node(conn, id)?.ok_or_else(|| AppError::not_found(format!("node {}", id)))?;
    if patch.is_empty() {
        return Ok((before.clone(), before));
    }

    let mut after = before.clone();
    if let Some(value) = &patch.value {
        value.validate()?;
        after.value = value.clone();
    }
    if let Some(node_type) = &patch.node_type {
        after.node_type = node_type.clone();
    }
    if let Some(language) = &patch.language {
        after.language = language.clone();
    }
    if let Some(metadata) = &patch.metadata {
        after.metadata = metadata.clone();
    }
    after.updated_at = now();

    conn.execute(
        "UPDATE nodes SET value = ?2, type = ?3, language = ?4, metadata = ?5, updated_at = ?6
         WHERE id = ?1",
        params![
            id,
            encode_value(&after.value)?,
            after.node_type,
            after.language,
            encode_metadata(&after.metadata)?,
            after.updated_at,
        ],
    )?;

    append_change(
        conn,
        &NewChange {
            project_id: after.project_id.clone(),
            node_id: Some(after.id.clone()),
            operation: ChangeOperation::Update,
            old_value: Some(before.value.clone()),
            new_value: Some(after.value.clone()),
            metadata: path_metadata(&after.path),
        },
    )?;

    Ok((before, after))
}

/// Delete a node and its descendants, logging one DELETE row per removed
/// node (deepest first). Returns the removed nodes in that order.
pub(crate) fn delete_node(conn: &Connection, id: &str) -> AppResult<Vec<Node>> {
    if find_node(conn, id)?.is_none() {
        return Err(AppError::not_found(format!("node {}", id)));
    }

    let removed = query_nodes(
        conn,
        &format!(
            "WITH RECURSIVE subtree(id) AS (
                SELECT id FROM nodes WHERE id = ?1
                UNION ALL
                SELECT n.id FROM nodes n JOIN subtree s ON n.parent_id = s.id
             )
             SELECT {} FROM nodes WHERE id IN (SELECT id FROM subtree)
             ORDER BY path DESC",
            NODE_COLUMNS
        ),
        params![id],
    )?;

    for node in &removed {
        let mut metadata = path_metadata(&node.path);
        metadata.insert("node_id".to_string(), json!(node.id));
        append_change(
            conn,
            &NewChange {
                project_id: node.project_id.clone(),
                node_id: Some(node.id.clone()),
                operation: ChangeOperation::Delete,
                old_value: Some(node.value.clone()),
                new_value: None,
                metadata,
            },
        )?;
    }

    // Descendants go with the parent_id cascade
    conn.execute("DELETE FROM nodes WHERE id = ?1", params![id])?;
    Ok(removed)
}

impl Database {
    /// Create a node and return its id
    pub fn create_node(&self, new: NewNode) -> AppResult<String> {
        let node = self.transact(&new.project_id, |tx| insert_node(tx, &new))?;
        tracing::debug!("[Database] Created node {} at {}", node.id, node.path);
        Ok(node.id)
    }

    /// Get a node by id
    pub fn get_node(&self, id: &str) -> AppResult<Node> {
        let conn = self.get_connection()?;
        find_node(&conn, id)?.ok_or_else(|| AppError::not_found(format!("node {}", id)))
    }

    /// Get a node by project and path (any accepted path spelling)
    pub fn get_node_by_path(&self, project_id: &str, path: &str) -> AppResult<Option<Node>> {
        let canonical = NodePath::parse(path)?.to_string();
        let conn = self.get_connection()?;
        find_node_by_path(&conn, project_id, &canonical)
    }

    /// Apply a partial update to a node
    pub fn update_node(&self, id: &str, patch: NodePatch) -> AppResult<Node> {
        let project_id = self.get_node(id)?.project_id;
        let (_, after) = self.transact(&project_id, |tx| update_node(tx, id, &patch))?;
        Ok(after)
    }

    /// Delete a node and its descendants; returns how many rows went
    pub fn delete_node(&self, id: &str) -> AppResult<usize> {
        let project_id = self.get_node(id)?.project_id;
        let removed = self.transact(&project_id, |tx| delete_node(tx, id))?;
        tracing::debug!("[Database] Deleted node {} ({} rows)", id, removed.len());
        Ok(removed.len())
    }

    /// Direct children of a node, ordered by path
    pub fn get_child_nodes(&self, parent_id: &str) -> AppResult<Vec<Node>> {
        let conn = self.get_connection()?;
        query_nodes(
            &conn,
            &format!(
                "SELECT {} FROM nodes WHERE parent_id = ?1 ORDER BY path",
                NODE_COLUMNS
            ),
            params![parent_id],
        )
    }

    /// Nodes of a project ordered by path, optionally restricted to a subtree
    pub fn get_project_nodes(&self, project_id: &str, prefix: Option<&str>) -> AppResult<Vec<Node>> {
        let prefix = prefix.map(NodePath::parse).transpose()?;
        let conn = self.get_connection()?;
        project_nodes(&conn, project_id, prefix.as_ref())
    }

    /// Create many nodes in a single transaction; returns their ids in order.
    ///
    /// Entries may reference parents created earlier in the same batch.
    pub fn batch_create_nodes(&self, entries: &[NewNode]) -> AppResult<Vec<String>> {
        let Some(first) = entries.first() else {
            return Ok(Vec::new());
        };
        let project_id = first.project_id.clone();
        if let Some(other) = entries.iter().find(|e| e.project_id != project_id) {
            return Err(AppError::validation(format!(
                "batch mixes projects {} and {}",
                project_id, other.project_id
            )));
        }

        let ids = self.transact(&project_id, |tx| {
            entries
                .iter()
                .map(|entry| insert_node(tx, entry).map(|node| node.id))
                .collect::<AppResult<Vec<_>>>()
        })?;

        tracing::info!(
            "[Database] Batch created {} nodes in project {}",
            ids.len(),
            project_id
        );
        Ok(ids)
    }
}
