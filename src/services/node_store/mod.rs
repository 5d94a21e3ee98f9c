//! Node Store
//!
//! In-memory, path-addressed view of one project's node forest, written
//! through to the database. Every mutation commits (node rows plus change-log
//! rows) before the in-memory index changes; watchers run afterwards.

mod watchers;

pub use watchers::{
    MutationQueue, NodeChange, NodeWrite, QueuedMutation, SetOptions, WatchCallback, WatchHandle,
};

use std::collections::{BTreeMap, HashMap, HashSet};

use codeviz_core::{NodePath, NodeValue};

use crate::models::{NewNode, Node, NodePatch, RestoreReport};
use crate::storage::nodes;
use crate::storage::Database;
use crate::utils::deadline::Deadline;
use crate::utils::error::{AppError, AppResult};
use watchers::WatcherRegistry;

/// Upper bound on mutations queued by watchers in one cascade
pub const MAX_CASCADE: usize = 1024;

pub struct NodeStore {
    db: Database,
    project_id: String,
    /// Canonical path -> node, ordered like `ORDER BY path`
    index: BTreeMap<String, Node>,
    /// Canonical paths hidden by a branch switch
    unavailable: HashSet<String>,
    watchers: WatcherRegistry,
}

impl NodeStore {
    /// Open the store for an existing project and load its nodes
    pub fn open(db: Database, project_id: &str) -> AppResult<Self> {
        db.get_project(project_id)?;
        let mut store = Self {
            db,
            project_id: project_id.to_string(),
            index: BTreeMap::new(),
            unavailable: HashSet::new(),
            watchers: WatcherRegistry::default(),
        };
        store.reload()?;
        Ok(store)
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Re-read the project's nodes from the database. Clears unavailable
    /// marks and drops watchers of nodes that no longer exist.
    pub fn reload(&mut self) -> AppResult<()> {
        let nodes = self.db.get_project_nodes(&self.project_id, None)?;
        self.index = nodes.into_iter().map(|n| (n.path.clone(), n)).collect();
        self.unavailable.clear();

        let live: HashSet<&str> = self.index.values().map(|n| n.id.as_str()).collect();
        self.watchers.retain_nodes(|id| live.contains(id));

        tracing::debug!(
            "[NodeStore] Loaded {} nodes for project {}",
            self.index.len(),
            self.project_id
        );
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Node at `path`, unless missing or hidden by a branch switch
    pub fn resolve(&self, path: &str) -> AppResult<Option<&Node>> {
        let path = NodePath::parse(path)?;
        Ok(self.lookup(&path))
    }

    /// Value at `path`, or `default` when the path does not resolve
    pub fn get(&self, path: &str, default: NodeValue) -> AppResult<NodeValue> {
        Ok(self
            .resolve(path)?
            .map(|node| node.value.clone())
            .unwrap_or(default))
    }

    /// Value at `rel` below `base`; an empty `rel` yields the base node's
    /// own value.
    pub fn get_within(&self, base: &str, rel: &str, default: NodeValue) -> AppResult<NodeValue> {
        let path = NodePath::parse(base)?.join(&NodePath::parse(rel)?);
        Ok(self
            .lookup(&path)
            .map(|node| node.value.clone())
            .unwrap_or(default))
    }

    /// Direct children of `path` (top-level nodes for the empty path)
    pub fn children(&self, path: &str) -> AppResult<Vec<&Node>> {
        let path = NodePath::parse(path)?;
        let parent_id = if path.is_root() {
            None
        } else {
            match self.lookup(&path) {
                Some(node) => Some(node.id.as_str()),
                None => return Ok(Vec::new()),
            }
        };
        Ok(self
            .nodes()
            .filter(|node| node.parent_id.as_deref() == parent_id)
            .collect())
    }

    /// All available nodes ordered by path
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.index
            .values()
            .filter(move |node| !self.unavailable.contains(&node.path))
    }

    pub fn len(&self) -> usize {
        self.index.len() - self.unavailable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_unavailable(&self, path: &str) -> bool {
        NodePath::parse(path)
            .map(|p| self.unavailable.contains(&p.to_string()))
            .unwrap_or(false)
    }

    /// Parent-link problems: a node whose parent is missing, or whose
    /// parent's path is not its immediate prefix. Empty when healthy.
    pub fn check_integrity(&self) -> Vec<String> {
        let by_id: HashMap<&str, &Node> = self.index.values().map(|n| (n.id.as_str(), n)).collect();
        let mut problems = Vec::new();
        for node in self.index.values() {
            let Ok(path) = NodePath::parse(&node.path) else {
                problems.push(format!("{}: unparsable path", node.path));
                continue;
            };
            let expected = path.parent().filter(|p| !p.is_root()).map(|p| p.to_string());
            match (node.parent_id.as_deref(), expected) {
                (None, None) => {}
                (Some(parent_id), Some(expected)) => match by_id.get(parent_id) {
                    Some(parent) if parent.path == expected => {}
                    Some(parent) => problems.push(format!(
                        "{}: parent is {} instead of {}",
                        node.path, parent.path, expected
                    )),
                    None => problems.push(format!("{}: parent {} is missing", node.path, parent_id)),
                },
                (None, Some(expected)) => {
                    problems.push(format!("{}: no parent link to {}", node.path, expected))
                }
                (Some(_), None) => {
                    problems.push(format!("{}: top-level node has a parent", node.path))
                }
            }
        }
        problems
    }

    /// Node at `path` regardless of availability
    pub(crate) fn node_at(&self, path: &NodePath) -> Option<&Node> {
        self.index.get(&path.to_string())
    }

    fn lookup(&self, path: &NodePath) -> Option<&Node> {
        let key = path.to_string();
        if self.unavailable.contains(&key) {
            return None;
        }
        self.index.get(&key)
    }

    /// Hide nodes until they are written again or the store reloads
    pub(crate) fn mark_unavailable<I: IntoIterator<Item = String>>(&mut self, paths: I) {
        for path in paths {
            if self.index.contains_key(&path) {
                self.unavailable.insert(path);
            }
        }
    }

    pub(crate) fn mark_available<'a, I: IntoIterator<Item = &'a str>>(&mut self, paths: I) {
        for path in paths {
            self.unavailable.remove(path);
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Set the value at `path`, creating missing intermediate nodes
    pub fn set(&mut self, path: &str, value: impl Into<NodeValue>) -> AppResult<()> {
        self.set_many(vec![NodeWrite::new(path, value)])
    }

    /// `set` with explicit type, language and metadata
    pub fn set_with(
        &mut self,
        path: &str,
        value: impl Into<NodeValue>,
        options: SetOptions,
    ) -> AppResult<()> {
        self.set_many(vec![NodeWrite::new(path, value).with_options(options)])
    }

    /// Apply several writes in one transaction, then notify watchers
    pub fn set_many(&mut self, writes: Vec<NodeWrite>) -> AppResult<()> {
        let changes = self.commit_writes(writes)?;
        self.dispatch(changes)
    }

    /// Remove the node at `path` and its descendants; returns how many
    /// nodes were removed
    pub fn delete(&mut self, path: &str) -> AppResult<usize> {
        let path = NodePath::parse(path)?;
        let (change, removed) = self.commit_delete(&path)?;
        self.dispatch(vec![change])?;
        Ok(removed)
    }

    /// Restore a snapshot of this project and re-index, bounded by the
    /// database's snapshot deadline
    pub fn restore_snapshot(&mut self, snapshot_id: &str) -> AppResult<RestoreReport> {
        let deadline = self.db.snapshot_deadline();
        self.restore_snapshot_within(snapshot_id, deadline)
    }

    pub fn restore_snapshot_within(
        &mut self,
        snapshot_id: &str,
        deadline: Deadline,
    ) -> AppResult<RestoreReport> {
        let snapshot = self.db.get_snapshot(snapshot_id)?;
        if snapshot.project_id != self.project_id {
            return Err(AppError::validation(format!(
                "snapshot {} belongs to project {}",
                snapshot_id, snapshot.project_id
            )));
        }
        let report = self.db.restore_from_snapshot_within(snapshot_id, deadline)?;
        if report.complete {
            self.reload()?;
        }
        Ok(report)
    }

    /// Capture the current node set
    pub fn snapshot(&self, description: &str) -> AppResult<String> {
        self.db.create_snapshot(&self.project_id, description)
    }

    // ========================================================================
    // Watchers
    // ========================================================================

    /// Subscribe to mutations of the node at `path`
    pub fn watch<F>(&mut self, path: &str, callback: F) -> AppResult<WatchHandle>
    where
        F: FnMut(&NodeChange, &mut MutationQueue) + Send + 'static,
    {
        let node_id = self
            .resolve(path)?
            .map(|node| node.id.clone())
            .ok_or_else(|| AppError::not_found(format!("node at {}", path)))?;
        Ok(self.watchers.register(&node_id, Box::new(callback)))
    }

    pub fn unwatch(&mut self, handle: &WatchHandle) -> bool {
        self.watchers.remove(handle)
    }

    pub fn watcher_count(&self, path: &str) -> usize {
        match self.resolve(path) {
            Ok(Some(node)) => self.watchers.count(&node.id),
            _ => 0,
        }
    }

    /// Notify watchers, then drain queued follow-ups round by round
    fn dispatch(&mut self, mut round: Vec<NodeChange>) -> AppResult<()> {
        let mut queue = MutationQueue::default();
        let mut applied = 0usize;

        while !round.is_empty() {
            for change in &round {
                self.watchers.notify(change, &mut queue);
                if change.new_value.is_none() {
                    self.watchers.drop_node(&change.node_id);
                }
            }

            let mut next = Vec::new();
            while let Some(mutation) = queue.pop() {
                applied += 1;
                if applied > MAX_CASCADE {
                    return Err(AppError::validation(format!(
                        "watcher cascade exceeded {} queued mutations",
                        MAX_CASCADE
                    )));
                }
                match mutation {
                    QueuedMutation::Set(write) => next.extend(self.commit_writes(vec![write])?),
                    QueuedMutation::Delete(path) => {
                        let path = NodePath::parse(&path)?;
                        next.push(self.commit_delete(&path)?.0);
                    }
                }
            }
            round = next;
        }
        Ok(())
    }

    fn commit_writes(&mut self, writes: Vec<NodeWrite>) -> AppResult<Vec<NodeChange>> {
        let mut parsed = Vec::with_capacity(writes.len());
        for write in writes {
            let path = NodePath::parse(&write.path)?;
            if path.is_root() {
                return Err(AppError::validation("cannot set the empty path"));
            }
            write.value.validate()?;
            parsed.push((path, write));
        }

        let project_id = self.project_id.clone();
        let index = &self.index;
        let (staged, changes) = self.db.transact(&project_id, |tx| {
            let mut staged: BTreeMap<String, Node> = BTreeMap::new();
            let mut changes = Vec::new();

            for (path, write) in &parsed {
                let mut parent_id = None;
                for ancestor in path.ancestors() {
                    let key = ancestor.to_string();
                    let node = match staged.get(&key).or_else(|| index.get(&key)).cloned() {
                        Some(node) if !node.value.is_descendable() => {
                            return Err(AppError::validation(format!(
                                "cannot descend through {} value at {}",
                                node.value.kind(),
                                key
                            )));
                        }
                        Some(node) => node,
                        None => {
                            let mut new = NewNode::new(&project_id, &key, NodeValue::Null);
                            new.parent_id = parent_id.clone();
                            let node = nodes::insert_node(tx, &new)?;
                            staged.insert(key, node.clone());
                            node
                        }
                    };
                    parent_id = Some(node.id);
                }

                let key = path.to_string();
                match staged.get(&key).or_else(|| index.get(&key)).cloned() {
                    Some(current) => {
                        let patch = terminal_patch(&current, write);
                        if patch.is_empty() {
                            continue;
                        }
                        let (before, after) = nodes::update_node(tx, &current.id, &patch)?;
                        changes.push(NodeChange::updated(&before, &after));
                        staged.insert(key, after);
                    }
                    None => {
                        let new = NewNode {
                            id: None,
                            project_id: project_id.clone(),
                            parent_id,
                            path: key.clone(),
                            value: write.value.clone(),
                            node_type: Some(
                                write
                                    .options
                                    .node_type
                                    .clone()
                                    .unwrap_or_else(|| write.value.kind().as_str().to_string()),
                            ),
                            language: write.options.language.clone(),
                            metadata: write.options.metadata.clone().unwrap_or_default(),
                        };
                        let node = nodes::insert_node(tx, &new)?;
                        changes.push(NodeChange::created(&node));
                        staged.insert(key, node);
                    }
                }
            }
            Ok((staged, changes))
        })?;

        for (path, _) in &parsed {
            self.unavailable.remove(&path.to_string());
        }
        self.index.extend(staged);
        Ok(changes)
    }

    fn commit_delete(&mut self, path: &NodePath) -> AppResult<(NodeChange, usize)> {
        let target = self
            .node_at(path)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("node at {}", path)))?;

        let removed = self
            .db
            .transact(&self.project_id, |tx| nodes::delete_node(tx, &target.id))?;

        for node in &removed {
            self.index.remove(&node.path);
            self.unavailable.remove(&node.path);
            if node.id != target.id {
                self.watchers.drop_node(&node.id);
            }
        }
        tracing::debug!("[NodeStore] Deleted {} ({} nodes)", path, removed.len());
        Ok((NodeChange::deleted(&target), removed.len()))
    }
}

/// The patch turning `current` into the result of `write`; empty when the
/// write changes nothing.
fn terminal_patch(current: &Node, write: &NodeWrite) -> NodePatch {
    let mut patch = NodePatch::default();
    let value_changed = current.value != write.value;
    if value_changed {
        patch.value = Some(write.value.clone());
    }

    let node_type = match &write.options.node_type {
        Some(explicit) => Some(explicit.clone()),
        // A type that merely tracked the old value's kind follows the new one
        None if value_changed => match &current.node_type {
            Some(tag) if tag != current.value.kind().as_str() => Some(tag.clone()),
            _ => Some(write.value.kind().as_str().to_string()),
        },
        None => current.node_type.clone(),
    };
    if node_type != current.node_type {
        patch.node_type = Some(node_type);
    }

    if let Some(language) = &write.options.language {
        if current.language.as_ref() != Some(language) {
            patch.language = Some(Some(language.clone()));
        }
    }
    if let Some(metadata) = &write.options.metadata {
        if &current.metadata != metadata {
            patch.metadata = Some(metadata.clone());
        }
    }
    patch
}
