//! Watcher Registry
//!
//! Subscriptions keyed by node id. Callbacks run synchronously after a
//! mutation commits, in registration order, and may enqueue follow-up
//! mutations on the [`MutationQueue`] instead of mutating the store inline.

use std::collections::{HashMap, VecDeque};

use codeviz_core::NodeValue;
use serde::{Deserialize, Serialize};

use crate::models::{ChangeOperation, Metadata, Node};

/// A committed mutation as seen by watchers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeChange {
    pub node_id: String,
    pub path: String,
    pub operation: ChangeOperation,
    pub old_value: Option<NodeValue>,
    pub new_value: Option<NodeValue>,
}

impl NodeChange {
    pub(crate) fn created(node: &Node) -> Self {
        Self {
            node_id: node.id.clone(),
            path: node.path.clone(),
            operation: ChangeOperation::Create,
            old_value: None,
            new_value: Some(node.value.clone()),
        }
    }

    pub(crate) fn updated(before: &Node, after: &Node) -> Self {
        Self {
            node_id: after.id.clone(),
            path: after.path.clone(),
            operation: ChangeOperation::Update,
            old_value: Some(before.value.clone()),
            new_value: Some(after.value.clone()),
        }
    }

    pub(crate) fn deleted(node: &Node) -> Self {
        Self {
            node_id: node.id.clone(),
            path: node.path.clone(),
            operation: ChangeOperation::Delete,
            old_value: Some(node.value.clone()),
            new_value: None,
        }
    }
}

/// Optional tags applied by a write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetOptions {
    /// Type tag; defaults to the value's kind on create
    pub node_type: Option<String>,
    pub language: Option<String>,
    /// Replaces the node's metadata when set
    pub metadata: Option<Metadata>,
}

/// One `set` request
#[derive(Debug, Clone, PartialEq)]
pub struct NodeWrite {
    pub path: String,
    pub value: NodeValue,
    pub options: SetOptions,
}

impl NodeWrite {
    pub fn new(path: impl Into<String>, value: impl Into<NodeValue>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
            options: SetOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SetOptions) -> Self {
        self.options = options;
        self
    }
}

/// A mutation requested by a watcher
#[derive(Debug, Clone, PartialEq)]
pub enum QueuedMutation {
    Set(NodeWrite),
    Delete(String),
}

/// FIFO of mutations requested while watchers run
#[derive(Debug, Default)]
pub struct MutationQueue {
    pending: VecDeque<QueuedMutation>,
}

impl MutationQueue {
    pub fn set(&mut self, path: impl Into<String>, value: impl Into<NodeValue>) {
        self.pending
            .push_back(QueuedMutation::Set(NodeWrite::new(path, value)));
    }

    pub fn set_with(&mut self, write: NodeWrite) {
        self.pending.push_back(QueuedMutation::Set(write));
    }

    pub fn delete(&mut self, path: impl Into<String>) {
        self.pending.push_back(QueuedMutation::Delete(path.into()));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn pop(&mut self) -> Option<QueuedMutation> {
        self.pending.pop_front()
    }
}

pub type WatchCallback = Box<dyn FnMut(&NodeChange, &mut MutationQueue) + Send>;

/// Returned by `watch`; pass to `unwatch` to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchHandle {
    node_id: String,
    id: u64,
}

impl WatchHandle {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

#[derive(Default)]
pub(crate) struct WatcherRegistry {
    next_id: u64,
    by_node: HashMap<String, Vec<(u64, WatchCallback)>>,
}

impl WatcherRegistry {
    pub fn register(&mut self, node_id: &str, callback: WatchCallback) -> WatchHandle {
        self.next_id += 1;
        let id = self.next_id;
        self.by_node
            .entry(node_id.to_string())
            .or_default()
            .push((id, callback));
        WatchHandle {
            node_id: node_id.to_string(),
            id,
        }
    }

    pub fn remove(&mut self, handle: &WatchHandle) -> bool {
        let Some(callbacks) = self.by_node.get_mut(&handle.node_id) else {
            return false;
        };
        let before = callbacks.len();
        callbacks.retain(|(id, _)| *id != handle.id);
        let removed = callbacks.len() != before;
        if callbacks.is_empty() {
            self.by_node.remove(&handle.node_id);
        }
        removed
    }

    pub fn drop_node(&mut self, node_id: &str) {
        self.by_node.remove(node_id);
    }

    pub fn retain_nodes(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.by_node.retain(|node_id, _| keep(node_id));
    }

    pub fn count(&self, node_id: &str) -> usize {
        self.by_node.get(node_id).map(Vec::len).unwrap_or(0)
    }

    pub fn notify(&mut self, change: &NodeChange, queue: &mut MutationQueue) {
        if let Some(callbacks) = self.by_node.get_mut(&change.node_id) {
            for (_, callback) in callbacks.iter_mut() {
                callback(change, queue);
            }
        }
    }
}
