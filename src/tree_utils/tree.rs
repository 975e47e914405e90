use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use anyhow::{bail, ensure};
use serde::{Deserialize, Serialize};

use super::history::{History, HISTORY_LIMIT};
use super::ids::IdSource;
use super::projection::{self, ViewNode};

// Basic type aliases for clarity
pub type NodeId = String;
pub type BlockId = String;

pub const ROOT_ID: &str = "root";
pub const DEFAULT_ROOT_NAME: &str = "Root";
pub const DEFAULT_NODE_NAME: &str = "Page";
pub const DEFAULT_BLOCK_NAME: &str = "New Block";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    Block,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockItem {
    pub id: BlockId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub parent_id: Option<NodeId>,
    pub children: Vec<NodeId>,
    #[serde(default)]
    pub blocks: Vec<BlockItem>,
}

impl TreeNode {
    fn root() -> Self {
        TreeNode {
            id: ROOT_ID.to_string(),
            name: DEFAULT_ROOT_NAME.to_string(),
            kind: NodeKind::Root,
            parent_id: None,
            children: Vec::new(),
            blocks: Vec::new(),
        }
    }
}

// Entries are shared between snapshots; a mutation swaps in a new Arc only
// for the nodes it touches.
pub type NodeTable = HashMap<NodeId, Arc<TreeNode>>;

/// Immutable capture of the node table and expansion set.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeSnapshot {
    pub nodes: Arc<NodeTable>,
    pub expanded: Arc<HashSet<NodeId>>,
}

impl TreeSnapshot {
    pub fn fresh() -> Self {
        let root = TreeNode::root();
        let mut nodes = NodeTable::new();
        nodes.insert(root.id.clone(), Arc::new(root));
        let expanded: HashSet<NodeId> = [ROOT_ID.to_string()].into_iter().collect();
        TreeSnapshot {
            nodes: Arc::new(nodes),
            expanded: Arc::new(expanded),
        }
    }

    // True when both tables are the very same allocation (no mutation happened in between)
    pub fn ptr_eq(&self, other: &TreeSnapshot) -> bool {
        Arc::ptr_eq(&self.nodes, &other.nodes) && Arc::ptr_eq(&self.expanded, &other.expanded)
    }
}

/// Serializable part of the store: history and UI selection are not persisted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedTree {
    pub nodes: BTreeMap<NodeId, TreeNode>,
    #[serde(default)]
    pub expanded: BTreeMap<NodeId, bool>,
}

impl PersistedTree {
    pub fn validate(&self) -> anyhow::Result<()> {
        let roots: Vec<&TreeNode> = self.nodes.values().filter(|n| n.kind == NodeKind::Root).collect();
        ensure!(roots.len() == 1, "expected exactly one root node, found {}", roots.len());
        ensure!(roots[0].parent_id.is_none(), "root node '{}' has a parent", roots[0].id);

        for (key, node) in &self.nodes {
            ensure!(key == &node.id, "node stored under '{}' carries id '{}'", key, node.id);
            for child in &node.children {
                let Some(child_node) = self.nodes.get(child) else {
                    bail!("node '{}' lists missing child '{}'", key, child);
                };
                ensure!(
                    child_node.parent_id.as_deref() == Some(key.as_str()),
                    "child '{}' does not point back to parent '{}'",
                    child,
                    key
                );
            }
            if node.kind == NodeKind::Block {
                let Some(parent_id) = &node.parent_id else {
                    bail!("node '{}' has no parent", key);
                };
                let Some(parent) = self.nodes.get(parent_id) else {
                    bail!("node '{}' points at missing parent '{}'", key, parent_id);
                };
                let listed = parent.children.iter().filter(|c| *c == key).count();
                ensure!(listed == 1, "node '{}' listed {} times by its parent", key, listed);
            }
        }

        // Every node hangs off the root exactly once; loops never reach it
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![roots[0].id.as_str()];
        while let Some(id) = stack.pop() {
            ensure!(visited.insert(id), "node '{}' is reachable more than once", id);
            if let Some(node) = self.nodes.get(id) {
                stack.extend(node.children.iter().map(|c| c.as_str()));
            }
        }
        ensure!(
            visited.len() == self.nodes.len(),
            "{} node(s) are not reachable from the root",
            self.nodes.len() - visited.len()
        );
        Ok(())
    }

    pub fn into_snapshot(self) -> anyhow::Result<TreeSnapshot> {
        self.validate()?;
        let PersistedTree { nodes, expanded } = self;
        let expanded: HashSet<NodeId> = expanded
            .into_iter()
            .filter(|(id, open)| *open && nodes.contains_key(id))
            .map(|(id, _)| id)
            .collect();
        let nodes: NodeTable = nodes.into_iter().map(|(id, node)| (id, Arc::new(node))).collect();
        Ok(TreeSnapshot {
            nodes: Arc::new(nodes),
            expanded: Arc::new(expanded),
        })
    }
}

pub type SubscriptionId = u64;
type Listener = Box<dyn FnMut(&TreeSnapshot)>;

/// Canonical tree state plus undo/redo history.
///
/// Every operation is total: unknown ids and void edits return early without
/// touching state or history. Mutations report whether they were applied.
pub struct TreeStore {
    current: TreeSnapshot,
    history: History<TreeSnapshot>,
    ids: Box<dyn IdSource>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: SubscriptionId,
}

impl TreeStore {
    pub fn new(ids: impl IdSource + 'static) -> Self {
        Self::with_history_limit(ids, HISTORY_LIMIT)
    }

    pub fn with_history_limit(ids: impl IdSource + 'static, limit: usize) -> Self {
        TreeStore {
            current: TreeSnapshot::fresh(),
            history: History::new(limit),
            ids: Box::new(ids),
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn from_persisted(state: PersistedTree, ids: impl IdSource + 'static, limit: usize) -> anyhow::Result<Self> {
        let current = state.into_snapshot()?;
        let mut store = Self::with_history_limit(ids, limit);
        store.current = current;
        Ok(store)
    }

    pub fn partialize(&self) -> PersistedTree {
        PersistedTree {
            nodes: self
                .current
                .nodes
                .iter()
                .map(|(id, node)| (id.clone(), TreeNode::clone(node)))
                .collect(),
            expanded: self.current.expanded.iter().map(|id| (id.clone(), true)).collect(),
        }
    }

    // Subscriptions
    pub fn subscribe(&mut self, listener: impl FnMut(&TreeSnapshot) + 'static) -> SubscriptionId {
        self.next_subscription += 1;
        let id = self.next_subscription;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    fn notify(&mut self) {
        let snapshot = self.current.clone();
        for (_, listener) in self.listeners.iter_mut() {
            listener(&snapshot);
        }
    }

    // Swap in the next state, remembering the previous one for undo
    fn commit(&mut self, next: TreeSnapshot) {
        let previous = std::mem::replace(&mut self.current, next);
        self.history.record(previous);
        self.notify();
    }

    fn with_nodes(&self, nodes: NodeTable) -> TreeSnapshot {
        TreeSnapshot {
            nodes: Arc::new(nodes),
            expanded: Arc::clone(&self.current.expanded),
        }
    }

    // Selectors
    pub fn snapshot(&self) -> &TreeSnapshot { &self.current }
    pub fn nodes(&self) -> &NodeTable { &self.current.nodes }
    pub fn expanded(&self) -> &HashSet<NodeId> { &self.current.expanded }
    pub fn node(&self, id: &str) -> Option<&TreeNode> { self.current.nodes.get(id).map(|n| n.as_ref()) }
    pub fn node_count(&self) -> usize { self.current.nodes.len() }
    pub fn is_expanded(&self, id: &str) -> bool { self.current.expanded.contains(id) }
    pub fn can_undo(&self) -> bool { self.history.can_undo() }
    pub fn can_redo(&self) -> bool { self.history.can_redo() }
    pub fn past_len(&self) -> usize { self.history.past_len() }
    pub fn future_len(&self) -> usize { self.history.future_len() }

    pub fn children(&self, id: &str) -> &[NodeId] {
        self.current.nodes.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn root_id(&self) -> Option<&str> {
        if let Some(root) = self.current.nodes.get(ROOT_ID) {
            if root.kind == NodeKind::Root {
                return Some(root.id.as_str());
            }
        }
        self.current
            .nodes
            .values()
            .find(|n| n.kind == NodeKind::Root)
            .map(|n| n.id.as_str())
    }

    // Expansion-aware projection of the whole tree, starting at the root
    pub fn view(&self) -> Option<ViewNode> {
        let root_id = self.root_id()?;
        projection::project(&self.current.nodes, &self.current.expanded, root_id)
    }

    // Node operations
    pub fn rename_node(&mut self, id: &str, name: &str) -> bool {
        let Some(node) = self.current.nodes.get(id) else { return false };
        if node.name == name {
            return false;
        }
        let renamed = TreeNode { name: name.to_string(), ..TreeNode::clone(node) };
        let mut nodes = NodeTable::clone(&self.current.nodes);
        nodes.insert(id.to_string(), Arc::new(renamed));
        log::debug!("rename_node id={}", id);
        self.commit(self.with_nodes(nodes));
        true
    }

    pub fn add_node(&mut self, parent_id: &str, name: Option<&str>) -> Option<NodeId> {
        let parent = self.current.nodes.get(parent_id)?;

        let id = self.ids.new_id();
        let node = TreeNode {
            id: id.clone(),
            name: name.unwrap_or(DEFAULT_NODE_NAME).to_string(),
            kind: NodeKind::Block,
            parent_id: Some(parent_id.to_string()),
            children: Vec::new(),
            blocks: Vec::new(),
        };
        let mut parent = TreeNode::clone(parent);
        parent.children.push(id.clone());

        let mut nodes = NodeTable::clone(&self.current.nodes);
        nodes.insert(id.clone(), Arc::new(node));
        nodes.insert(parent_id.to_string(), Arc::new(parent));
        let mut expanded = (*self.current.expanded).clone();
        expanded.insert(parent_id.to_string());

        log::debug!("add_node parent={} id={}", parent_id, id);
        self.commit(TreeSnapshot {
            nodes: Arc::new(nodes),
            expanded: Arc::new(expanded),
        });
        Some(id)
    }

    pub fn remove_node(&mut self, id: &str) -> bool {
        let Some(node) = self.current.nodes.get(id) else { return false };
        if node.kind == NodeKind::Root {
            return false;
        }

        // Iterative walk so deep trees cannot exhaust the call stack
        let mut doomed: Vec<NodeId> = Vec::new();
        let mut stack: Vec<&str> = vec![id];
        let mut seen: HashSet<&str> = HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            doomed.push(current.to_string());
            if let Some(n) = self.current.nodes.get(current) {
                stack.extend(n.children.iter().map(|c| c.as_str()));
            }
        }

        let mut nodes = NodeTable::clone(&self.current.nodes);
        if let Some(parent_id) = &node.parent_id {
            if let Some(parent) = nodes.get(parent_id) {
                let mut parent = TreeNode::clone(parent);
                parent.children.retain(|c| c != id);
                nodes.insert(parent_id.clone(), Arc::new(parent));
            }
        }
        for gone in &doomed {
            nodes.remove(gone);
        }

        let expanded = if doomed.iter().any(|d| self.current.expanded.contains(d)) {
            let mut expanded = (*self.current.expanded).clone();
            for gone in &doomed {
                expanded.remove(gone);
            }
            Arc::new(expanded)
        } else {
            Arc::clone(&self.current.expanded)
        };

        log::debug!("remove_node id={} removed={}", id, doomed.len());
        self.commit(TreeSnapshot {
            nodes: Arc::new(nodes),
            expanded,
        });
        true
    }

    pub fn move_node(&mut self, id: &str, next_parent_id: &str, index: Option<isize>) -> bool {
        let Some(node) = self.current.nodes.get(id) else { return false };
        if node.kind == NodeKind::Root || !self.current.nodes.contains_key(next_parent_id) {
            return false;
        }
        if !self.can_adopt(next_parent_id, id) {
            return false;
        }

        let mut nodes = NodeTable::clone(&self.current.nodes);
        let same_parent = node.parent_id.as_deref() == Some(next_parent_id);

        if same_parent {
            let mut parent = TreeNode::clone(&nodes[next_parent_id]);
            let before = parent.children.clone();
            match parent.children.iter().position(|c| c == id) {
                Some(from) => reorder(&mut parent.children, from, index),
                None => {
                    let at = clamp_index(index.unwrap_or(isize::MAX), parent.children.len());
                    parent.children.insert(at, id.to_string());
                }
            }
            if before == parent.children && self.current.expanded.contains(next_parent_id) {
                return false;
            }
            nodes.insert(next_parent_id.to_string(), Arc::new(parent));
        } else {
            if let Some(old_parent_id) = &node.parent_id {
                if let Some(old_parent) = nodes.get(old_parent_id) {
                    let mut old_parent = TreeNode::clone(old_parent);
                    old_parent.children.retain(|c| c != id);
                    nodes.insert(old_parent_id.clone(), Arc::new(old_parent));
                }
            }
            let mut parent = TreeNode::clone(&nodes[next_parent_id]);
            let at = clamp_index(index.unwrap_or(isize::MAX), parent.children.len());
            parent.children.insert(at, id.to_string());
            nodes.insert(next_parent_id.to_string(), Arc::new(parent));

            let moved = TreeNode {
                parent_id: Some(next_parent_id.to_string()),
                ..TreeNode::clone(node)
            };
            nodes.insert(id.to_string(), Arc::new(moved));
        }

        let mut expanded = (*self.current.expanded).clone();
        expanded.insert(next_parent_id.to_string());

        log::debug!("move_node id={} parent={} index={:?}", id, next_parent_id, index);
        self.commit(TreeSnapshot {
            nodes: Arc::new(nodes),
            expanded: Arc::new(expanded),
        });
        true
    }

    // Walk parent links upward from `target`: adopting `id` is only allowed when
    // `id` is not on that path and the path ends at the root.
    fn can_adopt(&self, target: &str, id: &str) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut cursor = Some(target);
        while let Some(current) = cursor {
            if current == id || !visited.insert(current) {
                return false;
            }
            let Some(node) = self.current.nodes.get(current) else { return false };
            if node.kind == NodeKind::Root {
                return true;
            }
            cursor = node.parent_id.as_deref();
        }
        false
    }

    pub fn toggle_expand(&mut self, id: &str) -> bool {
        if !self.current.nodes.contains_key(id) {
            return false;
        }
        let mut expanded = (*self.current.expanded).clone();
        if !expanded.remove(id) {
            expanded.insert(id.to_string());
        }
        log::debug!("toggle_expand id={} expanded={}", id, expanded.contains(id));
        self.commit(TreeSnapshot {
            nodes: Arc::clone(&self.current.nodes),
            expanded: Arc::new(expanded),
        });
        true
    }

    // Block operations
    pub fn add_block(&mut self, node_id: &str, name: Option<&str>) -> Option<BlockId> {
        let node = self.current.nodes.get(node_id)?;
        let id = self.ids.new_id();
        let mut node = TreeNode::clone(node);
        node.blocks.push(BlockItem {
            id: id.clone(),
            name: name.unwrap_or(DEFAULT_BLOCK_NAME).to_string(),
        });

        let mut nodes = NodeTable::clone(&self.current.nodes);
        nodes.insert(node_id.to_string(), Arc::new(node));
        log::debug!("add_block node={} id={}", node_id, id);
        self.commit(self.with_nodes(nodes));
        Some(id)
    }

    pub fn remove_block(&mut self, node_id: &str, block_id: &str) -> bool {
        let Some(node) = self.current.nodes.get(node_id) else { return false };
        let mut node = TreeNode::clone(node);
        let before = node.blocks.len();
        node.blocks.retain(|b| b.id != block_id);
        if node.blocks.len() == before {
            return false;
        }

        let mut nodes = NodeTable::clone(&self.current.nodes);
        nodes.insert(node_id.to_string(), Arc::new(node));
        log::debug!("remove_block node={} id={}", node_id, block_id);
        self.commit(self.with_nodes(nodes));
        true
    }

    pub fn rename_block(&mut self, node_id: &str, block_id: &str, name: &str) -> bool {
        let Some(node) = self.current.nodes.get(node_id) else { return false };
        let mut node = TreeNode::clone(node);
        let Some(block) = node.blocks.iter_mut().find(|b| b.id == block_id) else { return false };
        if block.name == name {
            return false;
        }
        block.name = name.to_string();

        let mut nodes = NodeTable::clone(&self.current.nodes);
        nodes.insert(node_id.to_string(), Arc::new(node));
        log::debug!("rename_block node={} id={}", node_id, block_id);
        self.commit(self.with_nodes(nodes));
        true
    }

    pub fn move_block(&mut self, from_node_id: &str, to_node_id: &str, block_id: &str, index: Option<isize>) -> bool {
        let (Some(from), Some(to)) = (self.current.nodes.get(from_node_id), self.current.nodes.get(to_node_id)) else {
            return false;
        };
        let Some(from_index) = from.blocks.iter().position(|b| b.id == block_id) else { return false };

        let mut nodes = NodeTable::clone(&self.current.nodes);
        if from_node_id == to_node_id {
            let mut node = TreeNode::clone(from);
            reorder(&mut node.blocks, from_index, index);
            if node.blocks == from.blocks {
                return false;
            }
            nodes.insert(from_node_id.to_string(), Arc::new(node));
        } else {
            let mut source = TreeNode::clone(from);
            let block = source.blocks.remove(from_index);
            let mut target = TreeNode::clone(to);
            let at = clamp_index(index.unwrap_or(isize::MAX), target.blocks.len());
            target.blocks.insert(at, block);
            nodes.insert(from_node_id.to_string(), Arc::new(source));
            nodes.insert(to_node_id.to_string(), Arc::new(target));
        }

        log::debug!("move_block id={} from={} to={} index={:?}", block_id, from_node_id, to_node_id, index);
        self.commit(self.with_nodes(nodes));
        true
    }

    // History
    pub fn undo(&mut self) -> bool {
        match self.history.undo(self.current.clone()) {
            Some(previous) => {
                self.current = previous;
                log::debug!("undo past={} future={}", self.history.past_len(), self.history.future_len());
                self.notify();
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo(self.current.clone()) {
            Some(next) => {
                self.current = next;
                log::debug!("redo past={} future={}", self.history.past_len(), self.history.future_len());
                self.notify();
                true
            }
            None => false,
        }
    }

    // Start over with a root-only tree; undoable like any other edit.
    // Already fresh means nothing to record.
    pub fn reset(&mut self) -> bool {
        let fresh = TreeSnapshot::fresh();
        if self.current == fresh {
            return false;
        }
        log::debug!("reset nodes={}", self.current.nodes.len());
        self.commit(fresh);
        true
    }

    // Replace the whole state (e.g. after loading from disk); history is dropped
    pub fn replace(&mut self, state: PersistedTree) -> anyhow::Result<()> {
        self.current = state.into_snapshot()?;
        self.history.clear();
        self.notify();
        Ok(())
    }
}

fn clamp_index(index: isize, len: usize) -> usize {
    index.clamp(0, len as isize) as usize
}

// Move the item at `from` so that it lands in drop slot `index` of the original
// list; slots past the removed item shift down by one. No index means the end.
fn reorder<T>(items: &mut Vec<T>, from: usize, index: Option<isize>) {
    let item = items.remove(from);
    let mut insert_at = index.unwrap_or(isize::MAX);
    if (from as isize) < insert_at {
        insert_at -= 1;
    }
    let at = clamp_index(insert_at, items.len());
    items.insert(at, item);
}
