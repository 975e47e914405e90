use std::collections::HashSet;

use serde::Serialize;

use super::tree::{BlockItem, NodeId, NodeKind, NodeTable, TreeNode};

/// Rendering-facing view of a node. Children are only populated when the node
/// is expanded, while `has_children` always reflects the real child list.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ViewNode {
    pub id: NodeId,
    pub label: String,
    pub kind: NodeKind,
    pub parent_id: Option<NodeId>,
    pub has_children: bool,
    pub is_expanded: bool,
    pub blocks: Vec<BlockItem>,
    pub children: Vec<ViewNode>,
}

struct Frame<'a> {
    node: &'a TreeNode,
    is_expanded: bool,
    next_child: usize,
    children: Vec<ViewNode>,
}

impl<'a> Frame<'a> {
    fn new(node: &'a TreeNode, expanded: &HashSet<NodeId>) -> Self {
        Frame {
            node,
            is_expanded: expanded.contains(&node.id),
            next_child: 0,
            children: Vec::new(),
        }
    }

    fn finish(self) -> ViewNode {
        ViewNode {
            id: self.node.id.clone(),
            label: self.node.name.clone(),
            kind: self.node.kind,
            parent_id: self.node.parent_id.clone(),
            has_children: !self.node.children.is_empty(),
            is_expanded: self.is_expanded,
            blocks: self.node.blocks.clone(),
            children: self.children,
        }
    }
}

/// Build the visible tree below `root_id`. Returns `None` when the root is unknown.
///
/// Uses an explicit stack instead of recursion, so depth is bounded only by memory.
/// Dangling child ids are skipped, and a child already on the current path is
/// skipped too so a corrupted table cannot loop forever.
pub fn project(nodes: &NodeTable, expanded: &HashSet<NodeId>, root_id: &str) -> Option<ViewNode> {
    let root = nodes.get(root_id)?;
    let mut on_path: HashSet<&str> = HashSet::new();
    on_path.insert(root.id.as_str());
    let mut stack = vec![Frame::new(root, expanded)];

    while let Some(frame) = stack.last_mut() {
        let node: &TreeNode = frame.node;
        if frame.is_expanded && frame.next_child < node.children.len() {
            let child_id = node.children[frame.next_child].as_str();
            frame.next_child += 1;
            if let Some(child) = nodes.get(child_id) {
                if on_path.insert(child_id) {
                    stack.push(Frame::new(child, expanded));
                }
            }
            continue;
        }

        let done = stack.pop()?;
        on_path.remove(done.node.id.as_str());
        let view = done.finish();
        match stack.last_mut() {
            Some(parent) => parent.children.push(view),
            None => return Some(view),
        }
    }
    None
}
