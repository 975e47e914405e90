use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::projection::ViewNode;
use super::tree::{BlockItem, NodeId, NodeKind};

pub const DEFAULT_NODE_SIZE: NodeSize = NodeSize { width: 152.0, height: 64.0 };
pub const H_GAP: f32 = 48.0;
pub const V_GAP: f32 = 72.0;
pub const PADDING: f32 = 24.0;
pub const BLOCK_ROW_HEIGHT: f32 = 16.0;
pub const BLOCK_GAP: f32 = 4.0;
// Offset of the first block row below the card's top edge (title sits above it)
pub const BLOCK_LIST_TOP: f32 = 40.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct NodeSize {
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self { Point { x, y } }
}

/// A placed node. Mirrors the view node it came from, minus its children.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LayoutNode {
    pub id: NodeId,
    pub label: String,
    pub kind: NodeKind,
    pub parent_id: Option<NodeId>,
    pub has_children: bool,
    pub is_expanded: bool,
    pub blocks: Vec<BlockItem>,
    // first child of its parent; the root is never first
    pub is_first: bool,
    pub position: Point,
    pub height: f32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LayoutEdge {
    pub from_id: NodeId,
    pub to_id: NodeId,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LayoutResult {
    pub nodes: Vec<LayoutNode>,
    pub edges: Vec<LayoutEdge>,
    pub width: f32,
    pub height: f32,
}

impl LayoutResult {
    pub fn node(&self, id: &str) -> Option<&LayoutNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

// Base card height plus the block list, plus one extra row for the "add block"
// affordance on the selected node.
pub fn node_height(node: &ViewNode, size: NodeSize, selected: Option<&str>) -> f32 {
    let count = node.blocks.len();
    let list = if count > 0 {
        count as f32 * BLOCK_ROW_HEIGHT + (count - 1) as f32 * BLOCK_GAP
    } else {
        0.0
    };
    let selected_space = if selected == Some(node.id.as_str()) { BLOCK_ROW_HEIGHT + BLOCK_GAP } else { 0.0 };
    size.height + list + selected_space
}

/// Top of block row `index` relative to its card. Row `blocks.len()` is the
/// "add block" row reserved on the selected node.
pub fn block_row_top(index: usize) -> f32 {
    BLOCK_LIST_TOP + index as f32 * (BLOCK_ROW_HEIGHT + BLOCK_GAP)
}

// Insertion marker for drop slot `index`, centered in the gap above that row
pub fn drop_marker_y(index: usize) -> f32 {
    block_row_top(index) - BLOCK_GAP / 2.0
}

struct Measurements<'a> {
    size: NodeSize,
    selected: Option<&'a str>,
    widths: HashMap<&'a str, f32>,
    heights: HashMap<&'a str, f32>,
    visiting: HashSet<&'a str>,
}

impl<'a> Measurements<'a> {
    // Post-order: a subtree is as wide as its card or its row of child subtrees
    fn measure(&mut self, node: &'a ViewNode) -> f32 {
        if !self.visiting.insert(node.id.as_str()) {
            return self.size.width;
        }
        self.heights.insert(node.id.as_str(), node_height(node, self.size, self.selected));

        let mut children_width = 0.0;
        for (i, child) in node.children.iter().enumerate() {
            children_width += self.measure(child);
            if i > 0 {
                children_width += H_GAP;
            }
        }
        let width = self.size.width.max(children_width);
        self.widths.insert(node.id.as_str(), width);

        self.visiting.remove(node.id.as_str());
        width
    }

    fn width(&self, id: &str) -> f32 { self.widths.get(id).copied().unwrap_or(self.size.width) }
    fn height(&self, id: &str) -> f32 { self.heights.get(id).copied().unwrap_or(self.size.height) }
}

struct Placement<'m, 'a> {
    measured: &'m Measurements<'a>,
    nodes: Vec<LayoutNode>,
    edges: Vec<LayoutEdge>,
    max_y: f32,
}

impl Placement<'_, '_> {
    // Pre-order: center the card over its allocation, then lay children left to right
    fn place(&mut self, node: &ViewNode, left: f32, top: f32, is_first: bool) {
        let size = self.measured.size;
        let subtree_width = self.measured.width(&node.id);
        let height = self.measured.height(&node.id);
        let x = left + (subtree_width - size.width) / 2.0;

        self.nodes.push(LayoutNode {
            id: node.id.clone(),
            label: node.label.clone(),
            kind: node.kind,
            parent_id: node.parent_id.clone(),
            has_children: node.has_children,
            is_expanded: node.is_expanded,
            blocks: node.blocks.clone(),
            is_first,
            position: Point::new(x.round(), top.round()),
            height,
        });
        self.max_y = self.max_y.max(top + height);

        if node.children.is_empty() {
            return;
        }

        let row_width: f32 = node.children.iter().map(|c| self.measured.width(&c.id)).sum::<f32>()
            + H_GAP * (node.children.len() - 1) as f32;
        let mut child_left = left + ((subtree_width - row_width) / 2.0).max(0.0);
        let child_top = top + height + V_GAP;

        for (i, child) in node.children.iter().enumerate() {
            self.edges.push(LayoutEdge {
                from_id: node.id.clone(),
                to_id: child.id.clone(),
            });
            self.place(child, child_left, child_top, i == 0);
            child_left += self.measured.width(&child.id) + H_GAP;
        }
    }
}

/// Two-pass tidy layout: measure subtree widths bottom-up, then place nodes
/// top-down. Edges come out in placement order (a parent's edges before its
/// children's, children in list order).
///
/// Recursion depth equals tree depth; the visible trees this is fed are shallow.
pub fn layout_tree(root: &ViewNode, size: NodeSize, canvas_width: f32, selected: Option<&str>) -> LayoutResult {
    let mut measured = Measurements {
        size,
        selected,
        widths: HashMap::new(),
        heights: HashMap::new(),
        visiting: HashSet::new(),
    };
    let tree_width = measured.measure(root);

    let mut placement = Placement {
        measured: &measured,
        nodes: Vec::new(),
        edges: Vec::new(),
        max_y: 0.0,
    };
    let start_left = if tree_width < canvas_width { (canvas_width - tree_width) / 2.0 } else { PADDING };
    placement.place(root, start_left, PADDING, false);

    LayoutResult {
        width: (tree_width + PADDING * 2.0).max(canvas_width),
        height: placement.max_y + PADDING,
        nodes: placement.nodes,
        edges: placement.edges,
    }
}

pub fn top_anchor(node: &LayoutNode, size: NodeSize) -> Point {
    Point::new(node.position.x + size.width / 2.0, node.position.y)
}

pub fn bottom_anchor(node: &LayoutNode, size: NodeSize) -> Point {
    Point::new(node.position.x + size.width / 2.0, node.position.y + node.height)
}

// Elbow connector: down to the midline, across, then down into the child
pub fn connector_points(from: Point, to: Point) -> [Point; 4] {
    let mid_y = (from.y + to.y) / 2.0;
    [from, Point::new(from.x, mid_y), Point::new(to.x, mid_y), to]
}
