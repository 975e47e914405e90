use std::cell::Cell;
use std::rc::Rc;

use tree_loom::gui::drag::{apply_block_drop, DragPayload};
use tree_loom::tree_utils::history::History;
use tree_loom::tree_utils::ids::SequentialIds;
use tree_loom::tree_utils::tree::{NodeKind, TreeStore, ROOT_ID};

fn new_store() -> TreeStore {
    TreeStore::new(SequentialIds::new())
}

fn block_ids(store: &TreeStore, node: &str) -> Vec<String> {
    store.node(node).expect("node exists").blocks.iter().map(|b| b.id.clone()).collect()
}

#[test]
fn store_starts_with_expanded_root() {
    let store = new_store();
    let root = store.node(ROOT_ID).expect("root exists");
    assert_eq!(root.kind, NodeKind::Root);
    assert_eq!(root.name, "Root");
    assert!(root.parent_id.is_none());
    assert!(store.is_expanded(ROOT_ID));
    assert_eq!(store.root_id(), Some(ROOT_ID));
    assert!(!store.can_undo());
}

#[test]
fn rename_node_and_ignore_missing_or_unchanged() {
    let mut store = new_store();
    let before = store.snapshot().clone();

    assert!(!store.rename_node("missing", "Nope"));
    assert!(!store.rename_node(ROOT_ID, "Root"));
    assert!(store.snapshot().ptr_eq(&before));
    assert_eq!(store.past_len(), 0);

    assert!(store.rename_node(ROOT_ID, "New Root"));
    assert_eq!(store.node(ROOT_ID).unwrap().name, "New Root");
    assert_eq!(store.past_len(), 1);
}

#[test]
fn add_node_appends_child_and_expands_parent() {
    let mut store = new_store();
    store.toggle_expand(ROOT_ID);
    assert!(!store.is_expanded(ROOT_ID));

    let child = store.add_node(ROOT_ID, Some("Child")).expect("child created");
    assert_eq!(child, "test-id-1");
    assert_eq!(store.children(ROOT_ID), &[child.clone()]);
    assert!(store.is_expanded(ROOT_ID));

    let node = store.node(&child).unwrap();
    assert_eq!(node.name, "Child");
    assert_eq!(node.kind, NodeKind::Block);
    assert_eq!(node.parent_id.as_deref(), Some(ROOT_ID));

    let unnamed = store.add_node(ROOT_ID, None).unwrap();
    assert_eq!(store.node(&unnamed).unwrap().name, "Page");
}

#[test]
fn add_node_to_missing_parent_returns_none() {
    let mut store = new_store();
    assert!(store.add_node("missing", Some("Child")).is_none());
    assert_eq!(store.node_count(), 1);
    assert_eq!(store.past_len(), 0);
}

#[test]
fn remove_node_deletes_whole_subtree_only() {
    let mut store = new_store();
    let a = store.add_node(ROOT_ID, Some("A")).unwrap();
    let b = store.add_node(ROOT_ID, Some("B")).unwrap();
    let a1 = store.add_node(&a, Some("A1")).unwrap();
    let a11 = store.add_node(&a1, Some("A11")).unwrap();
    let b1 = store.add_node(&b, Some("B1")).unwrap();
    assert!(store.is_expanded(&a1));

    assert!(store.remove_node(&a));

    assert_eq!(store.children(ROOT_ID), &[b.clone()]);
    for gone in [&a, &a1, &a11] {
        assert!(store.node(gone).is_none());
        assert!(!store.is_expanded(gone));
    }
    assert!(store.node(&b).is_some());
    assert!(store.node(&b1).is_some());
    assert_eq!(store.node_count(), 3);
}

#[test]
fn root_cannot_be_removed() {
    let mut store = new_store();
    store.add_node(ROOT_ID, None);
    let past = store.past_len();
    assert!(!store.remove_node(ROOT_ID));
    assert!(store.node(ROOT_ID).is_some());
    assert_eq!(store.past_len(), past);
}

#[test]
fn remove_node_handles_deep_chains() {
    let mut store = TreeStore::with_history_limit(SequentialIds::new(), 5);
    let first = store.add_node(ROOT_ID, None).unwrap();
    let mut tip = first.clone();
    for _ in 0..3_000 {
        tip = store.add_node(&tip, None).unwrap();
    }
    assert!(store.view().is_some());
    assert!(store.remove_node(&first));
    assert_eq!(store.node_count(), 1);
    assert!(store.children(ROOT_ID).is_empty());
}

#[test]
fn blocks_add_rename_remove() {
    let mut store = new_store();
    let block = store.add_block(ROOT_ID, Some("Block A")).unwrap();
    assert!(store.rename_block(ROOT_ID, &block, "Block B"));
    let blocks = &store.node(ROOT_ID).unwrap().blocks;
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].name, "Block B");

    // Unknown block or unchanged name: nothing recorded
    let past = store.past_len();
    assert!(!store.rename_block(ROOT_ID, "missing", "X"));
    assert!(!store.rename_block(ROOT_ID, &block, "Block B"));
    assert!(!store.rename_block("missing", &block, "X"));
    assert_eq!(store.past_len(), past);

    assert!(store.remove_block(ROOT_ID, &block));
    assert!(store.node(ROOT_ID).unwrap().blocks.is_empty());
    assert!(!store.remove_block(ROOT_ID, "missing"));
    assert!(!store.remove_block("missing", &block));

    let unnamed = store.add_block(ROOT_ID, None).unwrap();
    assert_eq!(store.node(ROOT_ID).unwrap().blocks[0].id, unnamed);
    assert_eq!(store.node(ROOT_ID).unwrap().blocks[0].name, "New Block");
}

#[test]
fn add_block_to_missing_node_returns_none() {
    let mut store = new_store();
    let keys = store.nodes().len();
    assert!(store.add_block("missing", Some("Block")).is_none());
    assert_eq!(store.nodes().len(), keys);
}

#[test]
fn move_block_reorders_within_node() {
    let mut store = new_store();
    let a = store.add_block(ROOT_ID, Some("A")).unwrap();
    let b = store.add_block(ROOT_ID, Some("B")).unwrap();
    let c = store.add_block(ROOT_ID, Some("C")).unwrap();

    assert!(store.move_block(ROOT_ID, ROOT_ID, &c, Some(0)));
    assert_eq!(block_ids(&store, ROOT_ID), vec![c.clone(), a.clone(), b.clone()]);

    // No index means "to the end"
    assert!(store.move_block(ROOT_ID, ROOT_ID, &c, None));
    assert_eq!(block_ids(&store, ROOT_ID), vec![a, b, c]);
}

#[test]
fn move_block_clamps_index() {
    let mut store = new_store();
    let a = store.add_block(ROOT_ID, Some("A")).unwrap();
    let b = store.add_block(ROOT_ID, Some("B")).unwrap();
    let c = store.add_block(ROOT_ID, Some("C")).unwrap();

    assert!(store.move_block(ROOT_ID, ROOT_ID, &c, Some(-100)));
    assert_eq!(block_ids(&store, ROOT_ID), vec![c.clone(), a.clone(), b.clone()]);

    assert!(store.move_block(ROOT_ID, ROOT_ID, &c, Some(100)));
    assert_eq!(block_ids(&store, ROOT_ID), vec![a.clone(), b.clone(), c.clone()]);

    // Already first: clamps to the same spot and records nothing
    let past = store.past_len();
    assert!(!store.move_block(ROOT_ID, ROOT_ID, &a, Some(-5)));
    assert_eq!(block_ids(&store, ROOT_ID), vec![a, b, c]);
    assert_eq!(store.past_len(), past);
}

#[test]
fn move_block_round_trip_restores_order() {
    let mut store = new_store();
    for name in ["A", "B", "C", "D"] {
        store.add_block(ROOT_ID, Some(name));
    }
    let original = block_ids(&store, ROOT_ID);
    let moving = original[1].clone();

    assert!(store.move_block(ROOT_ID, ROOT_ID, &moving, Some(3)));
    assert_ne!(block_ids(&store, ROOT_ID), original);
    assert!(store.move_block(ROOT_ID, ROOT_ID, &moving, Some(1)));
    assert_eq!(block_ids(&store, ROOT_ID), original);
}

#[test]
fn move_block_across_nodes() {
    let mut store = new_store();
    let child = store.add_node(ROOT_ID, Some("Child")).unwrap();
    let existing = store.add_block(&child, Some("Existing")).unwrap();
    let block = store.add_block(ROOT_ID, Some("Block")).unwrap();

    assert!(store.move_block(ROOT_ID, &child, &block, Some(0)));
    assert!(store.node(ROOT_ID).unwrap().blocks.is_empty());
    assert_eq!(block_ids(&store, &child), vec![block.clone(), existing.clone()]);
    assert_eq!(store.node(&child).unwrap().blocks[0].name, "Block");

    // Out of range index lands at the end of the target list
    assert!(store.move_block(&child, ROOT_ID, &existing, Some(42)));
    assert_eq!(block_ids(&store, ROOT_ID), vec![existing]);
}

#[test]
fn move_block_ignores_missing_block_or_nodes() {
    let mut store = new_store();
    let block = store.add_block(ROOT_ID, Some("Block")).unwrap();
    let past = store.past_len();

    assert!(!store.move_block(ROOT_ID, ROOT_ID, "missing", Some(0)));
    assert!(!store.move_block("missing", ROOT_ID, &block, Some(0)));
    assert!(!store.move_block(ROOT_ID, "missing", &block, Some(0)));
    assert_eq!(block_ids(&store, ROOT_ID), vec![block]);
    assert_eq!(store.past_len(), past);
}

#[test]
fn move_node_across_parents() {
    let mut store = new_store();
    let a = store.add_node(ROOT_ID, Some("A")).unwrap();
    let b = store.add_node(ROOT_ID, Some("B")).unwrap();
    let b1 = store.add_node(&b, Some("B1")).unwrap();
    store.toggle_expand(&b);
    assert!(!store.is_expanded(&b));

    assert!(store.move_node(&a, &b, Some(0)));
    assert_eq!(store.children(ROOT_ID), &[b.clone()]);
    assert_eq!(store.children(&b), &[a.clone(), b1.clone()]);
    assert_eq!(store.node(&a).unwrap().parent_id.as_deref(), Some(b.as_str()));
    assert!(store.is_expanded(&b));
}

#[test]
fn move_node_reorders_within_parent() {
    let mut store = new_store();
    let a = store.add_node(ROOT_ID, Some("A")).unwrap();
    let b = store.add_node(ROOT_ID, Some("B")).unwrap();
    let c = store.add_node(ROOT_ID, Some("C")).unwrap();

    assert!(store.move_node(&c, ROOT_ID, Some(0)));
    assert_eq!(store.children(ROOT_ID), &[c.clone(), a.clone(), b.clone()]);

    let past = store.past_len();
    assert!(!store.move_node(&c, ROOT_ID, Some(0)));
    assert_eq!(store.past_len(), past);
}

#[test]
fn move_node_rejects_cycles_and_root() {
    let mut store = new_store();
    let a = store.add_node(ROOT_ID, Some("A")).unwrap();
    let a1 = store.add_node(&a, Some("A1")).unwrap();
    let a11 = store.add_node(&a1, Some("A11")).unwrap();
    let before = store.snapshot().clone();

    assert!(!store.move_node(&a, &a, None));
    assert!(!store.move_node(&a, &a1, None));
    assert!(!store.move_node(&a, &a11, None));
    assert!(!store.move_node(ROOT_ID, &a, None));
    assert!(!store.move_node("missing", ROOT_ID, None));
    assert!(!store.move_node(&a1, "missing", None));
    assert!(store.snapshot().ptr_eq(&before));

    // Moving a descendant up is fine
    assert!(store.move_node(&a11, ROOT_ID, None));
    assert_eq!(store.children(ROOT_ID), &[a, a11]);
}

#[test]
fn toggle_expand_flips_and_records_history() {
    let mut store = new_store();
    assert!(store.toggle_expand(ROOT_ID));
    assert!(!store.is_expanded(ROOT_ID));
    assert!(store.toggle_expand(ROOT_ID));
    assert!(store.is_expanded(ROOT_ID));
    assert_eq!(store.past_len(), 2);

    assert!(!store.toggle_expand("missing"));
    assert_eq!(store.past_len(), 2);

    assert!(store.undo());
    assert!(!store.is_expanded(ROOT_ID));
}

#[test]
fn undo_then_redo_restores_states() {
    let mut store = new_store();
    let initial = store.snapshot().clone();

    let child = store.add_node(ROOT_ID, Some("Child")).unwrap();
    let block = store.add_block(&child, Some("Block")).unwrap();
    store.rename_block(&child, &block, "Renamed");
    store.add_node(&child, Some("Grand"));
    store.move_block(&child, ROOT_ID, &block, None);
    store.toggle_expand(&child);
    store.remove_node(&child);
    let last = store.snapshot().clone();
    let ops = store.past_len();
    assert_eq!(ops, 7);

    for _ in 0..ops {
        assert!(store.undo());
    }
    assert_eq!(store.snapshot(), &initial);
    assert!(!store.undo());
    assert_eq!(store.future_len(), ops);

    for _ in 0..ops {
        assert!(store.redo());
    }
    assert_eq!(store.snapshot(), &last);
    assert!(!store.redo());
}

#[test]
fn new_edit_clears_redo() {
    let mut store = new_store();
    store.add_node(ROOT_ID, None);
    store.undo();
    assert!(store.can_redo());
    store.add_block(ROOT_ID, None);
    assert!(!store.can_redo());
}

#[test]
fn history_is_capped() {
    let mut store = new_store();
    for i in 0..75 {
        store.rename_node(ROOT_ID, &format!("Root {}", i));
        assert!(store.past_len() <= 50);
    }
    assert_eq!(store.past_len(), 50);

    let mut undone = 0;
    while store.undo() {
        undone += 1;
    }
    assert_eq!(undone, 50);
    // Oldest surviving snapshot is the one taken before edit #25
    assert_eq!(store.node(ROOT_ID).unwrap().name, "Root 24");
    assert_eq!(store.future_len(), 50);
}

#[test]
fn history_stacks_keep_order() {
    let mut history: History<u32> = History::new(3);
    for v in 1..=5 {
        history.record(v);
    }
    assert_eq!(history.past_len(), 3);
    assert_eq!(history.undo(6), Some(5));
    assert_eq!(history.undo(5), Some(4));
    assert_eq!(history.redo(4), Some(5));
    assert_eq!(history.redo(5), Some(6));
    assert_eq!(history.redo(6), None);
}

#[test]
fn untouched_nodes_are_shared_between_snapshots() {
    let mut store = new_store();
    let a = store.add_node(ROOT_ID, Some("A")).unwrap();
    let b = store.add_node(ROOT_ID, Some("B")).unwrap();
    let before = store.snapshot().clone();

    store.rename_node(&a, "A2");
    let after = store.snapshot();
    assert!(std::sync::Arc::ptr_eq(&before.nodes[&b], &after.nodes[&b]));
    assert!(!std::sync::Arc::ptr_eq(&before.nodes[&a], &after.nodes[&a]));
    assert!(std::sync::Arc::ptr_eq(&before.expanded, &after.expanded));
}

#[test]
fn subscribers_hear_changes_but_not_noops() {
    let mut store = new_store();
    let hits = Rc::new(Cell::new(0));
    let counter = Rc::clone(&hits);
    let sub = store.subscribe(move |_| counter.set(counter.get() + 1));

    store.add_node(ROOT_ID, None);
    store.rename_node(ROOT_ID, "Root");
    store.remove_node(ROOT_ID);
    store.undo();
    store.redo();
    assert_eq!(hits.get(), 3);

    assert!(store.unsubscribe(sub));
    assert!(!store.unsubscribe(sub));
    store.add_block(ROOT_ID, None);
    assert_eq!(hits.get(), 3);
}

#[test]
fn reset_is_undoable() {
    let mut store = new_store();
    let child = store.add_node(ROOT_ID, Some("Child")).unwrap();
    assert!(store.reset());
    assert_eq!(store.node_count(), 1);
    assert!(store.undo());
    assert!(store.node(&child).is_some());
}

#[test]
fn reset_of_a_fresh_tree_records_nothing() {
    let mut store = new_store();
    assert!(!store.reset());
    assert!(!store.can_undo());

    // Back to a bare root after edits is fresh again
    let child = store.add_node(ROOT_ID, None).unwrap();
    store.remove_node(&child);
    let past = store.past_len();
    assert!(!store.reset());
    assert_eq!(store.past_len(), past);
}

#[test]
fn projection_skips_children_of_collapsed_nodes() {
    let mut store = new_store();
    let child = store.add_node(ROOT_ID, Some("Child")).unwrap();
    let block = store.add_block(&child, Some("Block 1")).unwrap();

    let view = store.view().expect("root projects");
    assert_eq!(view.id, ROOT_ID);
    assert_eq!(view.label, "Root");
    assert!(view.has_children);
    assert!(view.is_expanded);
    assert_eq!(view.children.len(), 1);
    let child_view = &view.children[0];
    assert_eq!(child_view.label, "Child");
    assert_eq!(child_view.parent_id.as_deref(), Some(ROOT_ID));
    assert!(!child_view.has_children);
    assert_eq!(child_view.blocks[0].id, block);

    store.toggle_expand(ROOT_ID);
    let collapsed = store.view().unwrap();
    assert!(collapsed.has_children);
    assert!(!collapsed.is_expanded);
    assert!(collapsed.children.is_empty());
}

#[test]
fn projection_of_missing_root_is_none() {
    let store = new_store();
    let snap = store.snapshot();
    assert!(tree_loom::tree_utils::projection::project(&snap.nodes, &snap.expanded, "missing").is_none());
}

#[test]
fn drag_payload_parses_only_well_formed_input() {
    let payload = DragPayload::new("b1", "n1");
    let raw = payload.encode();
    assert_eq!(raw, r#"{"blockId":"b1","fromNodeId":"n1"}"#);
    assert_eq!(DragPayload::parse(&raw), Some(payload));

    assert!(DragPayload::parse("").is_none());
    assert!(DragPayload::parse("not json").is_none());
    assert!(DragPayload::parse(r#"{"blockId":"b1"}"#).is_none());
    assert!(DragPayload::parse(r#"{"blockId":"","fromNodeId":"n1"}"#).is_none());
    assert!(DragPayload::parse(r#"{"blockId":1,"fromNodeId":"n1"}"#).is_none());
}

#[test]
fn drop_moves_block_and_ignores_garbage() {
    let mut store = new_store();
    let child = store.add_node(ROOT_ID, Some("Child")).unwrap();
    let block = store.add_block(ROOT_ID, Some("Block")).unwrap();
    let past = store.past_len();

    assert!(!apply_block_drop(&mut store, "{garbage", &child, None));
    assert_eq!(store.past_len(), past);

    let raw = DragPayload::new(&block, ROOT_ID).encode();
    assert!(apply_block_drop(&mut store, &raw, &child, None));
    assert_eq!(block_ids(&store, &child), vec![block]);
}
