use std::cell::Cell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use egui::{self, Align2, Color32, FontId, Pos2, Rect, Sense, Stroke, Vec2};

use crate::gui::drag::{self, DragPayload};
use crate::persistence::persist;
use crate::persistence::settings::EditorSettings;
use crate::tree_utils::layout::{
    block_row_top, bottom_anchor, connector_points, drop_marker_y, layout_tree, top_anchor, LayoutNode, Point,
    BLOCK_ROW_HEIGHT, DEFAULT_NODE_SIZE,
};
use crate::tree_utils::tree::{BlockId, NodeId, NodeKind, TreeStore};

const CARD_RADIUS: f32 = 8.0;
const TOGGLE_RADIUS: f32 = 9.0;
const INFO_TTL: Duration = Duration::from_secs(3);

const INK: Color32 = Color32::from_rgb(15, 23, 42);
const CARD_FILL: Color32 = Color32::from_rgb(249, 250, 251);
const CARD_SELECTED: Color32 = Color32::from_rgb(219, 234, 254);
const ROW_FILL: Color32 = Color32::from_rgb(229, 231, 235);
const CANVAS_BG: Color32 = Color32::from_rgb(198, 217, 234);

// Intents collected while painting the canvas, applied once painting is done
enum CanvasAction {
    Select(NodeId),
    ToggleExpand(NodeId),
    AddChild(NodeId),
    AddBlock(NodeId),
    Remove(NodeId),
    DropBlock { raw: String, to: NodeId, index: Option<isize> },
}

pub struct TreeApp {
    store: TreeStore,
    settings: EditorSettings,
    selected: Option<NodeId>,
    // Raised by the store subscription after every state change
    changed: Rc<Cell<bool>>,
    // persistence
    dirty: bool,
    last_change: Instant,
    save_error: Option<String>,
    last_info: Option<(String, Instant)>,
    show_load_versions: bool,
    versions: Vec<PathBuf>,
    // Inspector edit buffers
    name_edit_for: Option<NodeId>,
    node_name_edit: String,
    block_name_edits: HashMap<BlockId, String>,
    move_target: Option<NodeId>,
}

impl TreeApp {
    pub fn new(mut store: TreeStore, settings: EditorSettings) -> Self {
        let changed = Rc::new(Cell::new(false));
        let flag = Rc::clone(&changed);
        store.subscribe(move |_| flag.set(true));
        Self {
            store,
            settings,
            selected: None,
            changed,
            dirty: false,
            last_change: Instant::now(),
            save_error: None,
            last_info: None,
            show_load_versions: false,
            versions: Vec::new(),
            name_edit_for: None,
            node_name_edit: String::new(),
            block_name_edits: HashMap::new(),
            move_target: None,
        }
    }

    fn info(&mut self, msg: impl Into<String>) {
        self.last_info = Some((msg.into(), Instant::now()));
    }

    // Pick up store notifications: mark dirty, drop stale selection and buffers
    fn sync_after_change(&mut self) {
        if !self.changed.replace(false) {
            return;
        }
        self.dirty = true;
        self.last_change = Instant::now();
        if let Some(id) = &self.selected {
            if self.store.node(id).is_none() {
                self.selected = None;
            }
        }
        if let Some(target) = &self.move_target {
            if self.store.node(target).is_none() {
                self.move_target = None;
            }
        }
        self.name_edit_for = None;
        self.block_name_edits.clear();
    }

    fn save_now(&mut self) {
        let state = self.store.partialize();
        match persist::save_active(&self.settings.autosave_dir(), &state) {
            Ok(path) => {
                self.dirty = false;
                self.save_error = None;
                self.info(format!("Saved to {}", path.display()));
            }
            Err(e) => {
                log::warn!("save failed: {}", e);
                self.save_error = Some(format!("Save failed: {}", e));
            }
        }
    }

    fn save_versioned_now(&mut self) {
        let state = self.store.partialize();
        match persist::save_versioned(&self.settings.autosave_dir(), &state) {
            Ok(path) => {
                self.save_error = None;
                self.info(format!("Saved version {}", path.display()));
            }
            Err(e) => {
                log::warn!("save version failed: {}", e);
                self.save_error = Some(format!("Save version failed: {}", e));
            }
        }
    }

    fn maybe_autosave(&mut self, ctx: &egui::Context) {
        if !self.settings.autosave_enabled || !self.dirty {
            return;
        }
        let debounce = self.settings.autosave_debounce();
        if self.last_change.elapsed() >= debounce {
            self.save_now();
        } else {
            ctx.request_repaint_after(debounce);
        }
    }

    fn load_from(&mut self, path: Option<PathBuf>) {
        let dir = self.settings.autosave_dir();
        let loaded = match path {
            Some(p) => persist::load_from_path(&p).map(Some),
            None => persist::load_active(&dir),
        };
        match loaded {
            Ok(Some(state)) => match self.store.replace(state) {
                Ok(()) => {
                    self.sync_after_change();
                    self.dirty = false;
                    self.save_error = None;
                    self.info("Loaded saved tree");
                }
                Err(e) => self.save_error = Some(format!("Load failed: {}", e)),
            },
            Ok(None) => self.save_error = Some("No saved tree found".into()),
            Err(e) => self.save_error = Some(format!("Load failed: {}", e)),
        }
    }

    fn open_versions(&mut self) {
        match persist::list_versions(&self.settings.autosave_dir()) {
            Ok(v) => {
                self.versions = v;
                self.show_load_versions = true;
            }
            Err(e) => self.save_error = Some(format!("Listing versions failed: {}", e)),
        }
    }

    fn new_tree(&mut self) {
        // Back up the current tree when it has more than a bare root
        let had_content = self.store.node_count() > 1;
        if had_content { self.save_versioned_now(); }
        let cleared = self.store.reset();
        self.selected = None;
        self.info(match (cleared, had_content) {
            (false, _) => "Tree is already empty",
            (true, true) => "Started a new tree (backup saved)",
            (true, false) => "Started a new tree",
        });
    }

    fn undo(&mut self) {
        if !self.store.undo() { self.info("Nothing to undo"); }
    }

    fn redo(&mut self) {
        if !self.store.redo() { self.info("Nothing to redo"); }
    }

    fn apply(&mut self, action: CanvasAction) {
        match action {
            CanvasAction::Select(id) => self.selected = Some(id),
            CanvasAction::ToggleExpand(id) => { self.store.toggle_expand(&id); }
            CanvasAction::AddChild(id) => {
                if let Some(child) = self.store.add_node(&id, None) {
                    self.selected = Some(child);
                }
            }
            CanvasAction::AddBlock(id) => { self.store.add_block(&id, None); }
            CanvasAction::Remove(id) => { self.store.remove_node(&id); }
            CanvasAction::DropBlock { raw, to, index } => {
                drag::apply_block_drop(&mut self.store, &raw, &to, index);
            }
        }
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        let redo_shift = egui::KeyboardShortcut::new(egui::Modifiers::COMMAND | egui::Modifiers::SHIFT, egui::Key::Z);
        let redo_y = egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::Y);
        let undo = egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::Z);
        let save = egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::S);
        // Check the shifted chord first so Ctrl+Z does not swallow it
        if ctx.input_mut(|i| i.consume_shortcut(&redo_shift) || i.consume_shortcut(&redo_y)) {
            self.redo();
        } else if ctx.input_mut(|i| i.consume_shortcut(&undo)) {
            self.undo();
        }
        if ctx.input_mut(|i| i.consume_shortcut(&save)) {
            self.save_now();
        }
    }

    fn top_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Tree-Loom");

                ui.menu_button("File", |ui| {
                    let save = egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::S);
                    if ui.add(egui::Button::new("Save").shortcut_text(ctx.format_shortcut(&save))).clicked() {
                        self.save_now();
                        ui.close();
                    }
                    if ui.button("Save Version").clicked() {
                        self.save_versioned_now();
                        ui.close();
                    }
                    if ui.button("Load Latest").clicked() {
                        self.load_from(None);
                        ui.close();
                    }
                    if ui.button("Load Version…").clicked() {
                        self.open_versions();
                        ui.close();
                    }
                    ui.separator();
                    if ui.button("New Tree").clicked() {
                        self.new_tree();
                        ui.close();
                    }
                    ui.separator();
                    if ui.button("Quit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                        ui.close();
                    }
                });

                ui.menu_button("Edit", |ui| {
                    let undo = egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::Z);
                    let redo = egui::KeyboardShortcut::new(egui::Modifiers::COMMAND | egui::Modifiers::SHIFT, egui::Key::Z);
                    let undo_btn = egui::Button::new("Undo").shortcut_text(ctx.format_shortcut(&undo));
                    if ui.add_enabled(self.store.can_undo(), undo_btn).clicked() {
                        self.undo();
                        ui.close();
                    }
                    let redo_btn = egui::Button::new("Redo").shortcut_text(ctx.format_shortcut(&redo));
                    if ui.add_enabled(self.store.can_redo(), redo_btn).clicked() {
                        self.redo();
                        ui.close();
                    }
                });

                ui.small(format!(
                    "Nodes:{} Undo:{} Redo:{}",
                    self.store.node_count(),
                    self.store.past_len(),
                    self.store.future_len()
                ));
                if let Some(err) = &self.save_error {
                    ui.separator();
                    ui.colored_label(Color32::RED, err.as_str());
                } else if let Some((msg, at)) = &self.last_info {
                    if at.elapsed() < INFO_TTL {
                        ui.separator();
                        ui.small(msg.as_str());
                        ctx.request_repaint_after(INFO_TTL);
                    }
                }
            });
        });
    }

    fn versions_window(&mut self, ctx: &egui::Context) {
        if !self.show_load_versions {
            return;
        }
        let mut open = true;
        let mut chosen: Option<PathBuf> = None;
        egui::Window::new("Load Version").open(&mut open).collapsible(false).show(ctx, |ui| {
            if self.versions.is_empty() {
                ui.label("No saved versions");
            }
            egui::ScrollArea::vertical().max_height(240.0).show(ui, |ui| {
                for p in &self.versions {
                    let name = p.file_name().and_then(|s| s.to_str()).unwrap_or("?");
                    if ui.button(name).clicked() {
                        chosen = Some(p.clone());
                    }
                }
            });
        });
        if let Some(p) = chosen {
            self.load_from(Some(p));
            open = false;
        }
        self.show_load_versions = open;
    }

    fn inspector(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("inspector")
            .resizable(true)
            .default_width(260.0)
            .show(ctx, |ui| {
                ui.heading("Inspector");
                ui.separator();
                let Some(id) = self.selected.clone() else {
                    ui.label("Select a node on the canvas.");
                    return;
                };
                let Some(node) = self.store.node(&id).cloned() else { return };
                let is_root = node.kind == NodeKind::Root;

                if self.name_edit_for.as_deref() != Some(id.as_str()) {
                    self.node_name_edit = node.name.clone();
                    self.name_edit_for = Some(id.clone());
                }
                ui.horizontal(|ui| {
                    ui.label("Name");
                    let resp = ui.text_edit_singleline(&mut self.node_name_edit);
                    if resp.lost_focus() {
                        let name = self.node_name_edit.trim().to_string();
                        if !name.is_empty() {
                            self.store.rename_node(&id, &name);
                        }
                    }
                });
                ui.small(if is_root { "Root node" } else { "Page" });

                ui.horizontal_wrapped(|ui| {
                    if ui.button("Add child").clicked() {
                        self.apply(CanvasAction::AddChild(id.clone()));
                    }
                    if ui.button("Add block").clicked() {
                        self.store.add_block(&id, None);
                    }
                    if !node.children.is_empty() {
                        let label = if self.store.is_expanded(&id) { "Collapse" } else { "Expand" };
                        if ui.button(label).clicked() {
                            self.store.toggle_expand(&id);
                        }
                    }
                    if ui.add_enabled(!is_root, egui::Button::new("Delete")).clicked() {
                        self.store.remove_node(&id);
                    }
                });

                if !is_root {
                    ui.separator();
                    self.reparent_controls(ui, &id);
                }

                ui.separator();
                ui.label(format!("Blocks ({})", node.blocks.len()));
                let count = node.blocks.len();
                for (i, block) in node.blocks.iter().enumerate() {
                    ui.horizontal(|ui| {
                        let buf = self
                            .block_name_edits
                            .entry(block.id.clone())
                            .or_insert_with(|| block.name.clone());
                        let resp = ui.add(egui::TextEdit::singleline(buf).desired_width(120.0));
                        if resp.lost_focus() {
                            let name = buf.trim().to_string();
                            if !name.is_empty() {
                                self.store.rename_block(&id, &block.id, &name);
                            }
                        }
                        if ui.add_enabled(i > 0, egui::Button::new("↑").small()).clicked() {
                            self.store.move_block(&id, &id, &block.id, Some(i as isize - 1));
                        }
                        // Drop slots count the block itself, so "one down" is slot i + 2
                        if ui.add_enabled(i + 1 < count, egui::Button::new("↓").small()).clicked() {
                            self.store.move_block(&id, &id, &block.id, Some(i as isize + 2));
                        }
                        if ui.small_button("✕").clicked() {
                            self.store.remove_block(&id, &block.id);
                        }
                    });
                }
            });
    }

    fn reparent_controls(&mut self, ui: &mut egui::Ui, id: &str) {
        let mut candidates: Vec<(NodeId, String)> = self
            .store
            .nodes()
            .values()
            .filter(|n| n.id != id)
            .map(|n| (n.id.clone(), n.name.clone()))
            .collect();
        candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let selected_text = self
            .move_target
            .as_deref()
            .and_then(|t| self.store.node(t))
            .map(|n| n.name.clone())
            .unwrap_or_else(|| "Choose parent…".to_string());
        ui.horizontal(|ui| {
            egui::ComboBox::from_id_salt("move_target")
                .selected_text(selected_text)
                .show_ui(ui, |ui| {
                    for (cid, name) in &candidates {
                        ui.selectable_value(&mut self.move_target, Some(cid.clone()), name.as_str());
                    }
                });
            if ui.add_enabled(self.move_target.is_some(), egui::Button::new("Move")).clicked() {
                if let Some(target) = self.move_target.clone() {
                    // Rejected silently when the target sits inside the moved subtree
                    if !self.store.move_node(id, &target, None) {
                        self.info("Cannot move a node under itself");
                    }
                }
            }
        });
    }

    fn canvas(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default()
            .frame(egui::Frame::default().fill(CANVAS_BG))
            .show(ctx, |ui| {
                let Some(view) = self.store.view() else {
                    ui.label("No tree data available");
                    return;
                };
                let canvas_width = ui.available_width();
                let layout = layout_tree(&view, DEFAULT_NODE_SIZE, canvas_width, self.selected.as_deref());

                let mut actions: Vec<CanvasAction> = Vec::new();
                egui::ScrollArea::both().auto_shrink([false, false]).show(ui, |ui| {
                    let (rect, bg_resp) = ui.allocate_exact_size(Vec2::new(layout.width, layout.height), Sense::click());
                    let origin = rect.min;
                    let painter = ui.painter_at(rect);
                    let to_screen = |p: Point| -> Pos2 { origin + Vec2::new(p.x, p.y) };

                    let by_id: HashMap<&str, &LayoutNode> = layout.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
                    let edge_stroke = Stroke::new(2.0, INK);
                    for edge in &layout.edges {
                        let (Some(from), Some(to)) = (by_id.get(edge.from_id.as_str()), by_id.get(edge.to_id.as_str())) else {
                            continue;
                        };
                        let pts = connector_points(bottom_anchor(from, DEFAULT_NODE_SIZE), top_anchor(to, DEFAULT_NODE_SIZE));
                        for seg in pts.windows(2) {
                            painter.line_segment([to_screen(seg[0]), to_screen(seg[1])], edge_stroke);
                        }
                    }

                    if bg_resp.clicked() {
                        self.selected = None;
                    }
                    for node in &layout.nodes {
                        let selected = self.selected.as_deref() == Some(node.id.as_str());
                        draw_card(ui, &painter, node, to_screen(node.position), selected, &mut actions);
                    }
                });

                for action in actions {
                    self.apply(action);
                }
            });
    }
}

fn draw_card(ui: &mut egui::Ui, painter: &egui::Painter, node: &LayoutNode, min: Pos2, selected: bool, actions: &mut Vec<CanvasAction>) {
    let size = DEFAULT_NODE_SIZE;
    let card = Rect::from_min_size(min, Vec2::new(size.width, node.height));
    let card_resp = ui.interact(card, egui::Id::new(("card", node.id.as_str())), Sense::click());
    if card_resp.clicked() {
        actions.push(CanvasAction::Select(node.id.clone()));
    }

    let drop_hover = card_resp.dnd_hover_payload::<String>().is_some();
    painter.rect_filled(card, CARD_RADIUS, if selected { CARD_SELECTED } else { CARD_FILL });
    painter.rect_stroke(card, CARD_RADIUS, Stroke::new(2.0, INK), egui::StrokeKind::Inside);
    if drop_hover {
        painter.rect_stroke(card.expand(3.0), CARD_RADIUS, Stroke::new(2.0, INK.gamma_multiply(0.4)), egui::StrokeKind::Outside);
    }
    painter.text(min + Vec2::new(12.0, 14.0), Align2::LEFT_TOP, &node.label, FontId::proportional(15.0), INK);

    // Block rows: each one is a drag source and a positional drop target
    let mut dropped = false;
    let mut hover_slot: Option<usize> = None;
    for (i, block) in node.blocks.iter().enumerate() {
        let top = min.y + block_row_top(i);
        let row = Rect::from_min_size(Pos2::new(min.x + 12.0, top), Vec2::new(size.width - 24.0, BLOCK_ROW_HEIGHT));
        let row_resp = ui.interact(row, egui::Id::new(("block", node.id.as_str(), block.id.as_str())), Sense::click_and_drag());
        row_resp.dnd_set_drag_payload(DragPayload::new(&block.id, &node.id).encode());
        if row_resp.dnd_hover_payload::<String>().is_some() {
            hover_slot = Some(i);
        }
        if let Some(raw) = row_resp.dnd_release_payload::<String>() {
            actions.push(CanvasAction::DropBlock {
                raw: (*raw).clone(),
                to: node.id.clone(),
                index: Some(i as isize),
            });
            dropped = true;
        }
        painter.rect_filled(row, 4.0, ROW_FILL);
        painter.text(row.left_center() + Vec2::new(6.0, 0.0), Align2::LEFT_CENTER, &block.name, FontId::proportional(12.0), INK);
    }
    if !dropped {
        if let Some(raw) = card_resp.dnd_release_payload::<String>() {
            actions.push(CanvasAction::DropBlock {
                raw: (*raw).clone(),
                to: node.id.clone(),
                index: None,
            });
        }
    }

    // Mark where a hovering block would land: above the row under the pointer,
    // or after the last row when only the card is hovered
    let marker_slot = hover_slot.or(drop_hover.then_some(node.blocks.len()));
    if let Some(slot) = marker_slot {
        let y = min.y + drop_marker_y(slot);
        painter.line_segment([Pos2::new(min.x + 10.0, y), Pos2::new(card.right() - 10.0, y)], Stroke::new(2.0, INK));
    }

    if selected {
        // Reserved row under the block list
        let top = min.y + block_row_top(node.blocks.len());
        let add = Rect::from_min_size(Pos2::new(min.x + 12.0, top), Vec2::new(size.width - 24.0, BLOCK_ROW_HEIGHT));
        let add_resp = ui.interact(add, egui::Id::new(("add_block", node.id.as_str())), Sense::click());
        if add_resp.clicked() {
            actions.push(CanvasAction::AddBlock(node.id.clone()));
        }
        painter.text(add.left_center() + Vec2::new(6.0, 0.0), Align2::LEFT_CENTER, "+ Add block", FontId::proportional(12.0), INK.gamma_multiply(0.6));

        let plus = Pos2::new(card.right() - 14.0, card.bottom());
        if small_round_button(ui, painter, plus, egui::Id::new(("add_child", node.id.as_str())), "+") {
            actions.push(CanvasAction::AddChild(node.id.clone()));
        }
        if node.kind != NodeKind::Root {
            let close = Pos2::new(card.right(), card.top());
            if small_round_button(ui, painter, close, egui::Id::new(("remove", node.id.as_str())), "×") {
                actions.push(CanvasAction::Remove(node.id.clone()));
            }
        }
    }

    if node.has_children {
        let center = Pos2::new(card.center().x, card.bottom());
        let glyph = if node.is_expanded { "−" } else { "+" };
        if small_round_button(ui, painter, center, egui::Id::new(("toggle", node.id.as_str())), glyph) {
            actions.push(CanvasAction::ToggleExpand(node.id.clone()));
        }
    }
}

fn small_round_button(ui: &mut egui::Ui, painter: &egui::Painter, center: Pos2, id: egui::Id, glyph: &str) -> bool {
    let rect = Rect::from_center_size(center, Vec2::splat(TOGGLE_RADIUS * 2.0));
    let resp = ui.interact(rect, id, Sense::click());
    let fill = if resp.hovered() { ROW_FILL } else { CARD_FILL };
    painter.circle_filled(center, TOGGLE_RADIUS, fill);
    painter.circle_stroke(center, TOGGLE_RADIUS, Stroke::new(2.0, INK));
    painter.text(center, Align2::CENTER_CENTER, glyph, FontId::proportional(13.0), INK);
    resp.clicked()
}

impl eframe::App for TreeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_shortcuts(ctx);
        self.top_bar(ctx);
        self.versions_window(ctx);
        self.inspector(ctx);
        self.canvas(ctx);
        self.sync_after_change();
        self.maybe_autosave(ctx);

        // Flush pending edits before the window goes away
        if ctx.input(|i| i.viewport().close_requested()) && self.settings.autosave_enabled && self.dirty {
            self.save_now();
        }
    }
}
