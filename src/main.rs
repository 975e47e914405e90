use tree_loom::gui::frontend::TreeApp;
use tree_loom::persistence::persist;
use tree_loom::persistence::settings::EditorSettings;
use tree_loom::tree_utils::ids::UuidIds;
use tree_loom::tree_utils::tree::TreeStore;

// Restore the last autosaved tree; anything unreadable falls back to a fresh root
fn initial_store(settings: &EditorSettings) -> TreeStore {
    let limit = settings.history_limit;
    match persist::load_active(&settings.autosave_dir()) {
        Ok(Some(state)) => TreeStore::from_persisted(state, UuidIds, limit).unwrap_or_else(|e| {
            log::warn!("saved tree rejected, starting fresh: {}", e);
            TreeStore::with_history_limit(UuidIds, limit)
        }),
        Ok(None) => TreeStore::with_history_limit(UuidIds, limit),
        Err(e) => {
            log::warn!("could not load saved tree, starting fresh: {}", e);
            TreeStore::with_history_limit(UuidIds, limit)
        }
    }
}

fn main() -> eframe::Result {
    env_logger::init();

    let settings = EditorSettings::load().unwrap_or_else(|e| {
        log::warn!("settings unreadable, using defaults: {}", e);
        EditorSettings::default()
    });
    let store = initial_store(&settings);
    log::info!("starting with {} node(s)", store.node_count());

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 760.0])
            // Keep the inspector and a usable canvas on small screens
            .with_min_inner_size([640.0, 420.0])
            .with_resizable(true),
        ..Default::default()
    };
    eframe::run_native(
        "Tree-Loom",
        options,
        Box::new(move |_cc| Ok(Box::new(TreeApp::new(store, settings)) as Box<dyn eframe::App>)),
    )
}
