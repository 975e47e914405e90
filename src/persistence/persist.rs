use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use ron::ser::PrettyConfig;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::tree_utils::tree::PersistedTree;

// Single storage key: everything lives in one record
pub const STORAGE_KEY: &str = "tree-store";

pub fn active_state_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}.ron", STORAGE_KEY))
}

pub fn versioned_state_path_now(dir: &Path) -> PathBuf {
    let now = OffsetDateTime::now_utc();
    let fmt = format_description!("[year][month][day]_[hour][minute][second]");
    let stamp = now.format(fmt).unwrap_or_else(|_| "unknown".to_string());
    dir.join(format!("{}_{}.ron", STORAGE_KEY, stamp))
}

fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("ron.tmp");
    {
        let mut f = File::create(&tmp_path)?;
        f.write_all(data)?;
        f.flush()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

fn encode(state: &PersistedTree) -> anyhow::Result<String> {
    let pretty = PrettyConfig::new().struct_names(false);
    Ok(ron::ser::to_string_pretty(state, pretty)?)
}

pub fn save_active(dir: &Path, state: &PersistedTree) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = active_state_path(dir);
    atomic_write(&path, encode(state)?.as_bytes())?;
    log::info!("saved {} node(s) to {}", state.nodes.len(), path.display());
    Ok(path)
}

pub fn save_versioned(dir: &Path, state: &PersistedTree) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = versioned_state_path_now(dir);
    atomic_write(&path, encode(state)?.as_bytes())?;
    log::info!("saved version {}", path.display());
    Ok(path)
}

pub fn load_active(dir: &Path) -> anyhow::Result<Option<PersistedTree>> {
    let path = active_state_path(dir);
    if !path.exists() {
        return Ok(None);
    }
    load_from_path(&path).map(Some)
}

// Parses and validates; a structurally broken record is an error, not a tree
pub fn load_from_path(path: &Path) -> anyhow::Result<PersistedTree> {
    let mut f = File::open(path)?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let state: PersistedTree = ron::from_str(&buf)?;
    state.validate()?;
    log::info!("loaded {} node(s) from {}", state.nodes.len(), path.display());
    Ok(state)
}

pub fn list_versions(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let prefix = format!("{}_", STORAGE_KEY);
    let mut entries: Vec<PathBuf> = Vec::new();
    if dir.exists() {
        for e in fs::read_dir(dir)? {
            let p = e?.path();
            if let Some(name) = p.file_name().and_then(|s| s.to_str())
                && name.starts_with(&prefix) && name.ends_with(".ron")
            {
                entries.push(p);
            }
        }
    }
    // newest first: timestamps sort lexically
    entries.sort();
    entries.reverse();
    Ok(entries)
}
