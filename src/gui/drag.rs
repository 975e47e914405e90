use serde::{Deserialize, Serialize};

use crate::tree_utils::tree::TreeStore;

// Payload carried by a dragged block row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragPayload {
    pub block_id: String,
    pub from_node_id: String,
}

impl DragPayload {
    pub fn new(block_id: &str, from_node_id: &str) -> Self {
        Self {
            block_id: block_id.to_string(),
            from_node_id: from_node_id.to_string(),
        }
    }

    pub fn encode(&self) -> String {
        // Two plain strings always serialize
        serde_json::to_string(self).unwrap_or_default()
    }

    // Anything that is not a JSON object with two non-empty ids is rejected
    pub fn parse(raw: &str) -> Option<Self> {
        let payload: DragPayload = match serde_json::from_str(raw) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("ignoring malformed drag payload: {}", e);
                return None;
            }
        };
        if payload.block_id.trim().is_empty() || payload.from_node_id.trim().is_empty() {
            log::warn!("ignoring drag payload with empty ids");
            return None;
        }
        Some(payload)
    }
}

/// Translate a raw drop into `move_block`. Malformed payloads are ignored.
pub fn apply_block_drop(store: &mut TreeStore, raw: &str, to_node_id: &str, index: Option<isize>) -> bool {
    match DragPayload::parse(raw) {
        Some(p) => store.move_block(&p.from_node_id, to_node_id, &p.block_id, index),
        None => false,
    }
}
