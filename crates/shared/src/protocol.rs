use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default list path clients subscribe to when none is configured.
pub const DEFAULT_LIST_PATH: &str = "shopping-list";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPayload {
    pub title: String,
    pub quantity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEntryResponse {
    pub key: String,
}

/// Full state of one list, keyed by entry key. Entries travel as raw JSON
/// values so a reader can drop a malformed entry without rejecting the
/// snapshot it arrived in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSnapshot {
    pub path: String,
    pub entries: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SyncEvent {
    /// The list changed (or a subscriber just connected); `snapshot` is the
    /// entire current set, replacing anything delivered before.
    SnapshotChanged { snapshot: ListSnapshot },
}
