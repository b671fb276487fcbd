/// Storage keys and typed access over chrome.storage.local
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::blocklist::BlockEntry;
use crate::config::TrackerConfig;
use crate::error::Result;
use crate::focus_data::{FocusHistory, FocusStats};
use crate::host::Storage;

pub const FOCUS_STATS: &str = "focusStats";
pub const FOCUS_HISTORY: &str = "focusHistory";
pub const BLOCKED_DOMAINS: &str = "blockedDomains";
pub const FOCUS_MODE_ACTIVE: &str = "focusModeActive";
pub const SETTINGS: &str = "settings";

/// Everything the background core persists
#[derive(Debug, Clone, Default)]
pub struct StorageData {
    pub focus_stats: FocusStats,
    pub focus_history: FocusHistory,
    pub blocked_domains: Vec<BlockEntry>,
    pub focus_mode_active: bool,
    pub config: TrackerConfig,
}

impl StorageData {
    /// Read all persisted state; absent keys yield their empty value
    pub async fn load(storage: &dyn Storage) -> Result<StorageData> {
        let mut values = storage
            .get(&[FOCUS_STATS, FOCUS_HISTORY, BLOCKED_DOMAINS, FOCUS_MODE_ACTIVE, SETTINGS])
            .await?;

        Ok(StorageData {
            focus_stats: take_or_default(&mut values, FOCUS_STATS)?,
            focus_history: take_or_default(&mut values, FOCUS_HISTORY)?,
            blocked_domains: take_or_default(&mut values, BLOCKED_DOMAINS)?,
            focus_mode_active: take_or_default(&mut values, FOCUS_MODE_ACTIVE)?,
            config: TrackerConfig::from_value(values.remove(SETTINGS)),
        })
    }
}

/// Read one key, treating absent or null as the type's default
pub async fn load_key<T>(storage: &dyn Storage, key: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let mut values = storage.get(&[key]).await?;
    take_or_default(&mut values, key)
}

/// Write one key
pub async fn save_key<T: Serialize>(storage: &dyn Storage, key: &str, value: &T) -> Result<()> {
    let mut items = Map::new();
    items.insert(key.to_string(), serde_json::to_value(value)?);
    storage.set(items).await
}

/// Write FocusStats and FocusHistory in a single call
pub async fn save_focus_data(
    storage: &dyn Storage,
    stats: &FocusStats,
    history: &FocusHistory,
) -> Result<()> {
    let mut items = Map::new();
    items.insert(FOCUS_STATS.to_string(), serde_json::to_value(stats)?);
    items.insert(FOCUS_HISTORY.to_string(), serde_json::to_value(history)?);
    storage.set(items).await
}

fn take_or_default<T>(values: &mut Map<String, Value>, key: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match values.remove(key) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => Ok(serde_json::from_value(value)?),
    }
}
