/// Tracker settings persisted under the `settings` storage key
use log::warn;
use serde::{Deserialize, Serialize};

/// Noise samples longer than this are real dwell time and must be kept
const MAX_MIN_SESSION_MS: u64 = 1_000;
const MIN_TIMER_PERIOD_MS: u32 = 1_000;
/// FocusHistory never keeps entries older than this
const MAX_RETENTION_DAYS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackerConfig {
    /// Samples shorter than this are dropped as accidental tab switches
    pub min_session_ms: u64,
    /// Period of the backup flush timer
    pub backup_interval_ms: u32,
    /// A backup flush only commits sessions at least this old
    pub backup_min_ms: u64,
    /// Period of the block-expiry sweep
    pub block_check_interval_ms: u32,
    /// FocusHistory retention window
    pub retention_days: u32,
    /// Extension page shown instead of a blocked site
    pub blocked_page: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_session_ms: 500,
            backup_interval_ms: 30_000,
            backup_min_ms: 1_000,
            block_check_interval_ms: 10_000,
            retention_days: 30,
            blocked_page: "blocked.html".to_string(),
        }
    }
}

impl TrackerConfig {
    /// Parse persisted settings, falling back to defaults when absent or unreadable
    pub fn from_value(value: Option<serde_json::Value>) -> Self {
        let config = match value {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Ignoring unreadable settings: {e}");
                Self::default()
            }),
            None => Self::default(),
        };
        config.normalized()
    }

    /// Clamp values into their supported ranges
    pub fn normalized(mut self) -> Self {
        if self.min_session_ms > MAX_MIN_SESSION_MS {
            warn!(
                "minSessionMs {} would drop real dwell time, using {MAX_MIN_SESSION_MS}",
                self.min_session_ms
            );
            self.min_session_ms = MAX_MIN_SESSION_MS;
        }
        self.backup_interval_ms = self.backup_interval_ms.max(MIN_TIMER_PERIOD_MS);
        self.block_check_interval_ms = self.block_check_interval_ms.max(MIN_TIMER_PERIOD_MS);
        self.retention_days = self.retention_days.clamp(1, MAX_RETENTION_DAYS);
        if self.blocked_page.trim().is_empty() {
            self.blocked_page = Self::default().blocked_page;
        }
        self
    }

    pub fn retention_ms(&self) -> u64 {
        u64::from(self.retention_days) * crate::focus_data::DAY_MS
    }
}
