/// Data structures for focus-time tracking
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Browser tab identifier
pub type TabId = i32;

/// Milliseconds in one day
pub const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// One recorded dwell sample
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// Epoch-ms when the sample was recorded
    pub timestamp: u64,
    /// Dwell time in ms
    pub duration: u64,
}

/// The foreground tab whose dwell time is being accumulated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveSession {
    pub tab_id: TabId,
    pub start_time: u64,
}

impl ActiveSession {
    pub fn new(tab_id: TabId, start_time: u64) -> ActiveSession {
        ActiveSession { tab_id, start_time }
    }

    /// Time spent in this session up to `now` (zero if the clock went backwards)
    pub fn elapsed(&self, now: u64) -> u64 {
        now.saturating_sub(self.start_time)
    }
}

/// Cumulative milliseconds per domain
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct FocusStats(HashMap<String, u64>);

impl FocusStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, domain: &str, duration_ms: u64) {
        let total = self.0.entry(domain.to_string()).or_insert(0);
        *total = total.saturating_add(duration_ms);
    }

    pub fn get(&self, domain: &str) -> u64 {
        self.0.get(domain).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Per-domain session log, bounded by the retention window
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct FocusHistory(HashMap<String, Vec<Session>>);

impl FocusHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample and drop this domain's entries older than `cutoff`
    pub fn record(&mut self, domain: &str, session: Session, cutoff: u64) {
        let sessions = self.0.entry(domain.to_string()).or_default();
        sessions.push(session);
        sessions.retain(|s| s.timestamp >= cutoff);
    }

    pub fn sessions(&self, domain: &str) -> &[Session] {
        self.0.get(domain).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Session>)> {
        self.0.iter()
    }

    pub fn session_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}
