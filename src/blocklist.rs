/// Block Rule Store: blocked domains with optional temporary unblocks
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use tokio::sync::Mutex;

use crate::domain::{matches_domain, normalize_domain_input};
use crate::error::{Result, TrackerError};
use crate::host::Storage;
use crate::storage::{self, BLOCKED_DOMAINS};

const MINUTE_MS: u64 = 60 * 1000;

/// A blocked domain
///
/// `unblock_until`:
/// - `None` → blocked whenever focus mode is on
/// - in the future → temporarily allowed until then
/// - in the past → allowance lapsed, blocked again
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockEntry {
    pub domain: String,
    #[serde(default)]
    pub unblock_until: Option<u64>,
}

impl BlockEntry {
    pub fn permanent(domain: &str) -> BlockEntry {
        BlockEntry { domain: domain.to_string(), unblock_until: None }
    }

    /// Whether this entry blocks right now
    pub fn is_effective(&self, now: u64) -> bool {
        self.unblock_until.is_none_or(|until| now >= until)
    }

    pub fn is_temporarily_allowed(&self, now: u64) -> bool {
        !self.is_effective(now)
    }
}

/// The block entries, unique by domain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockList {
    entries: Vec<BlockEntry>,
}

impl BlockList {
    /// Build from persisted entries, keeping the last entry for a repeated domain
    pub fn from_entries(entries: Vec<BlockEntry>) -> BlockList {
        let mut list = BlockList::default();
        for entry in entries {
            list.upsert(entry);
        }
        list
    }

    pub fn entries(&self) -> &[BlockEntry] {
        &self.entries
    }

    /// Insert, or replace the `unblock_until` of the entry with the same domain
    pub fn upsert(&mut self, entry: BlockEntry) {
        match self.entries.iter_mut().find(|e| e.domain == entry.domain) {
            Some(existing) => existing.unblock_until = entry.unblock_until,
            None => self.entries.push(entry),
        }
    }

    pub fn remove(&mut self, domain: &str) -> bool {
        let original_len = self.entries.len();
        self.entries.retain(|e| e.domain != domain);
        self.entries.len() < original_len
    }

    /// Entries that currently block
    pub fn effective(&self, now: u64) -> Vec<BlockEntry> {
        self.entries.iter().filter(|e| e.is_effective(now)).cloned().collect()
    }

    /// Turn lapsed temporary unblocks into standing blocks; true if anything changed
    pub fn reconcile_expired(&mut self, now: u64) -> bool {
        let mut changed = false;
        for entry in &mut self.entries {
            if entry.unblock_until.is_some_and(|until| now >= until) {
                entry.unblock_until = None;
                changed = true;
            }
        }
        changed
    }

    /// True if any effective entry matches the domain or one of its parents
    pub fn is_blocked(&self, domain: &str, now: u64) -> bool {
        self.entries
            .iter()
            .any(|e| e.is_effective(now) && matches_domain(domain, &e.domain))
    }
}

struct StoreState {
    list: BlockList,
    // Set when the last write failed, so the next change persists everything again
    dirty: bool,
}

/// Persisted block list shared by the guard and the reconciler
pub struct BlockRuleStore {
    storage: Rc<dyn Storage>,
    state: Mutex<StoreState>,
}

impl BlockRuleStore {
    pub fn new(storage: Rc<dyn Storage>, entries: Vec<BlockEntry>) -> BlockRuleStore {
        BlockRuleStore {
            storage,
            state: Mutex::new(StoreState { list: BlockList::from_entries(entries), dirty: false }),
        }
    }

    /// Block `domain`, or allow it for `temporary_minutes` from `now`
    ///
    /// Fails only on invalid input. A failed write leaves the entry in
    /// memory and the store dirty, so the next write persists it.
    pub async fn add_or_update(
        &self,
        domain: &str,
        temporary_minutes: Option<u32>,
        now: u64,
    ) -> Result<BlockEntry> {
        let domain = normalize_domain_input(domain).ok_or_else(|| TrackerError::InvalidInput {
            field: "domain",
            reason: format!("'{}' is not a valid domain or URL", domain.trim()),
        })?;

        let unblock_until = temporary_minutes
            .filter(|minutes| *minutes > 0)
            .map(|minutes| now.saturating_add(u64::from(minutes) * MINUTE_MS));
        let entry = BlockEntry { domain, unblock_until };

        let mut state = self.state.lock().await;
        state.list.upsert(entry.clone());
        info!("Block entry for {} set (unblockUntil: {:?})", entry.domain, entry.unblock_until);
        if self.persist(&mut state).await.is_err() {
            debug!("Keeping {} in memory until the next write succeeds", entry.domain);
        }

        Ok(entry)
    }

    /// Remove a domain; returns whether it was present
    pub async fn remove(&self, domain: &str) -> bool {
        let domain = normalize_domain_input(domain).unwrap_or_else(|| domain.trim().to_lowercase());

        let mut state = self.state.lock().await;
        let removed = state.list.remove(&domain);
        if (removed || state.dirty) && self.persist(&mut state).await.is_err() {
            debug!("Removal of {domain} kept in memory until the next write succeeds");
        }

        removed
    }

    pub async fn list_effective(&self, now: u64) -> Vec<BlockEntry> {
        self.state.lock().await.list.effective(now)
    }

    pub async fn entries(&self) -> Vec<BlockEntry> {
        self.state.lock().await.list.entries().to_vec()
    }

    /// Promote lapsed temporary unblocks to permanent blocks
    ///
    /// Writes only when an entry changed (or an earlier write failed);
    /// returns whether any entry changed.
    pub async fn reconcile_expired(&self, now: u64) -> Result<bool> {
        let mut state = self.state.lock().await;
        let changed = state.list.reconcile_expired(now);

        if changed {
            debug!("Temporary unblocks expired, blocking again");
        }
        if changed || state.dirty {
            self.persist(&mut state).await?;
        }

        Ok(changed)
    }

    pub async fn is_domain_blocked(&self, domain: &str, now: u64) -> bool {
        self.state.lock().await.list.is_blocked(domain, now)
    }

    /// Replace the in-memory list with what is persisted (the options page may write it directly)
    pub async fn reload(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.dirty {
            // Unpersisted local changes win over the stale stored copy
            return Ok(());
        }
        let entries: Vec<BlockEntry> =
            storage::load_key(self.storage.as_ref(), BLOCKED_DOMAINS).await?;
        state.list = BlockList::from_entries(entries);
        Ok(())
    }

    async fn persist(&self, state: &mut StoreState) -> Result<()> {
        let entries = state.list.entries();
        let result = storage::save_key(self.storage.as_ref(), BLOCKED_DOMAINS, &entries).await;
        match result {
            Ok(()) => {
                state.dirty = false;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to persist blocked domains: {e}");
                state.dirty = true;
                Err(e)
            }
        }
    }
}
