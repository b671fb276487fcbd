/// Focus Session Recorder
///
/// Tracks which tab is in the foreground and folds its dwell time into
/// per-domain totals and a bounded history. Every transition holds the
/// state lock from reading the open session to persisting the result, so
/// events from different sources never observe a half-applied transition.
use log::{debug, warn};
use std::collections::HashMap;
use std::rc::Rc;
use tokio::sync::Mutex;

use crate::config::TrackerConfig;
use crate::domain::extract_domain;
use crate::error::TrackerError;
use crate::focus_data::{ActiveSession, FocusHistory, FocusStats, Session, TabId};
use crate::host::{Storage, Tabs};
use crate::storage::save_focus_data;

#[derive(Debug, Default)]
struct TrackerState {
    active: Option<ActiveSession>,
    stats: FocusStats,
    history: FocusHistory,
    // Last URL seen per tab; credits the old page on navigation and on close
    known_urls: HashMap<TabId, String>,
}

pub struct FocusTracker {
    storage: Rc<dyn Storage>,
    tabs: Rc<dyn Tabs>,
    config: TrackerConfig,
    state: Mutex<TrackerState>,
}

impl FocusTracker {
    pub fn new(
        storage: Rc<dyn Storage>,
        tabs: Rc<dyn Tabs>,
        config: TrackerConfig,
        stats: FocusStats,
        history: FocusHistory,
    ) -> FocusTracker {
        FocusTracker {
            storage,
            tabs,
            config,
            state: Mutex::new(TrackerState { stats, history, ..TrackerState::default() }),
        }
    }

    /// A tab became the foreground tab: close out the previous one, start timing this one
    pub async fn on_tab_became_active(&self, tab_id: TabId, now: u64) {
        let mut state = self.state.lock().await;
        if let Some(previous) = state.active.take() {
            self.record(&mut state, previous.tab_id, previous.elapsed(now), now).await;
        }
        self.remember_url(&mut state, tab_id).await;
        state.active = Some(ActiveSession::new(tab_id, now));
        debug!("Tracking tab {tab_id} from {now}");
    }

    /// The browser lost focus: flush and pause tracking
    pub async fn on_window_focus_lost(&self, now: u64) {
        let mut state = self.state.lock().await;
        if let Some(previous) = state.active.take() {
            self.record(&mut state, previous.tab_id, previous.elapsed(now), now).await;
            debug!("Tracking paused");
        }
    }

    /// A window gained focus with `active_tab_id` in front
    ///
    /// Normally nothing is open here. When focus moves straight from one
    /// window to another the open session is flushed first.
    pub async fn on_window_focus_gained(&self, active_tab_id: Option<TabId>, now: u64) {
        let mut state = self.state.lock().await;
        if let Some(previous) = state.active.take() {
            self.record(&mut state, previous.tab_id, previous.elapsed(now), now).await;
        }
        if let Some(tab_id) = active_tab_id {
            self.remember_url(&mut state, tab_id).await;
        }
        state.active = active_tab_id.map(|tab_id| ActiveSession::new(tab_id, now));
    }

    /// A tab navigated to `url`
    ///
    /// If it is the tracked tab, the time so far is credited to the page it
    /// is leaving and the clock restarts for the new page.
    pub async fn on_url_changed(&self, tab_id: TabId, url: &str, now: u64) {
        let mut state = self.state.lock().await;
        if let Some(session) = state.active.filter(|s| s.tab_id == tab_id) {
            self.record(&mut state, tab_id, session.elapsed(now), now).await;
            state.active = Some(ActiveSession::new(tab_id, now));
        }
        state.known_urls.insert(tab_id, url.to_string());
    }

    /// A tab was closed: flush and stop if it was the tracked tab
    pub async fn on_tab_closed(&self, tab_id: TabId, now: u64) {
        let mut state = self.state.lock().await;
        if let Some(session) = state.active.filter(|s| s.tab_id == tab_id) {
            state.active = None;
            self.record(&mut state, tab_id, session.elapsed(now), now).await;
        }
        state.known_urls.remove(&tab_id);
    }

    /// Commit the open session without ending it
    ///
    /// Only sessions at least `backup_min_ms` old are flushed; the tab stays
    /// tracked and its clock restarts at `now`. Returns whether a flush happened.
    pub async fn flush_now(&self, now: u64) -> bool {
        let mut state = self.state.lock().await;
        let Some(session) = state.active else {
            return false;
        };

        let elapsed = session.elapsed(now);
        if elapsed < self.config.backup_min_ms {
            return false;
        }

        self.record(&mut state, session.tab_id, elapsed, now).await;
        state.active = Some(ActiveSession::new(session.tab_id, now));
        true
    }

    /// Credit `duration_ms` to the domain tab `tab_id` currently shows
    ///
    /// Returns the domain credited, or `None` when the sample was dropped.
    pub async fn record_focus_duration(
        &self,
        tab_id: TabId,
        duration_ms: u64,
        now: u64,
    ) -> Option<String> {
        let mut state = self.state.lock().await;
        self.record(&mut state, tab_id, duration_ms, now).await
    }

    /// Clear all recorded focus time; an open session restarts at `now`
    pub async fn reset(&self, now: u64) -> crate::error::Result<()> {
        let mut state = self.state.lock().await;
        state.stats.clear();
        state.history.clear();
        if let Some(session) = state.active.as_mut() {
            session.start_time = now;
        }
        save_focus_data(self.storage.as_ref(), &state.stats, &state.history).await
    }

    pub async fn active_session(&self) -> Option<ActiveSession> {
        self.state.lock().await.active
    }

    /// Copies of the current aggregates
    pub async fn snapshot(&self) -> (FocusStats, FocusHistory) {
        let state = self.state.lock().await;
        (state.stats.clone(), state.history.clone())
    }

    /// Cache the page a newly tracked tab shows, so a later navigation credits it
    ///
    /// After a worker restart no URL event has been seen yet, and by the time
    /// the tab navigates the host already reports the new page.
    async fn remember_url(&self, state: &mut TrackerState, tab_id: TabId) {
        if state.known_urls.contains_key(&tab_id) {
            return;
        }
        match self.tabs.tab_url(tab_id).await {
            Ok(url) => {
                state.known_urls.insert(tab_id, url);
            }
            Err(e) => debug!("No URL yet for tab {tab_id}: {e}"),
        }
    }

    async fn record(
        &self,
        state: &mut TrackerState,
        tab_id: TabId,
        duration_ms: u64,
        now: u64,
    ) -> Option<String> {
        if duration_ms < self.config.min_session_ms {
            debug!("Dropping {duration_ms}ms sample for tab {tab_id} as noise");
            return None;
        }

        let url = match state.known_urls.get(&tab_id) {
            Some(url) => url.clone(),
            None => match self.tabs.tab_url(tab_id).await {
                Ok(url) => url,
                Err(TrackerError::TabNotFound { .. }) => {
                    warn!("Tab {tab_id} is gone, dropping {duration_ms}ms sample");
                    return None;
                }
                Err(e) => {
                    warn!("Could not resolve tab {tab_id}, dropping {duration_ms}ms sample: {e}");
                    return None;
                }
            },
        };

        let domain = extract_domain(&url)?;

        state.stats.add(&domain, duration_ms);
        let cutoff = now.saturating_sub(self.config.retention_ms());
        state.history.record(&domain, Session { timestamp: now, duration: duration_ms }, cutoff);
        debug!("Recorded {duration_ms}ms on {domain}");

        // Memory stays authoritative; the next flush writes the merged maps again
        if let Err(e) = save_focus_data(self.storage.as_ref(), &state.stats, &state.history).await {
            warn!("Failed to persist focus time: {e}");
        }

        Some(domain)
    }
}
