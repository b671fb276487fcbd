/// Background service: routes browser events and UI messages into the core
///
/// This is the catch boundary. Nothing below it may abort the host's event
/// dispatch, so every handler here logs failures instead of returning them.
use log::{debug, error, info, warn};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::analytics;
use crate::blocklist::BlockRuleStore;
use crate::config::TrackerConfig;
use crate::error::Result;
use crate::focus_data::TabId;
use crate::guard::NavigationGuard;
use crate::host::{LocalFuture, RuleSink, Scheduler, Storage, Tabs, Tick};
use crate::messages::{DEFAULT_ANALYTICS_DAYS, Reply, Request};
use crate::reconciler::Reconciler;
use crate::rules::{clear_rules, refresh_rules};
use crate::storage::{self, FOCUS_MODE_ACTIVE, StorageData};
use crate::tracker::FocusTracker;

/// chrome.windows.WINDOW_ID_NONE: the browser lost focus
pub const WINDOW_ID_NONE: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserEvent {
    TabActivated { tab_id: TabId },
    WindowFocusChanged { window_id: i32 },
    TabUrlUpdated { tab_id: TabId, url: String },
    TabRemoved { tab_id: TabId },
}

#[derive(Debug, Clone, Copy)]
enum Timer {
    Backup,
    Expiry,
}

pub struct Background {
    config: TrackerConfig,
    storage: Rc<dyn Storage>,
    tabs: Rc<dyn Tabs>,
    rules: Rc<dyn RuleSink>,
    tracker: FocusTracker,
    blocklist: Rc<BlockRuleStore>,
    guard: NavigationGuard,
    reconciler: Reconciler,
    // Browser events waiting their turn, in delivery order
    events: RefCell<VecDeque<(BrowserEvent, u64)>>,
    draining: Cell<bool>,
}

impl Background {
    /// Load persisted state and restore focus mode if it was on
    pub async fn start(
        storage: Rc<dyn Storage>,
        tabs: Rc<dyn Tabs>,
        rules: Rc<dyn RuleSink>,
        scheduler: Rc<dyn Scheduler>,
        now: u64,
    ) -> Rc<Background> {
        let data = StorageData::load(storage.as_ref()).await.unwrap_or_else(|e| {
            error!("Failed to load persisted state, starting empty: {e}");
            StorageData::default()
        });
        let config = data.config;

        let blocklist = Rc::new(BlockRuleStore::new(Rc::clone(&storage), data.blocked_domains));
        let background = Rc::new(Background {
            tracker: FocusTracker::new(
                Rc::clone(&storage),
                Rc::clone(&tabs),
                config.clone(),
                data.focus_stats,
                data.focus_history,
            ),
            guard: NavigationGuard::new(
                Rc::clone(&blocklist),
                Rc::clone(&tabs),
                &config.blocked_page,
            ),
            reconciler: Reconciler::new(scheduler, &config),
            blocklist,
            config,
            storage,
            tabs,
            rules,
            events: RefCell::new(VecDeque::new()),
            draining: Cell::new(false),
        });

        if data.focus_mode_active {
            background.arm(now).await;
        }
        info!("Background started (guard {:?})", background.guard.state());

        background
    }

    /// Queue a browser event and apply it in turn
    pub async fn dispatch_event(&self, event: BrowserEvent, now: u64) {
        self.queue_event(event, now);
        self.drain_events().await;
    }

    pub fn queue_event(&self, event: BrowserEvent, now: u64) {
        self.events.borrow_mut().push_back((event, now));
    }

    /// Apply queued events one at a time, in delivery order
    ///
    /// An event that awaits the host before reaching the tracker still
    /// finishes before the next one starts. Whichever call finds the queue
    /// idle drains it; the others return immediately.
    pub async fn drain_events(&self) {
        if self.draining.replace(true) {
            return;
        }

        loop {
            let next = self.events.borrow_mut().pop_front();
            let Some((event, now)) = next else {
                break;
            };
            self.handle_event(event, now).await;
        }
        self.draining.set(false);
    }

    async fn handle_event(&self, event: BrowserEvent, now: u64) {
        match event {
            BrowserEvent::TabActivated { tab_id } => {
                self.tracker.on_tab_became_active(tab_id, now).await;
            }
            BrowserEvent::WindowFocusChanged { window_id } if window_id == WINDOW_ID_NONE => {
                self.tracker.on_window_focus_lost(now).await;
            }
            BrowserEvent::WindowFocusChanged { window_id } => {
                let active_tab = self.tabs.active_tab(window_id).await.unwrap_or_else(|e| {
                    warn!("Could not find the active tab of window {window_id}: {e}");
                    None
                });
                self.tracker.on_window_focus_gained(active_tab, now).await;
            }
            BrowserEvent::TabUrlUpdated { tab_id, url } => {
                // Blocking first: this is the earliest signal for the new page
                if let Err(e) = self.guard.on_url_updated(tab_id, &url, now).await {
                    warn!("Failed to redirect tab {tab_id}: {e}");
                }
                self.tracker.on_url_changed(tab_id, &url, now).await;
            }
            BrowserEvent::TabRemoved { tab_id } => self.tracker.on_tab_closed(tab_id, now).await,
        }
    }

    pub async fn handle_message(self: &Rc<Self>, request: Request, now: u64) -> Reply {
        let result = match request {
            Request::FlushFocusTime => {
                self.tracker.flush_now(now).await;
                Ok(Reply::ok())
            }
            Request::UpdateBlockingRules => {
                self.update_blocking_rules(now).await.map(|()| Reply::ok())
            }
            Request::SetFocusMode { active } => {
                self.set_focus_mode(active, now).await.map(|()| Reply::ok())
            }
            Request::AddBlockedDomain { domain, minutes } => {
                self.add_blocked_domain(&domain, minutes, now).await
            }
            Request::RemoveBlockedDomain { domain } => {
                self.remove_blocked_domain(&domain, now).await
            }
            Request::ResetFocusData => self.tracker.reset(now).await.map(|()| Reply::ok()),
            Request::GetAnalytics { days } => {
                self.analytics(days.unwrap_or(DEFAULT_ANALYTICS_DAYS), now).await
            }
        };

        result.unwrap_or_else(|e| {
            warn!("Message failed: {e}");
            Reply::failed(e)
        })
    }

    /// Turn focus mode on or off and persist the choice
    pub async fn set_focus_mode(self: &Rc<Self>, active: bool, now: u64) -> Result<()> {
        if self.guard.is_armed() == active {
            debug!("Focus mode already {}", if active { "on" } else { "off" });
            return Ok(());
        }

        if active {
            self.arm(now).await;
        } else {
            self.disarm().await;
        }
        storage::save_key(self.storage.as_ref(), FOCUS_MODE_ACTIVE, &active).await
    }

    /// Re-read the block list, promote lapsed unblocks, and reinstall rules
    pub async fn update_blocking_rules(&self, now: u64) -> Result<()> {
        self.blocklist.reload().await?;
        self.blocklist.reconcile_expired(now).await?;
        if self.guard.is_armed() {
            self.refresh(now).await?;
        }
        Ok(())
    }

    pub fn is_focus_mode_active(&self) -> bool {
        self.guard.is_armed()
    }

    pub fn tracker(&self) -> &FocusTracker {
        &self.tracker
    }

    pub fn blocklist(&self) -> &BlockRuleStore {
        &self.blocklist
    }

    async fn on_backup_tick(&self, now: u64) {
        self.tracker.flush_now(now).await;
    }

    async fn on_expiry_tick(&self, now: u64) {
        if !self.guard.is_armed() {
            return;
        }

        match self.blocklist.reconcile_expired(now).await {
            Ok(true) => {
                if let Err(e) = self.refresh(now).await {
                    warn!("Failed to refresh blocking rules: {e}");
                }
            }
            Ok(false) => {}
            Err(e) => warn!("Block expiry sweep failed: {e}"),
        }
    }

    async fn arm(self: &Rc<Self>, now: u64) {
        self.guard.arm();
        self.reconciler.start(self.tick(Timer::Backup), self.tick(Timer::Expiry));

        if let Err(e) = self.blocklist.reconcile_expired(now).await {
            warn!("Block expiry sweep failed: {e}");
        }
        if let Err(e) = self.refresh(now).await {
            warn!("Failed to install blocking rules: {e}");
        }
    }

    async fn refresh(&self, now: u64) -> Result<usize> {
        refresh_rules(&self.blocklist, self.rules.as_ref(), &self.config.blocked_page, now).await
    }

    async fn disarm(&self) {
        self.guard.disarm();
        self.reconciler.stop();

        if let Err(e) = clear_rules(self.rules.as_ref()).await {
            warn!("Failed to clear blocking rules: {e}");
        }
    }

    async fn add_blocked_domain(
        &self,
        domain: &str,
        minutes: Option<u32>,
        now: u64,
    ) -> Result<Reply> {
        let entry = self.blocklist.add_or_update(domain, minutes, now).await?;
        if self.guard.is_armed() {
            self.refresh(now).await?;
        }
        Ok(Reply::with_data(serde_json::to_value(entry)?))
    }

    async fn remove_blocked_domain(&self, domain: &str, now: u64) -> Result<Reply> {
        let removed = self.blocklist.remove(domain).await;
        if removed && self.guard.is_armed() {
            self.refresh(now).await?;
        }
        Ok(Reply::with_data(serde_json::Value::Bool(removed)))
    }

    async fn analytics(&self, days: u32, now: u64) -> Result<Reply> {
        let (stats, history) = self.tracker.snapshot().await;
        let report = analytics::report(&stats, &history, now, days.max(1));
        Ok(Reply::with_data(serde_json::to_value(report)?))
    }

    /// Timer callback that runs for as long as this service is alive
    fn tick(self: &Rc<Self>, timer: Timer) -> Tick {
        let weak: Weak<Background> = Rc::downgrade(self);
        Rc::new(move |now: u64| -> LocalFuture {
            let weak = Weak::clone(&weak);
            Box::pin(async move {
                let Some(background) = weak.upgrade() else {
                    return;
                };
                match timer {
                    Timer::Backup => background.on_backup_tick(now).await,
                    Timer::Expiry => background.on_expiry_tick(now).await,
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::BlockEntry;
    use crate::storage::{BLOCKED_DOMAINS, FOCUS_STATS};
    use crate::test_utils::{FakeTabs, ManualScheduler, MemoryStorage, RecordingRules};
    use serde_json::json;

    const MINUTE_MS: u64 = 60_000;

    struct Fixture {
        storage: Rc<MemoryStorage>,
        tabs: Rc<FakeTabs>,
        rules: Rc<RecordingRules>,
        scheduler: Rc<ManualScheduler>,
    }

    impl Fixture {
        fn new() -> Fixture {
            Fixture {
                storage: Rc::new(MemoryStorage::new()),
                tabs: Rc::new(FakeTabs::new()),
                rules: Rc::new(RecordingRules::new()),
                scheduler: Rc::new(ManualScheduler::new()),
            }
        }

        async fn start(&self, now: u64) -> Rc<Background> {
            Background::start(
                Rc::clone(&self.storage) as Rc<dyn Storage>,
                Rc::clone(&self.tabs) as Rc<dyn Tabs>,
                Rc::clone(&self.rules) as Rc<dyn RuleSink>,
                Rc::clone(&self.scheduler) as Rc<dyn Scheduler>,
                now,
            )
            .await
        }
    }

    async fn send(background: &Rc<Background>, request: serde_json::Value, now: u64) -> Reply {
        let request: Request = serde_json::from_value(request).unwrap();
        background.handle_message(request, now).await
    }

    #[tokio::test]
    async fn test_starts_inert_without_timers() {
        let fx = Fixture::new();

        let background = fx.start(0).await;

        assert!(!background.is_focus_mode_active());
        assert_eq!(fx.scheduler.running(), 0);
        assert!(fx.rules.installs().is_empty());
    }

    #[tokio::test]
    async fn test_restores_persisted_focus_mode() {
        let fx = Fixture::new();
        fx.storage.insert(FOCUS_MODE_ACTIVE, json!(true));
        fx.storage.insert(
            BLOCKED_DOMAINS,
            json!([{ "domain": "reddit.com", "unblockUntil": null }]),
        );
        fx.storage.insert(FOCUS_STATS, json!({ "a.com": 1000 }));

        let background = fx.start(0).await;

        assert!(background.is_focus_mode_active());
        assert_eq!(fx.scheduler.periods(), vec![10_000, 30_000]);
        assert_eq!(fx.rules.last().map(|r| r.len()), Some(1));
        assert_eq!(background.tracker().snapshot().await.0.get("a.com"), 1000);
    }

    #[tokio::test]
    async fn test_toggle_focus_mode_starts_and_stops_timers() {
        let fx = Fixture::new();
        let background = fx.start(0).await;

        let reply = send(&background, json!({ "action": "setFocusMode", "active": true }), 0).await;
        assert!(reply.success);
        assert_eq!(fx.scheduler.running(), 2);
        assert_eq!(fx.storage.value(FOCUS_MODE_ACTIVE), Some(json!(true)));

        send(&background, json!({ "action": "setFocusMode", "active": false }), 0).await;
        assert_eq!(fx.scheduler.running(), 0);
        assert_eq!(fx.rules.last(), Some(Vec::new()));
        assert_eq!(fx.storage.value(FOCUS_MODE_ACTIVE), Some(json!(false)));
    }

    #[tokio::test]
    async fn test_blocked_navigation_is_redirected_only_when_armed() {
        let fx = Fixture::new();
        let background = fx.start(0).await;
        let add = json!({ "action": "addBlockedDomain", "domain": "example.com" });
        send(&background, add, 0).await;

        let event = BrowserEvent::TabUrlUpdated {
            tab_id: 3,
            url: "https://mail.example.com".to_string(),
        };
        background.handle_event(event.clone(), 1_000).await;
        assert!(fx.tabs.redirects().is_empty());

        background.set_focus_mode(true, 2_000).await.unwrap();
        background.handle_event(event, 3_000).await;
        assert_eq!(
            fx.tabs.redirects(),
            vec![(3, "blocked.html?domain=mail.example.com".to_string())]
        );
    }

    #[tokio::test]
    async fn test_expiry_tick_refreshes_rules_once() {
        let fx = Fixture::new();
        let background = fx.start(0).await;
        background.set_focus_mode(true, 0).await.unwrap();
        let add = json!({ "action": "addBlockedDomain", "domain": "reddit.com", "minutes": 15 });
        send(&background, add, 0).await;
        assert_eq!(fx.rules.last().map(|r| r.len()), Some(0));
        let installs_before = fx.rules.installs().len();

        let later = 16 * MINUTE_MS;
        fx.scheduler.fire(10_000, later).await;
        fx.scheduler.fire(10_000, later).await;

        let installs = fx.rules.installs();
        assert_eq!(installs.len(), installs_before + 1);
        assert_eq!(installs.last().map(|r| r.len()), Some(1));
        assert_eq!(
            background.blocklist().entries().await,
            vec![BlockEntry::permanent("reddit.com")]
        );
    }

    #[tokio::test]
    async fn test_backup_tick_flushes_open_session() {
        let fx = Fixture::new();
        fx.tabs.open(3, "https://c.com");
        let background = fx.start(0).await;
        background.set_focus_mode(true, 0).await.unwrap();
        background.handle_event(BrowserEvent::TabActivated { tab_id: 3 }, 0).await;

        fx.scheduler.fire(30_000, 40_000).await;

        assert_eq!(fx.storage.value(FOCUS_STATS), Some(json!({ "c.com": 40000 })));
    }

    #[tokio::test]
    async fn test_window_focus_events() {
        let fx = Fixture::new();
        fx.tabs.open(1, "https://a.com");
        fx.tabs.set_active(10, 1);
        let background = fx.start(0).await;

        background.handle_event(BrowserEvent::WindowFocusChanged { window_id: 10 }, 0).await;
        let focus_lost = BrowserEvent::WindowFocusChanged { window_id: WINDOW_ID_NONE };
        background.handle_event(focus_lost, 5_000).await;

        assert_eq!(background.tracker().snapshot().await.0.get("a.com"), 5_000);
        assert_eq!(background.tracker().active_session().await, None);
    }

    #[tokio::test]
    async fn test_flush_message() {
        let fx = Fixture::new();
        fx.tabs.open(1, "https://a.com");
        let background = fx.start(0).await;
        background.handle_event(BrowserEvent::TabActivated { tab_id: 1 }, 0).await;

        let reply = send(&background, json!({ "action": "flushFocusTime" }), 2_000).await;

        assert!(reply.success);
        assert_eq!(background.tracker().snapshot().await.0.get("a.com"), 2_000);
    }

    #[tokio::test]
    async fn test_update_blocking_rules_reads_external_changes() {
        let fx = Fixture::new();
        let background = fx.start(0).await;
        background.set_focus_mode(true, 0).await.unwrap();
        fx.storage.insert(BLOCKED_DOMAINS, json!([
            { "domain": "a.com", "unblockUntil": null },
            { "domain": "b.com", "unblockUntil": 500 }
        ]));

        let reply = send(&background, json!({ "action": "updateBlockingRules" }), 1_000).await;

        assert!(reply.success);
        assert_eq!(fx.rules.last().map(|r| r.len()), Some(2));
        assert_eq!(
            fx.storage.value(BLOCKED_DOMAINS),
            Some(json!([
                { "domain": "a.com", "unblockUntil": null },
                { "domain": "b.com", "unblockUntil": null }
            ]))
        );
    }

    #[tokio::test]
    async fn test_invalid_domain_reply() {
        let fx = Fixture::new();
        let background = fx.start(0).await;

        let add = json!({ "action": "addBlockedDomain", "domain": "" });
        let reply = send(&background, add, 0).await;

        assert!(!reply.success);
        assert!(reply.error.is_some());
    }

    #[tokio::test]
    async fn test_remove_and_reset_and_analytics() {
        let fx = Fixture::new();
        fx.tabs.open(1, "https://a.com");
        let background = fx.start(0).await;
        send(&background, json!({ "action": "addBlockedDomain", "domain": "a.com" }), 0).await;
        background.tracker().record_focus_duration(1, 3_000, 1_000).await;

        let reply = send(&background, json!({ "action": "getAnalytics", "days": 7 }), 2_000).await;
        let data = reply.data.unwrap();
        assert_eq!(data["summary"]["totalTrackedTime"], json!(3000));
        assert_eq!(data["windowTotals"]["a.com"], json!(3000));

        let remove = json!({ "action": "removeBlockedDomain", "domain": "a.com" });
        let reply = send(&background, remove, 2_000).await;
        assert_eq!(reply.data, Some(json!(true)));

        send(&background, json!({ "action": "resetFocusData" }), 3_000).await;
        assert_eq!(fx.storage.value(FOCUS_STATS), Some(json!({})));
    }

    #[tokio::test]
    async fn test_timers_stop_firing_work_after_drop() {
        let fx = Fixture::new();
        fx.tabs.open(1, "https://a.com");
        let background = fx.start(0).await;
        background.set_focus_mode(true, 0).await.unwrap();
        background.handle_event(BrowserEvent::TabActivated { tab_id: 1 }, 0).await;
        let writes = fx.storage.write_count();

        drop(background);
        fx.scheduler.fire(30_000, 40_000).await;

        assert_eq!(fx.storage.write_count(), writes);
    }

    #[tokio::test]
    async fn test_events_apply_in_delivery_order() {
        let fx = Fixture::new();
        fx.tabs.open(1, "https://a.com");
        fx.tabs.open(2, "https://b.com");
        fx.tabs.open(3, "https://c.com");
        fx.tabs.set_active(10, 2);
        let background = fx.start(0).await;
        background.dispatch_event(BrowserEvent::TabActivated { tab_id: 1 }, 0).await;

        // The focus change waits on the host while the activation arrives
        fx.tabs.set_yield_lookups(true);
        tokio::join!(
            background.dispatch_event(BrowserEvent::WindowFocusChanged { window_id: 10 }, 1_000),
            background.dispatch_event(BrowserEvent::TabActivated { tab_id: 3 }, 2_000),
        );
        let focus_lost = BrowserEvent::WindowFocusChanged { window_id: WINDOW_ID_NONE };
        background.dispatch_event(focus_lost, 5_000).await;

        let stats = background.tracker().snapshot().await.0;
        assert_eq!(stats.get("a.com"), 1_000);
        assert_eq!(stats.get("b.com"), 1_000);
        assert_eq!(stats.get("c.com"), 3_000);
        assert_eq!(stats.total(), 5_000);
    }

    #[tokio::test]
    async fn test_repeated_focus_mode_request_is_noop() {
        let fx = Fixture::new();
        let background = fx.start(0).await;

        let on = json!({ "action": "setFocusMode", "active": true });
        send(&background, on.clone(), 0).await;
        let writes = fx.storage.write_count();
        let reply = send(&background, on, 1_000).await;

        assert!(reply.success);
        assert_eq!(fx.rules.installs().len(), 1);
        assert_eq!(fx.storage.write_count(), writes);
        assert_eq!(fx.scheduler.running(), 2);
    }

    #[tokio::test]
    async fn test_add_during_failed_write_still_installs_rule() {
        let fx = Fixture::new();
        let background = fx.start(0).await;
        background.set_focus_mode(true, 0).await.unwrap();

        fx.storage.set_fail_writes(true);
        let add = json!({ "action": "addBlockedDomain", "domain": "new.com" });
        let reply = send(&background, add, 0).await;
        assert!(reply.success);
        assert_eq!(reply.data, Some(json!({ "domain": "new.com", "unblockUntil": null })));
        assert_eq!(fx.rules.last().map(|r| r.len()), Some(1));

        fx.storage.set_fail_writes(false);
        let reply = send(&background, json!({ "action": "updateBlockingRules" }), 1_000).await;
        assert!(reply.success);
        assert_eq!(
            fx.storage.value(BLOCKED_DOMAINS),
            Some(json!([{ "domain": "new.com", "unblockUntil": null }]))
        );
    }
}
