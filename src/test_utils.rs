/// In-memory host implementations for unit tests
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::error::{Result, TrackerError};
use crate::focus_data::TabId;
use crate::host::{IntervalId, RuleSink, Scheduler, Storage, Tabs, Tick};
use crate::rules::DynamicRule;

#[derive(Default)]
pub struct MemoryStorage {
    values: RefCell<Map<String, Value>>,
    writes: Cell<usize>,
    fail_writes: Cell<bool>,
    yield_reads: Cell<bool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, value: Value) {
        self.values.borrow_mut().insert(key.to_string(), value);
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.values.borrow().get(key).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.get()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    /// Make every read suspend once, like a real host round trip
    pub fn set_yield_reads(&self, yield_reads: bool) {
        self.yield_reads.set(yield_reads);
    }
}

#[async_trait(?Send)]
impl Storage for MemoryStorage {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>> {
        if self.yield_reads.get() {
            tokio::task::yield_now().await;
        }
        let values = self.values.borrow();
        Ok(keys
            .iter()
            .filter_map(|key| values.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, items: Map<String, Value>) -> Result<()> {
        if self.fail_writes.get() {
            return Err(TrackerError::Storage { op: "set", reason: "write rejected".to_string() });
        }
        self.values.borrow_mut().extend(items);
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeTabs {
    urls: RefCell<HashMap<TabId, String>>,
    active: RefCell<HashMap<i32, TabId>>,
    redirects: RefCell<Vec<(TabId, String)>>,
    yield_lookups: Cell<bool>,
}

impl FakeTabs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, tab_id: TabId, url: &str) {
        self.urls.borrow_mut().insert(tab_id, url.to_string());
    }

    pub fn close(&self, tab_id: TabId) {
        self.urls.borrow_mut().remove(&tab_id);
    }

    pub fn set_active(&self, window_id: i32, tab_id: TabId) {
        self.active.borrow_mut().insert(window_id, tab_id);
    }

    pub fn redirects(&self) -> Vec<(TabId, String)> {
        self.redirects.borrow().clone()
    }

    /// Make active-tab lookups suspend once before answering
    pub fn set_yield_lookups(&self, yield_lookups: bool) {
        self.yield_lookups.set(yield_lookups);
    }
}

#[async_trait(?Send)]
impl Tabs for FakeTabs {
    async fn tab_url(&self, tab_id: TabId) -> Result<String> {
        self.urls
            .borrow()
            .get(&tab_id)
            .cloned()
            .ok_or(TrackerError::TabNotFound { tab_id })
    }

    async fn active_tab(&self, window_id: i32) -> Result<Option<TabId>> {
        if self.yield_lookups.get() {
            tokio::task::yield_now().await;
        }
        Ok(self.active.borrow().get(&window_id).copied())
    }

    async fn redirect_to_extension_page(&self, tab_id: TabId, path: &str) -> Result<()> {
        self.redirects.borrow_mut().push((tab_id, path.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingRules {
    installs: RefCell<Vec<Vec<DynamicRule>>>,
}

impl RecordingRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn installs(&self) -> Vec<Vec<DynamicRule>> {
        self.installs.borrow().clone()
    }

    pub fn last(&self) -> Option<Vec<DynamicRule>> {
        self.installs.borrow().last().cloned()
    }
}

#[async_trait(?Send)]
impl RuleSink for RecordingRules {
    async fn replace_rules(&self, rules: &[DynamicRule]) -> Result<()> {
        self.installs.borrow_mut().push(rules.to_vec());
        Ok(())
    }
}

/// Scheduler whose ticks only run when a test fires them
#[derive(Default)]
pub struct ManualScheduler {
    timers: RefCell<HashMap<IntervalId, (u32, Tick)>>,
    next_id: Cell<i32>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running(&self) -> usize {
        self.timers.borrow().len()
    }

    pub fn periods(&self) -> Vec<u32> {
        let mut periods: Vec<u32> = self.timers.borrow().values().map(|(p, _)| *p).collect();
        periods.sort_unstable();
        periods
    }

    /// Run the tick of the timer with the given period
    pub async fn fire(&self, period_ms: u32, now: u64) {
        let tick = self
            .timers
            .borrow()
            .values()
            .find(|(p, _)| *p == period_ms)
            .map(|(_, tick)| std::rc::Rc::clone(tick));
        if let Some(tick) = tick {
            tick(now).await;
        }
    }
}

impl Scheduler for ManualScheduler {
    fn every(&self, period_ms: u32, tick: Tick) -> IntervalId {
        let id = IntervalId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.timers.borrow_mut().insert(id, (period_ms, tick));
        id
    }

    fn cancel(&self, id: IntervalId) {
        self.timers.borrow_mut().remove(&id);
    }
}
