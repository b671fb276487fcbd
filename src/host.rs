/// Seams between the core and the browser runtime
///
/// Everything the tracker and blocker need from the extension host goes
/// through these traits. The wasm build implements them over chrome.* in
/// `chrome.rs`; tests use the in-memory versions in `test_utils.rs`.
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use crate::error::Result;
use crate::focus_data::TabId;
use crate::rules::DynamicRule;

/// Key/value persistence (chrome.storage.local)
#[async_trait(?Send)]
pub trait Storage {
    /// Read the given keys; absent keys are missing from the returned map
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>>;

    /// Write all items in one call, so readers see all of them or none
    async fn set(&self, items: Map<String, Value>) -> Result<()>;
}

/// Tab lookup and navigation (chrome.tabs)
#[async_trait(?Send)]
pub trait Tabs {
    /// Current URL of a tab, or `TabNotFound` if it no longer exists
    async fn tab_url(&self, tab_id: TabId) -> Result<String>;

    /// Active tab of a window, if any
    async fn active_tab(&self, window_id: i32) -> Result<Option<TabId>>;

    /// Send a tab to a page bundled with the extension
    async fn redirect_to_extension_page(&self, tab_id: TabId, path: &str) -> Result<()>;
}

/// Declarative blocking rules (chrome.declarativeNetRequest dynamic rules)
#[async_trait(?Send)]
pub trait RuleSink {
    /// Replace the whole dynamic rule set
    async fn replace_rules(&self, rules: &[DynamicRule]) -> Result<()>;
}

pub type LocalFuture = Pin<Box<dyn Future<Output = ()>>>;

/// Timer callback; receives the epoch-ms of the tick
pub type Tick = Rc<dyn Fn(u64) -> LocalFuture>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntervalId(pub i32);

/// Repeating timers; the host drives the returned futures to completion
pub trait Scheduler {
    fn every(&self, period_ms: u32, tick: Tick) -> IntervalId;
    fn cancel(&self, id: IntervalId);
}
