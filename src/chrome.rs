/// chrome.* implementations of the host traits
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

use crate::error::{Result, TrackerError};
use crate::focus_data::TabId;
use crate::host::{IntervalId, RuleSink, Scheduler, Storage, Tabs, Tick};
use crate::rules::DynamicRule;

// Import JS bridge functions
#[wasm_bindgen(module = "/background.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn getStorage(keys: JsValue) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn setStorage(items: JsValue) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn getTabUrl(tab_id: i32) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn getActiveTabId(window_id: i32) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn redirectTab(tab_id: i32, path: &str) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn replaceDynamicRules(rules: JsValue) -> std::result::Result<(), JsValue>;

    fn startInterval(callback: &Closure<dyn FnMut()>, period_ms: u32) -> i32;

    fn stopInterval(id: i32);
}

/// Current time in epoch-ms
pub fn now_ms() -> u64 {
    js_sys::Date::now() as u64
}

/// Convert to a plain JS value (objects for maps, null for None)
pub fn to_js<T: Serialize + ?Sized>(
    value: &T,
) -> std::result::Result<JsValue, serde_wasm_bindgen::Error> {
    value.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
}

fn host_error(context: &str, e: &JsValue) -> String {
    format!("{context}: {e:?}")
}

fn storage_error(op: &'static str, reason: impl ToString) -> TrackerError {
    TrackerError::Storage { op, reason: reason.to_string() }
}

pub struct ChromeStorage;

#[async_trait(?Send)]
impl Storage for ChromeStorage {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>> {
        let keys_js = to_js(keys).map_err(|e| storage_error("get", e))?;
        let result = getStorage(keys_js)
            .await
            .map_err(|e| storage_error("get", host_error("chrome.storage.local.get", &e)))?;

        if result.is_null() || result.is_undefined() {
            return Ok(Map::new());
        }
        serde_wasm_bindgen::from_value(result).map_err(|e| storage_error("get", e))
    }

    async fn set(&self, items: Map<String, Value>) -> Result<()> {
        let items_js = to_js(&items).map_err(|e| storage_error("set", e))?;
        setStorage(items_js)
            .await
            .map_err(|e| storage_error("set", host_error("chrome.storage.local.set", &e)))
    }
}

pub struct ChromeTabs;

#[async_trait(?Send)]
impl Tabs for ChromeTabs {
    async fn tab_url(&self, tab_id: TabId) -> Result<String> {
        let url = getTabUrl(tab_id)
            .await
            .map_err(|e| TrackerError::Host(host_error("chrome.tabs.get", &e)))?;
        url.as_string().ok_or(TrackerError::TabNotFound { tab_id })
    }

    async fn active_tab(&self, window_id: i32) -> Result<Option<TabId>> {
        let tab_id = getActiveTabId(window_id)
            .await
            .map_err(|e| TrackerError::Host(host_error("chrome.tabs.query", &e)))?;
        Ok(tab_id.as_f64().and_then(|id| i32::try_from(id as i64).ok()))
    }

    async fn redirect_to_extension_page(&self, tab_id: TabId, path: &str) -> Result<()> {
        redirectTab(tab_id, path)
            .await
            .map_err(|e| TrackerError::Host(host_error("chrome.tabs.update", &e)))
    }
}

pub struct ChromeRules;

#[async_trait(?Send)]
impl RuleSink for ChromeRules {
    async fn replace_rules(&self, rules: &[DynamicRule]) -> Result<()> {
        let rules_js = to_js(rules).map_err(|e| TrackerError::Host(e.to_string()))?;
        replaceDynamicRules(rules_js).await.map_err(|e| {
            TrackerError::Host(host_error("chrome.declarativeNetRequest.updateDynamicRules", &e))
        })
    }
}

/// setInterval-backed timers; each tick runs on the local executor
#[derive(Default)]
pub struct ChromeScheduler {
    callbacks: RefCell<HashMap<i32, Closure<dyn FnMut()>>>,
}

impl Scheduler for ChromeScheduler {
    fn every(&self, period_ms: u32, tick: Tick) -> IntervalId {
        let callback = Closure::<dyn FnMut()>::new(move || spawn_local(tick(now_ms())));
        let id = startInterval(&callback, period_ms);
        self.callbacks.borrow_mut().insert(id, callback);
        IntervalId(id)
    }

    fn cancel(&self, id: IntervalId) {
        stopInterval(id.0);
        self.callbacks.borrow_mut().remove(&id.0);
    }
}
