/// Service worker entry points exported to JavaScript
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

use crate::background::{Background, BrowserEvent};
use crate::chrome::{ChromeRules, ChromeScheduler, ChromeStorage, ChromeTabs, now_ms, to_js};
use crate::host::{RuleSink, Scheduler, Storage, Tabs};
use crate::messages::{Reply, Request};

/// Handle the service worker keeps; listeners call into it
#[wasm_bindgen]
pub struct BackgroundWorker {
    background: Rc<Background>,
}

#[wasm_bindgen]
impl BackgroundWorker {
    /// Load state and restore focus mode. Register listeners after this resolves.
    pub async fn start() -> BackgroundWorker {
        let background = Background::start(
            Rc::new(ChromeStorage) as Rc<dyn Storage>,
            Rc::new(ChromeTabs) as Rc<dyn Tabs>,
            Rc::new(ChromeRules) as Rc<dyn RuleSink>,
            Rc::new(ChromeScheduler::default()) as Rc<dyn Scheduler>,
            now_ms(),
        )
        .await;
        BackgroundWorker { background }
    }

    #[wasm_bindgen(js_name = onTabActivated)]
    pub fn on_tab_activated(&self, tab_id: i32) {
        self.dispatch(BrowserEvent::TabActivated { tab_id });
    }

    #[wasm_bindgen(js_name = onWindowFocusChanged)]
    pub fn on_window_focus_changed(&self, window_id: i32) {
        self.dispatch(BrowserEvent::WindowFocusChanged { window_id });
    }

    #[wasm_bindgen(js_name = onTabUrlUpdated)]
    pub fn on_tab_url_updated(&self, tab_id: i32, url: String) {
        self.dispatch(BrowserEvent::TabUrlUpdated { tab_id, url });
    }

    #[wasm_bindgen(js_name = onTabRemoved)]
    pub fn on_tab_removed(&self, tab_id: i32) {
        self.dispatch(BrowserEvent::TabRemoved { tab_id });
    }

    /// Handle a runtime message; resolves to `{ success, error?, data? }`
    #[wasm_bindgen(js_name = handleMessage)]
    pub fn handle_message(&self, message: JsValue) -> js_sys::Promise {
        let background = Rc::clone(&self.background);
        let now = now_ms();

        future_to_promise(async move {
            let reply = match serde_wasm_bindgen::from_value::<Request>(message) {
                Ok(request) => background.handle_message(request, now).await,
                Err(e) => Reply::failed(format!("Unrecognized message: {e}")),
            };
            to_js(&reply).map_err(|e| JsValue::from_str(&e.to_string()))
        })
    }

    fn dispatch(&self, event: BrowserEvent) {
        let background = Rc::clone(&self.background);
        // Timestamp and queue at delivery, not when the transition runs
        background.queue_event(event, now_ms());
        spawn_local(async move { background.drain_events().await });
    }
}
