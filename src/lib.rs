/// Smart Tab Manager - focus-time tracker and domain blocker
/// Built with Rust + WASM as the extension's background service worker

mod analytics;
mod background;
mod blocklist;
mod chrome;
mod config;
mod domain;
pub mod error;
mod focus_data;
mod guard;
mod host;
mod messages;
mod reconciler;
mod rules;
mod storage;
mod tracker;
pub mod worker;

#[cfg(test)]
mod test_utils;

use wasm_bindgen::prelude::*;

pub use background::{Background, BrowserEvent};
pub use blocklist::{BlockEntry, BlockRuleStore};
pub use config::TrackerConfig;
pub use focus_data::{ActiveSession, FocusHistory, FocusStats, Session, TabId};
pub use host::{RuleSink, Scheduler, Storage, Tabs};
pub use messages::{Reply, Request};
pub use tracker::FocusTracker;

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

// Re-export core domain functions for JavaScript access
#[wasm_bindgen]
pub fn extract_domain(url: &str) -> Option<String> {
    domain::extract_domain(url)
}

#[wasm_bindgen]
pub fn normalize_domain_input(input: &str) -> Option<String> {
    domain::normalize_domain_input(input)
}
