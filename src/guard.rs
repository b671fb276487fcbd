/// Navigation Guard: redirects blocked navigations while focus mode is on
use log::{debug, info};
use std::cell::Cell;
use std::rc::Rc;
use url::form_urlencoded;

use crate::blocklist::BlockRuleStore;
use crate::domain::extract_domain;
use crate::error::Result;
use crate::focus_data::TabId;
use crate::host::Tabs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Inert,
    Armed,
}

pub struct NavigationGuard {
    state: Cell<GuardState>,
    store: Rc<BlockRuleStore>,
    tabs: Rc<dyn Tabs>,
    blocked_page: String,
}

impl NavigationGuard {
    pub fn new(
        store: Rc<BlockRuleStore>,
        tabs: Rc<dyn Tabs>,
        blocked_page: &str,
    ) -> NavigationGuard {
        NavigationGuard {
            state: Cell::new(GuardState::Inert),
            store,
            tabs,
            blocked_page: blocked_page.trim_start_matches('/').to_string(),
        }
    }

    pub fn state(&self) -> GuardState {
        self.state.get()
    }

    pub fn is_armed(&self) -> bool {
        self.state.get() == GuardState::Armed
    }

    pub fn arm(&self) {
        if self.state.replace(GuardState::Armed) == GuardState::Inert {
            info!("Navigation guard armed");
        }
    }

    pub fn disarm(&self) {
        if self.state.replace(GuardState::Inert) == GuardState::Armed {
            info!("Navigation guard inert");
        }
    }

    /// Check a tab's new URL; returns true if the tab was redirected
    pub async fn on_url_updated(&self, tab_id: TabId, url: &str, now: u64) -> Result<bool> {
        if !self.is_armed() {
            return Ok(false);
        }

        let Some(domain) = extract_domain(url) else {
            return Ok(false);
        };

        if !self.store.is_domain_blocked(&domain, now).await {
            return Ok(false);
        }

        debug!("Blocking {domain} in tab {tab_id}");
        self.tabs
            .redirect_to_extension_page(tab_id, &self.blocked_page_for(&domain))
            .await?;
        Ok(true)
    }

    fn blocked_page_for(&self, domain: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("domain", domain)
            .finish();
        format!("{}?{query}", self.blocked_page)
    }
}
