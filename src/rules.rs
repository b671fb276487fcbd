/// Declarative redirect rules generated from the effective block list
use log::info;
use serde::{Deserialize, Serialize};

use crate::blocklist::{BlockEntry, BlockRuleStore};
use crate::error::Result;
use crate::host::RuleSink;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DynamicRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub redirect: Redirect,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub extension_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub request_domains: Vec<String>,
    pub resource_types: Vec<String>,
}

/// One main-frame redirect rule per blocked domain, ids starting at 1
pub fn build_rules(entries: &[BlockEntry], blocked_page: &str) -> Vec<DynamicRule> {
    let extension_path = format!("/{}", blocked_page.trim_start_matches('/'));

    entries
        .iter()
        .zip(1u32..)
        .map(|(entry, id)| DynamicRule {
            id,
            priority: 1,
            action: RuleAction {
                kind: "redirect".to_string(),
                redirect: Redirect { extension_path: extension_path.clone() },
            },
            condition: RuleCondition {
                request_domains: vec![entry.domain.clone()],
                resource_types: vec!["main_frame".to_string()],
            },
        })
        .collect()
}

/// Install the rules for everything currently blocked
pub async fn refresh_rules(
    store: &BlockRuleStore,
    sink: &dyn RuleSink,
    blocked_page: &str,
    now: u64,
) -> Result<usize> {
    let rules = build_rules(&store.list_effective(now).await, blocked_page);
    sink.replace_rules(&rules).await?;
    info!("Installed {} blocking rules", rules.len());
    Ok(rules.len())
}

/// Remove every dynamic rule
pub async fn clear_rules(sink: &dyn RuleSink) -> Result<()> {
    sink.replace_rules(&[]).await?;
    info!("Cleared blocking rules");
    Ok(())
}
