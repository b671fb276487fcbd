/// Messages accepted from the popup and options pages
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default window for `getAnalytics`
pub const DEFAULT_ANALYTICS_DAYS: u32 = 7;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    FlushFocusTime,
    UpdateBlockingRules,
    SetFocusMode { active: bool },
    AddBlockedDomain { domain: String, #[serde(default)] minutes: Option<u32> },
    RemoveBlockedDomain { domain: String },
    ResetFocusData,
    GetAnalytics { #[serde(default)] days: Option<u32> },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Reply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Reply {
    pub fn ok() -> Reply {
        Reply { success: true, error: None, data: None }
    }

    pub fn with_data(data: Value) -> Reply {
        Reply { success: true, error: None, data: Some(data) }
    }

    pub fn failed(error: impl ToString) -> Reply {
        Reply { success: false, error: Some(error.to_string()), data: None }
    }
}
