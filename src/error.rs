use thiserror::Error;

use crate::focus_data::TabId;

/// Errors raised inside the tracker and blocker core
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Storage {op} failed: {reason}")]
    Storage { op: &'static str, reason: String },

    #[error("Tab {tab_id} not found")]
    TabNotFound { tab_id: TabId },

    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Host error: {0}")]
    Host(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = TrackerError::Storage { op: "set", reason: "QUOTA_BYTES exceeded".to_string() };
        assert_eq!(err.to_string(), "Storage set failed: QUOTA_BYTES exceeded");

        let err = TrackerError::TabNotFound { tab_id: 7 };
        assert_eq!(err.to_string(), "Tab 7 not found");
    }

    #[test]
    fn test_from_serde_error() {
        let parse_err = serde_json::from_str::<u64>("\"nope\"").unwrap_err();
        let err: TrackerError = parse_err.into();
        assert!(matches!(err, TrackerError::Serialization(_)));
    }
}
