use serde::{Deserialize, Serialize};

/// Append-only audit record stored in redb, keyed
/// `"{timestamp_millis:013}:{id}"` so a reverse scan yields newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    /// Lowercased email of the acting user, absent for guest actions
    pub user: Option<String>,
    pub action: String,
    pub event_code: Option<String>,
    /// Unix timestamp in seconds
    pub timestamp: i64,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

impl ActivityRecord {
    /// Storage key for this record given its millisecond timestamp
    pub fn key(&self, timestamp_millis: i64) -> String {
        format!("{:013}:{}", timestamp_millis, self.id)
    }
}

/// Activity model for API responses
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_code: Option<String>,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

impl From<ActivityRecord> for Activity {
    fn from(r: ActivityRecord) -> Self {
        Activity {
            id: r.id,
            user: r.user,
            action: r.action,
            event_code: r.event_code,
            timestamp: r.timestamp,
            user_agent: r.user_agent,
            ip: r.ip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_sort_chronologically() {
        let record = ActivityRecord {
            id: "a-1".to_string(),
            user: None,
            action: "upload".to_string(),
            event_code: Some("ABC123".to_string()),
            timestamp: 1_700_000_000,
            user_agent: None,
            ip: None,
        };

        let earlier = record.key(999);
        let later = record.key(1_700_000_000_000);
        assert!(earlier < later, "zero padding must preserve ordering");
    }
}
