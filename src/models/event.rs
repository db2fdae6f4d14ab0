use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_MAX_FILES;

/// Lifecycle state of an event
///
/// `pending -> active` on approve, `pending -> deleted` on reject,
/// `active <-> inactive` on archive/activate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Active,
    Inactive,
}

/// Event record stored in redb, keyed by its uppercase code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub status: EventStatus,
    pub max_files: Option<u32>,
    pub current_files: u32,
    pub max_file_size: Option<u64>,
    pub allowed_types: Option<Vec<String>>,
    /// Id of the hosting user
    pub created_by: String,
    /// Unix timestamp
    pub created_at: i64,
    pub expires_at: Option<i64>,
    /// Blob-store folder id, cached once the first upload creates it
    pub folder_id: Option<String>,
}

impl EventRecord {
    pub fn is_active(&self) -> bool {
        self.status == EventStatus::Active
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|t| now >= t)
    }

    /// Effective file quota, falling back to the platform default
    pub fn effective_max_files(&self) -> u32 {
        self.max_files.unwrap_or(DEFAULT_MAX_FILES)
    }

    pub fn at_capacity(&self) -> bool {
        self.current_files >= self.effective_max_files()
    }

    /// Whether the given MIME type is accepted by this event.
    /// `allowed_types` entries may be exact (`image/png`) or a
    /// wildcard family (`image/*`). No list means everything is accepted.
    pub fn accepts_mime(&self, mime: &str) -> bool {
        match &self.allowed_types {
            None => true,
            Some(types) => types.iter().any(|t| {
                if let Some(family) = t.strip_suffix("/*") {
                    mime.strip_prefix(family)
                        .is_some_and(|rest| rest.starts_with('/'))
                } else {
                    t.eq_ignore_ascii_case(mime)
                }
            }),
        }
    }
}

/// Event model for API responses
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: EventStatus,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_files: Option<u32>,
    pub current_files: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_types: Option<Vec<String>>,
    pub created_by: String,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl From<EventRecord> for Event {
    fn from(r: EventRecord) -> Self {
        let is_active = r.is_active();
        Event {
            id: r.id,
            code: r.code,
            name: r.name,
            description: r.description,
            status: r.status,
            is_active,
            max_files: r.max_files,
            current_files: r.current_files,
            max_file_size: r.max_file_size,
            allowed_types: r.allowed_types,
            created_by: r.created_by,
            created_at: r.created_at,
            expires_at: r.expires_at,
        }
    }
}

/// Guest-facing event view: enough to render the upload page,
/// nothing about the host or moderation state beyond activity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicEvent {
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_types: Option<Vec<String>>,
}

impl From<EventRecord> for PublicEvent {
    fn from(r: EventRecord) -> Self {
        PublicEvent {
            code: r.code,
            name: r.name,
            description: r.description,
            max_file_size: r.max_file_size,
            allowed_types: r.allowed_types,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> EventRecord {
        EventRecord {
            id: "e-1".to_string(),
            code: "ABC123".to_string(),
            name: "Wedding".to_string(),
            description: None,
            status: EventStatus::Active,
            max_files: Some(2),
            current_files: 0,
            max_file_size: None,
            allowed_types: None,
            created_by: "u-1".to_string(),
            created_at: 1_700_000_000,
            expires_at: None,
            folder_id: None,
        }
    }

    #[test]
    fn test_capacity() {
        let mut r = record();
        assert!(!r.at_capacity());
        r.current_files = 2;
        assert!(r.at_capacity());
        r.current_files = 3;
        assert!(r.at_capacity());
    }

    #[test]
    fn test_default_quota_applies_when_unset() {
        let mut r = record();
        r.max_files = None;
        assert_eq!(r.effective_max_files(), DEFAULT_MAX_FILES);
    }

    #[test]
    fn test_expiry() {
        let mut r = record();
        assert!(!r.is_expired(1_700_000_100));
        r.expires_at = Some(1_700_000_050);
        assert!(r.is_expired(1_700_000_100));
        assert!(!r.is_expired(1_700_000_000));
    }

    #[test]
    fn test_accepts_mime() {
        let mut r = record();
        assert!(r.accepts_mime("application/pdf"));

        r.allowed_types = Some(vec!["image/*".to_string(), "video/mp4".to_string()]);
        assert!(r.accepts_mime("image/png"));
        assert!(r.accepts_mime("image/jpeg"));
        assert!(r.accepts_mime("video/mp4"));
        assert!(!r.accepts_mime("video/webm"));
        assert!(!r.accepts_mime("imagefoo/png"));
    }
}
