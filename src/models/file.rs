use serde::{Deserialize, Serialize};

/// File record stored in redb under `"{event_code}:{file_id}"`.
/// Written once per accepted upload, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    /// Id assigned by the external blob store. Known immediately for
    /// server-relayed uploads; absent for direct uploads, where the
    /// client pushes bytes to the blob store after admission.
    pub blob_id: Option<String>,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub event_code: String,
    pub table_id: Option<String>,
    /// Free-form guest label ("Table 4", "Aunt May"), never authenticated
    pub uploaded_by: Option<String>,
    pub created_at: i64,
}

/// File model for API responses
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_id: Option<String>,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_by: Option<String>,
    pub created_at: i64,
}

impl From<FileRecord> for FileInfo {
    fn from(r: FileRecord) -> Self {
        FileInfo {
            id: r.id,
            blob_id: r.blob_id,
            name: r.name,
            size: r.size,
            mime_type: r.mime_type,
            table_id: r.table_id,
            uploaded_by: r.uploaded_by,
            created_at: r.created_at,
        }
    }
}

/// Validate an upload descriptor's file name.
/// Rejects empty names and path separators that could leak into
/// blob-store object names.
pub fn validate_file_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 255
        && !name.contains('/')
        && !name.contains('\\')
        && !name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_file_name() {
        assert!(validate_file_name("photo.jpg"));
        assert!(validate_file_name("table 4 - group shot.heic"));
        assert!(!validate_file_name(""));
        assert!(!validate_file_name("../escape.jpg"));
        assert!(!validate_file_name("a/b.jpg"));
        assert!(!validate_file_name(&"x".repeat(256)));
    }
}
