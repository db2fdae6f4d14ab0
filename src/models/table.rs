use serde::{Deserialize, Serialize};

/// Table record stored in redb under `"{event_code}:{table_id}"`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRecord {
    pub id: String,
    pub name: String,
    /// Join URL encoded into the printed QR code
    pub qr_code: String,
    pub photo_count: u32,
    pub created_at: i64,
}

/// Table model for API responses
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub id: String,
    pub name: String,
    pub qr_code: String,
    pub photo_count: u32,
    pub created_at: i64,
}

impl From<TableRecord> for TableInfo {
    fn from(r: TableRecord) -> Self {
        TableInfo {
            id: r.id,
            name: r.name,
            qr_code: r.qr_code,
            photo_count: r.photo_count,
            created_at: r.created_at,
        }
    }
}

/// Build the join URL a table's QR code points at
pub fn join_url(base_url: &str, event_code: &str, table_id: &str) -> String {
    format!(
        "{}/e/{}?table={}",
        base_url.trim_end_matches('/'),
        event_code,
        table_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_trims_trailing_slash() {
        assert_eq!(
            join_url("https://momento.app/", "ABC123", "t-9"),
            "https://momento.app/e/ABC123?table=t-9"
        );
        assert_eq!(
            join_url("https://momento.app", "ABC123", "t-9"),
            "https://momento.app/e/ABC123?table=t-9"
        );
    }
}
