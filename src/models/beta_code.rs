use serde::{Deserialize, Serialize};

/// Beta access code stored in redb, keyed by its uppercase code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetaCodeRecord {
    pub id: String,
    pub code: String,
    pub is_active: bool,
    pub max_uses: Option<u32>,
    pub current_uses: u32,
    pub expires_at: Option<i64>,
    pub created_at: i64,
}

impl BetaCodeRecord {
    /// A code with no max_uses never exhausts
    pub fn exhausted(&self) -> bool {
        self.max_uses.is_some_and(|max| self.current_uses >= max)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|t| now >= t)
    }
}

/// Beta code model for API responses
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BetaCode {
    pub id: String,
    pub code: String,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<u32>,
    pub current_uses: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub created_at: i64,
}

impl From<BetaCodeRecord> for BetaCode {
    fn from(r: BetaCodeRecord) -> Self {
        BetaCode {
            id: r.id,
            code: r.code,
            is_active: r.is_active,
            max_uses: r.max_uses,
            current_uses: r.current_uses,
            expires_at: r.expires_at,
            created_at: r.created_at,
        }
    }
}
