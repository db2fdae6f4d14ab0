use serde::{Deserialize, Serialize};

use crate::constants::{ERR_INVALID_EMAIL, MIN_PASSWORD_LEN};

/// User record stored in redb, keyed by lowercased email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
    /// `"{salt}${hex}"` produced by security::hash_password
    pub password_hash: String,
    pub created_at: i64,
    pub last_login_at: Option<i64>,
}

/// User model for API responses (never exposes the password hash)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<i64>,
}

impl From<UserRecord> for User {
    fn from(r: UserRecord) -> Self {
        User {
            id: r.id,
            email: r.email,
            name: r.name,
            is_admin: r.is_admin,
            created_at: r.created_at,
            last_login_at: r.last_login_at,
        }
    }
}

/// Session record stored in redb, keyed by keyed-hash of the raw token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Lowercased email of the session owner
    pub email: String,
    pub created_at: i64,
    pub expires_at: i64,
}

/// Normalize an email for use as a storage key
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Minimal structural email check; real verification is a mailed link,
/// which is out of scope here.
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    let email = email.trim();
    let ok = email.len() >= 3
        && email.len() <= 254
        && email.split('@').count() == 2
        && email.split('@').all(|part| !part.is_empty())
        && !email.contains(char::is_whitespace);
    if ok {
        Ok(())
    } else {
        Err(ERR_INVALID_EMAIL)
    }
}

pub fn validate_password(password: &str) -> bool {
    password.len() >= MIN_PASSWORD_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Host@Example.COM "), "host@example.com");
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("host@example.com").is_ok());
        assert!(validate_email("a@b").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("two@@signs").is_err());
        assert!(validate_email("@empty-local").is_err());
        assert!(validate_email("spaces in@mail.com").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("longenough"));
        assert!(!validate_password("short"));
    }
}
