//! Code handling: normalization, format checks, generation, and the
//! read-time gate applied before every guest-facing action.

use rand::Rng;

use crate::constants::{CODE_ALPHABET, GENERATED_CODE_LEN, MAX_CODE_LEN, MIN_CODE_LEN};
use crate::error::AppError;
use crate::models::{BetaCodeRecord, EventRecord};

/// Why a code failed the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    NotFound,
    NotActive,
    Expired,
    Exhausted,
}

impl GateRejection {
    /// Short reason string surfaced in validation responses
    pub fn reason(&self) -> &'static str {
        match self {
            GateRejection::NotFound => "not_found",
            GateRejection::NotActive => "not_active",
            GateRejection::Expired => "expired",
            GateRejection::Exhausted => "exhausted",
        }
    }
}

impl From<GateRejection> for AppError {
    fn from(r: GateRejection) -> Self {
        match r {
            GateRejection::NotFound => AppError::NotFound("Event"),
            GateRejection::NotActive => {
                AppError::InvalidInput("This code is not currently active".to_string())
            }
            GateRejection::Expired => AppError::InvalidInput("This code has expired".to_string()),
            GateRejection::Exhausted => {
                AppError::InvalidInput("This code has reached its usage limit".to_string())
            }
        }
    }
}

/// Uppercase a candidate code for storage/lookup
pub fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Whether an already-normalized code has the accepted shape
pub fn is_valid_format(code: &str) -> bool {
    (MIN_CODE_LEN..=MAX_CODE_LEN).contains(&code.len())
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Generate a fresh random event code.
/// Uniqueness is still checked against the store by the caller.
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    (0..GENERATED_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Gate an event record: absent, pending/inactive, expired, or at its
/// file quota all reject. No side effects.
pub fn gate_event(
    record: Option<EventRecord>,
    now: i64,
) -> Result<EventRecord, GateRejection> {
    let record = record.ok_or(GateRejection::NotFound)?;
    if !record.is_active() {
        return Err(GateRejection::NotActive);
    }
    if record.is_expired(now) {
        return Err(GateRejection::Expired);
    }
    if record.at_capacity() {
        return Err(GateRejection::Exhausted);
    }
    Ok(record)
}

/// Gate a beta code record: absent, inactive, expired, or at its usage
/// cap all reject. No side effects; consumption happens separately
/// inside the registration transaction.
pub fn gate_beta(
    record: Option<BetaCodeRecord>,
    now: i64,
) -> Result<BetaCodeRecord, GateRejection> {
    let record = record.ok_or(GateRejection::NotFound)?;
    if !record.is_active {
        return Err(GateRejection::NotActive);
    }
    if record.is_expired(now) {
        return Err(GateRejection::Expired);
    }
    if record.exhausted() {
        return Err(GateRejection::Exhausted);
    }
    Ok(record)
}
