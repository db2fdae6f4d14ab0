use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use crate::codes;
use crate::db::{self, tables as t};
use crate::error::Result;
use crate::models::{BetaCode, BetaCodeRecord};
use crate::routes::ok_json;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    pub code: String,
}

/// Pure gate check for a beta code: no side effects, always 200.
///
/// `{ valid: true, code }` or `{ valid: false, reason }` where reason is
/// one of not_found / not_active / expired / exhausted.
pub async fn validate_beta_code(
    State(state): State<AppState>,
    Query(params): Query<ValidateQuery>,
) -> Result<Json<Value>> {
    let code = codes::normalize(&params.code);
    let db = state.db.clone();

    let outcome = tokio::task::spawn_blocking(
        move || -> Result<std::result::Result<BetaCodeRecord, codes::GateRejection>> {
            let now = Utc::now().timestamp();
            let read_txn = db.begin_read()?;
            let beta_codes = read_txn.open_table(t::BETA_CODES)?;
            let existing = beta_codes
                .get(code.as_str())?
                .map(|v| db::decode(v.value()))
                .transpose()?;
            Ok(codes::gate_beta(existing, now))
        },
    )
    .await??;

    match outcome {
        Ok(record) => Ok(ok_json(serde_json::json!({
            "valid": true,
            "code": BetaCode::from(record),
        }))),
        Err(rejection) => Ok(ok_json(serde_json::json!({
            "valid": false,
            "reason": rejection.reason(),
        }))),
    }
}
