use axum::{Json, extract::State};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::error::GatewayError;
use crate::identity::ClientId;
use crate::state::AppState;

// Read-only view of the caller's quota; never records usage
pub async fn quota_handler(
    State(state): State<Arc<AppState>>,
    client: ClientId,
) -> Result<Json<Value>, GatewayError> {
    let decision = state
        .limiter
        .peek(&client, Utc::now())
        .await
        .map_err(|_| GatewayError::StoreUnavailable)?;

    // the decision reserves a slot for "this" request; a status read should not
    let remaining = if decision.allowed && decision.keys.is_some() {
        decision.remaining + 1
    } else {
        decision.remaining
    };

    Ok(Json(json!({
        "allowed": decision.allowed,
        "remaining": remaining,
        "limit": state.limiter.limits().user,
        "resetAt": decision.reset_at.map(|at| at.timestamp_millis()),
        "reason": decision.reason,
        "enforced": decision.reset_at.is_some(),
    })))
}
