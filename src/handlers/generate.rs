use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::error::{GatewayError, REMAINING_HEADER, RESET_HEADER};
use crate::identity::ClientId;
use crate::metrics::REQUEST_TOTAL;
use crate::rate_limit::{LimitReason, RateDecision};
use crate::state::AppState;
use crate::validate::validate;
use crate::window::HourWindow;

// validate -> check quota -> forward -> record usage -> respond
pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    client: ClientId,
    body: Bytes,
) -> Result<Response, GatewayError> {
    REQUEST_TOTAL.inc();

    if !state.upstream.is_configured() {
        return Err(GatewayError::NotConfigured);
    }

    let payload: Value = serde_json::from_slice(&body).map_err(|_| GatewayError::InvalidJson)?;
    let request = validate(&payload)?;

    let now = Utc::now();
    let decision = state
        .limiter
        .check(&client, now)
        .await
        .map_err(|_| GatewayError::StoreUnavailable)?;
    if !decision.allowed {
        return Err(rejection(&state, &decision, now));
    }

    debug!(client = %client, kind = request.kind.as_str(), "Forwarding request");
    let reply = state.upstream.forward(&request).await?;

    // upstream error statuses still consume quota
    state.limiter.record(&decision, Utc::now()).await;

    let mut res = reply.into_response();
    let headers = res.headers_mut();
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(
        RESET_HEADER,
        decision
            .reset_at
            .map(|at| HeaderValue::from(at.timestamp()))
            .unwrap_or_else(|| HeaderValue::from_static("")),
    );
    headers.insert("x-demo-mode", HeaderValue::from_static("true"));
    Ok(res)
}

fn rejection(state: &AppState, decision: &RateDecision, now: DateTime<Utc>) -> GatewayError {
    let limits = state.limiter.limits();
    let reason = decision.reason.unwrap_or(LimitReason::User);
    let reset_at = decision
        .reset_at
        .unwrap_or_else(|| HourWindow::at(now).reset_at);
    let retry_after_ms = (reset_at - now).num_milliseconds().max(0) as u64;

    GatewayError::RateLimited {
        reason,
        limit: match reason {
            LimitReason::Global => limits.global,
            LimitReason::User => limits.user,
        },
        reset_at,
        retry_after_secs: retry_after_ms.div_ceil(1000).max(1),
    }
}

pub async fn preflight_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn method_not_allowed() -> GatewayError {
    GatewayError::MethodNotAllowed
}
