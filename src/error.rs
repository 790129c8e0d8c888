use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use thiserror::Error;

use crate::rate_limit::LimitReason;

pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Every way a gateway request can end without an upstream reply.
/// Each variant renders as a structured JSON response.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("API not configured")]
    NotConfigured,

    #[error("Invalid JSON body")]
    InvalidJson,

    #[error("Invalid request type {0:?}")]
    InvalidType(String),

    #[error("Messages array required")]
    MessagesRequired,

    #[error("{reason} rate limit exceeded")]
    RateLimited {
        reason: LimitReason,
        limit: u64,
        reset_at: DateTime<Utc>,
        retry_after_secs: u64,
    },

    #[error("rate limiter unavailable")]
    StoreUnavailable,

    #[error("API request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Method not allowed")]
    MethodNotAllowed,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            Self::NotConfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": "API not configured",
                    "message": "The upstream API key is not set on this gateway.",
                })),
            )
                .into_response(),
            Self::InvalidJson => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid JSON body" })))
                    .into_response()
            }
            Self::InvalidType(_) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid request type. Must be 'style' or 'copy'." })),
            )
                .into_response(),
            Self::MessagesRequired => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Messages array required" })),
            )
                .into_response(),
            Self::RateLimited {
                reason,
                limit,
                reset_at,
                retry_after_secs,
            } => {
                let message = match reason {
                    LimitReason::Global => {
                        "The demo has reached its hourly request limit. Please try again later."
                            .to_string()
                    }
                    LimitReason::User => format!(
                        "You have used all {limit} demo requests for this hour. Please try again later."
                    ),
                };
                let mut headers = HeaderMap::new();
                headers.insert(REMAINING_HEADER, HeaderValue::from(0u64));
                headers.insert(RESET_HEADER, HeaderValue::from(reset_at.timestamp()));
                headers.insert("retry-after", HeaderValue::from(retry_after_secs));
                let body = json!({
                    "error": "rate_limit_exceeded",
                    "reason": reason,
                    "message": message,
                    "resetAt": reset_at.timestamp_millis(),
                    "resetAtFormatted": reset_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                });
                (StatusCode::TOO_MANY_REQUESTS, headers, Json(body)).into_response()
            }
            Self::StoreUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": "rate_limiter_unavailable",
                    "message": "Quota could not be checked. Please try again shortly.",
                })),
            )
                .into_response(),
            Self::Upstream(err) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "API request failed",
                    "message": err.to_string(),
                })),
            )
                .into_response(),
            Self::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                Json(json!({ "error": "Method not allowed" })),
            )
                .into_response(),
        }
    }
}
