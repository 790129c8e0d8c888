use serde_json::Value;

use crate::error::GatewayError;
use crate::models::{RequestKind, UpstreamRequest};

/// Check an inbound body and build the payload that goes upstream.
///
/// The model always comes from the request kind and `max_tokens` is capped
/// at the kind's ceiling; neither is left to the caller.
pub fn validate(body: &Value) -> Result<UpstreamRequest, GatewayError> {
    let kind = match body.get("type") {
        Some(Value::String(value)) => {
            RequestKind::parse(value).ok_or_else(|| GatewayError::InvalidType(value.clone()))?
        }
        other => {
            return Err(GatewayError::InvalidType(
                other.map(Value::to_string).unwrap_or_default(),
            ));
        }
    };

    let messages = match body.get("messages") {
        Some(Value::Array(messages))
            if !messages.is_empty() && messages.iter().all(Value::is_object) =>
        {
            messages.clone()
        }
        _ => return Err(GatewayError::MessagesRequired),
    };

    Ok(UpstreamRequest {
        kind,
        model: kind.model(),
        max_tokens: clamp_max_tokens(kind, body.get("max_tokens")),
        messages,
        system: body
            .get("system")
            .and_then(Value::as_str)
            .map(str::to_string),
        temperature: body.get("temperature").and_then(Value::as_f64),
    })
}

// missing, zero or non-integer budgets get the ceiling
fn clamp_max_tokens(kind: RequestKind, requested: Option<&Value>) -> u64 {
    let ceiling = kind.max_tokens_ceiling();
    requested
        .and_then(Value::as_u64)
        .filter(|n| *n > 0)
        .map_or(ceiling, |n| n.min(ceiling))
}
