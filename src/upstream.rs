use axum::{
    body::{Body, Bytes},
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::{debug, error};

use crate::error::GatewayError;
use crate::metrics::{UPSTREAM_FAILURES, UPSTREAM_LATENCY};
use crate::models::UpstreamRequest;

pub const DEFAULT_UPSTREAM_URL: &str = "https://api.anthropic.com/v1/messages";
pub const API_VERSION: &str = "2023-06-01";

// Upstream reply relayed to the caller as-is
pub struct UpstreamReply {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

impl IntoResponse for UpstreamReply {
    fn into_response(self) -> Response {
        let mut res = Response::new(Body::from(self.body));
        *res.status_mut() = self.status;
        let content_type = self
            .content_type
            .unwrap_or_else(|| HeaderValue::from_static("application/json"));
        res.headers_mut().insert(CONTENT_TYPE, content_type);
        res
    }
}

pub struct Upstream {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl Upstream {
    pub fn new(client: reqwest::Client, url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            // a blank key is as good as none
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// One attempt, no retries. Any upstream status counts as a completed
    /// call; only transport failures come back as errors.
    pub async fn forward(&self, request: &UpstreamRequest) -> Result<UpstreamReply, GatewayError> {
        let api_key = self.api_key.as_deref().ok_or(GatewayError::NotConfigured)?;
        let start = Instant::now();

        let result = async {
            let res = self
                .client
                .post(&self.url)
                .header("x-api-key", api_key)
                .header("anthropic-version", API_VERSION)
                .json(request)
                .send()
                .await?;
            let status = res.status();
            let content_type = res.headers().get(CONTENT_TYPE).cloned();
            let body = res.bytes().await?;
            Ok::<_, reqwest::Error>(UpstreamReply {
                status,
                content_type,
                body,
            })
        }
        .await;

        UPSTREAM_LATENCY.observe(start.elapsed().as_secs_f64());
        match result {
            Ok(reply) => {
                debug!(
                    kind = request.kind.as_str(),
                    status = reply.status.as_u16(),
                    "Upstream replied"
                );
                Ok(reply)
            }
            Err(err) => {
                UPSTREAM_FAILURES.inc();
                error!("Upstream call to {} failed: {}", self.url, err);
                Err(GatewayError::Upstream(err))
            }
        }
    }
}
