use serde::Serialize;
use serde_json::Value;

// Kind of generation a caller may ask for; each maps to one fixed model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Style,
    Copywriting,
}

impl RequestKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "style" => Some(Self::Style),
            "copy" => Some(Self::Copywriting),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Style => "style",
            Self::Copywriting => "copy",
        }
    }

    // caller-supplied models are never forwarded
    pub fn model(self) -> &'static str {
        match self {
            Self::Style => "claude-3-5-haiku-20241022",
            Self::Copywriting => "claude-3-5-haiku-20241022",
        }
    }

    pub fn max_tokens_ceiling(self) -> u64 {
        match self {
            Self::Style => 1024,
            Self::Copywriting => 2048,
        }
    }
}

// Body sent to the upstream messages endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamRequest {
    #[serde(skip)]
    pub kind: RequestKind,
    pub model: &'static str,
    pub max_tokens: u64,
    pub messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}
