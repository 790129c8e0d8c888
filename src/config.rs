use clap::{Parser, ValueEnum};

use crate::rate_limit::{FailurePolicy, Limits};
use crate::upstream::DEFAULT_UPSTREAM_URL;

// CLI argument structure; every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "quota-gateway")]
#[command(about = "Hourly-quota proxy in front of a hosted text generation API")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Upstream API key; without it generate requests get a 503
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    // Upstream messages endpoint
    #[arg(long, env = "UPSTREAM_URL", default_value = DEFAULT_UPSTREAM_URL)]
    pub upstream_url: String,

    // Requests per UTC hour across all clients
    #[arg(long, env = "GLOBAL_RATE_LIMIT", default_value_t = 25,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub global_limit: u64,

    // Requests per UTC hour for a single client
    #[arg(long, env = "USER_RATE_LIMIT", default_value_t = 5,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub user_limit: u64,

    // Redis counter store; quota is off when no store is configured
    #[arg(long, env = "REDIS_URL", hide_env_values = true)]
    pub redis_url: Option<String>,

    // Keep counters in this process when no Redis URL is given
    #[arg(long, env = "MEMORY_STORE")]
    pub memory_store: bool,

    // Behaviour when the counter store can't be read
    #[arg(long, env = "STORE_FAILURE_POLICY", value_enum, default_value_t = FailurePolicy::Open)]
    pub store_failure_policy: FailurePolicy,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Args {
    pub fn limits(&self) -> Limits {
        Limits {
            global: self.global_limit,
            user: self.user_limit,
        }
    }
}
