mod generate;
mod health;
mod metrics;
mod quota;

pub use generate::{generate_handler, method_not_allowed, preflight_handler};
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use quota::quota_handler;
