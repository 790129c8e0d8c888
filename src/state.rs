use crate::rate_limit::RateLimiter;
use crate::upstream::Upstream;

// app's shared state; nothing mutable lives here, counters are in the store
pub struct AppState {
    pub limiter: RateLimiter,
    pub upstream: Upstream,
}

impl AppState {
    pub fn new(limiter: RateLimiter, upstream: Upstream) -> Self {
        Self { limiter, upstream }
    }
}
