//! Two-tier hourly quota: one counter for the whole gateway, one per client.
//!
//! Checking and recording are separate store round trips, so concurrent
//! requests can both read a stale count and overshoot a limit slightly.
//! The limiter is an abuse deterrent, not a billing boundary. A strict
//! version would need an atomic increment-and-fetch in the store, merging
//! `check` and `record` into one call.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::identity::ClientId;
use crate::metrics::{RATE_LIMITED, STORE_FAILURES};
use crate::store::{QuotaStore, StoreError};
use crate::window::{self, HourWindow};

pub const DEFAULT_GLOBAL_LIMIT: u64 = 25;
pub const DEFAULT_USER_LIMIT: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitReason {
    Global,
    User,
}

impl fmt::Display for LimitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Global => "global",
            Self::User => "user",
        })
    }
}

/// What to do when the counter store cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FailurePolicy {
    /// Admit the request as if quota were off.
    #[default]
    Open,
    /// Reject the request until the store is back.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub global: u64,
    pub user: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            global: DEFAULT_GLOBAL_LIMIT,
            user: DEFAULT_USER_LIMIT,
        }
    }
}

// Counter keys for one client in one window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    pub global: String,
    pub user: String,
}

impl StoreKeys {
    pub fn new(window: &HourWindow, client: &ClientId) -> Self {
        Self {
            global: format!("global:{}", window.key),
            user: format!("user:{}:{}", client, window.key),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u64,
    // None when quota is not being enforced (no store, or fail-open)
    pub reset_at: Option<DateTime<Utc>>,
    pub reason: Option<LimitReason>,
    // present only when usage should be recorded after the upstream call
    pub keys: Option<StoreKeys>,
}

impl RateDecision {
    fn unmetered(limits: Limits) -> Self {
        Self {
            allowed: true,
            remaining: limits.user,
            reset_at: None,
            reason: None,
            keys: None,
        }
    }

    fn denied(reason: LimitReason, reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_at: Some(reset_at),
            reason: Some(reason),
            keys: None,
        }
    }
}

pub struct RateLimiter {
    store: Arc<dyn QuotaStore>,
    limits: Limits,
    policy: FailurePolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn QuotaStore>, limits: Limits, policy: FailurePolicy) -> Self {
        Self {
            store,
            limits,
            policy,
        }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn store_enabled(&self) -> bool {
        self.store.is_enabled()
    }

    /// Decide whether `client` may make a request at `now`.
    ///
    /// Only fails when the store is unreadable under [`FailurePolicy::Closed`].
    /// Rejections and store failures are counted and logged here, so this
    /// is for requests that will actually be admitted or refused.
    pub async fn check(
        &self,
        client: &ClientId,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, StoreError> {
        match self.decide(client, now).await {
            Ok(decision) => {
                match decision.reason {
                    Some(LimitReason::Global) => {
                        RATE_LIMITED.with_label_values(&["global"]).inc();
                        info!(client = %client, "Global hourly limit reached ({})", self.limits.global);
                    }
                    Some(LimitReason::User) => {
                        RATE_LIMITED.with_label_values(&["user"]).inc();
                        info!(client = %client, "Client hourly limit reached ({})", self.limits.user);
                    }
                    None => debug!(client = %client, remaining = decision.remaining, "Request admitted"),
                }
                Ok(decision)
            }
            Err(err) => {
                STORE_FAILURES.inc();
                match self.policy {
                    FailurePolicy::Open => {
                        warn!("Counter store read failed, admitting request: {}", err);
                        Ok(RateDecision::unmetered(self.limits))
                    }
                    FailurePolicy::Closed => {
                        warn!("Counter store read failed, rejecting request: {}", err);
                        Err(err)
                    }
                }
            }
        }
    }

    /// Same decision as [`check`](Self::check) without metrics or logs,
    /// for status reads that do not stand for a request.
    pub async fn peek(
        &self,
        client: &ClientId,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, StoreError> {
        match self.decide(client, now).await {
            Err(_) if self.policy == FailurePolicy::Open => Ok(RateDecision::unmetered(self.limits)),
            result => result,
        }
    }

    // The global limit is checked first, so a client is told "global"
    // whenever both limits are exhausted at once.
    async fn decide(
        &self,
        client: &ClientId,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, StoreError> {
        if !self.store.is_enabled() {
            return Ok(RateDecision::unmetered(self.limits));
        }

        let window = HourWindow::at(now);
        let keys = StoreKeys::new(&window, client);
        let (global, user) = tokio::join!(self.store.get(&keys.global), self.store.get(&keys.user));
        let (global_count, user_count) = (global?, user?);

        if global_count >= self.limits.global {
            return Ok(RateDecision::denied(LimitReason::Global, window.reset_at));
        }
        if user_count >= self.limits.user {
            return Ok(RateDecision::denied(LimitReason::User, window.reset_at));
        }

        Ok(RateDecision {
            allowed: true,
            remaining: self.limits.user - user_count - 1,
            reset_at: Some(window.reset_at),
            reason: None,
            keys: Some(keys),
        })
    }

    /// Count one request against both tiers.
    ///
    /// Call after the upstream call completed, whatever its status. Counters
    /// are re-read rather than reusing the decision's values to narrow the
    /// lost-update window. Failures are logged and swallowed.
    pub async fn record(&self, decision: &RateDecision, now: DateTime<Utc>) {
        if !self.store.is_enabled() {
            return;
        }
        let (Some(keys), Some(reset_at)) = (&decision.keys, decision.reset_at) else {
            return;
        };
        let ttl = window::counter_ttl(reset_at, now);

        let (global, user) = tokio::join!(self.store.get(&keys.global), self.store.get(&keys.user));
        let (global_count, user_count) = match (global, user) {
            (Ok(g), Ok(u)) => (g, u),
            (Err(err), _) | (_, Err(err)) => {
                STORE_FAILURES.inc();
                warn!("Could not read counters to record usage: {}", err);
                return;
            }
        };

        let (global, user) = tokio::join!(
            self.store.put(&keys.global, global_count.saturating_add(1), ttl),
            self.store.put(&keys.user, user_count.saturating_add(1), ttl),
        );
        for (key, result) in [(&keys.global, global), (&keys.user, user)] {
            if let Err(err) = result {
                STORE_FAILURES.inc();
                warn!("Could not record usage for {}: {}", key, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DisabledStore, MemoryStore};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    // store whose every operation fails, counting attempts
    #[derive(Default)]
    struct BrokenStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QuotaStore for BrokenStore {
        async fn get(&self, key: &str) -> Result<u64, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Corrupt {
                key: key.to_string(),
                value: "???".to_string(),
            })
        }

        async fn put(&self, key: &str, _value: u64, _ttl: Duration) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Corrupt {
                key: key.to_string(),
                value: "???".to_string(),
            })
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 15, 20, 0).unwrap()
    }

    fn client() -> ClientId {
        ClientId::from_address("203.0.113.7")
    }

    fn limiter(store: Arc<dyn QuotaStore>) -> RateLimiter {
        RateLimiter::new(store, Limits::default(), FailurePolicy::Open)
    }

    async fn seed(store: &MemoryStore, global: u64, user: u64) {
        let keys = StoreKeys::new(&HourWindow::at(now()), &client());
        let ttl = Duration::from_secs(3600);
        store.put(&keys.global, global, ttl).await.unwrap();
        store.put(&keys.user, user, ttl).await.unwrap();
    }

    #[test]
    fn keys_follow_layout() {
        let keys = StoreKeys::new(&HourWindow::at(now()), &client());
        assert_eq!(keys.global, "global:2024-04-02-15");
        assert_eq!(keys.user, "user:n0wiat:2024-04-02-15");
    }

    #[tokio::test]
    async fn fresh_window_allows_with_reserved_slot() {
        let limiter = limiter(Arc::new(MemoryStore::new()));
        let decision = limiter.check(&client(), now()).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, DEFAULT_USER_LIMIT - 1);
        assert_eq!(
            decision.reset_at,
            Some(Utc.with_ymd_and_hms(2024, 4, 2, 16, 0, 0).unwrap())
        );
        assert!(decision.keys.is_some());
    }

    #[tokio::test]
    async fn last_global_slot_then_global_denial() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, DEFAULT_GLOBAL_LIMIT - 1, 0).await;
        let limiter = limiter(store.clone());

        let decision = limiter.check(&client(), now()).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, DEFAULT_USER_LIMIT - 1);

        limiter.record(&decision, now()).await;
        let decision = limiter.check(&client(), now()).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(LimitReason::Global));
        assert_eq!(decision.remaining, 0);
        assert!(decision.reset_at.is_some());
    }

    #[tokio::test]
    async fn exhausted_client_is_denied_as_user() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, 3, DEFAULT_USER_LIMIT).await;
        let decision = limiter(store).check(&client(), now()).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(LimitReason::User));
        assert_eq!(decision.remaining, 0);
    }

    #[tokio::test]
    async fn global_wins_when_both_exhausted() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, DEFAULT_GLOBAL_LIMIT, DEFAULT_USER_LIMIT).await;
        let decision = limiter(store).check(&client(), now()).await.unwrap();
        assert_eq!(decision.reason, Some(LimitReason::Global));
    }

    #[tokio::test]
    async fn other_clients_keep_their_own_quota() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, 3, DEFAULT_USER_LIMIT).await;
        let other = ClientId::from_address("198.51.100.20");
        let decision = limiter(store).check(&other, now()).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, DEFAULT_USER_LIMIT - 1);
    }

    #[tokio::test]
    async fn disabled_store_turns_quota_off() {
        let limiter = limiter(Arc::new(DisabledStore));
        let decision = limiter.check(&client(), now()).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, DEFAULT_USER_LIMIT);
        assert_eq!(decision.reset_at, None);
        assert_eq!(decision.keys, None);
    }

    #[tokio::test]
    async fn broken_store_fails_open() {
        let store = Arc::new(BrokenStore::default());
        let limiter = limiter(store.clone());
        let decision = limiter.check(&client(), now()).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, DEFAULT_USER_LIMIT);
        assert_eq!(decision.reset_at, None);

        // no keys on a fail-open decision, so recording never touches the store
        let before = store.calls.load(Ordering::SeqCst);
        limiter.record(&decision, now()).await;
        assert_eq!(store.calls.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn broken_store_fails_closed_when_asked() {
        let limiter = RateLimiter::new(
            Arc::new(BrokenStore::default()),
            Limits::default(),
            FailurePolicy::Closed,
        );
        assert!(limiter.check(&client(), now()).await.is_err());
    }

    #[tokio::test]
    async fn record_increments_both_tiers() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, 10, 2).await;
        let limiter = limiter(store.clone());
        let decision = limiter.check(&client(), now()).await.unwrap();
        assert_eq!(decision.remaining, 2);

        // another instance recorded meanwhile; re-reading picks that up
        seed(&store, 12, 3).await;
        limiter.record(&decision, now()).await;

        let keys = decision.keys.unwrap();
        assert_eq!(store.get(&keys.global).await.unwrap(), 13);
        assert_eq!(store.get(&keys.user).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn record_saturates_instead_of_overflowing() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, u64::MAX, u64::MAX).await;
        let window = HourWindow::at(now());
        let keys = StoreKeys::new(&window, &client());
        let decision = RateDecision {
            allowed: true,
            remaining: 0,
            reset_at: Some(window.reset_at),
            reason: None,
            keys: Some(keys.clone()),
        };
        limiter(store.clone()).record(&decision, now()).await;
        assert_eq!(store.get(&keys.global).await.unwrap(), u64::MAX);
        assert_eq!(store.get(&keys.user).await.unwrap(), u64::MAX);
    }

    #[tokio::test]
    async fn peek_matches_check() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, 3, DEFAULT_USER_LIMIT).await;
        let limiter = limiter(store);
        assert_eq!(
            limiter.peek(&client(), now()).await.unwrap(),
            limiter.check(&client(), now()).await.unwrap()
        );

        let broken = RateLimiter::new(
            Arc::new(BrokenStore::default()),
            Limits::default(),
            FailurePolicy::Open,
        );
        let decision = broken.peek(&client(), now()).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.reset_at, None);

        let closed = RateLimiter::new(
            Arc::new(BrokenStore::default()),
            Limits::default(),
            FailurePolicy::Closed,
        );
        assert!(closed.peek(&client(), now()).await.is_err());
    }

    #[tokio::test]
    async fn record_skips_denied_decisions() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, DEFAULT_GLOBAL_LIMIT, 0).await;
        let limiter = limiter(store.clone());
        let decision = limiter.check(&client(), now()).await.unwrap();
        limiter.record(&decision, now()).await;

        let keys = StoreKeys::new(&HourWindow::at(now()), &client());
        assert_eq!(store.get(&keys.global).await.unwrap(), DEFAULT_GLOBAL_LIMIT);
    }
}
