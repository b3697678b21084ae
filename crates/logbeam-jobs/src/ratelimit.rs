//! Fixed-window rate limiting over a shared counter store.
//!
//! Each call increments the counter for
//! `<prefix>:<scope>:<floor(now / window)>` and sets the key to expire after
//! one window, so a bucket is never read once its window has passed. The
//! first call in a window is always allowed for any non-zero limit.
//!
//! Two named policies sit on top:
//!
//! | Policy | Key prefix | On store failure |
//! |--------|------------|------------------|
//! | [`RateLimiter::allow_api`] | `ratelimit:api` | allow (fail open) |
//! | [`RateLimiter::allow_channel`] | `ratelimit:channel` | deny (fail closed) |
//!
//! Both failure policies can be flipped through [`RateLimitConfig`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use logbeam_core::defaults::{
    RATE_LIMIT_API_PER_MINUTE, RATE_LIMIT_API_PREFIX, RATE_LIMIT_CHANNEL_PREFIX,
    RATE_LIMIT_WINDOW_SECS,
};
use logbeam_core::{CounterStore, Error, RateLimitDecision, Result};

/// Rate limiter settings.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Ingestion requests allowed per project per window.
    pub api_per_minute: u32,
    /// Allow ingestion when the counter store is unreachable.
    pub api_fail_open: bool,
    /// Allow channel sends when the counter store is unreachable.
    pub channel_fail_open: bool,
    /// Window length for both policies.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            api_per_minute: RATE_LIMIT_API_PER_MINUTE,
            api_fail_open: true,
            channel_fail_open: false,
            window: Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
        }
    }
}

impl RateLimitConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `RATE_LIMIT_API_PER_MINUTE` | `600` | Ingestion requests per project per minute |
    /// | `RATE_LIMIT_API_FAIL_OPEN` | `true` | Allow ingestion when the store is down |
    /// | `RATE_LIMIT_CHANNEL_FAIL_OPEN` | `false` | Allow channel sends when the store is down |
    pub fn from_env() -> Self {
        let api_per_minute = std::env::var("RATE_LIMIT_API_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(RATE_LIMIT_API_PER_MINUTE);

        let api_fail_open = std::env::var("RATE_LIMIT_API_FAIL_OPEN")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let channel_fail_open = std::env::var("RATE_LIMIT_CHANNEL_FAIL_OPEN")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self {
            api_per_minute,
            api_fail_open,
            channel_fail_open,
            ..Self::default()
        }
    }

    pub fn with_api_per_minute(mut self, limit: u32) -> Self {
        self.api_per_minute = limit;
        self
    }

    pub fn with_api_fail_open(mut self, fail_open: bool) -> Self {
        self.api_fail_open = fail_open;
        self
    }

    pub fn with_channel_fail_open(mut self, fail_open: bool) -> Self {
        self.channel_fail_open = fail_open;
        self
    }
}

/// Fixed-window limiter shared by the ingestion API and the dispatcher.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count one call against `scope` in the current window.
    pub async fn allow(
        &self,
        prefix: &str,
        scope: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision> {
        self.allow_at(prefix, scope, limit, window, Utc::now()).await
    }

    /// Count one call against `scope` in the window containing `now`.
    pub async fn allow_at(
        &self,
        prefix: &str,
        scope: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision> {
        let window_secs = window.as_secs().max(1);
        let bucket = now.timestamp().div_euclid(window_secs as i64);
        let key = format!("{prefix}:{scope}:{bucket}");

        let count = self
            .store
            .incr_with_expiry(&key, Duration::from_secs(window_secs))
            .await
            .map_err(|e| Error::RateLimit(format!("{key}: {e}")))?;

        let limit_i = i64::from(limit);
        Ok(RateLimitDecision {
            allowed: count <= limit_i,
            count,
            limit,
            remaining: (limit_i - count).clamp(0, limit_i) as u32,
            reset_at: window_end(bucket, window_secs),
        })
    }

    /// Per-channel dispatch policy. Fails closed unless configured otherwise.
    pub async fn allow_channel(&self, channel_id: &str, limit: u32) -> RateLimitDecision {
        let fail_open = self.config.channel_fail_open;
        self.with_policy(RATE_LIMIT_CHANNEL_PREFIX, channel_id, limit, fail_open)
            .await
    }

    /// Per-project ingestion policy. Fails open unless configured otherwise.
    pub async fn allow_api(&self, project_id: &str, limit: u32) -> RateLimitDecision {
        let fail_open = self.config.api_fail_open;
        self.with_policy(RATE_LIMIT_API_PREFIX, project_id, limit, fail_open)
            .await
    }

    async fn with_policy(
        &self,
        prefix: &str,
        scope: &str,
        limit: u32,
        fail_open: bool,
    ) -> RateLimitDecision {
        let now = Utc::now();
        match self.allow_at(prefix, scope, limit, self.config.window, now).await {
            Ok(decision) => {
                if !decision.allowed {
                    debug!(prefix, scope, count = decision.count, limit, "Rate limit exceeded");
                }
                decision
            }
            Err(e) => {
                warn!(prefix, scope, fail_open, error = %e, "Rate limiter store unavailable");
                let window_secs = self.config.window.as_secs().max(1);
                let bucket = now.timestamp().div_euclid(window_secs as i64);
                RateLimitDecision {
                    allowed: fail_open,
                    count: 0,
                    limit,
                    remaining: if fail_open { limit } else { 0 },
                    reset_at: window_end(bucket, window_secs),
                }
            }
        }
    }
}

fn window_end(bucket: i64, window_secs: u64) -> DateTime<Utc> {
    let secs = (bucket + 1).saturating_mul(window_secs as i64);
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
