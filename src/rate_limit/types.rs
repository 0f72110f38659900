use crate::error::{GatekeeperError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identity used when a request carries no usable client address.
pub const UNRESOLVED_IDENTITY: &str = "unknown";

/// What to do with a request when the counter store cannot be consulted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Let the request through uncounted and log the degradation
    #[default]
    FailOpen,
    /// Reject the request as if the quota were exhausted
    FailClosed,
}

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Whether the rate limiting stage is installed at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum number of requests allowed per window
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    /// Length of a window (in seconds)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Behaviour when the counter store is unavailable
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Upper bound for a single counter store round trip (in milliseconds)
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    /// Whether `X-Forwarded-For` / `X-Real-IP` are trusted to name the client.
    ///
    /// These headers are client-controlled unless a reverse proxy overwrites
    /// them; only enable this when the service sits behind one.
    #[serde(default = "default_true")]
    pub trust_forwarded_headers: bool,
    /// Namespace prepended to every counter key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> u32 {
    20
}

fn default_window_secs() -> u64 {
    120
}

fn default_store_timeout_ms() -> u64 {
    250
}

fn default_key_prefix() -> String {
    "gatekeeper:ratelimit".to_string()
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            threshold: default_threshold(),
            window_secs: default_window_secs(),
            failure_policy: FailurePolicy::default(),
            store_timeout_ms: default_store_timeout_ms(),
            trust_forwarded_headers: default_true(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl RateLimitConfig {
    /// Create a configuration with the given threshold and window, defaults elsewhere
    pub fn new(threshold: u32, window_secs: u64) -> Self {
        Self {
            threshold,
            window_secs,
            ..Self::default()
        }
    }

    /// Get the window as a Duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Get the store timeout as a Duration
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Reject values that would make the limiter meaningless
    pub fn validate(&self) -> Result<()> {
        if self.threshold == 0 {
            return Err(GatekeeperError::InvalidConfiguration(
                "rate limit threshold must be > 0".to_string(),
            ));
        }
        if self.window_secs == 0 {
            return Err(GatekeeperError::InvalidConfiguration(
                "rate limit window must be > 0".to_string(),
            ));
        }
        if self.store_timeout_ms == 0 {
            return Err(GatekeeperError::InvalidConfiguration(
                "counter store timeout must be > 0".to_string(),
            ));
        }
        if self.key_prefix.is_empty() {
            return Err(GatekeeperError::InvalidConfiguration(
                "rate limit key prefix cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Opaque key identifying the caller, usually its IP address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Wrap an identity; blank input collapses to the unresolved sentinel
    pub fn new(identity: impl Into<String>) -> Self {
        let identity = identity.into();
        let trimmed = identity.trim();
        if trimmed.is_empty() {
            Self::unresolved()
        } else if trimmed.len() == identity.len() {
            Self(identity)
        } else {
            Self(trimmed.to_string())
        }
    }

    /// The shared fallback identity for callers without an address
    pub fn unresolved() -> Self {
        Self(UNRESOLVED_IDENTITY.to_string())
    }

    pub fn is_unresolved(&self) -> bool {
        self.0 == UNRESOLVED_IDENTITY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a single admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Configured threshold
    pub limit: u32,
    /// Counter value after this request, `None` when the store was not reached
    pub count: Option<i64>,
    /// How long until the current window closes (zero when allowed)
    pub retry_after: Duration,
}

impl RateLimitDecision {
    /// Create an allowed result for a counted request
    pub fn allowed(count: i64, limit: u32) -> Self {
        Self {
            allowed: true,
            limit,
            count: Some(count),
            retry_after: Duration::ZERO,
        }
    }

    /// Create an allowed result for a request the store never saw
    pub fn degraded(limit: u32) -> Self {
        Self {
            allowed: true,
            limit,
            count: None,
            retry_after: Duration::ZERO,
        }
    }

    /// Create a denied result
    pub fn denied(count: Option<i64>, limit: u32, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            limit,
            count,
            retry_after,
        }
    }

    /// Requests left in the current window, if known
    pub fn remaining(&self) -> Option<u64> {
        self.count
            .map(|count| (i64::from(self.limit) - count).max(0) as u64)
    }

    /// Retry-after rounded up to whole seconds for the `Retry-After` header.
    ///
    /// A denial never advertises 0, which clients read as "retry now".
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs() + u64::from(self.retry_after.subsec_nanos() > 0);
        if self.allowed {
            secs
        } else {
            secs.max(1)
        }
    }
}
