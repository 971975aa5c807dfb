//! Client-side throttling for the Drive API
//!
//! Requests are grouped into [`Category`] buckets, each a token bucket
//! refilled at the configured per-minute rate. A throttle signal from the
//! service halves the bucket's effective capacity; every 100 successes
//! recover 5 % of it, up to the configured capacity.
//!
//! ```rust,no_run
//! use gapis_drive::rate_limit::{AdaptiveRateLimiter, Category, RateLimitConfig};
//!
//! # async fn example() {
//! let limiter = AdaptiveRateLimiter::new(RateLimitConfig::default());
//! limiter.acquire(Category::List).await;
//! // ... make API call ...
//! limiter.on_success(Category::List);
//! # }
//! ```

use std::{
    collections::HashMap,
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use gapis_core::config::RateLimitingConfig;
use tracing::{debug, info, warn};

/// Successes needed before capacity is raised again
const RECOVERY_INTERVAL: u64 = 100;

/// Upper bound for exponential backoff between retries
const MAX_BACKOFF: Duration = Duration::from_secs(64);

/// Longest `Retry-After` date honored before falling back to the default
const MAX_RETRY_AFTER_SECS: u64 = 3600;

// ============================================================================
// Category
// ============================================================================

/// Logical group of API calls sharing one bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Folder listings and searches
    List,
    /// Get, create, rename, move, delete, permissions
    Metadata,
    /// Media uploads and upload session chunks
    Upload,
    /// Media downloads and exports
    Download,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::List,
        Category::Metadata,
        Category::Upload,
        Category::Download,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::List => "list",
            Category::Metadata => "metadata",
            Category::Upload => "upload",
            Category::Download => "download",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TokenBucket
// ============================================================================

#[derive(Debug)]
struct BucketState {
    /// Fractional for smooth refill
    tokens: f64,
    last_refill: Instant,
    /// Capacity after throttle adjustments
    effective_capacity: u32,
    /// Successes since the last throttle or recovery step
    successes: u64,
}

/// Token bucket for one category
///
/// The bucket starts full. All state sits behind one mutex so refill,
/// acquisition and capacity changes are observed atomically.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    /// Tokens added per second
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of tokens (at least 1)
    /// * `refill_rate` - Tokens added per second
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
                effective_capacity: capacity,
                successes: 0,
            }),
        }
    }

    /// Bucket refilled at `per_minute / 60` tokens per second
    pub fn per_minute(per_minute: u32) -> Self {
        Self::new(per_minute, f64::from(per_minute) / 60.0)
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.refill_rate)
                .min(f64::from(state.effective_capacity));
            state.last_refill = now;
        }
    }

    /// Takes one token if available
    pub fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until the next token is available (zero if one is ready)
    pub fn time_until_available(&self) -> Duration {
        let mut state = self.lock();
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            Duration::ZERO
        } else if self.refill_rate > 0.0 {
            Duration::from_secs_f64((1.0 - state.tokens) / self.refill_rate)
        } else {
            Duration::MAX
        }
    }

    pub fn available_tokens(&self) -> f64 {
        let mut state = self.lock();
        self.refill(&mut state);
        state.tokens
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn effective_capacity(&self) -> u32 {
        self.lock().effective_capacity
    }

    /// Records a success; every 100th raises capacity by 5 % (at least 1)
    pub fn on_success(&self) {
        let mut state = self.lock();
        state.successes += 1;
        if state.successes % RECOVERY_INTERVAL == 0 && state.effective_capacity < self.capacity {
            let old = state.effective_capacity;
            let increase = ((f64::from(old) * 0.05) as u32).max(1);
            state.effective_capacity = (old + increase).min(self.capacity);
            debug!(
                old_capacity = old,
                new_capacity = state.effective_capacity,
                "Recovering bucket capacity"
            );
        }
    }

    /// Records a throttle signal: halves capacity (minimum 1) and resets
    /// the success count
    pub fn on_throttle(&self) {
        let mut state = self.lock();
        let old = state.effective_capacity;
        state.effective_capacity = (old / 2).max(1);
        state.tokens = state.tokens.min(f64::from(state.effective_capacity));
        state.successes = 0;
        warn!(
            old_capacity = old,
            new_capacity = state.effective_capacity,
            "Throttled, halving bucket capacity"
        );
    }
}

// ============================================================================
// RateLimitConfig
// ============================================================================

/// Per-category request budgets and the retry limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests per minute for each category
    pub per_minute: HashMap<Category, u32>,
    /// Retries of a throttled or failed request before giving up
    pub max_retries: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::from(&RateLimitingConfig::default())
    }
}

impl From<&RateLimitingConfig> for RateLimitConfig {
    fn from(config: &RateLimitingConfig) -> Self {
        let per_minute = HashMap::from([
            (Category::List, config.list_requests_per_minute),
            (Category::Metadata, config.metadata_requests_per_minute),
            (Category::Upload, config.upload_requests_per_minute),
            (Category::Download, config.download_requests_per_minute),
        ]);
        Self {
            per_minute,
            max_retries: config.max_retries,
        }
    }
}

// ============================================================================
// AdaptiveRateLimiter
// ============================================================================

/// One token bucket per [`Category`], shared by every request of a client
///
/// Thread-safe and designed to be shared via `Arc<AdaptiveRateLimiter>`.
#[derive(Debug)]
pub struct AdaptiveRateLimiter {
    buckets: HashMap<Category, TokenBucket>,
    max_retries: u32,
}

impl AdaptiveRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let buckets = Category::ALL
            .into_iter()
            .map(|category| {
                let rate = config.per_minute.get(&category).copied().unwrap_or(60);
                (category, TokenBucket::per_minute(rate))
            })
            .collect();
        Self {
            buckets,
            max_retries: config.max_retries,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn bucket(&self, category: Category) -> Option<&TokenBucket> {
        self.buckets.get(&category)
    }

    /// Waits until a token for `category` is available and takes it
    pub async fn acquire(&self, category: Category) {
        let Some(bucket) = self.bucket(category) else {
            return;
        };
        loop {
            if bucket.try_acquire() {
                return;
            }
            let wait = bucket
                .time_until_available()
                .clamp(Duration::from_millis(10), MAX_BACKOFF);
            debug!(%category, wait_ms = wait.as_millis(), "Waiting for rate limit token");
            tokio::time::sleep(wait).await;
        }
    }

    pub fn on_success(&self, category: Category) {
        if let Some(bucket) = self.bucket(category) {
            bucket.on_success();
        }
    }

    pub fn on_throttle(&self, category: Category) {
        info!(%category, "Recording throttle event");
        if let Some(bucket) = self.bucket(category) {
            bucket.on_throttle();
        }
    }

    pub fn effective_capacity(&self, category: Category) -> Option<u32> {
        self.bucket(category).map(TokenBucket::effective_capacity)
    }

    pub fn available_tokens(&self, category: Category) -> Option<f64> {
        self.bucket(category).map(TokenBucket::available_tokens)
    }
}

// ============================================================================
// Retry delays
// ============================================================================

/// Exponential backoff for retry `attempt` (0-based): 1 s, 2 s, 4 s, ...
/// capped at 64 s
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(6)).min(MAX_BACKOFF)
}

/// Parses a `Retry-After` header value
///
/// Accepts delta-seconds (`"30"`) or an HTTP date, which is turned into a
/// delay from now. Dates in the past or more than an hour away, and
/// anything unparsable, yield `default`.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let delay = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        if let Some(secs) = u64::try_from(delay.num_seconds())
            .ok()
            .filter(|&s| s > 0 && s <= MAX_RETRY_AFTER_SECS)
        {
            return Duration::from_secs(secs);
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}
