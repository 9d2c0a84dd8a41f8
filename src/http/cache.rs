//! Short-lived response cache for outbound API calls.
//!
//! Entries are keyed by URL and the credentials used, so two callers with
//! different tokens never share a response. Expired entries are purged lazily
//! at the start of every lookup; there is no background timer.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::transport::{HttpError, Response, Transport};

/// Lifespan for ordinary lookups: long enough to cover one request's worth of
/// repeated lookups.
pub const DEFAULT_LIFESPAN: Duration = Duration::from_secs(5);

/// Lifespan for data that does not change once produced (build artifacts,
/// trees).
pub const LONG_LIFESPAN: Duration = Duration::from_secs(5 * 60);

/// Maximum number of live entries before the soonest-expiring one is evicted.
const DEFAULT_CAPACITY: usize = 1024;

/// Source of the current time, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Monotonic wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    url: String,
    identity: Option<String>,
}

struct CacheEntry {
    response: Arc<Response>,
    expires_at: Instant,
}

/// TTL memoization of GET requests.
pub struct ResponseCache {
    entries: DashMap<CacheKey, CacheEntry>,
    transport: Box<dyn Transport>,
    clock: Arc<dyn Clock>,
    capacity: usize,
    logged_base: Option<String>,
}

impl ResponseCache {
    /// Create a cache over `transport` using the system clock.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            entries: DashMap::new(),
            transport: Box::new(transport),
            clock: Arc::new(SystemClock),
            capacity: DEFAULT_CAPACITY,
            logged_base: None,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[cfg(test)]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Log every network call whose URL starts with `base`.
    ///
    /// Used for the hosting API so rate-limit consumption shows up in logs.
    pub fn with_logged_base(mut self, base: impl Into<String>) -> Self {
        self.logged_base = Some(base.into());
        self
    }

    /// Number of entries currently stored, live or not.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Fetch `url`, reusing a live cached response for the same credentials.
    ///
    /// Only transport failures are errors; HTTP error statuses are returned
    /// as responses for the caller to interpret.
    pub fn get(
        &self,
        url: &str,
        token: Option<&str>,
        lifespan: Duration,
    ) -> Result<Arc<Response>, HttpError> {
        let now = self.clock.now();
        self.entries.retain(|_, entry| entry.expires_at > now);

        let key = CacheKey {
            url: url.to_string(),
            identity: token.map(str::to_string),
        };

        if let Some(entry) = self.entries.get(&key) {
            log::debug!("Cache hit for {}", url);
            return Ok(Arc::clone(&entry.response));
        }

        if self
            .logged_base
            .as_deref()
            .is_some_and(|base| url.starts_with(base))
        {
            log::info!("GitHub API request: {}", url);
        }

        let response = Arc::new(self.transport.get(url, token)?);

        self.evict_if_full();
        self.entries.insert(
            key,
            CacheEntry {
                response: Arc::clone(&response),
                expires_at: self.clock.now() + lifespan,
            },
        );

        Ok(response)
    }

    fn evict_if_full(&self) {
        while self.entries.len() >= self.capacity {
            let soonest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.expires_at)
                .map(|entry| entry.key().clone());

            match soonest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}
