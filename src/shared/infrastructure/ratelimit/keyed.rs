use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::token_bucket::TokenBucket;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Map of token buckets keyed by an arbitrary string (client IP,
/// `METHOD:PATH`). Buckets are created lazily with the default capacity and
/// rate; a periodic sweep evicts entries idle beyond `idle_window` so the
/// map stays bounded under large key cardinality.
pub struct KeyedRateLimiter {
    entries: RwLock<HashMap<String, Arc<Entry>>>,
    default_tokens: f64,
    default_rate: f64,
    idle_window: Duration,
}

struct Entry {
    bucket: TokenBucket,
    last_used: Mutex<Instant>,
}

impl Entry {
    fn new(max_tokens: f64, refill_rate: f64) -> Arc<Self> {
        Arc::new(Self {
            bucket: TokenBucket::new(max_tokens, refill_rate),
            last_used: Mutex::new(Instant::now()),
        })
    }

    fn touch(&self) {
        *self.last_used.lock().expect("lock poisoned") = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used.lock().expect("lock poisoned").elapsed()
    }
}

#[derive(Debug, Serialize)]
pub struct KeyedLimit {
    pub max_tokens: f64,
    pub refill_rate: f64,
    pub available: f64,
}

impl KeyedRateLimiter {
    pub fn new(default_tokens: f64, default_rate: f64, idle_window: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_tokens,
            default_rate,
            idle_window,
        }
    }

    pub fn allow(&self, key: &str) -> bool {
        let entry = self.entry(key);
        entry.touch();
        entry.bucket.allow()
    }

    fn entry(&self, key: &str) -> Arc<Entry> {
        if let Some(entry) = self.entries.read().expect("lock poisoned").get(key) {
            return Arc::clone(entry);
        }

        let mut entries = self.entries.write().expect("lock poisoned");
        Arc::clone(
            entries
                .entry(key.to_string())
                .or_insert_with(|| Entry::new(self.default_tokens, self.default_rate)),
        )
    }

    /// Installs an explicit (tokens, rate) override, replacing any bucket
    /// already tracked for the key. Takes effect on the next `allow`.
    pub fn set_limit(&self, key: &str, max_tokens: f64, refill_rate: f64) {
        let mut entries = self.entries.write().expect("lock poisoned");
        entries.insert(key.to_string(), Entry::new(max_tokens, refill_rate));
    }

    /// Drops entries idle beyond the configured window; returns the number
    /// evicted.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.write().expect("lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| entry.idle_for() <= self.idle_window);
        before - entries.len()
    }

    pub fn limits(&self) -> BTreeMap<String, KeyedLimit> {
        let entries = self.entries.read().expect("lock poisoned");
        entries
            .iter()
            .map(|(key, entry)| {
                (
                    key.clone(),
                    KeyedLimit {
                        max_tokens: entry.bucket.max_tokens(),
                        refill_rate: entry.bucket.refill_rate(),
                        available: entry.bucket.available(),
                    },
                )
            })
            .collect()
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let limiter = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            // The first tick of a tokio interval fires immediately; consume
            // it so a freshly started sweeper does not evict anything early.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = limiter.sweep();
                        if evicted > 0 {
                            debug!(evicted, "evicted idle rate-limit entries");
                        }
                    }
                }
            }

            info!("keyed rate limiter sweeper stopped");
        })
    }
}

#[cfg(test)]
mod keyed_limiter_tests {
    use super::*;

    #[test]
    fn it_should_create_buckets_lazily_per_key() {
        let limiter = KeyedRateLimiter::new(1.0, 0.0, Duration::from_secs(60));

        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.2"));
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn set_limit_takes_effect_on_the_next_call() {
        let limiter = KeyedRateLimiter::new(1.0, 0.0, Duration::from_secs(60));
        assert!(limiter.allow("GET:/api/v1/orders"));
        assert!(!limiter.allow("GET:/api/v1/orders"));

        limiter.set_limit("GET:/api/v1/orders", 3.0, 0.0);
        assert!(limiter.allow("GET:/api/v1/orders"));
        assert!(limiter.allow("GET:/api/v1/orders"));
        assert!(limiter.allow("GET:/api/v1/orders"));
        assert!(!limiter.allow("GET:/api/v1/orders"));
    }

    #[test]
    fn sweep_evicts_only_idle_entries() {
        let limiter = KeyedRateLimiter::new(5.0, 1.0, Duration::from_millis(20));
        limiter.allow("stale");
        std::thread::sleep(Duration::from_millis(40));
        limiter.allow("fresh");

        let evicted = limiter.sweep();
        assert_eq!(evicted, 1);
        assert_eq!(limiter.tracked_keys(), 1);
        assert!(limiter.limits().contains_key("fresh"));
    }

    #[test]
    fn limits_reports_configuration_per_key() {
        let limiter = KeyedRateLimiter::new(2.0, 1.0, Duration::from_secs(60));
        limiter.allow("a");
        limiter.set_limit("b", 9.0, 3.0);

        let limits = limiter.limits();
        assert_eq!(limits["a"].max_tokens, 2.0);
        assert_eq!(limits["b"].max_tokens, 9.0);
        assert_eq!(limits["b"].refill_rate, 3.0);
    }
}
