use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::token_bucket::TokenBucket;

pub const ADAPTATION_INTERVAL: Duration = Duration::from_secs(5);

const DEFAULT_TASK_CEILING: usize = 10_000;

/// Global admission limiter whose refill rate tracks observed load. A
/// supervisor task periodically estimates a load scalar in `[0, 1]` from the
/// number of alive Tokio tasks and steers the bucket's refill rate between
/// `min_rate` and `max_rate`.
pub struct AdaptiveRateLimiter {
    bucket: TokenBucket,
    max_rate: f64,
    min_rate: f64,
    load_threshold: f64,
    task_ceiling: usize,
    current_rate: Mutex<f64>,
    current_load: Mutex<f64>,
    requests: AtomicU64,
    successes: AtomicU64,
    rejections: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct RateLimiterMetrics {
    pub current_rate: f64,
    pub max_rate: f64,
    pub min_rate: f64,
    pub current_load: f64,
    pub load_threshold: f64,
    pub requests: u64,
    pub successes: u64,
    pub rejections: u64,
    pub available_tokens: f64,
}

impl AdaptiveRateLimiter {
    pub fn new(max_tokens: f64, max_rate: f64, min_rate: f64, load_threshold: f64) -> Self {
        Self {
            bucket: TokenBucket::new(max_tokens, max_rate),
            max_rate,
            min_rate,
            load_threshold,
            task_ceiling: DEFAULT_TASK_CEILING,
            current_rate: Mutex::new(max_rate),
            current_load: Mutex::new(0.0),
            requests: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    pub fn allow(&self) -> bool {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let allowed = self.bucket.allow();

        if allowed {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejections.fetch_add(1, Ordering::Relaxed);
        }

        allowed
    }

    /// One adaptation step: sample the load proxy and steer the refill rate.
    pub fn adapt(&self) {
        let load = self.measure_load();
        self.apply_load(load);
    }

    fn measure_load(&self) -> f64 {
        let alive = tokio::runtime::Handle::try_current()
            .map(|handle| handle.metrics().num_alive_tasks())
            .unwrap_or(0);
        (alive as f64 / self.task_ceiling as f64).clamp(0.0, 1.0)
    }

    fn apply_load(&self, load: f64) {
        let span = self.max_rate - self.min_rate;

        let new_rate = if load > self.load_threshold {
            let factor =
                ((load - self.load_threshold) / (1.0 - self.load_threshold)).clamp(0.0, 1.0);
            self.max_rate - span * factor
        } else {
            let factor = load / self.load_threshold;
            self.min_rate + span * (1.0 - factor)
        };

        self.bucket.set_refill_rate(new_rate);
        *self.current_rate.lock().expect("lock poisoned") = new_rate;
        *self.current_load.lock().expect("lock poisoned") = load;

        debug!(load, rate = new_rate, "adaptive rate limiter adjusted");
    }

    pub fn metrics(&self) -> RateLimiterMetrics {
        RateLimiterMetrics {
            current_rate: *self.current_rate.lock().expect("lock poisoned"),
            max_rate: self.max_rate,
            min_rate: self.min_rate,
            current_load: *self.current_load.lock().expect("lock poisoned"),
            load_threshold: self.load_threshold,
            requests: self.requests.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            available_tokens: self.bucket.available(),
        }
    }

    pub fn reset(&self) {
        self.bucket.reset();
        self.bucket.set_refill_rate(self.max_rate);
        *self.current_rate.lock().expect("lock poisoned") = self.max_rate;
        self.requests.store(0, Ordering::Relaxed);
        self.successes.store(0, Ordering::Relaxed);
        self.rejections.store(0, Ordering::Relaxed);
    }

    pub fn spawn_supervisor(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let limiter = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ADAPTATION_INTERVAL);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => limiter.adapt(),
                }
            }

            info!("adaptive rate supervisor stopped");
        })
    }
}
