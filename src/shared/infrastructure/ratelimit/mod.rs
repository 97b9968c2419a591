pub mod adaptive;
pub mod keyed;
pub mod token_bucket;

pub use adaptive::{AdaptiveRateLimiter, RateLimiterMetrics, ADAPTATION_INTERVAL};
pub use keyed::{KeyedLimit, KeyedRateLimiter, SWEEP_INTERVAL};
pub use token_bucket::TokenBucket;
