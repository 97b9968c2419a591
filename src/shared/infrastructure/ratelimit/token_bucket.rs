use std::sync::Mutex;
use std::time::Instant;

/// Token bucket with continuous refill. Tokens accrue lazily: every
/// operation first credits `elapsed * refill_rate`, clamped to the
/// bucket's capacity, before touching the balance.
pub struct TokenBucket {
    inner: Mutex<Inner>,
}

struct Inner {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl Inner {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
    }
}

impl TokenBucket {
    pub fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tokens: max_tokens,
                max_tokens,
                refill_rate,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn allow(&self) -> bool {
        self.allow_n(1.0)
    }

    pub fn allow_n(&self, n: f64) -> bool {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.refill(Instant::now());

        if inner.tokens >= n {
            inner.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Reports the refilled balance without deducting anything.
    pub fn available(&self) -> f64 {
        let inner = self.inner.lock().expect("lock poisoned");
        let elapsed = inner.last_refill.elapsed().as_secs_f64();
        (inner.tokens + elapsed * inner.refill_rate).min(inner.max_tokens)
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.tokens = inner.max_tokens;
        inner.last_refill = Instant::now();
    }

    pub fn set_refill_rate(&self, refill_rate: f64) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.refill(Instant::now());
        inner.refill_rate = refill_rate;
    }

    pub fn max_tokens(&self) -> f64 {
        self.inner.lock().expect("lock poisoned").max_tokens
    }

    pub fn refill_rate(&self) -> f64 {
        self.inner.lock().expect("lock poisoned").refill_rate
    }
}
