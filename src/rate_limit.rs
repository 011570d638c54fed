use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

/// Checks between two sweeps of idle keys.
const SWEEP_EVERY: usize = 1024;

struct Bucket {
    hits: VecDeque<Instant>,
    window: Duration,
}

impl Bucket {
    fn expire(&mut self, now: Instant) {
        while let Some(front) = self.hits.front() {
            if now.duration_since(*front) >= self.window { self.hits.pop_front(); } else { break; }
        }
    }
}

/// Sliding window in-memory rate limiter (process local).
///
/// Keys whose window has fully elapsed are dropped every `SWEEP_EVERY` checks, so the map
/// only holds clients seen recently.
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, Bucket>>,
    checks: Arc<AtomicUsize>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { store: Arc::new(DashMap::new()), checks: Arc::new(AtomicUsize::new(0)), enabled }
    }

    /// Returns true if allowed, false if limited.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled { return true; }
        let now = Instant::now();
        let allowed = {
            let mut bucket = self
                .store
                .entry(key.to_string())
                .or_insert_with(|| Bucket { hits: VecDeque::new(), window });
            bucket.window = window;
            bucket.expire(now);
            if bucket.hits.len() < limit {
                bucket.hits.push_back(now);
                true
            } else {
                false
            }
        };
        // the entry guard is released above; retain locks every shard
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep();
        }
        allowed
    }

    /// Drops keys with no hit left inside their window.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.store.retain(|_, bucket| {
            bucket.expire(now);
            !bucket.hits.is_empty()
        });
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

/// Per-action limits, read from `RL_*` variables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub login_limit: usize,
    pub login_window: Duration,
    pub thread_limit: usize,
    pub thread_window: Duration,
    pub answer_limit: usize,
    pub answer_window: Duration,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let usize_var = |name: &str, default: usize| get(name).and_then(|v| v.parse().ok()).unwrap_or(default);
        let dur_var = |name: &str, default: u64| Duration::from_secs(get(name).and_then(|v| v.parse().ok()).unwrap_or(default));
        Self {
            enabled: get("RL_ENABLED").map(|v| v != "0" && !v.eq_ignore_ascii_case("false")).unwrap_or(true),
            login_limit: usize_var("RL_LOGIN_LIMIT", 10),
            login_window: dur_var("RL_LOGIN_WINDOW", 60),
            thread_limit: usize_var("RL_THREAD_LIMIT", 5),
            thread_window: dur_var("RL_THREAD_WINDOW", 60),
            answer_limit: usize_var("RL_ANSWER_LIMIT", 20),
            answer_window: dur_var("RL_ANSWER_WINDOW", 60),
        }
    }
}

/// High level guard used by handlers.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(cfg: RateLimitConfig) -> Self { Self { limiter: InMemoryRateLimiter::new(cfg.enabled), cfg } }
    pub fn from_env() -> Self { Self::new(RateLimitConfig::from_env()) }
    pub fn disabled() -> Self {
        let mut cfg = RateLimitConfig::from_lookup(|_| None);
        cfg.enabled = false;
        Self::new(cfg)
    }
    pub fn allow_login(&self, ip: &str) -> bool { self.limiter.check(&format!("login:{ip}"), self.cfg.login_limit, self.cfg.login_window) }
    pub fn allow_thread(&self, ip: &str) -> bool { self.limiter.check(&format!("thread:{ip}"), self.cfg.thread_limit, self.cfg.thread_window) }
    pub fn allow_answer(&self, ip: &str) -> bool { self.limiter.check(&format!("answer:{ip}"), self.cfg.answer_limit, self.cfg.answer_window) }
}
