//! Circuit breaker (C4): a per-service rolling-window failure gate.
//!
//! States: `Closed` (normal), `Open` (fast-fail), `HalfOpen` (single probe
//! admitted after cooldown). A [`Manager`] owns breakers by service name
//! behind a single lock, mirroring the teacher crate's preference for
//! name-keyed ownership over shared mutable pointers (see `DESIGN.md`).

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::error::{Error, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Closed => "closed",
            State::Open => "open",
            State::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout: Duration,
    pub window_size: usize,
    pub min_requests: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
            window_size: 10,
            min_requests: 5,
        }
    }
}

/// Snapshot of a breaker's counters, safe to hand out by value.
#[derive(Debug, Clone)]
pub struct Stats {
    pub state: State,
    pub failures: u32,
    pub successes: u32,
    pub requests: u32,
    pub last_failure_time: Option<Instant>,
    /// The rolling window itself, oldest outcome first (`true` = success).
    pub window: Vec<bool>,
}

struct Inner {
    state: State,
    window: VecDeque<bool>,
    failures_in_window: u32,
    successes_in_window: u32,
    requests: u32,
    consecutive_successes: u32,
    last_failure_time: Option<Instant>,
}

impl Inner {
    fn new(window_size: usize) -> Self {
        Self {
            state: State::Closed,
            window: VecDeque::with_capacity(window_size),
            failures_in_window: 0,
            successes_in_window: 0,
            requests: 0,
            consecutive_successes: 0,
            last_failure_time: None,
        }
    }

    fn record(&mut self, window_size: usize, success: bool) {
        if self.window.len() == window_size {
            if let Some(evicted) = self.window.pop_front() {
                if evicted {
                    self.successes_in_window -= 1;
                } else {
                    self.failures_in_window -= 1;
                }
            }
        }
        self.window.push_back(success);
        if success {
            self.successes_in_window += 1;
        } else {
            self.failures_in_window += 1;
        }
        self.requests += 1;
    }

    fn reset_window(&mut self) {
        self.window.clear();
        self.failures_in_window = 0;
        self.successes_in_window = 0;
        self.requests = 0;
        self.consecutive_successes = 0;
    }
}

/// A single service's circuit breaker. Cheap to clone (wraps `Arc`s
/// internally via the owning [`Manager`]); state mutation happens under a
/// short `Mutex` critical section per the concurrency model's "non-blocking
/// transitions" requirement.
pub struct CircuitBreaker {
    config: Config,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Mutex::new(Inner::new(config.window_size)),
            config,
        }
    }

    pub fn state(&self) -> State {
        self.inner.lock().unwrap().state
    }

    pub fn stats(&self) -> Stats {
        let inner = self.inner.lock().unwrap();
        Stats {
            state: inner.state,
            failures: inner.failures_in_window,
            successes: inner.successes_in_window,
            requests: inner.requests,
            last_failure_time: inner.last_failure_time,
            window: inner.window.iter().copied().collect(),
        }
    }

    /// Execute `f` through the breaker. Returns `CircuitOpen` without
    /// calling `f` while the breaker is tripped and the cooldown hasn't
    /// elapsed.
    pub async fn execute<F, Fut, T>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, Error>>,
    {
        if !self.admit() {
            return Err(Error::new(ErrorCode::CircuitOpen, "circuit breaker is open")
                .retryable_flag(false));
        }

        match f().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(err)
            }
        }
    }

    /// Run `fallback` whenever the primary call (including a CircuitOpen
    /// short-circuit) returns an error.
    pub async fn execute_with_fallback<F, Fut, FB, FbFut, T>(&self, f: F, fallback: FB) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, Error>>,
        FB: FnOnce(Error) -> FbFut,
        FbFut: std::future::Future<Output = Result<T, Error>>,
    {
        match self.execute(f).await {
            Ok(value) => Ok(value),
            Err(err) => fallback(err).await,
        }
    }

    /// Returns `true` if the call should proceed; performs the Open ->
    /// HalfOpen transition as a side effect when the cooldown has elapsed.
    fn admit(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::Closed | State::HalfOpen => true,
            State::Open => {
                let elapsed = inner
                    .last_failure_time
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.config.timeout {
                    inner.state = State::HalfOpen;
                    inner.consecutive_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.record(self.config.window_size, true);
        match inner.state {
            State::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = State::Closed;
                    inner.reset_window();
                }
            }
            State::Closed => {
                inner.consecutive_successes = 0;
            }
            State::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.record(self.config.window_size, false);
        inner.last_failure_time = Some(Instant::now());
        inner.consecutive_successes = 0;

        match inner.state {
            State::HalfOpen => {
                inner.state = State::Open;
            }
            State::Closed => {
                if inner.requests >= self.config.min_requests
                    && inner.failures_in_window >= self.config.failure_threshold
                {
                    inner.state = State::Open;
                }
            }
            State::Open => {}
        }
    }
}

/// Owns breakers by service name behind a single lock. `get_or_create` is
/// idempotent under concurrent access: a racing pair of callers for the
/// same name always converge on the same `Arc<CircuitBreaker>`.
#[derive(Default)]
pub struct Manager {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, name: &str, config: Config) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().unwrap().get(name) {
            return existing.clone();
        }
        let mut write = self.breakers.write().unwrap();
        write
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(config)))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().unwrap().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> Config {
        Config {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_millis(20),
            window_size: 10,
            min_requests: 1,
        }
    }

    #[tokio::test]
    async fn opens_after_failure_threshold_reached() {
        let breaker = CircuitBreaker::new(fast_config());
        for _ in 0..5 {
            let _ = breaker
                .execute(|| async { Err::<(), _>(Error::retryable(ErrorCode::Network, "down")) })
                .await;
        }
        assert_eq!(breaker.state(), State::Open);

        let called = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let called2 = called.clone();
        let result = breaker
            .execute(|| async move {
                called2.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<_, Error>(())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code, ErrorCode::CircuitOpen);
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn never_opens_before_min_requests() {
        let config = Config {
            min_requests: 10,
            failure_threshold: 1,
            ..fast_config()
        };
        let breaker = CircuitBreaker::new(config);
        for _ in 0..9 {
            let _ = breaker
                .execute(|| async { Err::<(), _>(Error::retryable(ErrorCode::Network, "down")) })
                .await;
            assert_eq!(breaker.state(), State::Closed);
        }
    }

    #[tokio::test]
    async fn half_open_after_timeout_then_closes_on_successes() {
        let breaker = CircuitBreaker::new(fast_config());
        for _ in 0..5 {
            let _ = breaker
                .execute(|| async { Err::<(), _>(Error::retryable(ErrorCode::Network, "down")) })
                .await;
        }
        assert_eq!(breaker.state(), State::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;

        let _ = breaker.execute(|| async { Ok::<_, Error>(()) }).await;
        assert_eq!(breaker.state(), State::HalfOpen);

        let _ = breaker.execute(|| async { Ok::<_, Error>(()) }).await;
        assert_eq!(breaker.state(), State::Closed);
    }

    #[tokio::test]
    async fn half_open_reopens_on_any_failure() {
        let breaker = CircuitBreaker::new(fast_config());
        for _ in 0..5 {
            let _ = breaker
                .execute(|| async { Err::<(), _>(Error::retryable(ErrorCode::Network, "down")) })
                .await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        let _ = breaker
            .execute(|| async { Err::<(), _>(Error::retryable(ErrorCode::Network, "still down")) })
            .await;
        assert_eq!(breaker.state(), State::Open);
    }

    #[test]
    fn stats_failures_plus_successes_never_exceeds_window() {
        let breaker = CircuitBreaker::new(Config {
            window_size: 3,
            min_requests: 1000,
            failure_threshold: 1000,
            ..fast_config()
        });
        for _ in 0..10 {
            breaker.on_success();
        }
        let stats = breaker.stats();
        assert_eq!(stats.failures + stats.successes, stats.requests.min(3));
        assert_eq!(stats.window.len(), 3);
        assert!(stats.window.iter().all(|&success| success));
    }

    #[test]
    fn stats_window_reflects_individual_outcomes_oldest_first() {
        let breaker = CircuitBreaker::new(Config {
            window_size: 3,
            min_requests: 1000,
            failure_threshold: 1000,
            ..fast_config()
        });
        breaker.on_success();
        breaker.on_failure();
        breaker.on_success();
        assert_eq!(breaker.stats().window, vec![true, false, true]);
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let manager = Manager::new();
        let a = manager.get_or_create("openai", Config::default());
        let b = manager.get_or_create("openai", Config::default());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_names_get_distinct_breakers() {
        let manager = Manager::new();
        let a = manager.get_or_create("openai", Config::default());
        let b = manager.get_or_create("gemini", Config::default());
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
