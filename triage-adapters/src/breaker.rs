//! Circuit breaker protecting callers from a failing source
//!
//! State machine:
//! closed --(failures reach threshold)--> open
//! open --(cooldown elapses, next call)--> half-open
//! half-open --(successes reach threshold)--> closed
//! half-open --(any failure)--> open with a fresh cooldown
//!
//! Rejections while open do not consume the registry's retry budget and
//! do not contact the source. Timeouts count as failures.

use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use triage_core::SourceError;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(v: u8) -> Self {
        match v {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }
}

/// Configuration for the circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in closed state before tripping.
    pub failure_threshold: u32,
    /// How long open lasts before a probe is allowed.
    pub cooldown: Duration,
    /// Concurrent probes permitted while half-open.
    pub half_open_probes: u32,
    /// Consecutive successes in half-open required to close.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            half_open_probes: 1,
            success_threshold: 2,
        }
    }
}

/// Outcome of a guarded call, flagged when it came from a fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct Guarded<T> {
    pub value: T,
    pub degraded: bool,
}

/// One circuit breaker per source. Transitions are atomic; counters are
/// updated under short critical sections only for the opened-at stamp.
pub struct CircuitBreaker {
    source: String,
    state: AtomicU8,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    probe_count: AtomicU32,
    opened_at: RwLock<Option<Instant>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(source: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            source: source.into(),
            state: AtomicU8::new(CircuitState::Closed as u8),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            probe_count: AtomicU32::new(0),
            opened_at: RwLock::new(None),
            config,
        }
    }

    pub fn with_defaults(source: impl Into<String>) -> Self {
        Self::new(source, CircuitBreakerConfig::default())
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether a call may proceed. Transitions open -> half-open when the
    /// cooldown has elapsed, and enforces the half-open probe budget.
    pub fn try_acquire(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled = self
                    .opened_at
                    .read()
                    .ok()
                    .and_then(|guard| *guard)
                    .map(|at| at.elapsed() >= self.config.cooldown)
                    .unwrap_or(false);
                if !cooled {
                    return false;
                }
                self.state
                    .store(CircuitState::HalfOpen as u8, Ordering::SeqCst);
                self.success_count.store(0, Ordering::SeqCst);
                self.probe_count.store(1, Ordering::SeqCst);
                true
            }
            CircuitState::HalfOpen => {
                let probes = self.probe_count.fetch_add(1, Ordering::SeqCst) + 1;
                if probes > self.config.half_open_probes {
                    self.probe_count.fetch_sub(1, Ordering::SeqCst);
                    false
                } else {
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                self.probe_count
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |p| {
                        Some(p.saturating_sub(1))
                    })
                    .ok();
                let successes = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.config.success_threshold {
                    self.state
                        .store(CircuitState::Closed as u8, Ordering::SeqCst);
                    self.failure_count.store(0, Ordering::SeqCst);
                    self.success_count.store(0, Ordering::SeqCst);
                    self.probe_count.store(0, Ordering::SeqCst);
                    tracing::info!(source = %self.source, "circuit closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.config.failure_threshold {
                    self.trip();
                }
            }
            CircuitState::HalfOpen => {
                // Any failure while probing re-opens with a fresh cooldown.
                self.trip();
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&self) {
        self.state.store(CircuitState::Open as u8, Ordering::SeqCst);
        self.success_count.store(0, Ordering::SeqCst);
        self.probe_count.store(0, Ordering::SeqCst);
        if let Ok(mut guard) = self.opened_at.write() {
            *guard = Some(Instant::now());
        }
        tracing::warn!(source = %self.source, "circuit opened");
    }

    /// Force-close and clear all counters.
    pub fn reset(&self) {
        self.state
            .store(CircuitState::Closed as u8, Ordering::SeqCst);
        self.failure_count.store(0, Ordering::SeqCst);
        self.success_count.store(0, Ordering::SeqCst);
        self.probe_count.store(0, Ordering::SeqCst);
        if let Ok(mut guard) = self.opened_at.write() {
            *guard = None;
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::SeqCst)
    }

    /// Run an operation under the breaker.
    ///
    /// On rejection, a caller-supplied fallback turns the rejection into a
    /// degraded success; without one the caller sees `circuit-open`.
    pub async fn guard<T, Fut>(
        &self,
        operation: Fut,
        fallback: Option<&(dyn Fn() -> T + Send + Sync)>,
    ) -> Result<Guarded<T>, SourceError>
    where
        Fut: Future<Output = Result<T, SourceError>>,
    {
        if !self.try_acquire() {
            return match fallback {
                Some(f) => Ok(Guarded {
                    value: f(),
                    degraded: true,
                }),
                None => Err(SourceError::CircuitOpen {
                    source_name: self.source.clone(),
                }),
            };
        }

        match operation.await {
            Ok(value) => {
                self.record_success();
                Ok(Guarded {
                    value,
                    degraded: false,
                })
            }
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("source", &self.source)
            .field("state", &self.state())
            .field("failure_count", &self.failure_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            cooldown: Duration::from_millis(50),
            half_open_probes: 1,
            success_threshold: 2,
        }
    }

    fn failing() -> Result<(), SourceError> {
        Err(SourceError::Unavailable {
            source_name: "s".into(),
            reason: "down".into(),
        })
    }

    #[test]
    fn test_trips_at_failure_threshold() {
        let breaker = CircuitBreaker::new("s", fast_config());
        for _ in 0..2 {
            assert!(breaker.try_acquire());
            breaker.record_failure();
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        assert!(breaker.try_acquire());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn test_success_resets_closed_counter() {
        let breaker = CircuitBreaker::new("s", fast_config());
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_cooldown_then_closes() {
        let breaker = CircuitBreaker::new("s", fast_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(60));
        assert!(breaker.try_acquire());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        assert!(breaker.try_acquire());
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("s", fast_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(breaker.try_acquire());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        // Fresh cooldown: still rejecting immediately after.
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn test_half_open_probe_budget() {
        let breaker = CircuitBreaker::new("s", fast_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(breaker.try_acquire());
        // Budget of one probe: a second concurrent call is rejected.
        assert!(!breaker.try_acquire());
    }

    #[tokio::test]
    async fn test_guard_rejects_when_open() {
        let breaker = CircuitBreaker::new("s", fast_config());
        for _ in 0..3 {
            breaker.record_failure();
        }

        let result = breaker
            .guard(async { failing() }, None::<&(dyn Fn() -> () + Send + Sync)>)
            .await;
        assert!(matches!(result, Err(SourceError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn test_guard_fallback_is_degraded_success() {
        let breaker = CircuitBreaker::new("s", fast_config());
        for _ in 0..3 {
            breaker.record_failure();
        }

        let fallback = || 42usize;
        let result = breaker
            .guard(
                async { Ok::<usize, SourceError>(1) },
                Some(&fallback as &(dyn Fn() -> usize + Send + Sync)),
            )
            .await
            .unwrap();
        assert!(result.degraded);
        assert_eq!(result.value, 42);
        // Rejection did not touch breaker state.
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_guard_records_outcomes() {
        let breaker = CircuitBreaker::new("s", fast_config());
        let err = breaker
            .guard(async { failing() }, None::<&(dyn Fn() -> () + Send + Sync)>)
            .await;
        assert!(err.is_err());
        assert_eq!(breaker.failure_count(), 1);

        let ok = breaker
            .guard(
                async { Ok::<(), SourceError>(()) },
                None::<&(dyn Fn() -> () + Send + Sync)>,
            )
            .await
            .unwrap();
        assert!(!ok.degraded);
        assert_eq!(breaker.failure_count(), 0);
    }

    proptest::proptest! {
        /// Whatever the event sequence, the state machine only makes legal
        /// transitions and the failure counter never exceeds the threshold
        /// while closed.
        #[test]
        fn prop_transitions_are_legal(events in proptest::collection::vec(0u8..3, 1..64)) {
            let breaker = CircuitBreaker::new("s", CircuitBreakerConfig {
                failure_threshold: 3,
                cooldown: Duration::from_secs(600),
                half_open_probes: 1,
                success_threshold: 2,
            });
            let mut prev = breaker.state();
            for event in events {
                match event {
                    0 => { breaker.try_acquire(); }
                    1 => breaker.record_success(),
                    _ => breaker.record_failure(),
                }
                let next = breaker.state();
                let legal = matches!(
                    (prev, next),
                    (CircuitState::Closed, CircuitState::Closed)
                        | (CircuitState::Closed, CircuitState::Open)
                        | (CircuitState::Open, CircuitState::Open)
                        | (CircuitState::Open, CircuitState::HalfOpen)
                        | (CircuitState::HalfOpen, CircuitState::HalfOpen)
                        | (CircuitState::HalfOpen, CircuitState::Open)
                        | (CircuitState::HalfOpen, CircuitState::Closed)
                );
                proptest::prop_assert!(legal, "illegal transition {:?} -> {:?}", prev, next);
                if next == CircuitState::Closed {
                    proptest::prop_assert!(breaker.failure_count() < 3);
                }
                prev = next;
            }
        }
    }
}
