//! Backoff policy and circuit breaker
//!
//! Retries in the sync pipeline are durable: a failed attempt is written back
//! to the local store with a `next_retry_at` timestamp instead of sleeping in
//! a loop. This module therefore only answers "how long until the next try?"
//! and "should we try at all right now?":
//!
//! - [`RetryConfig`] computes exponential backoff with jitter as a pure
//!   function of the attempt number and a jitter sample
//! - [`CircuitBreaker`] short-circuits calls while a remote is failing
//!
//! # Example
//!
//! ```rust
//! use fixmyarea_core::retry::RetryConfig;
//! use std::time::Duration;
//!
//! let policy = RetryConfig::default();
//! // attempt 1, no jitter applied (sample = 0.0)
//! assert_eq!(policy.delay_for_attempt(1, 0.0), Duration::from_secs(2));
//! assert!(policy.is_exhausted(6));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Share of the base delay that jitter may add on top.
const JITTER_RATIO: f64 = 0.25;

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of processing attempts before a report is failed
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    #[serde(with = "crate::config::duration_millis", rename = "initial_delay_ms")]
    pub initial_delay: Duration,
    /// Upper bound for any single delay, jitter included
    #[serde(with = "crate::config::duration_millis", rename = "max_delay_ms")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Add random jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Short, deterministic delays for local development and tests
    pub fn quick() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    /// Delay to wait after `attempt` failed attempts.
    ///
    /// `sample` is a value in `[0, 1)`; it is ignored when jitter is disabled.
    /// The result never exceeds `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32, sample: f64) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX).min(64);
        let max_secs = self.max_delay.as_secs_f64();
        let base = (self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent))
            .min(max_secs);

        let delay = if self.jitter {
            base * (1.0 + sample.clamp(0.0, 1.0) * JITTER_RATIO)
        } else {
            base
        };

        Duration::from_secs_f64(delay.min(max_secs).max(0.0))
    }

    /// Delay for `attempt` using a fresh jitter sample
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.delay_for_attempt(attempt, jitter_sample())
    }

    /// True once `attempts` processing attempts have been used up
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

/// Pseudo-random sample in `[0, 1)` for jitter.
///
/// `RandomState` is seeded per process, so this spreads retries of many
/// devices without pulling in a RNG crate.
pub fn jitter_sample() -> f64 {
    let mut hasher = RandomState::new().build_hasher();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    hasher.write_u128(nanos);
    (hasher.finish() % 10_000) as f64 / 10_000.0
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Successes in half-open needed to close the circuit
    pub success_threshold: u32,
    /// Time to stay open before probing again
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker guarding a remote endpoint
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get current state
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Check whether a call may go through, moving Open to HalfOpen once the
    /// reset timeout has elapsed
    pub fn can_execute(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map_or(Duration::MAX, |at| at.elapsed());
                if elapsed >= self.config.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.failures = 0;
        if inner.state == CircuitState::HalfOpen {
            inner.successes += 1;
            if inner.successes >= self.config.success_threshold {
                inner.state = CircuitState::Closed;
                inner.opened_at = None;
            }
        }
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failures += 1;
        let trip = match inner.state {
            CircuitState::Closed => inner.failures >= self.config.failure_threshold,
            // any failure while probing re-opens
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        if trip {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }
}
