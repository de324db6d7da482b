//! Bounded-wait location capture.
//!
//! Submitting a report must never hang on GPS. [`LocationCapturer::capture`]
//! waits at most [`CapturePolicy::timeout`] for a fresh fix, then falls back to
//! the provider's last known fix if it is recent enough, and otherwise gives
//! up. Fallback and low-accuracy fixes are flagged as degraded.

use crate::{Coordinate, GeoPoint};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fixmyarea_core::clock::{Clock, SystemClock};
use fixmyarea_core::config::LocationConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A single reading from a location provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    /// Reported position
    pub coordinate: Coordinate,
    /// Horizontal accuracy radius in meters
    pub accuracy_m: f64,
    /// When the reading was taken
    pub captured_at: DateTime<Utc>,
}

/// Platform location source (GPS, network, fused provider, ...)
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Request a fresh fix. May take arbitrarily long; callers bound it.
    async fn current_fix(&self) -> Option<LocationFix>;

    /// Most recent cached fix, without waiting
    fn last_known_fix(&self) -> Option<LocationFix> {
        None
    }
}

/// How long to wait and what to accept
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapturePolicy {
    /// Longest wait for a fresh fix
    pub timeout: Duration,
    /// Oldest last-known fix accepted as a fallback
    pub max_fix_age: Duration,
    /// Fixes with a larger accuracy radius are flagged as degraded
    pub degraded_accuracy_m: f64,
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self::from(&LocationConfig::default())
    }
}

impl From<&LocationConfig> for CapturePolicy {
    fn from(config: &LocationConfig) -> Self {
        Self {
            timeout: config.timeout,
            max_fix_age: config.max_fix_age,
            degraded_accuracy_m: config.degraded_accuracy_m,
        }
    }
}

/// Result of a capture attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureOutcome {
    /// Fresh fix obtained within the timeout
    Fresh(GeoPoint),
    /// Recent last-known fix used instead; always degraded
    Fallback(GeoPoint),
    /// Nothing usable
    Unavailable,
}

impl CaptureOutcome {
    /// The captured point, if any
    pub fn point(self) -> Option<GeoPoint> {
        match self {
            Self::Fresh(p) | Self::Fallback(p) => Some(p),
            Self::Unavailable => None,
        }
    }
}

/// Wraps a [`LocationProvider`] with the capture policy
pub struct LocationCapturer {
    provider: Arc<dyn LocationProvider>,
    policy: CapturePolicy,
    clock: Arc<dyn Clock>,
}

impl LocationCapturer {
    /// Create a capturer using the system clock
    pub fn new(provider: Arc<dyn LocationProvider>, policy: CapturePolicy) -> Self {
        Self::with_clock(provider, policy, Arc::new(SystemClock))
    }

    /// Create a capturer with an explicit clock (used to age fallback fixes)
    pub fn with_clock(
        provider: Arc<dyn LocationProvider>,
        policy: CapturePolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            policy,
            clock,
        }
    }

    /// Capture a location, waiting no longer than the policy timeout
    pub async fn capture(&self) -> CaptureOutcome {
        match tokio::time::timeout(self.policy.timeout, self.provider.current_fix()).await {
            Ok(Some(fix)) if fix.coordinate.is_valid() => {
                let degraded = fix.accuracy_m > self.policy.degraded_accuracy_m;
                debug!(accuracy_m = fix.accuracy_m, degraded, "Fresh location fix");
                return CaptureOutcome::Fresh(GeoPoint {
                    coordinate: fix.coordinate,
                    accuracy_m: Some(fix.accuracy_m),
                    degraded,
                });
            }
            Ok(Some(fix)) => {
                warn!(
                    latitude = fix.coordinate.latitude,
                    longitude = fix.coordinate.longitude,
                    "Provider returned an out-of-range fix"
                );
            }
            Ok(None) => debug!("Provider has no fix"),
            Err(_) => debug!(
                timeout_ms = self.policy.timeout.as_millis(),
                "Timed out waiting for a location fix"
            ),
        }

        self.fallback()
    }

    fn fallback(&self) -> CaptureOutcome {
        let Some(fix) = self.provider.last_known_fix() else {
            return CaptureOutcome::Unavailable;
        };
        if !fix.coordinate.is_valid() {
            return CaptureOutcome::Unavailable;
        }

        let age = (self.clock.now() - fix.captured_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if age > self.policy.max_fix_age {
            debug!(age_secs = age.as_secs(), "Last known fix is too old");
            return CaptureOutcome::Unavailable;
        }

        CaptureOutcome::Fallback(GeoPoint {
            coordinate: fix.coordinate,
            accuracy_m: Some(fix.accuracy_m),
            degraded: true,
        })
    }
}

/// Provider with a fixed answer: manual entry, map picker, or tests
#[derive(Debug, Clone, Default)]
pub struct StaticLocationProvider {
    current: Option<LocationFix>,
    last_known: Option<LocationFix>,
    delay: Duration,
}

impl StaticLocationProvider {
    /// Always answers with `fix`
    pub fn new(fix: Option<LocationFix>) -> Self {
        Self {
            current: fix,
            last_known: None,
            delay: Duration::ZERO,
        }
    }

    /// Cached fix returned by `last_known_fix`
    #[must_use]
    pub fn with_last_known(mut self, fix: LocationFix) -> Self {
        self.last_known = Some(fix);
        self
    }

    /// Simulated time to first fix
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl LocationProvider for StaticLocationProvider {
    async fn current_fix(&self) -> Option<LocationFix> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.current
    }

    fn last_known_fix(&self) -> Option<LocationFix> {
        self.last_known
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixmyarea_core::clock::ManualClock;
    use std::time::Instant;

    fn fix(accuracy_m: f64, captured_at: DateTime<Utc>) -> LocationFix {
        LocationFix {
            coordinate: Coordinate::new(23.8103, 90.4125),
            accuracy_m,
            captured_at,
        }
    }

    fn policy() -> CapturePolicy {
        CapturePolicy {
            timeout: Duration::from_millis(50),
            max_fix_age: Duration::from_secs(300),
            degraded_accuracy_m: 100.0,
        }
    }

    fn capturer(provider: StaticLocationProvider, clock: Arc<ManualClock>) -> LocationCapturer {
        LocationCapturer::with_clock(Arc::new(provider), policy(), clock)
    }

    #[tokio::test]
    async fn test_fresh_fix() {
        let clock = Arc::new(ManualClock::starting_now());
        let provider = StaticLocationProvider::new(Some(fix(8.0, clock.now())));

        let outcome = capturer(provider, clock).capture().await;

        let CaptureOutcome::Fresh(point) = outcome else {
            panic!("expected fresh fix, got {outcome:?}");
        };
        assert_eq!(point.accuracy_m, Some(8.0));
        assert!(!point.degraded);
    }

    #[tokio::test]
    async fn test_inaccurate_fix_is_degraded() {
        let clock = Arc::new(ManualClock::starting_now());
        let provider = StaticLocationProvider::new(Some(fix(450.0, clock.now())));

        let point = capturer(provider, clock).capture().await.point().unwrap();
        assert!(point.degraded);
    }

    #[tokio::test]
    async fn test_slow_provider_falls_back_within_bound() {
        let clock = Arc::new(ManualClock::starting_now());
        let provider = StaticLocationProvider::new(Some(fix(5.0, clock.now())))
            .with_delay(Duration::from_secs(10))
            .with_last_known(fix(20.0, clock.now()));

        let started = Instant::now();
        let outcome = capturer(provider, clock).capture().await;

        assert!(started.elapsed() < Duration::from_secs(2));
        let CaptureOutcome::Fallback(point) = outcome else {
            panic!("expected fallback, got {outcome:?}");
        };
        assert!(point.degraded);
    }

    #[tokio::test]
    async fn test_stale_last_known_is_unavailable() {
        let clock = Arc::new(ManualClock::starting_now());
        let provider = StaticLocationProvider::new(None).with_last_known(fix(20.0, clock.now()));
        clock.advance(Duration::from_secs(301));

        let outcome = capturer(provider, clock).capture().await;
        assert_eq!(outcome, CaptureOutcome::Unavailable);
        assert_eq!(outcome.point(), None);
    }

    #[tokio::test]
    async fn test_out_of_range_fix_is_ignored() {
        let clock = Arc::new(ManualClock::starting_now());
        let mut bad = fix(5.0, clock.now());
        bad.coordinate = Coordinate::new(123.0, 0.0);

        let outcome = capturer(StaticLocationProvider::new(Some(bad)), clock)
            .capture()
            .await;
        assert_eq!(outcome, CaptureOutcome::Unavailable);
    }
}
