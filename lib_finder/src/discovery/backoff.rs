//! # Backoff State Machine
//!
//! Single source of truth for whether an upstream sweep may start.
//!
//! ## States:
//! - **`Idle`**: nothing running, no cooldown pending.
//! - **`InFlight`**: exactly one sweep is running.
//! - **`Cooldown(until)`**: no sweep may start before `until`.
//!
//! Cooldown expiry is lazy: a `Cooldown` whose deadline has passed reads as
//! `Idle`. There is no timer task.
//!
//! All transitions go through one `std::sync::Mutex` whose critical sections
//! only compare and assign a handful of words. Nothing awaits while holding it,
//! so readers are never stalled behind network latency.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Upper bound on any single cooldown window.
pub const MAX_COOLDOWN_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Observable fetch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    /// No sweep running and no cooldown active.
    Idle,
    /// A sweep is running.
    InFlight,
    /// New sweeps are refused until the deadline.
    Cooldown {
        /// Deadline of the cooldown window.
        until: Instant,
    },
}

/// How the last sweep ended, as far as backoff is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchVerdict {
    /// Pagination completed with at least one qualifying record.
    Success,
    /// The upstream throttled us.
    RateLimited,
    /// Network, protocol or timeout failure, or a preempted sweep.
    TransportError,
    /// Pagination completed without a single qualifying record.
    EmptyResult,
}

impl FetchVerdict {
    /// Whether this verdict earns the long cooldown window.
    pub fn uses_long_window(self) -> bool {
        matches!(self, FetchVerdict::Success | FetchVerdict::RateLimited)
    }
}

#[derive(Debug, Default)]
struct Inner {
    in_flight: bool,
    cooldown_until: Option<Instant>,
    last_verdict: Option<FetchVerdict>,
}

/// Gatekeeper for upstream sweeps.
#[derive(Debug)]
pub struct BackoffStateMachine {
    inner: Mutex<Inner>,
    long_window: Duration,
    short_window: Duration,
}

impl BackoffStateMachine {
    /// Creates the machine in `Idle`.
    pub fn new(long_window: Duration, short_window: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            long_window,
            short_window,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state as seen at `now`.
    pub fn state(&self, now: Instant) -> FetchState {
        let inner = self.lock();
        if inner.in_flight {
            return FetchState::InFlight;
        }
        match inner.cooldown_until {
            Some(until) if until > now => FetchState::Cooldown { until },
            _ => FetchState::Idle,
        }
    }

    /// Whether a sweep is running.
    pub fn is_in_flight(&self) -> bool {
        self.lock().in_flight
    }

    /// Atomic test-and-set of `InFlight`.
    ///
    /// Succeeds only from `Idle` or an expired `Cooldown`; among concurrent
    /// callers exactly one wins.
    pub fn try_claim(&self, now: Instant) -> bool {
        let mut inner = self.lock();
        if inner.in_flight {
            return false;
        }
        if inner.cooldown_until.is_some_and(|until| until > now) {
            return false;
        }
        inner.in_flight = true;
        true
    }

    /// Leaves `InFlight` and installs the cooldown matching `verdict`.
    ///
    /// A throttle hint longer than the long window extends it, up to
    /// [`MAX_COOLDOWN_WINDOW`]. An already pending later deadline is kept.
    /// Returns the resulting deadline.
    pub fn finish(
        &self,
        verdict: FetchVerdict,
        retry_after: Option<Duration>,
        now: Instant,
    ) -> Instant {
        let mut window = if verdict.uses_long_window() {
            self.long_window
        } else {
            self.short_window
        };
        if verdict == FetchVerdict::RateLimited {
            if let Some(hint) = retry_after {
                window = window.max(hint);
            }
        }

        let window = window.min(MAX_COOLDOWN_WINDOW);
        let candidate = now.checked_add(window).unwrap_or(now);

        let mut inner = self.lock();
        let until = inner
            .cooldown_until
            .map_or(candidate, |existing| existing.max(candidate));
        inner.in_flight = false;
        inner.cooldown_until = Some(until);
        inner.last_verdict = Some(verdict);
        until
    }

    /// Moves the cooldown deadline to the past so the next claim may succeed.
    pub fn clear_cooldown(&self) {
        self.lock().cooldown_until = None;
    }

    /// Lets an external actor push the cooldown out to `until`.
    ///
    /// Never shortens a pending deadline. A running sweep notices the new
    /// deadline before its next page and stops.
    pub fn impose_cooldown(&self, until: Instant) {
        let mut inner = self.lock();
        inner.cooldown_until = Some(inner.cooldown_until.map_or(until, |u| u.max(until)));
    }

    /// True while a sweep is running and somebody has set a future deadline
    /// since it was claimed.
    pub fn cooldown_imposed(&self, now: Instant) -> bool {
        let inner = self.lock();
        inner.in_flight && inner.cooldown_until.is_some_and(|until| until > now)
    }

    /// Time left before a new claim may succeed (zero when none).
    pub fn cooldown_remaining(&self, now: Instant) -> Duration {
        self.lock()
            .cooldown_until
            .map_or(Duration::ZERO, |until| until.saturating_duration_since(now))
    }

    /// Outcome of the most recent finished sweep.
    pub fn last_verdict(&self) -> Option<FetchVerdict> {
        self.lock().last_verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: Duration = Duration::from_secs(60);
    const SHORT: Duration = Duration::from_secs(10);

    fn machine() -> BackoffStateMachine {
        BackoffStateMachine::new(LONG, SHORT)
    }

    #[test]
    fn test_starts_idle_and_claims_once() {
        let m = machine();
        let now = Instant::now();
        assert_eq!(m.state(now), FetchState::Idle);
        assert!(m.try_claim(now));
        assert_eq!(m.state(now), FetchState::InFlight);
        assert!(!m.try_claim(now));
    }

    #[test]
    fn test_success_and_rate_limit_use_long_window() {
        for verdict in [FetchVerdict::Success, FetchVerdict::RateLimited] {
            let m = machine();
            let now = Instant::now();
            assert!(m.try_claim(now));
            let until = m.finish(verdict, None, now);
            assert_eq!(until, now + LONG);
            assert_eq!(m.state(now), FetchState::Cooldown { until });
            assert_eq!(m.last_verdict(), Some(verdict));
        }
    }

    #[test]
    fn test_transport_and_empty_use_short_window() {
        for verdict in [FetchVerdict::TransportError, FetchVerdict::EmptyResult] {
            let m = machine();
            let now = Instant::now();
            assert!(m.try_claim(now));
            assert_eq!(m.finish(verdict, None, now), now + SHORT);
        }
    }

    #[test]
    fn test_claim_refused_before_deadline_and_allowed_after() {
        let m = machine();
        let now = Instant::now();
        assert!(m.try_claim(now));
        let until = m.finish(FetchVerdict::Success, None, now);

        assert!(!m.try_claim(now + Duration::from_secs(1)));
        assert!(!m.try_claim(until - Duration::from_millis(1)));
        assert_eq!(m.state(until), FetchState::Idle);
        assert!(m.try_claim(until));
    }

    #[test]
    fn test_retry_after_extends_throttle_window() {
        let m = machine();
        let now = Instant::now();
        assert!(m.try_claim(now));
        let until = m.finish(FetchVerdict::RateLimited, Some(Duration::from_secs(300)), now);
        assert_eq!(until, now + Duration::from_secs(300));

        // A short hint never shortens the long window.
        let m = machine();
        assert!(m.try_claim(now));
        let until = m.finish(FetchVerdict::RateLimited, Some(Duration::from_secs(1)), now);
        assert_eq!(until, now + LONG);
    }

    #[test]
    fn test_huge_retry_after_is_capped() {
        let m = machine();
        let now = Instant::now();
        assert!(m.try_claim(now));
        let until = m.finish(
            FetchVerdict::RateLimited,
            Some(Duration::from_secs(u64::MAX)),
            now,
        );
        assert_eq!(until, now + MAX_COOLDOWN_WINDOW);
        assert_eq!(m.cooldown_remaining(now), MAX_COOLDOWN_WINDOW);
    }

    #[test]
    fn test_imposed_cooldown_is_seen_by_running_sweep_and_kept() {
        let m = machine();
        let now = Instant::now();
        assert!(m.try_claim(now));
        assert!(!m.cooldown_imposed(now));

        let external = now + Duration::from_secs(600);
        m.impose_cooldown(external);
        assert!(m.cooldown_imposed(now));

        // Finishing with a short window must not overwrite the newer deadline.
        assert_eq!(m.finish(FetchVerdict::TransportError, None, now), external);
    }

    #[test]
    fn test_expired_cooldown_does_not_count_as_imposed() {
        let m = machine();
        let t0 = Instant::now();
        assert!(m.try_claim(t0));
        let until = m.finish(FetchVerdict::EmptyResult, None, t0);
        assert!(m.try_claim(until));
        assert!(!m.cooldown_imposed(until + Duration::from_secs(1)));
    }

    #[test]
    fn test_clear_cooldown_reopens_claims() {
        let m = machine();
        let now = Instant::now();
        assert!(m.try_claim(now));
        m.finish(FetchVerdict::Success, None, now);
        assert!(!m.try_claim(now));

        m.clear_cooldown();
        assert_eq!(m.cooldown_remaining(now), Duration::ZERO);
        assert!(m.try_claim(now));
    }

    #[test]
    fn test_concurrent_claims_have_a_single_winner() {
        let m = std::sync::Arc::new(machine());
        let now = Instant::now();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let m = std::sync::Arc::clone(&m);
                std::thread::spawn(move || m.try_claim(now))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
