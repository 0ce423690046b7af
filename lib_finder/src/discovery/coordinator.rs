//! # Refresh Coordinator
//!
//! The only entry point callers use. It decides, on every read, whether a
//! background sweep should start, and always answers from the cache without
//! waiting on the upstream.
//!
//! ## Key Design Principles:
//! - **Single-flight**: a sweep starts only if the caller wins the atomic
//!   `InFlight` claim on the [`BackoffStateMachine`]. Everyone else just reads.
//! - **Never block readers**: the sweep runs on its own tokio task. The one
//!   exception is the very first caller after startup, who may wait a bounded
//!   time for the initial fill.
//! - **Fair ordering**: every read returns an independently shuffled copy of
//!   the snapshot. The stored order is never touched.
//!
//! Refreshes are opportunistic: any read past the cooldown deadline triggers
//! one. [`RefreshCoordinator::keep_warm`] adds an optional ticker on top for
//! deployments that prefer the cache filled before anyone asks.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::backoff::{BackoffStateMachine, FetchState, FetchVerdict};
use super::config::DiscoveryConfig;
use super::fetcher::PaginatedFetcher;
use super::filter::{RecordFilter, ServerRecord};
use super::store::CacheStore;
use crate::listing::ListingSource;

/// Freshness/backoff label attached to every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// This call waited for and observed the initial fill.
    Fresh,
    /// Served from a snapshot with nothing special going on.
    Cached,
    /// The last sweep failed or came back empty; retrying soon.
    CoolingDown,
    /// The upstream throttled the last sweep.
    RateLimited,
    /// A sweep is running, or nothing has been cached yet.
    Updating,
}

/// Answer to [`RefreshCoordinator::get_servers`].
#[derive(Debug, Clone, Serialize)]
pub struct ServersView {
    /// Shuffled copy of the cached records.
    pub records: Vec<ServerRecord>,
    /// Freshness label.
    pub status: CacheStatus,
    /// Whole seconds until a new sweep may start (rounded up).
    pub cooldown_seconds_remaining: u64,
    /// Whole seconds since the snapshot was installed; absent when nothing is cached.
    pub cache_age_seconds: Option<u64>,
}

/// Coarse state label for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateLabel {
    /// See [`FetchState::Idle`].
    Idle,
    /// See [`FetchState::InFlight`].
    InFlight,
    /// See [`FetchState::Cooldown`].
    Cooldown,
}

impl From<FetchState> for StateLabel {
    fn from(state: FetchState) -> Self {
        match state {
            FetchState::Idle => StateLabel::Idle,
            FetchState::InFlight => StateLabel::InFlight,
            FetchState::Cooldown { .. } => StateLabel::Cooldown,
        }
    }
}

/// Read-only engine diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Current fetch state.
    pub state: StateLabel,
    /// Whole seconds until a new sweep may start.
    pub cooldown_seconds_remaining: u64,
    /// Records in the current snapshot.
    pub snapshot_len: usize,
    /// Snapshot age in whole seconds.
    pub cache_age_seconds: Option<u64>,
    /// Wall-clock install time of the snapshot.
    pub fetched_at: Option<DateTime<Utc>>,
    /// How the most recent sweep ended.
    pub last_verdict: Option<FetchVerdict>,
    /// Sweeps launched since startup.
    pub fetches_started: u64,
    /// Sweeps finished since startup.
    pub fetches_completed: u64,
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

struct Inner {
    fetcher: PaginatedFetcher,
    backoff: BackoffStateMachine,
    store: CacheStore,
    first_call_wait: Duration,
    /// Set by the first `get_servers` call; only that call may wait.
    first_call_taken: AtomicBool,
    fetches_started: AtomicU64,
    /// Bumped after each finished sweep, once store and backoff are updated.
    completions: watch::Sender<u64>,
}

impl Inner {
    async fn sweep(self: Arc<Self>) {
        let mut guard = SweepGuard {
            inner: &self,
            finished: false,
        };

        let outcome = self
            .fetcher
            .run(|| self.backoff.cooldown_imposed(Instant::now()))
            .await;

        let verdict = outcome.verdict();
        let retry_after = outcome.retry_after();
        let pages = outcome.pages;
        let collected = outcome.records.len();
        let replaced = self.store.replace(outcome.records);
        let until = self.backoff.finish(verdict, retry_after, Instant::now());
        guard.finished = true;
        self.completions.send_modify(|n| *n += 1);

        info!(
            ?verdict,
            pages,
            collected,
            replaced,
            cooldown_secs = ceil_secs(until.saturating_duration_since(Instant::now())),
            "upstream sweep finished"
        );
    }
}

/// Releases the claim if a sweep task unwinds before finishing.
struct SweepGuard<'a> {
    inner: &'a Inner,
    finished: bool,
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.inner
                .backoff
                .finish(FetchVerdict::TransportError, None, Instant::now());
            self.inner.completions.send_modify(|n| *n += 1);
        }
    }
}

/// Cheaply cloneable handle to the discovery engine.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    /// Assembles the engine around `source`.
    pub fn new(source: Arc<dyn ListingSource>, config: DiscoveryConfig) -> Self {
        let fetcher = PaginatedFetcher::new(
            source,
            RecordFilter::new(config.min_players),
            config.page_size,
            config.page_delay_min,
            config.page_delay_max,
        );
        let (completions, _) = watch::channel(0);

        Self {
            inner: Arc::new(Inner {
                fetcher,
                backoff: BackoffStateMachine::new(config.long_cooldown, config.short_cooldown),
                store: CacheStore::new(),
                first_call_wait: config.first_call_wait,
                first_call_taken: AtomicBool::new(false),
                fetches_started: AtomicU64::new(0),
                completions,
            }),
        }
    }

    /// Claims `InFlight` and launches a background sweep. Must run inside a
    /// tokio runtime. Returns whether a sweep was launched.
    fn trigger(&self) -> bool {
        if !self.inner.backoff.try_claim(Instant::now()) {
            return false;
        }
        let started = self.inner.fetches_started.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(sweep = started, "launching upstream sweep");
        tokio::spawn(Arc::clone(&self.inner).sweep());
        true
    }

    /// Returns the cached servers, shuffled, with freshness information.
    ///
    /// Kicks off a background sweep when the backoff allows one. The very
    /// first call of the process, and only that one, may wait up to
    /// `first_call_wait` for an unfilled cache to be populated. Every other
    /// call returns immediately.
    pub async fn get_servers(&self) -> ServersView {
        let mut completions = self.inner.completions.subscribe();
        let first_call = !self.inner.first_call_taken.swap(true, Ordering::AcqRel);
        self.trigger();

        let mut observed_fill = false;
        if first_call
            && !self.inner.store.is_populated()
            && self.inner.backoff.is_in_flight()
            && !self.inner.first_call_wait.is_zero()
        {
            let waited =
                tokio::time::timeout(self.inner.first_call_wait, completions.changed()).await;
            observed_fill = matches!(waited, Ok(Ok(()))) && self.inner.store.is_populated();
            if !observed_fill {
                debug!("first call returned before the cache was filled");
            }
        }

        self.view(observed_fill)
    }

    fn view(&self, observed_fill: bool) -> ServersView {
        let now = Instant::now();
        let snapshot = self.inner.store.read();
        let mut records = snapshot.records().to_vec();
        records.shuffle(&mut rand::rng());

        let backoff = &self.inner.backoff;
        let remaining = backoff.cooldown_remaining(now);
        let cooling = !remaining.is_zero();

        let status = if snapshot.is_empty() || backoff.is_in_flight() {
            CacheStatus::Updating
        } else {
            match backoff.last_verdict() {
                Some(FetchVerdict::RateLimited) if cooling => CacheStatus::RateLimited,
                Some(FetchVerdict::TransportError | FetchVerdict::EmptyResult) if cooling => {
                    CacheStatus::CoolingDown
                }
                _ if observed_fill => CacheStatus::Fresh,
                _ => CacheStatus::Cached,
            }
        };

        ServersView {
            records,
            status,
            cooldown_seconds_remaining: ceil_secs(remaining),
            cache_age_seconds: snapshot.age(now).map(|age| age.as_secs()),
        }
    }

    /// Clears the cooldown and launches a sweep unless one is already running.
    pub fn force_refresh(&self) -> bool {
        self.inner.backoff.clear_cooldown();
        let launched = self.trigger();
        info!(launched, "forced refresh requested");
        launched
    }

    /// Pushes the cooldown out to `until`; a running sweep stops at its next page.
    pub fn impose_cooldown(&self, until: Instant) {
        self.inner.backoff.impose_cooldown(until);
    }

    /// Current fetch state.
    pub fn fetch_state(&self) -> FetchState {
        self.inner.backoff.state(Instant::now())
    }

    /// Diagnostics snapshot.
    pub fn status(&self) -> EngineStatus {
        let now = Instant::now();
        let snapshot = self.inner.store.read();
        EngineStatus {
            state: self.inner.backoff.state(now).into(),
            cooldown_seconds_remaining: ceil_secs(self.inner.backoff.cooldown_remaining(now)),
            snapshot_len: snapshot.len(),
            cache_age_seconds: snapshot.age(now).map(|age| age.as_secs()),
            fetched_at: snapshot.fetched_at(),
            last_verdict: self.inner.backoff.last_verdict(),
            fetches_started: self.inner.fetches_started.load(Ordering::Relaxed),
            fetches_completed: *self.inner.completions.borrow(),
        }
    }

    /// Waits until `completed` sweeps have finished since startup.
    pub async fn wait_for_completions(&self, completed: u64) {
        let mut rx = self.inner.completions.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|n| *n >= completed).await;
    }

    /// Tries to launch a sweep every `period` until `shutdown` resolves.
    ///
    /// Each tick goes through the same backoff gate as reads do.
    pub async fn keep_warm<S>(&self, period: Duration, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("keep-warm loop stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if self.trigger() {
                        debug!("keep-warm tick launched a sweep");
                    }
                }
            }
        }
    }
}
