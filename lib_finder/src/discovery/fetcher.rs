//! # Paginated Fetcher
//!
//! Walks the upstream listing page by page, filtering as it goes.
//!
//! ## Workflow:
//! 1.  Start with an empty accumulator and no cursor.
//! 2.  Request a page, passing the cursor when there is one.
//! 3.  **Throttled**: stop, report `RateLimited` with what was collected so far.
//! 4.  **Any other failure**: stop, report `TransportError` with the partial set.
//! 5.  **Success**: run every entry through the [`RecordFilter`], append the
//!     survivors and read the next cursor. A page with no survivors is fine.
//! 6.  **No cursor**: stop, report `Complete`.
//! 7.  Otherwise sleep a randomized pause, holding no lock, and loop.
//!
//! Before every page after the first the fetcher asks its caller whether it has
//! been preempted (an external cooldown was imposed). If so it stops right away
//! instead of racing the newer deadline.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use super::backoff::FetchVerdict;
use super::filter::{RecordFilter, ServerRecord};
use crate::listing::{ListingSource, PageError};

/// Why pagination stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The upstream reported no further page.
    Complete,
    /// The upstream throttled us.
    RateLimited {
        /// Server hint on how long to stay away.
        retry_after: Option<Duration>,
    },
    /// Network, timeout or protocol failure.
    TransportError(String),
    /// A cooldown was imposed from outside while the sweep was running.
    Preempted,
}

/// Everything a sweep produced.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Qualifying records, partial unless `termination` is `Complete`.
    pub records: Vec<ServerRecord>,
    /// Why the sweep stopped.
    pub termination: Termination,
    /// Pages successfully retrieved.
    pub pages: u32,
}

impl FetchOutcome {
    /// Backoff classification of this outcome.
    pub fn verdict(&self) -> FetchVerdict {
        match self.termination {
            Termination::Complete if self.records.is_empty() => FetchVerdict::EmptyResult,
            Termination::Complete => FetchVerdict::Success,
            Termination::RateLimited { .. } => FetchVerdict::RateLimited,
            Termination::TransportError(_) | Termination::Preempted => {
                FetchVerdict::TransportError
            }
        }
    }

    /// Throttle hint carried by a `RateLimited` termination.
    pub fn retry_after(&self) -> Option<Duration> {
        match self.termination {
            Termination::RateLimited { retry_after } => retry_after,
            _ => None,
        }
    }
}

/// Page walker over a [`ListingSource`].
pub struct PaginatedFetcher {
    source: Arc<dyn ListingSource>,
    filter: RecordFilter,
    page_size: u32,
    delay_min: Duration,
    delay_max: Duration,
}

impl PaginatedFetcher {
    /// Creates a fetcher. A `delay_max` below `delay_min` collapses to `delay_min`.
    pub fn new(
        source: Arc<dyn ListingSource>,
        filter: RecordFilter,
        page_size: u32,
        delay_min: Duration,
        delay_max: Duration,
    ) -> Self {
        Self {
            source,
            filter,
            page_size,
            delay_min,
            delay_max: delay_max.max(delay_min),
        }
    }

    fn page_delay(&self) -> Duration {
        let min = self.delay_min.as_millis() as u64;
        let max = self.delay_max.as_millis() as u64;
        if max <= min {
            return self.delay_min;
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    /// Runs one sweep to completion.
    ///
    /// `preempted` is polled before each page after the first.
    pub async fn run<F>(&self, preempted: F) -> FetchOutcome
    where
        F: Fn() -> bool,
    {
        let mut records: Vec<ServerRecord> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages: u32 = 0;

        loop {
            if pages > 0 && preempted() {
                warn!(pages, collected = records.len(), "sweep preempted by an external cooldown");
                return FetchOutcome {
                    records,
                    termination: Termination::Preempted,
                    pages,
                };
            }

            let page = match self.source.fetch_page(cursor.as_deref(), self.page_size).await {
                Ok(page) => page,
                Err(PageError::RateLimited { retry_after }) => {
                    warn!(pages, collected = records.len(), "sweep stopped by upstream throttling");
                    return FetchOutcome {
                        records,
                        termination: Termination::RateLimited { retry_after },
                        pages,
                    };
                }
                Err(e) => {
                    warn!(pages, collected = records.len(), error = %e, "sweep stopped by a page failure");
                    return FetchOutcome {
                        records,
                        termination: Termination::TransportError(e.to_string()),
                        pages,
                    };
                }
            };

            pages += 1;
            let before = records.len();
            records.extend(page.entries.iter().filter_map(|entry| self.filter.apply(entry)));
            debug!(
                page = pages,
                entries = page.entries.len(),
                kept = records.len() - before,
                "listing page processed"
            );

            match page.next_cursor.filter(|c| !c.is_empty()) {
                Some(next) => cursor = Some(next),
                None => {
                    return FetchOutcome {
                        records,
                        termination: Termination::Complete,
                        pages,
                    }
                }
            }

            tokio::time::sleep(self.page_delay()).await;
        }
    }
}
