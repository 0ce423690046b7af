//! Engine tuning knobs.

use std::time::Duration;

/// Tuning knobs of the discovery engine. Fixed at construction time.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Minimum occupant count for a server to be kept.
    pub min_players: u32,
    /// Entries requested per upstream page.
    pub page_size: u32,
    /// Cooldown after a full successful sweep or an explicit throttle.
    pub long_cooldown: Duration,
    /// Cooldown after transport failures or an empty sweep.
    pub short_cooldown: Duration,
    /// Lower bound of the randomized pause between pages.
    pub page_delay_min: Duration,
    /// Upper bound of the randomized pause between pages.
    pub page_delay_max: Duration,
    /// How long the very first caller may wait for the cache to fill.
    pub first_call_wait: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            min_players: 7,
            page_size: 100,
            long_cooldown: Duration::from_secs(60),
            short_cooldown: Duration::from_secs(10),
            page_delay_min: Duration::from_millis(500),
            page_delay_max: Duration::from_millis(1200),
            first_call_wait: Duration::from_secs(15),
        }
    }
}
