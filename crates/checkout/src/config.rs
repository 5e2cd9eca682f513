//! Ledger and sweeper settings.

use std::time::Duration as StdDuration;

use chrono::Duration;

/// Reservation time-to-live settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// TTL given to new reservations. `None` means they never expire.
    pub reservation_ttl: Option<Duration>,
    /// TTL restarted when a reservation is confirmed. `None` keeps the
    /// existing expiry.
    pub confirmed_ttl: Option<Duration>,
}

impl LedgerConfig {
    /// Builds the config from second counts, where 0 disables the TTL.
    pub fn from_secs(reservation_ttl_secs: u64, confirmed_ttl_secs: u64) -> Self {
        Self {
            reservation_ttl: ttl(reservation_ttl_secs),
            confirmed_ttl: ttl(confirmed_ttl_secs),
        }
    }

    /// Reservations never expire.
    pub fn without_expiry() -> Self {
        Self {
            reservation_ttl: None,
            confirmed_ttl: None,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::from_secs(900, 3600)
    }
}

fn ttl(secs: u64) -> Option<Duration> {
    if secs == 0 {
        return None;
    }
    i64::try_from(secs).ok().map(Duration::seconds)
}

/// Background sweep settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    pub sweep_interval: StdDuration,
    /// `None` disables the reconciliation pass.
    pub reconcile_interval: Option<StdDuration>,
    /// Rewrite drifted counters instead of only reporting them.
    pub repair: bool,
}

impl SweeperConfig {
    pub fn from_secs(sweep_secs: u64, reconcile_secs: u64, repair: bool) -> Self {
        Self {
            sweep_interval: StdDuration::from_secs(sweep_secs.max(1)),
            reconcile_interval: (reconcile_secs > 0).then(|| StdDuration::from_secs(reconcile_secs)),
            repair,
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self::from_secs(30, 300, false)
    }
}
