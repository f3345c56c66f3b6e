//! Per-client token-bucket admission control built atop `governor`.
//!
//! Every client address gets its own direct (non-keyed) governor limiter
//! stored in a map guarded by a single mutex. The lock is only held while the
//! map is read or mutated, never while a request is being handled. A janitor
//! task sweeps the map once a minute and drops clients that have been idle
//! for longer than the staleness window.
use std::{
    collections::HashMap,
    net::IpAddr,
    num::NonZeroU32,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use tokio::{
    task::JoinHandle,
    time::{Instant, interval_at},
};

use crate::{config::models::LimiterConfig, utils::graceful_shutdown::ShutdownToken};

/// How often the janitor sweeps the client map.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Clients not seen for longer than this are evicted on the next sweep.
pub const STALE_AFTER: Duration = Duration::from_secs(180);

/// Highest accepted refill rate.
pub const MAX_RPS: f64 = 1_000_000.0;

pub type DirectRateLimiterImpl = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

struct ClientEntry {
    limiter: DirectRateLimiterImpl,
    last_seen: Instant,
}

/// Time between two token refills at `rps` requests per second.
///
/// Rejects rates that are not finite, not positive, above [`MAX_RPS`], or so
/// small that the period does not fit in a [`Duration`].
pub fn refill_period(rps: f64) -> Result<Duration, String> {
    if !rps.is_finite() || rps <= 0.0 || rps > MAX_RPS {
        return Err(format!(
            "must be a positive number no greater than {MAX_RPS}, got {rps}"
        ));
    }
    Duration::try_from_secs_f64(1.0 / rps)
        .map_err(|_| format!("refill period for {rps} rps is out of range"))
}

/// Admission control keyed by client address (port stripped).
pub struct TokenBucketLimiter {
    /// `None` when limiting is disabled.
    quota: Option<Quota>,
    clients: Mutex<HashMap<IpAddr, ClientEntry>>,
}

impl TokenBucketLimiter {
    /// Build a limiter from the `limiter` configuration section.
    pub fn new(config: &LimiterConfig) -> Result<Self, String> {
        let quota = if config.enabled {
            let period = refill_period(config.rps).map_err(|e| format!("Limiter rps {e}"))?;
            let burst = NonZeroU32::new(config.burst)
                .ok_or_else(|| "Limiter burst must be greater than 0".to_string())?;
            let quota = Quota::with_period(period)
                .ok_or_else(|| format!("Invalid refill period derived from rps: {period:?}"))?
                .allow_burst(burst);

            tracing::info!(
                rps = config.rps,
                burst = config.burst,
                "Creating client rate limiter"
            );
            Some(quota)
        } else {
            tracing::info!("Client rate limiting disabled");
            None
        };

        Ok(Self {
            quota,
            clients: Mutex::new(HashMap::new()),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.quota.is_some()
    }

    /// Decide whether a request from `client` may proceed.
    ///
    /// Creates the client's bucket on first sight, refreshes its last-seen
    /// time and consumes one token if one is available.
    pub fn admit(&self, client: IpAddr) -> bool {
        let Some(quota) = self.quota else {
            return true;
        };

        let now = Instant::now();
        let mut clients = self.lock();
        let entry = clients.entry(client).or_insert_with(|| ClientEntry {
            limiter: RateLimiter::direct(quota),
            last_seen: now,
        });
        entry.last_seen = now;
        entry.limiter.check().is_ok()
    }

    /// Evict stale clients using the current time.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Evict every client whose last request is older than [`STALE_AFTER`]
    /// relative to `now`. Returns the number of evicted clients.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= STALE_AFTER);
        before - clients.len()
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start the background sweep. The task ends once shutdown begins.
    pub fn spawn_janitor(self: Arc<Self>, mut shutdown: ShutdownToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + SWEEP_INTERVAL, SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = self.sweep();
                        if evicted > 0 {
                            tracing::debug!(evicted, remaining = self.len(), "Evicted idle rate limiter clients");
                        }
                    }
                    signal = shutdown.wait_for_shutdown() => {
                        tracing::debug!(signal = signal.name(), "Rate limiter janitor stopping");
                        break;
                    }
                }
            }
        })
    }

    // A panic while holding the lock leaves the map itself consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<IpAddr, ClientEntry>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
