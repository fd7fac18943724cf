//! Expiry Sweeper
//!
//! Background task that periodically removes expired keys. Lazy expiry in
//! readers already guarantees correctness; the sweep just reclaims memory
//! for keys nobody reads again.

use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, info};

use super::cache::Cache;

pub struct ExpirySweeper {
    cache: Cache,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(cache: Cache, sweep_interval: Duration) -> Self {
        Self {
            cache,
            interval: sweep_interval,
        }
    }

    /// Run the sweep loop (should be spawned as a task).
    pub async fn run(self) {
        let mut ticker = interval(self.interval);
        info!(interval = ?self.interval, "expiry sweeper started");

        loop {
            ticker.tick().await;
            let removed = self.cache.sweep_expired();
            if removed > 0 {
                debug!(removed, "swept expired keys");
            }
        }
    }

    /// Spawn the sweeper as a background task.
    pub fn spawn(cache: Cache, sweep_interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(Self::new(cache, sweep_interval).run())
    }
}
