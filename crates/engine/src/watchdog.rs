// SPDX-License-Identifier: MIT

//! The reconciliation watchdog (spec §4.9, C9): a ticker-driven loop,
//! scoped to the manager's lifetime, that notices when a machine's
//! recorded state has drifted from what the container engine actually
//! reports and nudges it back in line.
//!
//! The registry walk and the `c.mu`-guarded re-check belong to the
//! daemon (this crate has no registry type); this module owns the
//! ticking primitive itself and the per-tick report it logs, grounded
//! in the same armed-timer idiom the freezer's debounce uses.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What one tick accomplished, for the supplemental per-tick tracing
/// span (spec §4.9 "supplemented").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Machines whose state was corrected via `refresh_state`.
    pub corrected: usize,
    /// Machines whose forward table was enqueued for a GC rescan.
    pub gc_enqueued: usize,
}

/// Drives a caller-supplied reconcile closure on a fixed interval until
/// stopped. One instance per manager; `stop` (or dropping the returned
/// cancellation token's last clone) ends the loop at the next tick
/// boundary.
pub struct Watchdog {
    interval: Duration,
    token: CancellationToken,
}

impl Watchdog {
    pub fn new(interval: Duration) -> Self {
        Self { interval, token: CancellationToken::new() }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal the loop to exit at the next tick boundary (spec §4.9:
    /// "exits on a stop channel closed by the manager during
    /// shutdown").
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Run `tick` on every interval boundary until [`Watchdog::stop`]
    /// is called. `tick` does the registry walk and state comparisons;
    /// this loop only owns the schedule and the per-tick log line.
    pub async fn run<F, Fut>(&self, mut tick: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TickReport>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    debug!("watchdog stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let report = tick().await;
                    info!(corrected = report.corrected, gc_enqueued = report.gc_enqueued, "watchdog tick");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "watchdog_tests.rs"]
mod tests;
