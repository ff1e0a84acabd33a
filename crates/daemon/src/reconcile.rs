// SPDX-License-Identifier: MIT

//! Wires the registry walk into [`conman_engine::Watchdog`] (spec.md
//! §4.9, C9): each tick re-checks every machine's recorded state
//! against its engine, and separately sweeps forward engines whose
//! last scan is older than the configured GC threshold.

use crate::lifecycle;
use crate::manager::ConManager;
use conman_engine::{TickReport, Watchdog};
use std::sync::Arc;
use tracing::warn;

pub fn spawn(manager: Arc<ConManager>) -> Arc<Watchdog> {
    let watchdog = Arc::new(Watchdog::new(manager.config().watchdog_interval));
    let loop_watchdog = Arc::clone(&watchdog);
    let loop_manager = manager;
    tokio::spawn(async move {
        loop_watchdog.run(move || tick(Arc::clone(&loop_manager))).await;
    });
    watchdog
}

async fn tick(manager: Arc<ConManager>) -> TickReport {
    let mut report = TickReport::default();
    for machine in manager.list() {
        if lifecycle::refresh_state(&manager, &machine).await {
            report.corrected += 1;
        }
    }

    let threshold = manager.config().autofwd_gc_threshold;
    for machine in manager.list() {
        let Some(forward_engine) = manager.forward_engine_for(machine.id) else { continue };
        if forward_engine.last_update_age() < threshold {
            continue;
        }
        report.gc_enqueued += 1;
        if let Err(e) = forward_engine.rescan().await {
            warn!(id = %machine.id, error = %e, "watchdog-triggered forward GC rescan failed");
        }
    }
    report
}
