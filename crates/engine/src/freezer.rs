// SPDX-License-Identifier: MIT

//! The Docker freezer / idle-suspend controller (spec §4.4, C4): a
//! reference-counted freeze/unfreeze state machine that keeps the
//! Docker machine suspended when idle and eagerly thawed for any
//! in-flight use.
//!
//! The freezer never takes the owning machine's `mu` (spec §9 "Process-
//! wide singletons" / §5 lock order: `containersMu > c.mu >
//! freezer.mu`); callers that also touch `mu` must respect that
//! ordering themselves.

use conman_collab::ContainerEngine;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The derived target a freezer is steering the real container state
/// towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezerTarget {
    Unfrozen,
    ForcedFrozen,
    FrozenIfIdle,
}

/// A sentinel use-count value that makes [`Freezer::closed`] true.
const CLOSED_SENTINEL: i64 = i64::MIN;

/// Reference-counted freeze/unfreeze controller for one machine.
/// `begin_use`/`end_use` bracket each agent call when the machine needs
/// a live (unfrozen) agent; `begin_freeze`/`end_freeze` are used by the
/// idle-suspend controller itself. The two counters are independent
/// (spec §3 "Freezer state"): `target` is never stored, it is derived
/// fresh on every `apply()` from `{use_count, freeze_count, closed}`,
/// so a `freeze()`/`unfreeze()` RPC call changes behavior immediately
/// rather than waiting for whatever target the freezer was built with.
pub struct Freezer {
    idle_predicate: Arc<dyn Fn() -> bool + Send + Sync>,
    debounce: Duration,
    use_count: AtomicI64,
    freeze_count: AtomicI64,
    pending: Mutex<Option<CancellationToken>>,
    frozen: Mutex<bool>,
    settle: Notify,
}

impl Freezer {
    pub fn new(idle_predicate: Arc<dyn Fn() -> bool + Send + Sync>, debounce: Duration) -> Self {
        Self {
            idle_predicate,
            debounce,
            use_count: AtomicI64::new(0),
            freeze_count: AtomicI64::new(0),
            pending: Mutex::new(None),
            frozen: Mutex::new(false),
            settle: Notify::new(),
        }
    }

    pub fn is_frozen(&self) -> bool {
        *self.frozen.lock()
    }

    pub fn closed(&self) -> bool {
        self.use_count.load(Ordering::SeqCst) == CLOSED_SENTINEL
    }

    pub fn use_count(&self) -> i64 {
        let count = self.use_count.load(Ordering::SeqCst);
        if count == CLOSED_SENTINEL { 0 } else { count }
    }

    pub fn freeze_count(&self) -> i64 {
        self.freeze_count.load(Ordering::SeqCst)
    }

    /// The target the freezer is currently steering towards (spec §3
    /// "Derived target"), recomputed from the live counters every time
    /// it's needed rather than cached.
    fn target(&self) -> FreezerTarget {
        if self.closed() {
            FreezerTarget::Unfrozen
        } else if self.freeze_count() > 0 {
            FreezerTarget::ForcedFrozen
        } else if self.use_count() > 0 {
            FreezerTarget::Unfrozen
        } else {
            FreezerTarget::FrozenIfIdle
        }
    }

    /// Bump the use count, cancelling any pending debounced freeze (a
    /// concurrent `begin_use` before the debounce fires cancels it, per
    /// spec §8 scenario 5).
    pub fn begin_use(&self) {
        self.use_count.fetch_add(1, Ordering::SeqCst);
        self.cancel_pending();
    }

    pub fn end_use(&self) {
        self.use_count.fetch_sub(1, Ordering::SeqCst);
    }

    /// Used by the idle-suspend controller to force a frozen state
    /// regardless of the idle predicate (spec §3 "freeze_count>0 ⇒
    /// forced frozen").
    pub fn begin_freeze(&self) {
        self.freeze_count.fetch_add(1, Ordering::SeqCst);
        self.cancel_pending();
    }

    pub fn end_freeze(&self) {
        self.freeze_count.fetch_sub(1, Ordering::SeqCst);
    }

    /// Sets `use_count` to the closed sentinel; further `begin_use`
    /// calls are meaningless once a machine's freezer is closed (it is
    /// torn down alongside runtime state).
    pub fn close(&self) {
        self.cancel_pending();
        self.use_count.store(CLOSED_SENTINEL, Ordering::SeqCst);
    }

    fn cancel_pending(&self) {
        if let Some(token) = self.pending.lock().take() {
            token.cancel();
        }
    }

    /// Apply the derived target against the actual container state,
    /// through a debounced timer (spec §4.4). Synchronous once the
    /// debounce settles; idempotent if called repeatedly with nothing
    /// to do.
    pub async fn apply(&self, engine: &dyn ContainerEngine) {
        if self.closed() {
            return;
        }
        let currently_frozen = self.is_frozen();
        match self.target() {
            FreezerTarget::Unfrozen => {
                if currently_frozen {
                    self.debounced_transition(engine, false).await;
                }
            }
            FreezerTarget::ForcedFrozen => {
                if !currently_frozen {
                    self.debounced_transition(engine, true).await;
                }
            }
            FreezerTarget::FrozenIfIdle => {
                if !currently_frozen && self.use_count() == 0 && (self.idle_predicate)() {
                    self.debounced_transition(engine, true).await;
                }
            }
        }
    }

    async fn debounced_transition(&self, engine: &dyn ContainerEngine, freeze: bool) {
        let token = CancellationToken::new();
        *self.pending.lock() = Some(token.clone());

        tokio::select! {
            _ = token.cancelled() => {
                debug!("freezer transition cancelled during debounce window");
                return;
            }
            _ = tokio::time::sleep(self.debounce) => {}
        }

        *self.pending.lock() = None;
        if self.closed() {
            return;
        }
        let result = if freeze { engine.freeze().await } else { engine.unfreeze().await };
        match result {
            Ok(()) => {
                *self.frozen.lock() = freeze;
                self.settle.notify_waiters();
            }
            Err(e) => warn!(error = %e, freeze, "freezer transition failed"),
        }
    }
}

#[cfg(test)]
#[path = "freezer_tests.rs"]
mod tests;
