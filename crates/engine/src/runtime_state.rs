// SPDX-License-Identifier: MIT

//! Published runtime state for a Running machine (spec §4.5, C5):
//! everything that only exists while the container engine's init is up
//! — the pidfd/proc handle, the per-machine freezer, the agent
//! channel, and the BPF port monitor attachment.
//!
//! Construction and teardown are the two halves of one lifecycle.
//! Teardown is idempotent and is the single path used by stop, a
//! failed-start rollback, and manager shutdown alike.

use crate::freezer::Freezer;
use crate::holds::JobManager;
use conman_collab::{AgentClient, ContainerEngine, PortMonitor};
use conman_core::{Error, MachineId};
use parking_lot::Mutex;
use std::os::unix::io::RawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Everything constructed once a machine's init has come up. Held
/// behind a [`RuntimeStateSlot`] so the rest of the machine can observe
/// "is there a live runtime, and is it *this* one" without taking the
/// machine's own lock (spec §9, "process-wide singletons").
pub struct RuntimeState {
    id: MachineId,
    init_pid: u32,
    init_pidfd: RawFd,
    proc_dir: PathBuf,
    freezer: Option<Arc<Freezer>>,
    agent: Mutex<Option<Arc<dyn AgentClient>>>,
    port_monitor: Mutex<Option<Arc<dyn PortMonitor>>>,
    jobs: JobManager,
    torn_down: AtomicBool,
}

impl RuntimeState {
    pub fn id(&self) -> MachineId {
        self.id
    }

    pub fn init_pid(&self) -> u32 {
        self.init_pid
    }

    pub fn init_pidfd(&self) -> RawFd {
        self.init_pidfd
    }

    pub fn proc_dir(&self) -> &std::path::Path {
        &self.proc_dir
    }

    pub fn freezer(&self) -> Option<&Arc<Freezer>> {
        self.freezer.as_ref()
    }

    pub fn agent(&self) -> Option<Arc<dyn AgentClient>> {
        self.agent.lock().clone()
    }

    pub fn port_monitor(&self) -> Option<Arc<dyn PortMonitor>> {
        self.port_monitor.lock().clone()
    }

    /// The listener-debounce cancellation token and spawn point used by
    /// the forward engine (C8), pinned to this runtime-state's
    /// lifetime.
    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    /// Construction steps 1-5 of spec §4.5, followed by the atomic
    /// publish (step 6) into `slot`. `on_agent_closed` fires at most
    /// once, from a background task, and only if this is still the
    /// published runtime-state when the agent channel closes.
    pub async fn construct(
        slot: &RuntimeStateSlot,
        id: MachineId,
        engine: &dyn ContainerEngine,
        freezer: Option<Arc<Freezer>>,
        agent: Arc<dyn AgentClient>,
        port_monitor: Arc<dyn PortMonitor>,
        on_agent_closed: impl FnOnce() + Send + 'static,
    ) -> Result<Arc<RuntimeState>, Error> {
        // Step 1: pid, pidfd, proc-dir handle.
        let init_pid = engine.init_pid().ok_or(Error::NotRunning(id))?;
        let init_pidfd = engine.init_pidfd()?;
        let proc_dir = PathBuf::from(format!("/proc/{init_pid}"));

        // Step 2: the listener-debounce job manager is created here and
        // lives for exactly this runtime-state's lifetime; the forward
        // engine (C8) schedules its debounced rescans onto it.
        let jobs = JobManager::new(id);
        let token = jobs.cancellation_token();

        let state = Arc::new(RuntimeState {
            id,
            init_pid,
            init_pidfd,
            proc_dir,
            // Step 3: per-hook freezer, already built by the caller via
            // `hooks.make_freezer` (Docker builtin only).
            freezer,
            agent: Mutex::new(Some(agent.clone())),
            // Step 5: BPF attach is represented by holding the
            // port-monitor handle for this runtime-state's lifetime;
            // dropping it is the "close BPF" teardown step.
            port_monitor: Mutex::new(Some(port_monitor)),
            jobs,
            torn_down: AtomicBool::new(false),
        });

        // Step 4: agent-close watcher. Cancelled by teardown; otherwise
        // fires `on_agent_closed` exactly once, guarded by the identity
        // check so a stale watcher from an already-replaced runtime
        // state can never trigger a spurious stop.
        state.jobs.spawn({
            let watched = Arc::clone(&state);
            let slot_id = slot.clone();
            async move {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {}
                    _ = agent.synthetic_wait_for_close() => {
                        if slot_id.is_current(&watched) {
                            on_agent_closed();
                        }
                    }
                }
            }
        });

        // Step 6: atomic publish. A non-nil `old` should never happen
        // (start always tears down any previous runtime-state first);
        // if it does, log and close it rather than leak it.
        if let Some(old) = slot.swap(Some(Arc::clone(&state))) {
            warn!(id = %id, "runtime-state publish found a live previous instance, closing it");
            old.teardown().await;
        }

        Ok(state)
    }

    /// Single teardown path (stop, failed-start rollback, manager
    /// shutdown). Idempotent: a second call is a no-op.
    pub async fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.jobs.close().await;
        if let Some(freezer) = &self.freezer {
            freezer.close();
        }
        self.agent.lock().take();
        self.port_monitor.lock().take();
    }
}

/// The process-wide-singleton-shaped publish point for one machine's
/// [`RuntimeState`]. `swap`/`is_current` never block across an
/// `.await`, matching spec §9's "runtime_state.swap(new)" wording.
#[derive(Clone)]
pub struct RuntimeStateSlot {
    inner: Arc<Mutex<Option<Arc<RuntimeState>>>>,
}

impl Default for RuntimeStateSlot {
    fn default() -> Self {
        Self { inner: Arc::new(Mutex::new(None)) }
    }
}

impl RuntimeStateSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<RuntimeState>> {
        self.inner.lock().clone()
    }

    pub fn is_some(&self) -> bool {
        self.inner.lock().is_some()
    }

    pub fn swap(&self, new: Option<Arc<RuntimeState>>) -> Option<Arc<RuntimeState>> {
        std::mem::replace(&mut *self.inner.lock(), new)
    }

    /// `Arc::ptr_eq` identity check used by the agent-close watcher and
    /// by `onStart`'s double-publish guard (spec §4.5, §9).
    pub fn is_current(&self, candidate: &Arc<RuntimeState>) -> bool {
        matches!(&*self.inner.lock(), Some(current) if Arc::ptr_eq(current, candidate))
    }

    /// Swap to nil and tear down whatever was published, if anything.
    /// Used by stop's `onStop` ("discard freezer... close BPF... close
    /// agent") and by manager shutdown.
    pub async fn teardown(&self) {
        if let Some(state) = self.swap(None) {
            state.teardown().await;
        }
    }
}

#[cfg(test)]
#[path = "runtime_state_tests.rs"]
mod tests;
