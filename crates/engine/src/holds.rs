// SPDX-License-Identifier: MIT

//! Mutation holds and cancellable jobs, scoped per machine (spec §4.3,
//! C3).
//!
//! *Holds* are named counters: `with_hold(name, f)` increments, runs
//! `f`, decrements. They never block readers — they only serialize
//! concurrent mutations of the same kind against each other, the way a
//! caller would use a named `RwLock` if holds were taken by callers
//! instead of counted.
//!
//! *Jobs* are cancellable scopes built on [`CancellationToken`]. Each
//! machine owns one [`JobManager`]; `run`/`run_context` attach the
//! token to the closure, and closing the manager cancels every
//! outstanding job and waits for them to finish.

use conman_core::{Error, MachineId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Named hold counters for one machine.
#[derive(Default)]
pub struct MutationHolds {
    counts: Mutex<HashMap<&'static str, u32>>,
}

impl MutationHolds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, name: &'static str) -> u32 {
        self.counts.lock().get(name).copied().unwrap_or(0)
    }

    fn increment(&self, name: &'static str) {
        *self.counts.lock().entry(name).or_insert(0) += 1;
    }

    fn decrement(&self, name: &'static str) {
        let mut counts = self.counts.lock();
        if let Some(count) = counts.get_mut(name) {
            *count = count.saturating_sub(1);
        }
    }

    /// Run `f` while `name`'s counter is held. Readers of [`Self::count`]
    /// are never blocked; concurrent callers of `with_hold(name, ..)`
    /// serialize only insofar as `f` itself does.
    pub fn with_hold<T>(&self, name: &'static str, f: impl FnOnce() -> T) -> T {
        self.increment(name);
        let result = f();
        self.decrement(name);
        result
    }

    /// Async variant of [`Self::with_hold`].
    pub async fn with_hold_async<T, Fut>(&self, name: &'static str, f: impl FnOnce() -> Fut) -> T
    where
        Fut: Future<Output = T>,
    {
        self.increment(name);
        let result = f().await;
        self.decrement(name);
        result
    }

    /// Begin a hold that outlives the current call — used when a
    /// mutation's completion is reported asynchronously (e.g.
    /// post-create setup continuing after the RPC response already
    /// went out). The returned token must eventually be consumed by
    /// [`EndMutationToken::end`] or dropped.
    pub fn begin(self: &Arc<Self>, name: &'static str) -> EndMutationToken {
        self.increment(name);
        EndMutationToken { holds: Arc::clone(self), name, active: true }
    }
}

/// An outstanding hold started via [`MutationHolds::begin`]. Ending it
/// explicitly is preferred so call sites read like
/// `token.end()`-at-completion; dropping without calling `end` still
/// decrements, so a cancelled task never leaks a hold.
pub struct EndMutationToken {
    holds: Arc<MutationHolds>,
    name: &'static str,
    active: bool,
}

impl EndMutationToken {
    pub fn end(mut self) {
        self.holds.decrement(self.name);
        self.active = false;
    }
}

impl Drop for EndMutationToken {
    fn drop(&mut self) {
        if self.active {
            self.holds.decrement(self.name);
        }
    }
}

/// Per-machine cancellable job scope. `run` attaches the machine's
/// cancellation token to `f`; closing the manager cancels every
/// outstanding job and blocks until they all return.
pub struct JobManager {
    id: MachineId,
    token: CancellationToken,
    jobs: Mutex<JoinSet<()>>,
}

impl JobManager {
    pub fn new(id: MachineId) -> Self {
        Self { id, token: CancellationToken::new(), jobs: Mutex::new(JoinSet::new()) }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Run `f(ctx)` to completion, or report [`Error::Cancelled`] if the
    /// manager's token fires first. The closure is responsible for
    /// checking `ctx` at cancellable points; this wrapper only decides
    /// which result wins the race.
    pub async fn run<T, Fut>(&self, f: impl FnOnce(CancellationToken) -> Fut) -> Result<T, Error>
    where
        Fut: Future<Output = Result<T, Error>>,
    {
        let ctx = self.token.child_token();
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(Error::Cancelled(self.id)),
            result = f(ctx.clone()) => result,
        }
    }

    /// Nest `parent`'s cancellation inside this manager's — used by
    /// clone to tie the new machine's job to the source machine's
    /// deletion (spec §4.3).
    pub async fn run_context<T, Fut>(
        &self,
        parent: &CancellationToken,
        f: impl FnOnce(CancellationToken) -> Fut,
    ) -> Result<T, Error>
    where
        Fut: Future<Output = Result<T, Error>>,
    {
        let ctx = self.token.child_token();
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(Error::Cancelled(self.id)),
            _ = parent.cancelled() => Err(Error::Cancelled(self.id)),
            result = f(ctx.clone()) => result,
        }
    }

    /// Cancel every outstanding job and wait for them all to return.
    /// Idempotent: closing an already-closed manager is a no-op beyond
    /// re-firing (already-fired) cancellation.
    pub async fn close(&self) {
        self.token.cancel();
        let mut taken = std::mem::take(&mut *self.jobs.lock());
        while let Some(result) = taken.join_next().await {
            if let Err(e) = result {
                warn!(id = %self.id, error = %e, "background job panicked during close");
            }
        }
        debug!(id = %self.id, "job manager closed");
    }

    /// Spawn a detached background task scoped to this machine's
    /// cancellation (e.g. the agent-close watcher in §4.5). Panics
    /// inside `fut` surface through [`Self::close`]'s join rather than
    /// being silently dropped.
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        self.jobs.lock().spawn(fut);
    }
}

#[cfg(test)]
#[path = "holds_tests.rs"]
mod tests;
