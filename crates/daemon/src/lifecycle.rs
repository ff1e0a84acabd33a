// SPDX-License-Identifier: MIT

//! Lifecycle orchestration (spec.md §4.7, C7): start, stop, restart,
//! freeze, unfreeze. Everything here operates on an already-registered
//! [`Machine`]; allocating or retiring the machine itself is
//! [`crate::manager::ConManager`]'s job.

use crate::machine::Machine;
use crate::manager::ConManager;
use conman_core::{Error, MachineState};
use conman_engine::{ForwardEngine, RuntimeState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Start the container engine and wait for it to report `Running`
/// (spec §4.5 "onStart" construction steps), without going through
/// [`start`]'s state-transition bookkeeping. Used only by
/// [`crate::manager::ConManager::create`]'s internal bootstrap, which
/// runs while the record is still `Creating` — a state the ordinary
/// `Stopped -> Starting -> Running` transition matrix does not cover
/// (spec.md §3 "internal start" during the Created lifecycle is the
/// one documented exception to the matrix).
pub(crate) async fn bootstrap_engine(manager: &Arc<ConManager>, machine: &Arc<Machine>) -> Result<(), Error> {
    machine.hooks.pre_start(&machine.record())?;
    machine.engine.start().await?;
    machine.engine.wait(MachineState::Running, manager.config().start_stop_timeout).await?;
    Ok(())
}

/// Stop the bootstrap engine quietly after initial setup, without the
/// full `onStop` teardown sequence (no runtime-state was ever
/// published for it). Failures are logged, not propagated: a machine
/// that fails to stop cleanly here still needs to land in `Stopped` so
/// `create` can finish.
pub(crate) async fn shutdown_engine_quietly(machine: &Arc<Machine>) {
    if let Err(e) = machine.engine.shutdown(Duration::from_secs(5)).await {
        warn!(id = %machine.id, error = %e, "bootstrap engine shutdown failed");
        if let Err(e) = machine.engine.stop().await {
            warn!(id = %machine.id, error = %e, "bootstrap engine kill also failed");
        }
    }
}

/// Start a `Stopped` machine (spec §4.7 "Start").
#[instrument(skip(manager, machine), fields(id = %machine.id))]
pub async fn start(manager: &Arc<ConManager>, machine: &Arc<Machine>) -> Result<(), Error> {
    let from = machine.transition(MachineState::Starting, false, Some(&manager.store))?;

    if let Err(e) = start_body(manager, machine).await {
        if let Err(revert_err) = machine.transition(from, true, Some(&manager.store)) {
            warn!(id = %machine.id, error = %revert_err, "reverting failed start's state transition also failed");
        }
        return Err(e);
    }
    Ok(())
}

async fn start_body(manager: &Arc<ConManager>, machine: &Arc<Machine>) -> Result<(), Error> {
    let record = machine.record();
    machine.hooks.pre_start(&record)?;
    machine.engine.start().await?;
    machine.engine.wait(MachineState::Running, manager.config().start_stop_timeout).await?;

    if let Err(e) = post_start(manager, machine, &record).await {
        let _ = stop(manager, machine, true).await;
        return Err(e);
    }
    Ok(())
}

async fn post_start(manager: &Arc<ConManager>, machine: &Arc<Machine>, record: &conman_core::MachineRecord) -> Result<(), Error> {
    let freezer = machine.hooks.make_freezer(record);
    let agent = manager.collaborators.agent_factory.connect(machine.id)?;
    let port_monitor = (manager.collaborators.port_monitor_factory)(machine.id)?;

    let watched_id = machine.id;
    let manager_for_close = Arc::clone(manager);
    let runtime = RuntimeState::construct(
        &machine.runtime_state,
        machine.id,
        machine.engine.as_ref(),
        freezer,
        agent.clone(),
        port_monitor.clone(),
        move || {
            let manager_for_close = Arc::clone(&manager_for_close);
            tokio::spawn(async move {
                if let Some(machine) = manager_for_close.get(watched_id) {
                    warn!(id = %watched_id, "agent channel closed, triggering internal stop");
                    if let Err(e) = stop(&manager_for_close, &machine, true).await {
                        warn!(id = %watched_id, error = %e, "internal stop after agent close failed");
                    }
                }
            });
        },
    )
    .await?;

    if !record.config.isolated {
        let forward_engine = Arc::new(ForwardEngine::new(
            machine.id,
            Arc::clone(&manager.forwards),
            agent,
            Arc::clone(&manager.collaborators.host_controller),
            port_monitor,
            manager.subnet,
        ));
        manager.forward_engines.write().insert(machine.id, Arc::clone(&forward_engine));
        let token = runtime.jobs().cancellation_token();
        runtime.jobs().spawn(debounced_rescan_loop(forward_engine, manager.config().autofwd_debounce, token));
    }

    machine.hooks.post_start(record)?;
    machine.transition(MachineState::Running, true, Some(&manager.store))?;
    info!(id = %machine.id, "machine started");
    Ok(())
}

async fn debounced_rescan_loop(forward_engine: Arc<ForwardEngine>, debounce: Duration, token: tokio_util::sync::CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(debounce) => {}
        }
        if let Err(e) = forward_engine.rescan().await {
            warn!(error = %e, "periodic forward rescan failed");
        }
    }
}

/// Stop a `Running` machine (spec §4.7 "Stop"). `kill` mirrors
/// `KillProcesses=true`: skip the graceful `Shutdown` attempt and go
/// straight to `Stop`.
#[instrument(skip(manager, machine), fields(id = %machine.id))]
pub async fn stop(manager: &Arc<ConManager>, machine: &Arc<Machine>, kill: bool) -> Result<(), Error> {
    if machine.state() != MachineState::Running {
        return Err(Error::NotRunning(machine.id));
    }
    if manager.is_stopping() && !kill {
        return Err(Error::Stopping);
    }

    let from = machine.transition(MachineState::Stopping, true, Some(&manager.store))?;
    if let Err(e) = stop_body(manager, machine, kill).await {
        if let Err(revert_err) = machine.transition(from, true, Some(&manager.store)) {
            warn!(id = %machine.id, error = %revert_err, "reverting failed stop's state transition also failed");
        }
        return Err(e);
    }
    Ok(())
}

async fn stop_body(manager: &Arc<ConManager>, machine: &Arc<Machine>, kill: bool) -> Result<(), Error> {
    let timeout = manager.config().start_stop_timeout;

    if let Some(runtime) = machine.runtime_state.get() {
        if let Some(freezer) = runtime.freezer() {
            freezer.begin_use();
            freezer.apply(machine.engine.as_ref()).await;
        }
        if let Some(agent) = runtime.agent() {
            agent.synthetic_warn_stop().await;
        }
    }

    if !kill {
        if machine.engine.shutdown(Duration::from_secs(5)).await.is_err() && machine.engine.running() {
            machine.engine.stop().await?;
        }
    } else {
        machine.engine.stop().await?;
    }

    machine
        .engine
        .wait(MachineState::Stopped, timeout)
        .await
        .map_err(|_| Error::Timeout { id: machine.id, op: "stop", elapsed: timeout })?;

    on_stop(manager, machine).await;
    Ok(())
}

async fn on_stop(manager: &Arc<ConManager>, machine: &Arc<Machine>) {
    manager.forward_engines.write().remove(&machine.id);
    for spec in manager.forwards.snapshot_for(machine.id) {
        manager.forwards.remove(&spec, machine.id);
    }
    machine.runtime_state.teardown().await;

    let record = machine.record();
    if let Err(e) = machine.hooks.post_stop(&record) {
        warn!(id = %machine.id, error = %e, "post-stop hook failed");
    }
    if let Err(e) = machine.transition(MachineState::Stopped, true, Some(&manager.store)) {
        warn!(id = %machine.id, error = %e, "persisting Stopped after onStop failed");
    }
    info!(id = %machine.id, "machine stopped");
}

/// Report that a machine's init already stopped out from under us (the
/// in-VM post-stop hook calling `InternalReportStopped`, spec §4.10).
/// Idempotent: a machine that is not `Running` is left untouched.
pub async fn report_stopped(manager: &Arc<ConManager>, machine: &Arc<Machine>) {
    if machine.state() != MachineState::Running {
        return;
    }
    if let Err(e) = stop(manager, machine, true).await {
        warn!(id = %machine.id, error = %e, "report_stopped's internal stop failed");
    }
}

/// Restart: stop then start (spec §4.7 "Restart").
pub async fn restart(manager: &Arc<ConManager>, machine: &Arc<Machine>) -> Result<(), Error> {
    stop(manager, machine, false).await?;
    start(manager, machine).await
}

/// Freeze/unfreeze (spec §4.7): thin wrappers over the container
/// engine. Fail `NotRunning` if the machine isn't `Running`.
pub async fn freeze(machine: &Arc<Machine>) -> Result<(), Error> {
    if machine.state() != MachineState::Running {
        return Err(Error::NotRunning(machine.id));
    }
    if let Some(runtime) = machine.runtime_state.get() {
        if let Some(freezer) = runtime.freezer() {
            freezer.begin_freeze();
            freezer.apply(machine.engine.as_ref()).await;
            return Ok(());
        }
    }
    machine.engine.freeze().await
}

pub async fn unfreeze(machine: &Arc<Machine>) -> Result<(), Error> {
    if machine.state() != MachineState::Running {
        return Err(Error::NotRunning(machine.id));
    }
    if let Some(runtime) = machine.runtime_state.get() {
        if let Some(freezer) = runtime.freezer() {
            freezer.end_freeze();
            freezer.apply(machine.engine.as_ref()).await;
            return Ok(());
        }
    }
    machine.engine.unfreeze().await
}

/// Used by the watchdog (C9): compare recorded state to the engine's
/// actual state and, if they disagree, dispatch to `start`/`stop`'s
/// internal completion paths.
pub async fn refresh_state(manager: &Arc<ConManager>, machine: &Arc<Machine>) -> bool {
    let recorded_running = machine.state() == MachineState::Running;
    let actually_running = machine.engine.running();
    if recorded_running == actually_running {
        return false;
    }
    if actually_running {
        adopt_running(manager, machine).await;
    } else {
        warn!(id = %machine.id, "watchdog found engine stopped but record says running, reconciling");
        report_stopped(manager, machine).await;
    }
    true
}

/// Bring a `Stopped` record whose engine turned out to already be
/// running back in line, without skipping the transition matrix:
/// `Stopped -> Starting` then the same `post_start` construction
/// [`start_body`] runs, landing on `Starting -> Running`. Either step
/// failing stops the orphaned engine instead of leaving the record
/// permanently wedged in `Starting`.
async fn adopt_running(manager: &Arc<ConManager>, machine: &Arc<Machine>) {
    warn!(id = %machine.id, "watchdog found engine running but record says stopped, adopting");
    let from = match machine.transition(MachineState::Starting, true, Some(&manager.store)) {
        Ok(from) => from,
        Err(e) => {
            warn!(id = %machine.id, error = %e, "adopting orphaned running engine failed to enter Starting");
            return;
        }
    };

    let record = machine.record();
    if let Err(e) = post_start(manager, machine, &record).await {
        warn!(id = %machine.id, error = %e, "adopting orphaned running engine failed post_start, stopping it");
        if let Err(revert_err) = machine.transition(from, true, Some(&manager.store)) {
            warn!(id = %machine.id, error = %revert_err, "reverting failed adopt's state transition also failed");
        }
        if let Err(stop_err) = machine.engine.stop().await {
            warn!(id = %machine.id, error = %stop_err, "stopping orphaned engine after failed adopt also failed");
        }
    }
}
