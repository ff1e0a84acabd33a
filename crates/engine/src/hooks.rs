// SPDX-License-Identifier: MIT

//! Per-image hooks: a capability set of `{Config, PreStart, PostStart,
//! PostStop, MakeFreezer}` selected by image distro at `restore_one`
//! time (spec §9 "Hooks polymorphism"). `Default` covers every
//! non-builtin image; `Docker` additionally builds a freezer
//! (`make_freezer`), which `Default` machines never have.

use crate::freezer::Freezer;
use conman_core::{Builtin, Error, MachineRecord};
use std::sync::Arc;

pub trait ConfigHook: Send + Sync + 'static {
    fn apply(&self, record: &mut MachineRecord);
}

/// Run before the container engine `start()` call (e.g. Docker's stale
/// pid file removal, spec §4.7).
pub trait PreStartHook: Send + Sync + 'static {
    fn pre_start(&self, record: &MachineRecord) -> Result<(), Error>;
}

/// Run after the engine reports Running and runtime state is published
/// (spec §4.7).
pub trait PostStartHook: Send + Sync + 'static {
    fn post_start(&self, record: &MachineRecord) -> Result<(), Error>;
}

/// Run during teardown, after the engine reports Stopped. Failures are
/// logged but never prevent the machine from reaching Stopped (spec
/// §7).
pub trait PostStopHook: Send + Sync + 'static {
    fn post_stop(&self, record: &MachineRecord) -> Result<(), Error>;
}

/// Builds the per-machine freezer, Docker builtin only (spec §4.5 step
/// 3). Other hook sets return `None`. The freezer's derived target
/// starts at frozen-if-idle (zero use/freeze count); `DockerHooks`
/// never pins it to a fixed target.
pub trait MakeFreezerHook: Send + Sync + 'static {
    fn make_freezer(&self, record: &MachineRecord) -> Option<Arc<Freezer>>;
}

/// The full capability set dispatched to by distro at restore time.
pub trait Hooks: ConfigHook + PreStartHook + PostStartHook + PostStopHook + MakeFreezerHook {}

impl<T: ConfigHook + PreStartHook + PostStartHook + PostStopHook + MakeFreezerHook> Hooks for T {}

/// The hook set every non-builtin image gets: no-ops throughout.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl ConfigHook for DefaultHooks {
    fn apply(&self, _record: &mut MachineRecord) {}
}

impl PreStartHook for DefaultHooks {
    fn pre_start(&self, _record: &MachineRecord) -> Result<(), Error> {
        Ok(())
    }
}

impl PostStartHook for DefaultHooks {
    fn post_start(&self, _record: &MachineRecord) -> Result<(), Error> {
        Ok(())
    }
}

impl PostStopHook for DefaultHooks {
    fn post_stop(&self, _record: &MachineRecord) -> Result<(), Error> {
        Ok(())
    }
}

impl MakeFreezerHook for DefaultHooks {
    fn make_freezer(&self, _record: &MachineRecord) -> Option<Arc<Freezer>> {
        None
    }
}

/// The Docker builtin's hook set: forces isolation, removes a stale pid
/// file before start, and builds a frozen-if-idle freezer whose idle
/// predicate is supplied by the daemon (Docker workload introspection
/// lives outside this crate).
pub struct DockerHooks {
    pub stale_pid_path: std::path::PathBuf,
    pub idle_predicate: Arc<dyn Fn() -> bool + Send + Sync>,
    pub debounce: std::time::Duration,
}

impl ConfigHook for DockerHooks {
    fn apply(&self, record: &mut MachineRecord) {
        record.config.isolated = true;
    }
}

impl PreStartHook for DockerHooks {
    fn pre_start(&self, _record: &MachineRecord) -> Result<(), Error> {
        if self.stale_pid_path.exists() {
            std::fs::remove_file(&self.stale_pid_path)
                .map_err(|e| Error::ExternalProcess { program: "rm".to_string(), stderr: e.to_string() })?;
        }
        Ok(())
    }
}

impl PostStartHook for DockerHooks {
    fn post_start(&self, _record: &MachineRecord) -> Result<(), Error> {
        Ok(())
    }
}

impl PostStopHook for DockerHooks {
    fn post_stop(&self, _record: &MachineRecord) -> Result<(), Error> {
        Ok(())
    }
}

impl MakeFreezerHook for DockerHooks {
    fn make_freezer(&self, _record: &MachineRecord) -> Option<Arc<Freezer>> {
        Some(Arc::new(Freezer::new(self.idle_predicate.clone(), self.debounce)))
    }
}

/// Picks the hook set for a restored/created record by builtin role.
pub fn hooks_for(record: &MachineRecord, docker_hooks: Arc<DockerHooks>) -> Arc<dyn Hooks> {
    match record.builtin {
        Some(Builtin::Docker) => docker_hooks,
        _ => Arc::new(DefaultHooks),
    }
}

#[cfg(test)]
#[path = "hooks_tests.rs"]
mod tests;
