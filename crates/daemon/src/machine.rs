// SPDX-License-Identifier: MIT

//! The in-memory machine runtime object (spec.md §3 "Machine runtime
//! object", C6/C7). One `Machine` exists per registered record, for as
//! long as that record is registered; `record` is the `c.mu`-guarded
//! field set spec §5 describes (name, image, config, builtin, state),
//! everything else here is either immutable for the machine's lifetime
//! or has its own internal synchronization ([`RuntimeStateSlot`],
//! [`JobManager`]).

use conman_collab::ContainerEngine;
use conman_core::{can_transition, Error, MachineId, MachineRecord, MachineState};
use conman_engine::{Hooks, JobManager, MutationHolds, RuntimeStateSlot};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything about one machine that outlives a single RPC call.
/// `dir`/`rootfs_dir` are fixed at `restore_one` time; `record` is the
/// only field mutated after construction, always under `record`'s own
/// lock (spec §5's `c.mu`).
pub struct Machine {
    pub id: MachineId,
    pub dir: PathBuf,
    pub rootfs_dir: PathBuf,
    pub engine: Arc<dyn ContainerEngine>,
    pub hooks: Arc<dyn Hooks>,
    pub holds: Arc<MutationHolds>,
    pub jobs: JobManager,
    pub runtime_state: RuntimeStateSlot,
    record: Mutex<MachineRecord>,
}

impl Machine {
    pub fn new(
        id: MachineId,
        dir: PathBuf,
        rootfs_dir: PathBuf,
        engine: Arc<dyn ContainerEngine>,
        hooks: Arc<dyn Hooks>,
        record: MachineRecord,
    ) -> Self {
        Self {
            id,
            dir,
            rootfs_dir,
            engine,
            hooks,
            holds: Arc::new(MutationHolds::new()),
            jobs: JobManager::new(id),
            runtime_state: RuntimeStateSlot::new(),
            record: Mutex::new(record),
        }
    }

    /// A consistent snapshot of the persisted fields. Cheap: `MachineRecord`
    /// is a handful of `String`/small-enum fields.
    pub fn record(&self) -> MachineRecord {
        self.record.lock().clone()
    }

    pub fn name(&self) -> String {
        self.record.lock().name.clone()
    }

    pub fn state(&self) -> MachineState {
        self.record.lock().state
    }

    pub fn is_builtin(&self) -> bool {
        self.record.lock().is_builtin()
    }

    /// Validate and apply a state transition, persisting the result
    /// before returning (spec §5: "persistence happens-before the
    /// return of a completed external transition"). Returns the
    /// pre-transition state. No persistence (and no error) happens if
    /// `store` is `None`, which callers use during manager shutdown
    /// (spec.md §3: "never [persisted] during manager shutdown").
    pub fn transition(
        &self,
        to: MachineState,
        is_internal: bool,
        store: Option<&conman_store::Store>,
    ) -> Result<MachineState, Error> {
        let mut record = self.record.lock();
        let from = record.state;
        if !can_transition(from, to, is_internal) {
            return Err(Error::StateTransition { id: self.id, from, to, is_internal });
        }
        record.state = to;
        if let Some(store) = store {
            store.set_container(self.id, &record)?;
        }
        Ok(from)
    }

    /// Overwrite the whole record (used by rename and by hooks'
    /// `ConfigHook::apply` at restore time), persisting immediately.
    pub fn replace_record(&self, new_record: MachineRecord, store: &conman_store::Store) -> Result<(), Error> {
        store.set_container(self.id, &new_record)?;
        *self.record.lock() = new_record;
        Ok(())
    }

    /// Mutate the record in place under the lock without a state-machine
    /// check (config edits that aren't a state transition), persisting
    /// the result.
    pub fn with_record_mut<T>(
        &self,
        store: &conman_store::Store,
        f: impl FnOnce(&mut MachineRecord) -> T,
    ) -> Result<T, Error> {
        let mut record = self.record.lock();
        let result = f(&mut record);
        store.set_container(self.id, &record)?;
        Ok(result)
    }
}
