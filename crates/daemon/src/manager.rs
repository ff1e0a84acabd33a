// SPDX-License-Identifier: MIT

//! The container manager (spec.md §4.6, C6): the two registries, the
//! default/last-machine pointers, and the create/clone/import/export/
//! delete/rename mutations. Lifecycle transitions themselves
//! (start/stop/restart/freeze/unfreeze, C7) live in [`crate::lifecycle`];
//! this module is the registry and the mutations that allocate or
//! retire a `Machine` entirely.

use crate::collaborators::Collaborators;
use crate::config::Config;
use crate::{archive, fsops, lifecycle};
use crate::machine::Machine;
use conman_core::{
    resolve_image, validate_name, Clock, Error, ImageSpec, MachineConfig, MachineId, MachineRecord, MachineState,
    SystemClock,
};
use conman_engine::{hooks_for, DockerHooks, ForwardTable};
use conman_store::Store;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Name used for the mutation hold taken across a create/clone/export/
/// import's asynchronous tail (spec §3 "a named mutation hold on its
/// source (or new machine) for the duration").
pub const HOLD_LIFECYCLE_MUTATION: &str = "lifecycle_mutation";

pub struct ConManager {
    pub(crate) config: Config,
    pub(crate) store: Store,
    pub(crate) collaborators: Collaborators,
    docker_hooks: Arc<DockerHooks>,
    by_id: RwLock<HashMap<MachineId, Arc<Machine>>>,
    by_name: RwLock<HashMap<String, MachineId>>,
    default_id: RwLock<Option<MachineId>>,
    last_id: RwLock<Option<MachineId>>,
    stopping: AtomicBool,
    pub(crate) forwards: Arc<ForwardTable>,
    pub(crate) subnet: conman_engine::Subnet,
    pub(crate) forward_engines: RwLock<HashMap<MachineId, Arc<conman_engine::ForwardEngine>>>,
    clock: SystemClock,
}

impl ConManager {
    pub fn new(config: Config, store: Store, collaborators: Collaborators, subnet: conman_engine::Subnet) -> Arc<Self> {
        let docker_hooks = Arc::new(DockerHooks {
            stale_pid_path: collaborators.docker_stale_pid_path.clone(),
            idle_predicate: collaborators.docker_idle_predicate.clone(),
            debounce: config.freezer_debounce,
        });
        Arc::new(Self {
            config,
            store,
            collaborators,
            docker_hooks,
            by_id: RwLock::new(HashMap::new()),
            by_name: RwLock::new(HashMap::new()),
            default_id: RwLock::new(None),
            last_id: RwLock::new(None),
            stopping: AtomicBool::new(false),
            forwards: Arc::new(ForwardTable::new()),
            subnet,
            forward_engines: RwLock::new(HashMap::new()),
            clock: SystemClock,
        })
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // --- registry reads ----------------------------------------------------

    pub fn get(&self, id: MachineId) -> Option<Arc<Machine>> {
        self.by_id.read().get(&id).cloned()
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<Machine>> {
        let id = *self.by_name.read().get(name)?;
        self.get(id)
    }

    pub fn list(&self) -> Vec<Arc<Machine>> {
        self.by_id.read().values().cloned().collect()
    }

    pub fn forward_engine_for(&self, id: MachineId) -> Option<Arc<conman_engine::ForwardEngine>> {
        self.forward_engines.read().get(&id).cloned()
    }

    pub fn forwards_table(&self) -> &Arc<ForwardTable> {
        &self.forwards
    }

    pub fn default_machine(&self) -> Option<Arc<Machine>> {
        let id = (*self.default_id.read())?;
        self.get(id)
    }

    pub fn set_default(&self, id: MachineId) -> Result<(), Error> {
        self.store.set_default_container_id(id)?;
        *self.default_id.write() = Some(id);
        Ok(())
    }

    pub fn last_machine(&self) -> Option<Arc<Machine>> {
        let id = (*self.last_id.read())?;
        self.get(id)
    }

    fn note_last(&self, id: MachineId) {
        if self.store.set_last_container_id(id).is_ok() {
            *self.last_id.write() = Some(id);
        }
    }

    // --- bootstrap -----------------------------------------------------------

    /// Process start-up (spec §5 "Process-wide state", init order steps
    /// 2-4): restore every persisted record, registering mDNS/NFS for
    /// anything not stuck in `Creating`.
    #[instrument(skip_all)]
    pub async fn bootstrap(self: &Arc<Self>) -> Result<(), Error> {
        self.default_id.write().clone_from(&self.store.get_default_container_id()?);
        self.last_id.write().clone_from(&self.store.get_last_container_id()?);

        for record in self.store.list_containers()? {
            if let Err(e) = self.restore_one(record.clone(), false) {
                warn!(id = %record.id, error = %e, "failed to restore machine, skipping");
            }
        }
        Ok(())
    }

    /// Construct the in-memory [`Machine`] for `record` and install it
    /// into the registry (spec §4.6). `is_new` forces the in-memory
    /// state to `Creating` regardless of what `record.state` says (a
    /// freshly allocated record is always passed in as `Creating`
    /// anyway; the flag exists so restore and create share one path).
    pub fn restore_one(self: &Arc<Self>, mut record: MachineRecord, is_new: bool) -> Result<Arc<Machine>, Error> {
        if is_new {
            record.state = MachineState::Creating;
        }

        let hooks = hooks_for(&record, Arc::clone(&self.docker_hooks));
        hooks.apply(&mut record);

        let dir = self.config.container_dir(record.id);
        let rootfs_dir = dir.join("rootfs");
        std::fs::create_dir_all(&rootfs_dir)
            .map_err(|e| Error::ExternalProcess { program: "mkdir".to_string(), stderr: e.to_string() })?;

        let engine = self.collaborators.engine_factory.new_engine(record.id, &dir)?;
        self.store.set_container(record.id, &record)?;

        let machine = Arc::new(Machine::new(record.id, dir, rootfs_dir, engine, hooks, record.clone()));

        self.by_id.write().insert(record.id, Arc::clone(&machine));
        self.by_name.write().insert(record.name.clone(), record.id);

        if !is_new && record.state != MachineState::Creating {
            if !record.config.isolated {
                self.collaborators.nfs.bind(record.id, &record.name);
            }
            self.collaborators.mdns.register(record.id, &record.name, &[]);
        }

        Ok(machine)
    }

    // --- create --------------------------------------------------------------

    /// Validate and allocate a new machine in `Creating` (spec §4.6
    /// `begin_create`). Does not materialize a rootfs or start anything.
    fn begin_create(self: &Arc<Self>, name: &str, image: ImageSpec, config: MachineConfig) -> Result<Arc<Machine>, Error> {
        if self.is_stopping() {
            return Err(Error::Stopping);
        }
        validate_name(name).map_err(|e| Error::InvalidName(name.to_string(), name_error_message(e)))?;
        if self.by_name.read().contains_key(name) {
            return Err(Error::NameTaken(name.to_string()));
        }
        let resolved = resolve_image(&image).map_err(|e| {
            Error::Unsupported("unsupported image distro").context(format!("resolving image {}", e.0))
        })?;

        let record = MachineRecord {
            id: MachineId::new(),
            name: name.to_string(),
            image: resolved,
            config,
            builtin: None,
            state: MachineState::Creating,
        };
        self.restore_one(record, true)
    }

    /// Full creation flow (spec §3 "Created", §4.6 `create`): allocate,
    /// materialize rootfs, bootstrap the engine and run in-guest initial
    /// setup, transition to `Stopped`, and register collaborators. Any
    /// failure along the way tears the half-created machine down via
    /// the internal delete path.
    #[instrument(skip(self, config), fields(name = %name))]
    pub async fn create(self: &Arc<Self>, name: &str, image: ImageSpec, config: MachineConfig) -> Result<Arc<Machine>, Error> {
        let machine = self.begin_create(name, image, config)?;
        match self.finish_create(&machine).await {
            Ok(()) => Ok(machine),
            Err(e) => {
                warn!(id = %machine.id, error = %e, "create failed, cleaning up");
                if let Err(cleanup_err) = self.delete_internal(machine.id).await {
                    warn!(id = %machine.id, error = %cleanup_err, "cleanup after failed create also failed");
                }
                Err(e)
            }
        }
    }

    async fn finish_create(self: &Arc<Self>, machine: &Arc<Machine>) -> Result<(), Error> {
        let record = machine.record();
        let spec = record.image.clone();
        self.collaborators.image_fetcher.materialize_rootfs(&spec, &machine.rootfs_dir).await?;

        lifecycle::bootstrap_engine(self, machine).await?;

        let setup = conman_collab::InitialSetupConfig { default_username: record.config.default_username.clone() };
        let agent = self.collaborators.agent_factory.connect(machine.id)?;
        agent.initial_setup_stage1(&setup).await?;
        agent.initial_setup_stage2(&setup).await?;

        lifecycle::shutdown_engine_quietly(machine).await;
        machine.transition(MachineState::Stopped, true, Some(&self.store))?;

        if !record.is_builtin() && self.default_id.read().is_none() {
            self.set_default(machine.id)?;
        }
        if !record.config.isolated {
            self.collaborators.nfs.bind(machine.id, &record.name);
        }
        self.collaborators.mdns.register(machine.id, &record.name, &[]);
        info!(id = %machine.id, name = %record.name, "machine created");
        Ok(())
    }

    // --- delete --------------------------------------------------------------

    pub async fn delete_external(self: &Arc<Self>, id: MachineId) -> Result<(), Error> {
        self.delete(id, false).await
    }

    pub(crate) async fn delete_internal(self: &Arc<Self>, id: MachineId) -> Result<(), Error> {
        self.delete(id, true).await
    }

    #[instrument(skip(self))]
    async fn delete(self: &Arc<Self>, id: MachineId, is_internal: bool) -> Result<(), Error> {
        let machine = self.get(id).ok_or(Error::NotFoundById(id))?;
        let record = machine.record();
        if record.is_builtin() && !record.allows_data_wipe() {
            return Err(Error::BuiltinForbidden("delete", id));
        }

        lifecycle::stop(self, &machine, true).await.or_else(|e| {
            if e.kind() == conman_core::ErrorKind::NotRunning { Ok(()) } else { Err(e) }
        })?;

        machine.transition(MachineState::Deleting, is_internal, Some(&self.store))?;
        machine.jobs.close().await;

        if !record.config.isolated {
            self.collaborators.nfs.unbind(id);
        }
        self.collaborators.mdns.deregister(id);

        fsops::delete_data_dir(&machine.dir).await?;
        if let Some(parent) = machine.dir.parent() {
            fsops::fsync_dir(parent).await?;
        }

        self.by_id.write().remove(&id);
        self.by_name.write().remove(&record.name);
        self.store.delete_container(id)?;

        if *self.default_id.read() == Some(id) {
            *self.default_id.write() = None;
        }
        info!(id = %id, "machine deleted");
        Ok(())
    }

    // --- rename ----------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn rename(self: &Arc<Self>, id: MachineId, new_name: &str) -> Result<(), Error> {
        validate_name(new_name).map_err(|e| Error::InvalidName(new_name.to_string(), name_error_message(e)))?;

        let mut by_name = self.by_name.write();
        if by_name.contains_key(new_name) {
            return Err(Error::NameTaken(new_name.to_string()));
        }
        let machine = self.get(id).ok_or(Error::NotFoundById(id))?;
        let old_record = machine.record();
        if old_record.is_builtin() {
            return Err(Error::BuiltinForbidden("rename", id));
        }
        let old_name = old_record.name.clone();

        by_name.remove(&old_name);
        by_name.insert(new_name.to_string(), id);

        let mut new_record = old_record.clone();
        new_record.name = new_name.to_string();
        if let Err(e) = machine.replace_record(new_record, &self.store) {
            by_name.remove(new_name);
            by_name.insert(old_name, id);
            return Err(e);
        }
        drop(by_name);

        if let Err(e) = self.rename_hostname(&machine, new_name).await {
            warn!(id = %id, error = %e, "in-guest hostname update failed, reverting rename");
            let mut by_name = self.by_name.write();
            by_name.remove(new_name);
            by_name.insert(old_name.clone(), id);
            if let Err(revert_err) = machine.replace_record(old_record, &self.store) {
                warn!(id = %id, error = %revert_err, "reverting rename record also failed");
            }
            return Err(e);
        }
        Ok(())
    }

    async fn rename_hostname(&self, machine: &Arc<Machine>, new_name: &str) -> Result<(), Error> {
        if machine.state() == MachineState::Running {
            let agent = self.collaborators.agent_factory.connect(machine.id)?;
            agent.update_hostname(new_name).await
        } else {
            let agent = self.collaborators.agent_factory.connect(machine.id)?;
            agent.write_hostname_files(&machine.rootfs_dir, new_name)
        }
    }

    // --- clone / import / export ---------------------------------------------

    #[instrument(skip(self, new_name))]
    pub async fn clone_machine(self: &Arc<Self>, source_id: MachineId, new_name: &str) -> Result<Arc<Machine>, Error> {
        let source = self.get(source_id).ok_or(Error::NotFoundById(source_id))?;
        let source_record = source.record();
        if source_record.is_builtin() {
            return Err(Error::BuiltinForbidden("clone", source_id));
        }

        let token = source.holds.begin(HOLD_LIFECYCLE_MUTATION);
        let result = self.clone_body(&source, new_name).await;
        token.end();
        result
    }

    async fn clone_body(self: &Arc<Self>, source: &Arc<Machine>, new_name: &str) -> Result<Arc<Machine>, Error> {
        let source_record = source.record();
        let new_machine = self.begin_create(new_name, source_record.image.clone(), source_record.config.clone())?;
        let source_parent = source.jobs.cancellation_token();

        let copy_result = new_machine
            .jobs
            .run_context(&source_parent, |_ctx| async {
                let was_running = source.state() == MachineState::Running;
                if was_running {
                    source.engine.freeze().await?;
                }
                let copy = copy_rootfs(&source.rootfs_dir, &new_machine.rootfs_dir).await;
                if was_running {
                    source.engine.unfreeze().await?;
                }
                copy
            })
            .await;

        if let Err(e) = copy_result {
            let _ = self.delete_internal(new_machine.id).await;
            return Err(e);
        }

        let agent = self.collaborators.agent_factory.connect(new_machine.id)?;
        if let Err(e) = agent.write_hostname_files(&new_machine.rootfs_dir, new_name) {
            warn!(id = %new_machine.id, error = %e, "clone hostname rewrite failed");
        }

        if !source_record.config.isolated {
            self.collaborators.nfs.bind(new_machine.id, new_name);
        }
        self.collaborators.mdns.register(new_machine.id, new_name, &[]);
        new_machine.transition(MachineState::Stopped, true, Some(&self.store))?;
        Ok(new_machine)
    }

    #[instrument(skip(self))]
    pub async fn export(self: &Arc<Self>, id: MachineId, dest: std::path::PathBuf) -> Result<(), Error> {
        let machine = self.get(id).ok_or(Error::NotFoundById(id))?;
        let record = machine.record();
        if record.is_builtin() {
            return Err(Error::BuiltinForbidden("export", id));
        }

        let token = machine.holds.begin(HOLD_LIFECYCLE_MUTATION);
        let was_running = machine.state() == MachineState::Running;
        if was_running {
            if let Err(e) = machine.engine.freeze().await {
                token.end();
                return Err(e);
            }
        }

        let header = archive::ExportHeader {
            version: 1,
            record: record.clone(),
            exported_at_epoch_ms: self.clock.epoch_ms(),
            host_uid: 0,
            host_gid: 0,
            source_fs: "unknown".to_string(),
        };
        let result = archive::export(dest, machine.rootfs_dir.clone(), header).await;

        if was_running {
            if let Err(e) = machine.engine.unfreeze().await {
                warn!(id = %id, error = %e, "re-unfreezing after export failed");
            }
        }
        token.end();
        result
    }

    /// Extract the archive into a throwaway staging directory first so
    /// its `config.json` header — and with it, the image distro the
    /// machine was originally created from — is known before a machine
    /// record is allocated. `begin_create` resolves `image` against the
    /// platform's supported-distro table (spec §4.2); there is no
    /// "imported" distro to fake there, so the real resolved image has
    /// to come from the archive, not be invented ahead of reading it.
    #[instrument(skip(self, new_name))]
    pub async fn import(self: &Arc<Self>, src: std::path::PathBuf, new_name: &str) -> Result<Arc<Machine>, Error> {
        let staging_dir = self.config.data_dir.join("import-staging").join(MachineId::new().as_str());
        let header = archive::import(src, staging_dir.clone()).await;
        let header = match header {
            Ok(h) => h,
            Err(e) => {
                let _ = fsops::delete_data_dir(&staging_dir).await;
                return Err(e);
            }
        };

        let new_machine = match self.begin_create(new_name, header.record.image.clone(), header.record.config.clone()) {
            Ok(m) => m,
            Err(e) => {
                let _ = fsops::delete_data_dir(&staging_dir).await;
                return Err(e);
            }
        };
        let token = new_machine.holds.begin(HOLD_LIFECYCLE_MUTATION);

        let staged_rootfs = staging_dir.join("rootfs");
        let result = new_machine
            .jobs
            .run(|_ctx| async {
                if staged_rootfs.exists() {
                    copy_rootfs(&staged_rootfs, &new_machine.rootfs_dir).await?;
                }
                Ok(())
            })
            .await;
        token.end();
        let _ = fsops::delete_data_dir(&staging_dir).await;

        if let Err(e) = result {
            let _ = self.delete_internal(new_machine.id).await;
            return Err(e);
        }

        let agent = self.collaborators.agent_factory.connect(new_machine.id)?;
        if let Err(e) = agent.write_hostname_files(&new_machine.rootfs_dir, new_name) {
            warn!(id = %new_machine.id, error = %e, "import hostname rewrite failed");
        }

        self.collaborators.mdns.register(new_machine.id, new_name, &[]);
        new_machine.transition(MachineState::Stopped, true, Some(&self.store))?;
        Ok(new_machine)
    }

    // --- shutdown --------------------------------------------------------------

    /// Manager-wide teardown (spec §5 init-order teardown): mark
    /// stopping, internal-stop every running machine, close net
    /// collaborators, flush the store. The caller (main.rs) closes the
    /// RPC listeners and the watchdog before calling this.
    #[instrument(skip_all)]
    pub async fn shutdown(self: &Arc<Self>) {
        self.stopping.store(true, Ordering::SeqCst);
        for machine in self.list() {
            if machine.state() == MachineState::Running {
                if let Err(e) = lifecycle::stop(self, &machine, true).await {
                    warn!(id = %machine.id, error = %e, "internal stop during shutdown failed");
                }
            }
        }
        if let Err(e) = self.store.flush() {
            warn!(error = %e, "store flush during shutdown failed");
        }
        info!("manager shutdown complete");
    }
}

fn name_error_message(e: conman_core::NameError) -> &'static str {
    match e {
        conman_core::NameError::InvalidFormat => "must match ^[a-zA-Z0-9_-]+$",
        conman_core::NameError::Reserved => "name is reserved",
        conman_core::NameError::Empty => "name must not be empty",
    }
}

async fn copy_rootfs(src: &std::path::Path, dst: &std::path::Path) -> Result<(), Error> {
    let src = src.to_path_buf();
    let dst = dst.to_path_buf();
    tokio::task::spawn_blocking(move || copy_dir_recursive(&src, &dst))
        .await
        .map_err(|e| Error::ExternalProcess { program: "copy".to_string(), stderr: e.to_string() })?
}

fn copy_dir_recursive(src: &std::path::Path, dst: &std::path::Path) -> Result<(), Error> {
    std::fs::create_dir_all(dst)
        .map_err(|e| Error::ExternalProcess { program: "copy".to_string(), stderr: e.to_string() })?;
    for entry in
        std::fs::read_dir(src).map_err(|e| Error::ExternalProcess { program: "copy".to_string(), stderr: e.to_string() })?
    {
        let entry = entry.map_err(|e| Error::ExternalProcess { program: "copy".to_string(), stderr: e.to_string() })?;
        let file_type =
            entry.file_type().map_err(|e| Error::ExternalProcess { program: "copy".to_string(), stderr: e.to_string() })?;
        let dest_path = dst.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &dest_path)?;
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())
                .map_err(|e| Error::ExternalProcess { program: "copy".to_string(), stderr: e.to_string() })?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(target, &dest_path)
                .map_err(|e| Error::ExternalProcess { program: "copy".to_string(), stderr: e.to_string() })?;
        } else {
            std::fs::copy(entry.path(), &dest_path)
                .map_err(|e| Error::ExternalProcess { program: "copy".to_string(), stderr: e.to_string() })?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
