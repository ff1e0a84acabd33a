// SPDX-License-Identifier: MIT

//! Object-safe adapters over the associated-type collaborator
//! factories (spec §6 "consumed" interfaces), plus the bundle of
//! collaborators a [`crate::manager::ConManager`] is constructed with.
//!
//! [`ContainerEngineFactory`]/[`AgentClientFactory`] carry an
//! associated `Engine`/`Client` type, so they can't be stored as
//! `Arc<dyn ContainerEngineFactory>` directly — the manager needs to
//! hold one factory value that can produce either a real or a fake
//! collaborator behind a single object-safe interface. These blanket
//! impls erase the associated type the same way `conman_collab`'s own
//! traits erase their concrete adapter behind `Arc<dyn ContainerEngine>`.

use conman_collab::{ContainerEngineFactory, AgentClientFactory, ContainerEngine, AgentClient, HostControllerClient, MdnsRegistrar, NfsRegistrar, PortMonitor, ImageFetcher};
use conman_core::{Error, MachineId};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Object-safe stand-in for [`ContainerEngineFactory`].
pub trait DynEngineFactory: Send + Sync + 'static {
    fn new_engine(&self, id: MachineId, dir: &Path) -> Result<Arc<dyn ContainerEngine>, Error>;
}

impl<T: ContainerEngineFactory> DynEngineFactory for T {
    fn new_engine(&self, id: MachineId, dir: &Path) -> Result<Arc<dyn ContainerEngine>, Error> {
        let dir = dir.to_path_buf();
        let engine = ContainerEngineFactory::new_engine(self, id, &dir)?;
        Ok(Arc::new(engine))
    }
}

/// Object-safe stand-in for [`AgentClientFactory`].
pub trait DynAgentFactory: Send + Sync + 'static {
    fn connect(&self, id: MachineId) -> Result<Arc<dyn AgentClient>, Error>;
}

impl<T: AgentClientFactory> DynAgentFactory for T {
    fn connect(&self, id: MachineId) -> Result<Arc<dyn AgentClient>, Error> {
        let client = AgentClientFactory::connect(self, id)?;
        Ok(Arc::new(client))
    }
}

/// A per-machine factory for the BPF port monitor, scoped to the
/// machine's netns (spec §4.5 step 5). `conman-collab` has no factory
/// trait for this seam (only the scoped-instance trait itself), so
/// this is a plain closure, the same shape `conman-engine`'s
/// `DockerHooks.idle_predicate` already uses for a daemon-supplied
/// callback.
pub type PortMonitorFactory = Arc<dyn Fn(MachineId) -> Result<Arc<dyn PortMonitor>, Error> + Send + Sync>;

/// Everything [`crate::manager::ConManager::new`] needs from outside
/// this crate (spec §6 "interfaces consumed" plus the two registration
/// seams). Bundled into one struct so construction call sites don't
/// carry eight positional `Arc` parameters.
pub struct Collaborators {
    pub engine_factory: Arc<dyn DynEngineFactory>,
    pub agent_factory: Arc<dyn DynAgentFactory>,
    pub image_fetcher: Arc<dyn ImageFetcher>,
    pub host_controller: Arc<dyn HostControllerClient>,
    pub mdns: Arc<dyn MdnsRegistrar>,
    pub nfs: Arc<dyn NfsRegistrar>,
    pub port_monitor_factory: PortMonitorFactory,
    /// Idle predicate wired into the Docker builtin's freezer (spec
    /// §4.4, §4.7: "Docker has no running workloads"). Docker workload
    /// introspection itself lives outside this crate; a caller that
    /// never creates a Docker builtin can pass a constant `false`.
    pub docker_idle_predicate: Arc<dyn Fn() -> bool + Send + Sync>,
    pub docker_stale_pid_path: PathBuf,
}
