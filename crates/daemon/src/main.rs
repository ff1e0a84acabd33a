// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

//! conmand: the in-VM container-platform supervisor daemon (spec.md
//! §1). Loads configuration, opens the persistence store, restores
//! every persisted machine, starts the reconciliation watchdog and the
//! two JSON-RPC listeners, and tears everything down in reverse order
//! on shutdown.

mod archive;
mod collaborators;
mod config;
mod fsops;
mod lifecycle;
mod machine;
mod manager;
mod reconcile;
mod rpc;

use collaborators::Collaborators;
use config::Config;
use conman_engine::Subnet;
use conman_store::Store;
use fs2::FileExt;
use manager::ConManager;
use std::fs::File;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_tracing();

    let config_path = std::env::var("CONMAN_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/etc/conman/conman.toml"));
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        error!(error = %e, dir = %config.data_dir.display(), "failed to create data directory");
        std::process::exit(1);
    }
    let _lock = match acquire_instance_lock(&config.data_dir) {
        Ok(lock) => lock,
        Err(e) => {
            error!(error = %e, "another conmand instance already holds the data directory lock");
            std::process::exit(1);
        }
    };

    let store = match Store::open(config.db_path()) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "failed to open store");
            std::process::exit(1);
        }
    };

    let collaborators = build_collaborators(&config);
    let subnet = Subnet::new(IpAddr::V4(std::net::Ipv4Addr::new(10, 200, 0, 0)), 16);
    let manager = ConManager::new(config.clone(), store, collaborators, subnet);

    if let Err(e) = manager.bootstrap().await {
        error!(error = %e, "bootstrap failed");
        std::process::exit(1);
    }

    let watchdog = reconcile::spawn(Arc::clone(&manager));

    let rpc_router = rpc::router(Arc::clone(&manager));
    let rpc_listener = match tokio::net::TcpListener::bind(config.rpc_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %config.rpc_addr, "failed to bind rpc listener");
            std::process::exit(1);
        }
    };
    let internal_listener = match tokio::net::TcpListener::bind(config.internal_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %config.internal_addr, "failed to bind internal listener");
            std::process::exit(1);
        }
    };
    info!(rpc_addr = %config.rpc_addr, internal_addr = %config.internal_addr, "conmand listening");

    let rpc_server = axum::serve(rpc_listener, rpc_router.clone());
    let internal_server = axum::serve(internal_listener, rpc_router);

    tokio::select! {
        result = rpc_server => {
            if let Err(e) = result {
                error!(error = %e, "rpc listener exited");
            }
        }
        result = internal_server => {
            if let Err(e) = result {
                error!(error = %e, "internal listener exited");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    watchdog.stop();
    manager.shutdown().await;
    info!("conmand shut down cleanly");
}

/// `fs2`-based single-instance lock over the data directory, the same
/// mechanism the teacher's startup path uses to refuse a second daemon
/// against the same state directory.
fn acquire_instance_lock(data_dir: &std::path::Path) -> std::io::Result<File> {
    let lock_path = data_dir.join("conmand.lock");
    let file = File::create(lock_path)?;
    file.try_lock_exclusive()?;
    Ok(file)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// `conman-collab`'s engine/agent/host-controller/registrar/port-monitor
/// seams are explicitly "interfaces consumed" (spec §6) whose real
/// implementations live outside this workspace (see that crate's own
/// module docs). Until a real adapter crate is wired in, conmand runs
/// against the in-memory fakes it ships under `test-support` — a
/// drop-in swap behind this one function once a real engine driver
/// exists (see DESIGN.md).
fn build_collaborators(config: &Config) -> Collaborators {
    use conman_collab::{FakeAgentClient, FakeContainerEngine, FakeHostControllerClient, FakeImageFetcher, FakePortMonitor, FakeRegistrar};

    let registrar = FakeRegistrar::new();
    let host_controller = Arc::new(FakeHostControllerClient::new());
    let image_fetcher = Arc::new(FakeImageFetcher::new());

    Collaborators {
        engine_factory: Arc::new(FixedEngineFactory),
        agent_factory: Arc::new(FixedAgentFactory),
        image_fetcher,
        host_controller,
        mdns: Arc::new(registrar.clone()),
        nfs: Arc::new(registrar),
        port_monitor_factory: Arc::new(|_id| Ok(Arc::new(FakePortMonitor::new()) as Arc<dyn conman_collab::PortMonitor>)),
        docker_idle_predicate: Arc::new(|| false),
        docker_stale_pid_path: config.data_dir.join("docker.pid"),
    }
}

struct FixedEngineFactory;

impl conman_collab::ContainerEngineFactory for FixedEngineFactory {
    type Engine = conman_collab::FakeContainerEngine;

    fn new_engine(&self, _id: conman_core::MachineId, _dir: &PathBuf) -> Result<Self::Engine, conman_core::Error> {
        Ok(conman_collab::FakeContainerEngine::new())
    }
}

struct FixedAgentFactory;

impl conman_collab::AgentClientFactory for FixedAgentFactory {
    type Client = conman_collab::FakeAgentClient;

    fn connect(&self, _id: conman_core::MachineId) -> Result<Self::Client, conman_core::Error> {
        Ok(conman_collab::FakeAgentClient::new())
    }
}

