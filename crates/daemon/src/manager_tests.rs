// SPDX-License-Identifier: MIT

use super::*;
use crate::collaborators::Collaborators;
use conman_collab::{FakeAgentClient, FakeContainerEngine, FakeHostControllerClient, FakeImageFetcher, FakePortMonitor, FakeRegistrar};
use conman_core::ImageSpec;
use std::net::IpAddr;

struct FixedEngineFactory;

impl conman_collab::ContainerEngineFactory for FixedEngineFactory {
    type Engine = FakeContainerEngine;

    fn new_engine(&self, _id: MachineId, _dir: &std::path::PathBuf) -> Result<Self::Engine, Error> {
        Ok(FakeContainerEngine::new())
    }
}

struct FixedAgentFactory;

impl conman_collab::AgentClientFactory for FixedAgentFactory {
    type Client = FakeAgentClient;

    fn connect(&self, _id: MachineId) -> Result<Self::Client, Error> {
        Ok(FakeAgentClient::new())
    }
}

fn test_manager(data_dir: std::path::PathBuf) -> Arc<ConManager> {
    let registrar = FakeRegistrar::new();
    let collaborators = Collaborators {
        engine_factory: Arc::new(FixedEngineFactory),
        agent_factory: Arc::new(FixedAgentFactory),
        image_fetcher: Arc::new(FakeImageFetcher::new()),
        host_controller: Arc::new(FakeHostControllerClient::new()),
        mdns: Arc::new(registrar.clone()),
        nfs: Arc::new(registrar),
        port_monitor_factory: Arc::new(|_id| Ok(Arc::new(FakePortMonitor::new()) as Arc<dyn conman_collab::PortMonitor>)),
        docker_idle_predicate: Arc::new(|| false),
        docker_stale_pid_path: data_dir.join("docker.pid"),
    };
    let config = Config::for_tests(data_dir);
    let subnet = conman_engine::Subnet::new("10.200.0.0".parse::<IpAddr>().unwrap(), 16);
    let store = conman_store::Store::open(config.db_path()).unwrap();
    ConManager::new(config, store, collaborators, subnet)
}

#[tokio::test]
async fn create_allocates_a_stopped_machine_and_sets_default() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path().to_path_buf());

    let machine = manager.create("ubuntu-1", ImageSpec::new("ubuntu"), MachineConfig::default()).await.unwrap();

    assert_eq!(machine.state(), MachineState::Stopped);
    assert!(manager.get(machine.id).is_some());
    assert!(manager.get_by_name("ubuntu-1").is_some());
    assert_eq!(manager.default_machine().unwrap().id, machine.id);
}

#[tokio::test]
async fn create_rejects_duplicate_names() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path().to_path_buf());

    manager.create("dup", ImageSpec::new("ubuntu"), MachineConfig::default()).await.unwrap();
    let err = manager.create("dup", ImageSpec::new("ubuntu"), MachineConfig::default()).await.unwrap_err();
    assert_eq!(err.kind(), conman_core::ErrorKind::NameTaken);
}

#[tokio::test]
async fn create_rejects_unsupported_image() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path().to_path_buf());

    let err = manager.create("bad", ImageSpec::new("not-a-distro"), MachineConfig::default()).await.unwrap_err();
    assert_eq!(err.kind(), conman_core::ErrorKind::Unsupported);
    assert!(manager.get_by_name("bad").is_none());
}

#[tokio::test]
async fn delete_removes_the_machine_and_clears_default() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path().to_path_buf());
    let machine = manager.create("solo", ImageSpec::new("ubuntu"), MachineConfig::default()).await.unwrap();

    manager.delete_external(machine.id).await.unwrap();

    assert!(manager.get(machine.id).is_none());
    assert!(manager.default_machine().is_none());
}

#[tokio::test]
async fn rename_updates_the_name_index() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path().to_path_buf());
    let machine = manager.create("old-name", ImageSpec::new("ubuntu"), MachineConfig::default()).await.unwrap();

    manager.rename(machine.id, "new-name").await.unwrap();

    assert!(manager.get_by_name("old-name").is_none());
    assert_eq!(manager.get_by_name("new-name").unwrap().id, machine.id);
}

#[tokio::test]
async fn rename_rejects_a_name_already_in_use() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path().to_path_buf());
    manager.create("taken", ImageSpec::new("ubuntu"), MachineConfig::default()).await.unwrap();
    let machine = manager.create("renameable", ImageSpec::new("ubuntu"), MachineConfig::default()).await.unwrap();

    let err = manager.rename(machine.id, "taken").await.unwrap_err();
    assert_eq!(err.kind(), conman_core::ErrorKind::NameTaken);
    assert_eq!(manager.get_by_name("renameable").unwrap().id, machine.id);
}

#[tokio::test]
async fn clone_machine_copies_rootfs_into_a_new_stopped_machine() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path().to_path_buf());
    let source = manager.create("source", ImageSpec::new("ubuntu"), MachineConfig::default()).await.unwrap();
    std::fs::write(source.rootfs_dir.join("marker"), b"hello").unwrap();

    let clone = manager.clone_machine(source.id, "clone").await.unwrap();

    assert_eq!(clone.state(), MachineState::Stopped);
    assert_ne!(clone.id, source.id);
    assert!(clone.rootfs_dir.join("marker").exists());
}

#[tokio::test]
async fn export_then_import_round_trips_a_machine() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path().to_path_buf());
    let source = manager.create("exportable", ImageSpec::new("ubuntu"), MachineConfig::default()).await.unwrap();
    std::fs::write(source.rootfs_dir.join("marker"), b"hello").unwrap();

    let archive_path = dir.path().join("exportable.tar.zst");
    manager.export(source.id, archive_path.clone()).await.unwrap();
    assert!(archive_path.exists());

    let imported = manager.import(archive_path, "imported").await.unwrap();
    assert_eq!(imported.state(), MachineState::Stopped);
    assert!(manager.get_by_name("imported").is_some());
    assert!(imported.rootfs_dir.join("marker").exists());
}

#[tokio::test]
async fn bootstrap_restores_persisted_machines() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let manager = test_manager(dir.path().to_path_buf());
        let machine = manager.create("persisted", ImageSpec::new("ubuntu"), MachineConfig::default()).await.unwrap();
        machine.id
    };

    let manager = test_manager(dir.path().to_path_buf());
    manager.bootstrap().await.unwrap();

    let machine = manager.get(id).expect("restored machine should be registered");
    assert_eq!(machine.name(), "persisted");
}

#[tokio::test]
async fn start_stop_round_trips_through_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let manager = test_manager(dir.path().to_path_buf());
    let machine = manager.create("runnable", ImageSpec::new("ubuntu"), MachineConfig::default()).await.unwrap();

    lifecycle::start(&manager, &machine).await.unwrap();
    assert_eq!(machine.state(), MachineState::Running);

    lifecycle::stop(&manager, &machine, false).await.unwrap();
    assert_eq!(machine.state(), MachineState::Stopped);
}
