use super::*;
use conman_core::test_support::MachineRecordBuilder;
use conman_core::ImageSpec;
use std::time::Duration;

fn docker_record() -> MachineRecord {
    MachineRecordBuilder::default().name("docker").image(ImageSpec::new("docker")).builtin(Builtin::Docker).build()
}

fn plain_record() -> MachineRecord {
    MachineRecordBuilder::default().name("dev").image(ImageSpec::new("ubuntu")).build()
}

fn docker_hooks(idle: bool) -> Arc<DockerHooks> {
    Arc::new(DockerHooks {
        stale_pid_path: std::env::temp_dir().join("conman-hooks-test-does-not-exist.pid"),
        idle_predicate: Arc::new(move || idle),
        debounce: Duration::from_millis(1),
    })
}

#[test]
fn default_hooks_is_selected_for_non_builtin_images() {
    let hooks = hooks_for(&plain_record(), docker_hooks(true));
    assert!(hooks.make_freezer(&plain_record()).is_none());
}

#[test]
fn docker_hooks_is_selected_for_the_docker_builtin() {
    let docker = docker_hooks(true);
    let hooks = hooks_for(&docker_record(), docker.clone());
    assert!(hooks.make_freezer(&docker_record()).is_some());
}

#[test]
fn docker_hooks_config_forces_isolation() {
    let hooks = docker_hooks(true);
    let mut record = docker_record();
    record.config.isolated = false;
    hooks.apply(&mut record);
    assert!(record.config.isolated);
}

#[test]
fn docker_hooks_pre_start_is_a_no_op_when_no_stale_pid_file_exists() {
    let hooks = docker_hooks(true);
    assert!(hooks.pre_start(&docker_record()).is_ok());
}

#[test]
fn docker_hooks_make_freezer_uses_the_supplied_idle_predicate() {
    let hooks = docker_hooks(false);
    let freezer = hooks.make_freezer(&docker_record()).unwrap();
    assert_eq!(freezer.use_count(), 0);
}
