use super::fake::FakeContainerEngine;
use super::*;

#[tokio::test]
async fn start_then_wait_running_succeeds() {
    let engine = FakeContainerEngine::new();
    engine.start().await.unwrap();
    engine.wait(MachineState::Running, Duration::from_secs(1)).await.unwrap();
    assert!(engine.running());
    assert_eq!(engine.init_pid(), Some(4242));
}

#[tokio::test]
async fn stop_then_wait_stopped_succeeds() {
    let engine = FakeContainerEngine::new();
    engine.start().await.unwrap();
    engine.stop().await.unwrap();
    engine.wait(MachineState::Stopped, Duration::from_secs(1)).await.unwrap();
    assert!(!engine.running());
}

#[tokio::test]
async fn wait_for_wrong_state_times_out() {
    let engine = FakeContainerEngine::new();
    let err = engine.wait(MachineState::Running, Duration::from_secs(1)).await.unwrap_err();
    assert_eq!(err.kind(), conman_core::ErrorKind::Timeout);
}

#[tokio::test]
async fn freeze_and_unfreeze_toggle_fake_state() {
    let engine = FakeContainerEngine::new();
    engine.freeze().await.unwrap();
    assert!(engine.is_frozen());
    engine.unfreeze().await.unwrap();
    assert!(!engine.is_frozen());
}

#[tokio::test]
async fn simulate_init_death_clears_running_and_pid() {
    let engine = FakeContainerEngine::new();
    engine.start().await.unwrap();
    engine.simulate_init_death();
    assert!(!engine.running());
    assert_eq!(engine.init_pid(), None);
}
