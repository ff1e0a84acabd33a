use super::*;
use conman_collab::{FakeAgentClient, FakeContainerEngine, FakePortMonitor};

async fn construct_for(
    slot: &RuntimeStateSlot,
    engine: &FakeContainerEngine,
    id: MachineId,
    on_agent_closed: impl FnOnce() + Send + 'static,
) -> Arc<RuntimeState> {
    engine.start().await.unwrap();
    RuntimeState::construct(
        slot,
        id,
        engine,
        None,
        Arc::new(FakeAgentClient::new()),
        Arc::new(FakePortMonitor::new()),
        on_agent_closed,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn construct_publishes_into_the_slot() {
    let slot = RuntimeStateSlot::new();
    let engine = FakeContainerEngine::new();
    let id = MachineId::new();
    let state = construct_for(&slot, &engine, id, || {}).await;

    assert!(slot.is_some());
    assert!(slot.is_current(&state));
    assert_eq!(state.init_pid(), 4242);
}

#[tokio::test]
async fn a_second_construct_closes_the_previous_instance_and_logs() {
    let slot = RuntimeStateSlot::new();
    let engine = FakeContainerEngine::new();
    let id = MachineId::new();
    let first = construct_for(&slot, &engine, id, || {}).await;
    let second = construct_for(&slot, &engine, id, || {}).await;

    assert!(!slot.is_current(&first));
    assert!(slot.is_current(&second));
}

#[tokio::test]
async fn teardown_is_idempotent() {
    let slot = RuntimeStateSlot::new();
    let engine = FakeContainerEngine::new();
    let id = MachineId::new();
    let state = construct_for(&slot, &engine, id, || {}).await;

    state.teardown().await;
    state.teardown().await;
    assert!(state.agent().is_none());
    assert!(state.port_monitor().is_none());
}

#[tokio::test]
async fn slot_teardown_swaps_to_nil_and_tears_down() {
    let slot = RuntimeStateSlot::new();
    let engine = FakeContainerEngine::new();
    let id = MachineId::new();
    let _state = construct_for(&slot, &engine, id, || {}).await;

    slot.teardown().await;
    assert!(!slot.is_some());
}

#[tokio::test]
async fn agent_close_watcher_fires_callback_only_while_still_current() {
    let slot = RuntimeStateSlot::new();
    let engine = FakeContainerEngine::new();
    let id = MachineId::new();
    engine.start().await.unwrap();

    let fired = Arc::new(AtomicBool::new(false));
    let fired_for_closure = fired.clone();
    let state = RuntimeState::construct(
        &slot,
        id,
        &engine,
        None,
        Arc::new(FakeAgentClient::new()),
        Arc::new(FakePortMonitor::new()),
        move || fired_for_closure.store(true, Ordering::SeqCst),
    )
    .await
    .unwrap();

    // Replace before the agent ever closes: the stale watcher must not
    // fire once it is no longer the published instance.
    slot.teardown().await;
    drop(state);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(!fired.load(Ordering::SeqCst));
}
