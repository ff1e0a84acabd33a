use super::*;
use conman_collab::FakeContainerEngine;

fn always_idle() -> Arc<dyn Fn() -> bool + Send + Sync> {
    Arc::new(|| true)
}

fn never_idle() -> Arc<dyn Fn() -> bool + Send + Sync> {
    Arc::new(|| false)
}

#[tokio::test(start_paused = true)]
async fn frozen_if_idle_freezes_when_use_count_zero_and_predicate_true() {
    let engine = FakeContainerEngine::new();
    let freezer = Freezer::new(always_idle(), Duration::from_secs(5));

    let apply = tokio::spawn({
        let engine = engine.clone();
        async move { freezer.apply(&engine).await }
    });
    tokio::time::advance(Duration::from_secs(6)).await;
    apply.await.unwrap();

    assert!(engine.is_frozen());
}

#[tokio::test(start_paused = true)]
async fn frozen_if_idle_does_not_freeze_when_predicate_false() {
    let engine = FakeContainerEngine::new();
    let freezer = Freezer::new(never_idle(), Duration::from_secs(5));

    let apply = tokio::spawn({
        let engine = engine.clone();
        async move { freezer.apply(&engine).await }
    });
    tokio::time::advance(Duration::from_secs(6)).await;
    apply.await.unwrap();

    assert!(!engine.is_frozen());
}

#[tokio::test(start_paused = true)]
async fn concurrent_begin_use_before_debounce_fires_cancels_pending_freeze() {
    let engine = FakeContainerEngine::new();
    let freezer = Arc::new(Freezer::new(always_idle(), Duration::from_secs(5)));

    let apply = tokio::spawn({
        let engine = engine.clone();
        let freezer = freezer.clone();
        async move { freezer.apply(&engine).await }
    });

    tokio::time::advance(Duration::from_secs(1)).await;
    freezer.begin_use();
    tokio::time::advance(Duration::from_secs(10)).await;
    apply.await.unwrap();

    assert!(!engine.is_frozen(), "a begin_use during the debounce window must cancel the pending freeze");
}

#[tokio::test]
async fn forced_frozen_freezes_unconditionally_even_when_predicate_is_false() {
    let engine = FakeContainerEngine::new();
    let freezer = Freezer::new(never_idle(), Duration::from_millis(1));
    freezer.begin_freeze();
    freezer.apply(&engine).await;
    assert!(engine.is_frozen());
    assert_eq!(freezer.target(), FreezerTarget::ForcedFrozen);
}

#[tokio::test]
async fn freeze_count_outranks_use_count() {
    // spec §3: freeze_count>0 wins over use_count>0 in the derived target.
    let engine = FakeContainerEngine::new();
    let freezer = Freezer::new(never_idle(), Duration::from_millis(1));
    freezer.begin_use();
    freezer.begin_freeze();
    assert_eq!(freezer.target(), FreezerTarget::ForcedFrozen);
    freezer.apply(&engine).await;
    assert!(engine.is_frozen());
}

#[tokio::test]
async fn begin_use_thaws_a_forced_frozen_engine() {
    let engine = FakeContainerEngine::new();
    engine.freeze().await.unwrap();
    let freezer = Freezer::new(never_idle(), Duration::from_millis(1));
    *freezer.frozen.lock() = true;
    freezer.begin_use();
    assert_eq!(freezer.target(), FreezerTarget::Unfrozen);
    freezer.apply(&engine).await;
    assert!(!engine.is_frozen());
}

#[test]
fn close_sets_closed_sentinel_and_zero_use_count() {
    let freezer = Freezer::new(never_idle(), Duration::from_secs(1));
    freezer.begin_use();
    freezer.close();
    assert!(freezer.closed());
    assert_eq!(freezer.use_count(), 0);
    assert_eq!(freezer.target(), FreezerTarget::Unfrozen);
}

#[test]
fn closed_outranks_freeze_count() {
    let freezer = Freezer::new(always_idle(), Duration::from_secs(1));
    freezer.begin_freeze();
    freezer.close();
    assert_eq!(freezer.target(), FreezerTarget::Unfrozen);
}
