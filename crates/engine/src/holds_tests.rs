use super::*;
use conman_core::MachineId;
use std::time::Duration;

#[test]
fn with_hold_increments_then_decrements() {
    let holds = MutationHolds::new();
    holds.with_hold("rename", || {
        assert_eq!(holds.count("rename"), 1);
    });
    assert_eq!(holds.count("rename"), 0);
}

#[test]
fn distinct_names_are_independent_counters() {
    let holds = MutationHolds::new();
    holds.with_hold("rename", || {
        assert_eq!(holds.count("delete"), 0);
    });
}

#[test]
fn begin_mutation_token_decrements_on_drop_without_end() {
    let holds = Arc::new(MutationHolds::new());
    {
        let _token = holds.begin("create");
        assert_eq!(holds.count("create"), 1);
    }
    assert_eq!(holds.count("create"), 0);
}

#[test]
fn begin_mutation_token_decrements_on_explicit_end() {
    let holds = Arc::new(MutationHolds::new());
    let token = holds.begin("create");
    assert_eq!(holds.count("create"), 1);
    token.end();
    assert_eq!(holds.count("create"), 0);
}

#[tokio::test]
async fn run_completes_normally_when_not_cancelled() {
    let jobs = JobManager::new(MachineId::new());
    let result = jobs.run(|_ctx| async { Ok::<_, Error>(42) }).await.unwrap();
    assert_eq!(result, 42);
}

#[tokio::test]
async fn close_cancels_outstanding_jobs() {
    let jobs = Arc::new(JobManager::new(MachineId::new()));
    let ctx = jobs.cancellation_token();
    let task = tokio::spawn(async move {
        ctx.cancelled().await;
        "cancelled"
    });
    jobs.close().await;
    assert!(jobs.is_cancelled());
    assert_eq!(task.await.unwrap(), "cancelled");
}

#[tokio::test]
async fn run_reports_cancelled_once_token_fires() {
    let jobs = Arc::new(JobManager::new(MachineId::new()));
    let token = jobs.cancellation_token();
    token.cancel();
    let result = jobs
        .run(|_ctx| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, Error>(())
        })
        .await;
    assert!(matches!(result, Err(Error::Cancelled(_))));
}

#[tokio::test]
async fn run_context_is_cancelled_by_parent_token() {
    let jobs = JobManager::new(MachineId::new());
    let parent = CancellationToken::new();
    parent.cancel();
    let result = jobs.run_context(&parent, |_ctx| async { Ok::<_, Error>(()) }).await;
    assert!(matches!(result, Err(Error::Cancelled(_))));
}
