use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test(start_paused = true)]
async fn ticks_repeatedly_until_stopped() {
    let watchdog = Arc::new(Watchdog::new(Duration::from_millis(10)));
    let ticks = Arc::new(AtomicUsize::new(0));

    let runner = tokio::spawn({
        let watchdog = watchdog.clone();
        let ticks = ticks.clone();
        async move {
            watchdog
                .run(|| {
                    let ticks = ticks.clone();
                    async move {
                        ticks.fetch_add(1, Ordering::SeqCst);
                        TickReport { corrected: 0, gc_enqueued: 0 }
                    }
                })
                .await;
        }
    });

    tokio::time::advance(Duration::from_millis(35)).await;
    watchdog.stop();
    runner.await.unwrap();

    assert!(ticks.load(Ordering::SeqCst) >= 3);
}

#[tokio::test(start_paused = true)]
async fn stopping_before_the_first_tick_exits_without_ticking() {
    let watchdog = Watchdog::new(Duration::from_secs(60));
    watchdog.stop();
    let ticks = Arc::new(AtomicUsize::new(0));

    watchdog
        .run(|| {
            let ticks = ticks.clone();
            async move {
                ticks.fetch_add(1, Ordering::SeqCst);
                TickReport::default()
            }
        })
        .await;

    assert_eq!(ticks.load(Ordering::SeqCst), 0);
}

#[test]
fn tick_report_default_is_all_zero() {
    let report = TickReport::default();
    assert_eq!(report.corrected, 0);
    assert_eq!(report.gc_enqueued, 0);
}
