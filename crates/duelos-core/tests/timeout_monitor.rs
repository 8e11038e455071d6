use std::sync::Arc;
use std::time::Duration;

use duelos_core::{
    CompletionReason, DuelEngine, DuelError, DuelId, DuelPolicy, DuelStatus, ManualClock,
    MemoryDuelStore, MemoryUserLedger, MonitorConfig, ProblemRef, SweepObserver, SweepReport,
    TimeoutMonitor,
};
use parking_lot::Mutex;

const T0: u64 = 1_700_000_000_000;
const MINUTE: Duration = Duration::from_secs(60);

fn engine(clock: Arc<ManualClock>) -> Arc<DuelEngine> {
    Arc::new(DuelEngine::new(
        Arc::new(MemoryDuelStore::new()),
        Arc::new(MemoryUserLedger::new()),
        clock,
        DuelPolicy::default(),
    ))
}

async fn active_duel(engine: &DuelEngine, challenger: &str, challengee: &str) -> DuelId {
    let id = engine
        .create(challenger, challengee, ProblemRef::slug("word-ladder"))
        .await
        .expect("create");
    engine.accept(&id, challengee).await.expect("accept");
    engine.start(&id, challenger).await.expect("start");
    engine.start(&id, challengee).await.expect("start");
    id
}

#[derive(Default)]
struct Recorder {
    reports: Mutex<Vec<SweepReport>>,
}

impl SweepObserver for Recorder {
    fn on_sweep(&self, report: &SweepReport) {
        self.reports.lock().push(report.clone());
    }
}

#[tokio::test]
async fn sweep_with_no_active_duels_does_nothing() {
    let clock = Arc::new(ManualClock::new(T0));
    let engine = engine(clock.clone());
    engine
        .create("alice", "bob", ProblemRef::slug("a"))
        .await
        .expect("create");
    clock.advance(Duration::from_secs(24 * 60 * 60));

    let monitor = TimeoutMonitor::new(engine, MonitorConfig::default());
    let report = monitor.sweep().await.expect("sweep");
    assert_eq!(report, SweepReport::default());
}

#[tokio::test]
async fn one_sided_duel_times_out_after_thirty_minutes() {
    let clock = Arc::new(ManualClock::new(T0));
    let engine = engine(clock.clone());
    let id = active_duel(&engine, "alice", "bob").await;
    engine.submit(&id, "alice", 120_000).await.expect("submit");

    let monitor = TimeoutMonitor::new(engine.clone(), MonitorConfig::default());
    clock.advance(30 * MINUTE);
    let report = monitor.sweep().await.expect("sweep");
    assert_eq!(report.scanned, 1);
    assert_eq!(report.timed_out, 0, "exactly thirty minutes is not past the threshold");

    clock.advance(MINUTE);
    let report = monitor.sweep().await.expect("sweep");
    assert_eq!(report.timed_out, 1);

    let duel = engine.get_by_id(&id).await.expect("get");
    assert_eq!(duel.status, DuelStatus::Completed);
    assert_eq!(duel.completion_reason, Some(CompletionReason::Timeout));
    assert_eq!(duel.winner.as_deref(), Some("alice"));
    assert_eq!(duel.xp_awarded, Some(75));
    assert_eq!(duel.completed_at, Some(T0 + 31 * 60_000));
    assert_eq!(engine.xp_of("alice").await.expect("xp"), 75);
    assert_eq!(engine.xp_of("bob").await.expect("xp"), 15);

    let err = engine.submit(&id, "bob", 1_000).await.expect_err("late");
    assert!(matches!(err, DuelError::AlreadyCompleted(_)));
    assert_eq!(engine.xp_of("bob").await.expect("xp"), 15);
}

#[tokio::test]
async fn untouched_duel_expires_after_two_hours_without_xp() {
    let clock = Arc::new(ManualClock::new(T0));
    let engine = engine(clock.clone());
    let id = active_duel(&engine, "alice", "bob").await;
    let monitor = TimeoutMonitor::new(engine.clone(), MonitorConfig::default());

    clock.advance(90 * MINUTE);
    assert_eq!(monitor.sweep().await.expect("sweep").expired, 0);

    clock.advance(31 * MINUTE);
    let report = monitor.sweep().await.expect("sweep");
    assert_eq!(report.expired, 1);

    let duel = engine.get_by_id(&id).await.expect("get");
    assert_eq!(duel.completion_reason, Some(CompletionReason::Expired));
    assert_eq!(duel.winner, None);
    assert_eq!(duel.xp_awarded, Some(0));
    assert_eq!(engine.xp_of("alice").await.expect("xp"), 0);
    assert_eq!(engine.xp_of("bob").await.expect("xp"), 0);

    let again = monitor.sweep().await.expect("sweep");
    assert_eq!(again, SweepReport::default());
}

#[tokio::test]
async fn sweep_leaves_fresh_duels_and_handles_many() {
    let clock = Arc::new(ManualClock::new(T0));
    let engine = engine(clock.clone());
    let stale_one_sided = active_duel(&engine, "alice", "bob").await;
    engine
        .submit(&stale_one_sided, "bob", 9_000)
        .await
        .expect("submit");
    let stale_idle = active_duel(&engine, "carol", "dave").await;
    clock.advance(125 * MINUTE);
    let fresh = active_duel(&engine, "erin", "frank").await;

    let monitor = TimeoutMonitor::new(engine.clone(), MonitorConfig::default());
    let report = monitor.sweep().await.expect("sweep");
    assert_eq!(report.scanned, 3);
    assert_eq!(report.timed_out, 1);
    assert_eq!(report.expired, 1);
    assert_eq!(report.failed, 0);

    let winner = engine.get_by_id(&stale_one_sided).await.expect("get");
    assert_eq!(winner.winner.as_deref(), Some("bob"));
    let idle = engine.get_by_id(&stale_idle).await.expect("get");
    assert_eq!(idle.completion_reason, Some(CompletionReason::Expired));
    let fresh = engine.get_by_id(&fresh).await.expect("get");
    assert_eq!(fresh.status, DuelStatus::Active);
}

#[tokio::test]
async fn run_sweeps_until_shutdown() {
    let clock = Arc::new(ManualClock::new(T0));
    let engine = engine(clock.clone());
    let id = active_duel(&engine, "alice", "bob").await;
    clock.advance(3 * 60 * MINUTE);

    let recorder = Arc::new(Recorder::default());
    let monitor = TimeoutMonitor::new(
        engine.clone(),
        MonitorConfig {
            interval: Duration::from_millis(10),
            tick_timeout: Duration::from_secs(1),
        },
    )
    .with_observer(recorder.clone());

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(monitor.run(async move {
        let _ = rx.await;
    }));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let duel = engine.get_by_id(&id).await.expect("get");
        if duel.is_completed() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "monitor never ran");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    tx.send(()).expect("signal shutdown");
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("monitor stops")
        .expect("join");

    let reports = recorder.reports.lock();
    assert!(reports.iter().any(|r| r.expired == 1));
}
