use super::*;
use crate::{Convergence, Reconcile, Scheduler, State};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A reconciler whose cycles take a fixed amount of (virtual) time.
struct SlowReconciler {
    cycle: Duration,
    started: AtomicUsize,
    finished: AtomicUsize,
    fail: bool,
}

impl SlowReconciler {
    fn new(cycle: Duration) -> Arc<Self> {
        Arc::new(Self {
            cycle,
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            fail: false,
        })
    }

    fn failing(cycle: Duration) -> Arc<Self> {
        Arc::new(Self {
            cycle,
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            fail: true,
        })
    }

    fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Reconcile for SlowReconciler {
    async fn reconcile(&self) -> Result<Convergence> {
        self.started.fetch_add(1, Ordering::SeqCst);
        time::sleep(self.cycle).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("catalog unavailable");
        }
        Ok(Convergence::default())
    }
}

#[tokio::test(start_paused = true)]
async fn overlapping_ticks_are_skipped() {
    let _tracing = init_tracing();

    let reconciler = SlowReconciler::new(Duration::from_secs(25));
    let metrics = ReconcileMetrics::default();
    let scheduler = Scheduler::new(reconciler.clone(), Duration::from_secs(10), metrics.clone());
    let (signal, watch) = drain::channel();
    let task = tokio::spawn(scheduler.run(watch));

    // Cycles start at t=0 and t=30; the ticks at 10, 20 and 50 fall inside a
    // running cycle.
    time::sleep(Duration::from_secs(59)).await;
    assert_eq!(reconciler.started(), 2);
    assert_eq!(reconciler.finished(), 2);
    assert_eq!(metrics.cycles("ok"), 2);

    signal.drain().await;
    task.await.expect("scheduler must not panic");
    assert_eq!(reconciler.started(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_waits_for_the_running_cycle() {
    let reconciler = SlowReconciler::new(Duration::from_secs(5));
    let scheduler = Scheduler::new(
        reconciler.clone(),
        Duration::from_secs(10),
        ReconcileMetrics::default(),
    );
    let mut state = scheduler.state();
    let (signal, watch) = drain::channel();
    let task = tokio::spawn(scheduler.run(watch));

    time::sleep(Duration::from_secs(1)).await;
    assert_eq!(*state.borrow_and_update(), State::Running);

    let start = time::Instant::now();
    signal.drain().await;
    assert!(start.elapsed() >= Duration::from_secs(4));
    assert_eq!(reconciler.finished(), 1);
    assert_eq!(*state.borrow(), State::Idle);

    task.await.expect("scheduler must not panic");
    assert_eq!(reconciler.started(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_cycles_return_to_idle() {
    let reconciler = SlowReconciler::failing(Duration::from_secs(1));
    let metrics = ReconcileMetrics::default();
    let scheduler = Scheduler::new(reconciler.clone(), Duration::from_secs(10), metrics.clone());
    let state = scheduler.state();
    let (signal, watch) = drain::channel();
    let task = tokio::spawn(scheduler.run(watch));

    time::sleep(Duration::from_secs(15)).await;
    assert_eq!(*state.borrow(), State::Idle);
    assert_eq!(reconciler.started(), 2);
    assert_eq!(metrics.cycles("error"), 2);
    assert_eq!(metrics.cycles("ok"), 0);

    signal.drain().await;
    task.await.expect("scheduler must not panic");
}

#[tokio::test(start_paused = true)]
async fn zero_interval_runs_back_to_back() {
    let reconciler = SlowReconciler::new(Duration::from_secs(1));
    let scheduler = Scheduler::new(reconciler.clone(), Duration::ZERO, ReconcileMetrics::default());
    let (signal, watch) = drain::channel();
    let task = tokio::spawn(scheduler.run(watch));

    time::sleep(Duration::from_millis(3_500)).await;
    assert!(reconciler.started() >= 3, "{}", reconciler.started());

    signal.drain().await;
    task.await.expect("scheduler must not panic");
}
