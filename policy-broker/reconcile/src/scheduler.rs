use crate::{converge::Convergence, metrics::ReconcileMetrics};
use std::sync::Arc;
use tokio::{
    sync::watch,
    time::{self, Duration, Instant, MissedTickBehavior},
};
use tracing::{info, info_span, warn, Instrument};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Shorter intervals are raised to this.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// A full reconciliation pass.
#[async_trait::async_trait]
pub trait Reconcile: Send + Sync + 'static {
    async fn reconcile(&self) -> anyhow::Result<Convergence>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    Running,
}

/// Runs reconciliation cycles on a fixed interval, one at a time.
pub struct Scheduler<R: ?Sized> {
    reconciler: Arc<R>,
    interval: Duration,
    state: watch::Sender<State>,
    metrics: ReconcileMetrics,
}

// === impl Scheduler ===

impl<R: Reconcile + ?Sized> Scheduler<R> {
    pub fn new(reconciler: Arc<R>, interval: Duration, metrics: ReconcileMetrics) -> Self {
        let (state, _) = watch::channel(State::Idle);
        Self {
            reconciler,
            interval: interval.max(MIN_INTERVAL),
            state,
            metrics,
        }
    }

    pub fn state(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    /// Runs cycles until `drain` is signaled.
    ///
    /// Ticks that elapse while a cycle is running are skipped. A cycle that
    /// is running when the drain is signaled is allowed to finish; the drain
    /// is not released until it has.
    pub async fn run(self, drain: drain::Watch) {
        let mut ticks = time::interval(self.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::pin! {
            let shutdown = drain.signaled();
        }

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Reconciliation stopped");
                    return;
                }

                _ = ticks.tick() => {}
            }

            self.cycle().instrument(info_span!("reconcile")).await;
        }
    }

    async fn cycle(&self) {
        self.state.send_replace(State::Running);
        let start = Instant::now();

        let result = self.reconciler.reconcile().await;
        let elapsed = start.elapsed();
        self.metrics.cycle(result.is_ok(), elapsed.as_secs_f64());
        match result {
            Ok(convergence) => info!(
                desired = convergence.desired,
                actual = convergence.actual,
                fixed = convergence.fixed(),
                failed = convergence.failed.len(),
                ?elapsed,
                "Reconciliation cycle completed",
            ),
            Err(error) => warn!(error = %format!("{error:#}"), ?elapsed, "Reconciliation cycle failed"),
        }

        self.state.send_replace(State::Idle);
    }
}
