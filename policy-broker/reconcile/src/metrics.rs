use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::{Registry, Unit},
};

#[derive(Clone, Debug)]
pub struct ReconcileMetrics {
    cycles: Family<CycleLabels, Counter>,
    cycle_duration: Histogram,
    fixed: Counter,
    failed: Counter,
    chunks: Family<ChunkLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct CycleLabels {
    outcome: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ChunkLabels {
    action: &'static str,
    outcome: &'static str,
}

// === impl ReconcileMetrics ===

impl ReconcileMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let metrics = Self::default();

        reg.register(
            "cycles",
            "Count of reconciliation cycles by outcome",
            metrics.cycles.clone(),
        );

        // Cycles are expected to take seconds; the store may take up to a
        // write timeout per chunk.
        reg.register_with_unit(
            "cycle_duration",
            "Histogram of reconciliation cycle durations",
            Unit::Seconds,
            metrics.cycle_duration.clone(),
        );

        reg.register(
            "fixed",
            "Count of missing policies created by reconciliation",
            metrics.fixed.clone(),
        );

        reg.register(
            "failed",
            "Count of missing policies reconciliation failed to create",
            metrics.failed.clone(),
        );

        reg.register(
            "chunks",
            "Count of policy-store writes by action and outcome",
            metrics.chunks.clone(),
        );

        metrics
    }

    pub(crate) fn cycle(&self, ok: bool, secs: f64) {
        let outcome = if ok { "ok" } else { "error" };
        self.cycles.get_or_create(&CycleLabels { outcome }).inc();
        self.cycle_duration.observe(secs);
    }

    pub(crate) fn fixed(&self, fixed: usize, failed: usize) {
        self.fixed.inc_by(fixed as u64);
        self.failed.inc_by(failed as u64);
    }

    pub(crate) fn chunk(&self, action: &'static str, outcome: &'static str) {
        self.chunks
            .get_or_create(&ChunkLabels { action, outcome })
            .inc();
    }

    #[cfg(test)]
    pub(crate) fn cycles(&self, outcome: &'static str) -> u64 {
        self.cycles.get_or_create(&CycleLabels { outcome }).get()
    }

    #[cfg(test)]
    pub(crate) fn chunks(&self, action: &'static str, outcome: &'static str) -> u64 {
        self.chunks
            .get_or_create(&ChunkLabels { action, outcome })
            .get()
    }
}

impl Default for ReconcileMetrics {
    fn default() -> Self {
        Self {
            cycles: Family::default(),
            cycle_duration: Histogram::new([0.1, 1.0, 10.0, 30.0, 60.0, 300.0].into_iter()),
            fixed: Counter::default(),
            failed: Counter::default(),
            chunks: Family::default(),
        }
    }
}
