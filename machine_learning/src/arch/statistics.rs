use std::collections::BTreeMap;

use crate::execution::ExecutionMode;

/// Weighted running means, one per execution mode, reset at the start of every epoch.
#[derive(Debug, Clone, Default)]
pub struct EpochStatistics {
    totals: BTreeMap<ExecutionMode, (f64, f64)>,
}

impl EpochStatistics {
    pub fn add(&mut self, mode: ExecutionMode, sum: f64, weight: f64) {
        let (s, w) = self.totals.entry(mode).or_default();
        *s += sum;
        *w += weight;
    }

    /// The mean of everything added for `mode` since its last reset.
    pub fn mean(&self, mode: ExecutionMode) -> Option<f64> {
        self.totals
            .get(&mode)
            .filter(|(_, w)| *w > 0.)
            .map(|(s, w)| s / w)
    }

    pub fn reset(&mut self, mode: ExecutionMode) {
        self.totals.remove(&mode);
    }
}
