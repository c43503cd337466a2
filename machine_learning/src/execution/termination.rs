use comms::specs::training::TerminationSpec;

use super::ExecutionContext;

/// When a training or evaluation loop stops.
///
/// Every criterion also reports done once the context's early stop flag is set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TerminationCriteria {
    /// Done once the context has taken this many steps.
    Batches(usize),
    /// Done once the context has completed this many epochs.
    Epochs(usize),
    /// Done once the context timer has accumulated this many seconds.
    Seconds(f64),
}

impl TerminationCriteria {
    pub fn is_done(&self, ctx: &ExecutionContext) -> bool {
        if ctx.early_stop() {
            return true;
        }

        match *self {
            Self::Batches(max) => ctx.step() >= max,
            Self::Epochs(max) => ctx.epoch() >= max,
            Self::Seconds(max) => ctx.elapsed().as_secs_f64() >= max,
        }
    }
}

impl From<TerminationSpec> for TerminationCriteria {
    fn from(spec: TerminationSpec) -> Self {
        match spec {
            TerminationSpec::MaxBatches(n) => Self::Batches(n),
            TerminationSpec::MaxEpochs(n) => Self::Epochs(n),
            TerminationSpec::MaxSeconds(s) => Self::Seconds(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::execution::ExecutionMode;

    fn ctx_at(steps: usize, epochs: usize) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(ExecutionMode::Training, 1);
        (0..steps).for_each(|_| ctx.inc_step());
        (0..epochs).for_each(|_| ctx.inc_epoch());
        ctx
    }

    #[test]
    fn batches_boundary() {
        let term = TerminationCriteria::Batches(5);

        assert!(!term.is_done(&ctx_at(4, 0)));
        assert!(term.is_done(&ctx_at(5, 0)));
    }

    #[test]
    fn epochs_boundary() {
        let term = TerminationCriteria::Epochs(2);

        assert!(!term.is_done(&ctx_at(0, 1)));
        assert!(term.is_done(&ctx_at(0, 2)));
    }

    #[test]
    fn seconds_boundary() {
        let term = TerminationCriteria::Seconds(1.5);
        let mut ctx = ctx_at(0, 0);

        ctx.set_elapsed(Duration::from_millis(1499));
        assert!(!term.is_done(&ctx));

        ctx.set_elapsed(Duration::from_millis(1500));
        assert!(term.is_done(&ctx));
    }

    #[test]
    fn zero_bounds_are_done_immediately() {
        let ctx = ctx_at(0, 0);

        assert!(TerminationCriteria::Batches(0).is_done(&ctx));
        assert!(TerminationCriteria::Epochs(0).is_done(&ctx));
        assert!(TerminationCriteria::Seconds(0.0).is_done(&ctx));
    }

    #[test]
    fn early_stop_overrides_every_bound() {
        let mut ctx = ctx_at(0, 0);
        ctx.set_early_stop(true);

        assert!(TerminationCriteria::Batches(100).is_done(&ctx));
        assert!(TerminationCriteria::Epochs(100).is_done(&ctx));
        assert!(TerminationCriteria::Seconds(100.0).is_done(&ctx));
    }

    #[test]
    fn from_spec() {
        assert_eq!(
            TerminationCriteria::from(TerminationSpec::MaxEpochs(3)),
            TerminationCriteria::Epochs(3)
        );
    }
}
