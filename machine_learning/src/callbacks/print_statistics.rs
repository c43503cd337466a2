use log::{debug, info};

use super::Callback;
use crate::{
    Result,
    arch::Model,
    execution::{ExecutionContext, ExecutionMode},
};

/// Logs the objective and metric values of every epoch and evaluation from the master rank.
#[derive(Debug, Clone)]
pub struct PrintStatistics {
    batch_interval: usize,
}

impl PrintStatistics {
    /// Creates a new `PrintStatistics`.
    ///
    /// # Arguments
    /// * `batch_interval` - Every how many training steps the running objective is logged.
    pub fn new(batch_interval: usize) -> Self {
        Self { batch_interval }
    }

    fn report(model: &dyn Model, ctx: &ExecutionContext, mode: ExecutionMode) {
        if !model.comm().am_master() {
            return;
        }

        let objective = model.objective_value(mode).unwrap_or(f32::NAN);
        info!(
            model = model.name(), mode = mode.as_str(), epoch = ctx.epoch(), step = ctx.step();
            "{mode} objective: {objective:.6}"
        );

        for name in model.metric_names() {
            if let Some(value) = model.metric_value(mode, name) {
                info!(model = model.name(), mode = mode.as_str(); "{mode} {name}: {value:.4}");
            }
        }
    }
}

impl Default for PrintStatistics {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Callback for PrintStatistics {
    fn name(&self) -> &str {
        "print statistics"
    }

    fn batch_interval(&self) -> usize {
        self.batch_interval
    }

    fn on_batch_end(&mut self, model: &mut dyn Model, ctx: &mut ExecutionContext) -> Result<()> {
        if model.comm().am_master() {
            let objective = model
                .objective_value(ExecutionMode::Training)
                .unwrap_or(f32::NAN);
            debug!(step = ctx.step(), objective = objective; "running training objective");
        }

        Ok(())
    }

    fn on_epoch_end(&mut self, model: &mut dyn Model, ctx: &mut ExecutionContext) -> Result<()> {
        Self::report(model, ctx, ExecutionMode::Training);
        Ok(())
    }

    fn on_validation_end(&mut self, model: &mut dyn Model, ctx: &mut ExecutionContext) -> Result<()> {
        Self::report(model, ctx, ctx.execution_mode());
        Ok(())
    }

    fn on_test_end(&mut self, model: &mut dyn Model, ctx: &mut ExecutionContext) -> Result<()> {
        Self::report(model, ctx, ExecutionMode::Testing);
        Ok(())
    }
}
