use log::info;

use super::Callback;
use crate::{
    MlErr, Result,
    arch::Model,
    execution::{ExecutionContext, ExecutionMode},
};

/// Requests an early stop once the validation score has not improved for `patience`
/// consecutive validation epochs.
///
/// Watches the objective by default, lower being better, or the given metric in its own
/// direction. Tournament evaluations are ignored.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    metric: Option<String>,
    best: Option<f32>,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            metric: None,
            best: None,
            wait: 0,
        }
    }

    /// Watches the metric called `name` instead of the objective.
    pub fn on_metric(mut self, name: impl Into<String>) -> Self {
        self.metric = Some(name.into());
        self
    }

    pub fn best(&self) -> Option<f32> {
        self.best
    }

    /// The amount of validation epochs since the last improvement.
    pub fn wait(&self) -> usize {
        self.wait
    }

    fn score(&self, model: &dyn Model) -> Result<(Option<f32>, bool)> {
        let mode = ExecutionMode::Validation;

        let Some(name) = &self.metric else {
            return Ok((model.objective_value(mode), false));
        };

        let higher_is_better = model
            .metric_higher_is_better(name)
            .ok_or_else(|| MlErr::InvalidConfig(format!("early stopping on unknown metric {name:?}")))?;

        Ok((model.metric_value(mode, name), higher_is_better))
    }
}

impl Callback for EarlyStopping {
    fn name(&self) -> &str {
        "early stopping"
    }

    fn on_validation_end(&mut self, model: &mut dyn Model, ctx: &mut ExecutionContext) -> Result<()> {
        if ctx.execution_mode() != ExecutionMode::Validation {
            return Ok(());
        }

        let (Some(value), higher_is_better) = self.score(model)? else {
            return Ok(());
        };

        let improved = match self.best {
            None => true,
            Some(best) if higher_is_better => value > best,
            Some(best) => value < best,
        };

        if improved {
            self.best = Some(value);
            self.wait = 0;
        } else if self.wait >= self.patience {
            ctx.set_early_stop(true);

            if model.comm().am_master() {
                info!(
                    epoch = ctx.epoch(), best = self.best.unwrap_or(value);
                    "validation stopped improving, stopping early"
                );
            }
        } else {
            self.wait += 1;
        }

        Ok(())
    }
}
