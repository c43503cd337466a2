#![cfg(test)]

use crate::{
    Result,
    arch::{Model, ObjectiveFunction, WeightsSnapshot},
    callbacks::SharedCallback,
    data::MiniBatch,
    distributed::{Communicator, LocalComm},
    execution::{ExecutionContext, ExecutionMode},
};

struct InertObjective;

impl ObjectiveFunction for InertObjective {
    fn start_evaluation(&mut self, _mode: ExecutionMode, _mini_batch_size: usize) -> Result<()> {
        Ok(())
    }

    fn differentiate(&mut self) -> Result<()> {
        Ok(())
    }

    fn compute_weight_regularization(&mut self) -> Result<()> {
        Ok(())
    }

    fn finish_evaluation(&mut self, _mode: ExecutionMode, _mini_batch_size: usize) -> Result<f32> {
        Ok(0.0)
    }
}

/// A model whose scores are set by hand, for exercising callbacks.
pub(crate) struct ScoredModel {
    pub objective: Option<f32>,
    /// The value of the `categorical_accuracy` metric, higher is better.
    pub accuracy: Option<f32>,
    pub weights: Vec<WeightsSnapshot>,
    comm: LocalComm,
    objective_fn: InertObjective,
}

impl ScoredModel {
    pub fn new() -> Self {
        Self {
            objective: None,
            accuracy: None,
            weights: vec![WeightsSnapshot {
                name: "dense0.params".to_string(),
                values: vec![0.25, -0.5, 1.0],
            }],
            comm: LocalComm,
            objective_fn: InertObjective,
        }
    }
}

impl Model for ScoredModel {
    fn name(&self) -> &str {
        "scored"
    }

    fn comm(&self) -> &dyn Communicator {
        &self.comm
    }

    fn callbacks(&self) -> Vec<SharedCallback> {
        Vec::new()
    }

    fn add_callback(&mut self, _callback: SharedCallback) {}

    fn reset_mode(&mut self, _ctx: &ExecutionContext, _mode: ExecutionMode) {}

    fn reset_epoch_statistics(&mut self, _mode: ExecutionMode) {}

    fn forward_prop(&mut self, _mode: ExecutionMode, _batch: &MiniBatch) -> Result<()> {
        Ok(())
    }

    fn backward_prop(&mut self) -> Result<()> {
        Ok(())
    }

    fn clear_gradients(&mut self) {}

    fn update_weights(&mut self) -> Result<()> {
        Ok(())
    }

    fn update_layers(&mut self) -> bool {
        true
    }

    fn evaluate_metrics(&mut self, _mode: ExecutionMode, _mini_batch_size: usize) -> Result<()> {
        Ok(())
    }

    fn reconcile_weight_values(&mut self) -> Result<()> {
        Ok(())
    }

    fn objective_function(&mut self) -> &mut dyn ObjectiveFunction {
        &mut self.objective_fn
    }

    fn objective_value(&self, _mode: ExecutionMode) -> Option<f32> {
        self.objective
    }

    fn metric_value(&self, _mode: ExecutionMode, name: &str) -> Option<f32> {
        (name == "categorical_accuracy").then_some(self.accuracy).flatten()
    }

    fn metric_names(&self) -> Vec<&'static str> {
        vec!["categorical_accuracy"]
    }

    fn metric_higher_is_better(&self, name: &str) -> Option<bool> {
        (name == "categorical_accuracy").then_some(true)
    }

    fn weights(&self) -> Vec<WeightsSnapshot> {
        self.weights.clone()
    }

    fn set_weights(&mut self, snapshots: &[WeightsSnapshot]) -> Result<()> {
        self.weights = snapshots.to_vec();
        Ok(())
    }

    fn copy_model(&self) -> Box<dyn Model> {
        let mut copy = ScoredModel::new();
        copy.weights = self.weights.clone();
        Box::new(copy)
    }
}
