use crate::{
    MlErr, Result,
    arch::{ObjectiveFunction, WeightsSnapshot},
    callbacks::SharedCallback,
    data::MiniBatch,
    distributed::Communicator,
    execution::{ExecutionContext, ExecutionMode},
    optimization::OptimizerState,
};

/// A trainable model as driven by a training algorithm.
///
/// The algorithm owns the order in which these are called for every mini-batch, the model
/// owns what each step means.
pub trait Model: Send {
    fn name(&self) -> &str;

    /// The communicator shared by every rank of the trainer.
    fn comm(&self) -> &dyn Communicator;

    /// The model's callbacks, in the order they were added.
    fn callbacks(&self) -> Vec<SharedCallback>;

    fn add_callback(&mut self, callback: SharedCallback);

    /// Prepares the model to run in `mode` as part of the loop driven by `ctx`.
    fn reset_mode(&mut self, ctx: &ExecutionContext, mode: ExecutionMode);

    /// Clears the objective and metric values accumulated for `mode`.
    fn reset_epoch_statistics(&mut self, mode: ExecutionMode);

    /// Computes the model's output for `batch` and hands it to the objective.
    fn forward_prop(&mut self, mode: ExecutionMode, batch: &MiniBatch) -> Result<()>;

    /// Propagates the objective gradient back to every weights object.
    fn backward_prop(&mut self) -> Result<()>;

    fn clear_gradients(&mut self);

    /// Averages the gradients across ranks and applies every optimizer.
    fn update_weights(&mut self) -> Result<()>;

    /// Lets stateful layers advance, returns whether every layer finished.
    fn update_layers(&mut self) -> bool;

    /// Scores the last forward pass with every metric.
    fn evaluate_metrics(&mut self, mode: ExecutionMode, mini_batch_size: usize) -> Result<()>;

    /// Averages the weight values across ranks.
    fn reconcile_weight_values(&mut self) -> Result<()>;

    fn objective_function(&mut self) -> &mut dyn ObjectiveFunction;

    /// The mean objective value of `mode` over the current epoch.
    fn objective_value(&self, mode: ExecutionMode) -> Option<f32>;

    /// The mean value of the metric called `name` for `mode` over the current epoch.
    fn metric_value(&self, mode: ExecutionMode, name: &str) -> Option<f32>;

    /// The name of every metric, in evaluation order.
    fn metric_names(&self) -> Vec<&'static str>;

    /// Whether a higher value of the metric called `name` is an improvement.
    fn metric_higher_is_better(&self, name: &str) -> Option<bool>;

    fn weights(&self) -> Vec<WeightsSnapshot>;

    fn set_weights(&mut self, snapshots: &[WeightsSnapshot]) -> Result<()>;

    /// The optimizer state of every weights object, paired with the weights name.
    fn optimizer_states(&self) -> Vec<(String, OptimizerState)> {
        Vec::new()
    }

    /// Loads optimizer states as returned by `optimizer_states`.
    fn set_optimizer_states(&mut self, states: &[(String, OptimizerState)]) -> Result<()> {
        match states.len() {
            0 => Ok(()),
            got => Err(MlErr::SizeMismatch {
                what: "optimizer states",
                got,
                expected: 0,
            }),
        }
    }

    /// A deep copy with its own weights and optimizer state and no callbacks.
    fn copy_model(&self) -> Box<dyn Model>;
}
