use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    Dense, LossFn, Metric, Model, Objective, ObjectiveFunction, Weights, WeightsHandle,
    WeightsSnapshot, statistics::EpochStatistics,
};
use crate::{
    MlErr, Result,
    callbacks::{Callback, SharedCallback},
    data::MiniBatch,
    distributed::Communicator,
    execution::{ExecutionContext, ExecutionMode},
    optimization::OptimizerState,
};

fn fire<F>(callbacks: &[SharedCallback], mut hook: F) -> Result<()>
where
    F: FnMut(&mut dyn Callback) -> Result<()>,
{
    for cb in callbacks {
        hook(&mut *cb.lock())?;
    }

    Ok(())
}

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
///
/// Every dense layer owns exactly one weights object, shared with the objective so the
/// regularization term can read it.
pub struct Sequential<L: LossFn> {
    name: String,
    layers: Vec<Dense>,
    weights: Vec<WeightsHandle>,
    objective: Objective<L>,
    metrics: Vec<(Metric, EpochStatistics)>,
    callbacks: Vec<SharedCallback>,
    comm: Arc<dyn Communicator>,
    mode: ExecutionMode,
    step: usize,
}

impl<L: LossFn> Sequential<L> {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `name` - The name callbacks see for the model.
    /// * `layers` - Every layer together with its weights, in forward order.
    /// * `loss_fn` - The loss term of the objective.
    /// * `comm` - The communicator of the trainer's ranks.
    ///
    /// # Returns
    /// A new `Sequential` or an error if some weights do not fit their layer.
    pub fn new<I>(
        name: impl Into<String>,
        layers: I,
        loss_fn: L,
        comm: Arc<dyn Communicator>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (Dense, Weights)>,
    {
        let (layers, weights): (Vec<_>, Vec<_>) = layers.into_iter().unzip();

        for (layer, w) in layers.iter().zip(&weights) {
            if layer.size() != w.len() {
                return Err(MlErr::SizeMismatch {
                    what: "layer weights",
                    got: w.len(),
                    expected: layer.size(),
                });
            }
        }

        for pair in layers.windows(2) {
            if pair[0].dim().1 != pair[1].dim().0 {
                return Err(MlErr::SizeMismatch {
                    what: "consecutive layer dimensions",
                    got: pair[1].dim().0,
                    expected: pair[0].dim().1,
                });
            }
        }

        Ok(Self {
            name: name.into(),
            layers,
            weights: weights.into_iter().map(Weights::into_handle).collect(),
            objective: Objective::new(loss_fn, Arc::clone(&comm)),
            metrics: Vec::new(),
            callbacks: Vec::new(),
            comm,
            mode: ExecutionMode::Invalid,
            step: 0,
        })
    }

    /// Penalizes every weights object of the model with an L2 term of the given scale.
    pub fn with_l2(mut self, scale: f32) -> Self {
        self.objective = self.objective.with_l2(scale, self.weights.clone());
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metrics.push((metric, EpochStatistics::default()));
        self
    }

    pub fn with_callback(mut self, callback: SharedCallback) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    pub fn objective(&self) -> &Objective<L> {
        &self.objective
    }

    /// The mode and step of the last `reset_mode` call.
    pub fn position(&self) -> (ExecutionMode, usize) {
        (self.mode, self.step)
    }
}

impl<L: LossFn> Model for Sequential<L> {
    fn name(&self) -> &str {
        &self.name
    }

    fn comm(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }

    fn callbacks(&self) -> Vec<SharedCallback> {
        self.callbacks.clone()
    }

    fn add_callback(&mut self, callback: SharedCallback) {
        self.callbacks.push(callback);
    }

    fn reset_mode(&mut self, ctx: &ExecutionContext, mode: ExecutionMode) {
        self.mode = mode;
        self.step = ctx.step();
    }

    fn reset_epoch_statistics(&mut self, mode: ExecutionMode) {
        self.objective.reset_statistics(mode);
        self.metrics
            .iter_mut()
            .for_each(|(_, stats)| stats.reset(mode));
    }

    fn forward_prop(&mut self, mode: ExecutionMode, batch: &MiniBatch) -> Result<()> {
        let Self {
            name,
            layers,
            weights,
            objective,
            callbacks,
            ..
        } = self;
        let (name, callbacks) = (name.as_str(), callbacks.as_slice());

        fire(callbacks, |cb| cb.on_forward_prop_begin(name, mode))?;

        let mut x = batch.x.clone();
        for (layer, handle) in layers.iter_mut().zip(weights.iter()) {
            fire(callbacks, |cb| cb.on_layer_forward_prop_begin(layer.name(), mode))?;
            x = layer.forward(handle.lock().values(), x.view())?;
            fire(callbacks, |cb| cb.on_layer_forward_prop_end(layer.name(), mode))?;
        }

        objective.set_outputs(x, batch.y.clone());
        fire(callbacks, |cb| cb.on_forward_prop_end(name, mode))
    }

    fn backward_prop(&mut self) -> Result<()> {
        let Self {
            name,
            layers,
            weights,
            objective,
            callbacks,
            ..
        } = self;
        let (name, callbacks) = (name.as_str(), callbacks.as_slice());

        fire(callbacks, |cb| cb.on_backward_prop_begin(name))?;

        let mut d = objective.gradient().clone();
        for (layer, handle) in layers.iter_mut().zip(weights.iter()).rev() {
            fire(callbacks, |cb| cb.on_layer_backward_prop_begin(layer.name()))?;

            {
                let mut w = handle.lock();
                let (values, grad) = w.parts_mut();
                d = layer.backward(values, grad, d.view())?;
            }

            fire(callbacks, |cb| cb.on_layer_backward_prop_end(layer.name()))?;
        }

        fire(callbacks, |cb| cb.on_backward_prop_end(name))
    }

    fn clear_gradients(&mut self) {
        self.weights
            .iter()
            .for_each(|handle| handle.lock().clear_gradient());
    }

    fn update_weights(&mut self) -> Result<()> {
        let Self {
            name,
            weights,
            callbacks,
            comm,
            ..
        } = self;
        let (name, callbacks) = (name.as_str(), callbacks.as_slice());

        fire(callbacks, |cb| cb.on_optimize_begin(name))?;

        for handle in weights.iter() {
            let mut w = handle.lock();
            comm.allreduce_mean(w.gradient_mut());

            fire(callbacks, |cb| cb.on_weights_optimize_begin(w.name()))?;
            w.step()?;
            fire(callbacks, |cb| cb.on_weights_optimize_end(w.name()))?;
        }

        fire(callbacks, |cb| cb.on_optimize_end(name))
    }

    fn update_layers(&mut self) -> bool {
        true
    }

    fn evaluate_metrics(&mut self, mode: ExecutionMode, mini_batch_size: usize) -> Result<()> {
        let prediction = self.objective.prediction().view();
        let labels = self.objective.labels().view();

        for (metric, stats) in &mut self.metrics {
            let mut totals = [metric.evaluate(prediction, labels), mini_batch_size as f64];
            self.comm.allreduce_sum_f64(&mut totals);
            stats.add(mode, totals[0], totals[1]);
        }

        Ok(())
    }

    fn reconcile_weight_values(&mut self) -> Result<()> {
        for handle in &self.weights {
            self.comm.allreduce_mean(handle.lock().values_mut());
        }

        Ok(())
    }

    fn objective_function(&mut self) -> &mut dyn ObjectiveFunction {
        &mut self.objective
    }

    fn objective_value(&self, mode: ExecutionMode) -> Option<f32> {
        self.objective.mean_value(mode)
    }

    fn metric_value(&self, mode: ExecutionMode, name: &str) -> Option<f32> {
        self.metrics
            .iter()
            .find(|(metric, _)| metric.name() == name)
            .and_then(|(_, stats)| stats.mean(mode))
            .map(|v| v as f32)
    }

    fn metric_names(&self) -> Vec<&'static str> {
        self.metrics.iter().map(|(metric, _)| metric.name()).collect()
    }

    fn metric_higher_is_better(&self, name: &str) -> Option<bool> {
        self.metrics
            .iter()
            .find(|(metric, _)| metric.name() == name)
            .map(|(metric, _)| metric.higher_is_better())
    }

    fn weights(&self) -> Vec<WeightsSnapshot> {
        self.weights.iter().map(|w| w.lock().snapshot()).collect()
    }

    fn set_weights(&mut self, snapshots: &[WeightsSnapshot]) -> Result<()> {
        if snapshots.len() != self.weights.len() {
            return Err(MlErr::SizeMismatch {
                what: "weights objects",
                got: snapshots.len(),
                expected: self.weights.len(),
            });
        }

        for (handle, snapshot) in self.weights.iter().zip(snapshots) {
            let mut w = handle.lock();

            if w.name() != snapshot.name {
                return Err(MlErr::InvalidConfig(format!(
                    "expected weights {:?}, got {:?}",
                    w.name(),
                    snapshot.name
                )));
            }

            w.load(snapshot)?;
        }

        Ok(())
    }

    fn optimizer_states(&self) -> Vec<(String, OptimizerState)> {
        self.weights
            .iter()
            .map(|w| {
                let w = w.lock();
                (w.name().to_string(), w.optimizer_state())
            })
            .collect()
    }

    fn set_optimizer_states(&mut self, states: &[(String, OptimizerState)]) -> Result<()> {
        if states.len() != self.weights.len() {
            return Err(MlErr::SizeMismatch {
                what: "optimizer states",
                got: states.len(),
                expected: self.weights.len(),
            });
        }

        for (handle, (name, state)) in self.weights.iter().zip(states) {
            let mut w = handle.lock();

            if w.name() != name {
                return Err(MlErr::InvalidConfig(format!(
                    "expected optimizer state of {:?}, got {name:?}",
                    w.name()
                )));
            }

            w.load_optimizer_state(state)?;
        }

        Ok(())
    }

    fn copy_model(&self) -> Box<dyn Model> {
        let weights: Vec<WeightsHandle> = self
            .weights
            .iter()
            .map(|w| Arc::new(Mutex::new(w.lock().clone())))
            .collect();

        Box::new(Self {
            name: self.name.clone(),
            layers: self.layers.clone(),
            objective: self.objective.copy_with(weights.clone()),
            weights,
            metrics: self
                .metrics
                .iter()
                .map(|(metric, _)| (*metric, EpochStatistics::default()))
                .collect(),
            callbacks: Vec::new(),
            comm: Arc::clone(&self.comm),
            mode: self.mode,
            step: self.step,
        })
    }
}
