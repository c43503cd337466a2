#![allow(dead_code)]

use std::{collections::BTreeMap, sync::Arc};

use machine_learning::{
    MlErr, Result,
    arch::{Model, ObjectiveFunction, WeightsSnapshot},
    callbacks::{Callback, SharedCallback, shared},
    data::{DataCoordinator, MiniBatch},
    distributed::{Communicator, LocalComm},
    execution::{ExecutionContext, ExecutionMode},
};
use ndarray::Array2;
use parking_lot::Mutex;

/// Every call the mocks observed, in order.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == event).count()
    }

    pub fn starting_with(&self, prefix: &str) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == event)
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

struct RecordingObjective {
    log: EventLog,
    open: Option<ExecutionMode>,
}

impl ObjectiveFunction for RecordingObjective {
    fn start_evaluation(&mut self, mode: ExecutionMode, _mini_batch_size: usize) -> Result<()> {
        self.open = Some(mode);
        self.log.push(format!("start({mode})"));
        Ok(())
    }

    fn differentiate(&mut self) -> Result<()> {
        self.log.push("differentiate");
        Ok(())
    }

    fn compute_weight_regularization(&mut self) -> Result<()> {
        self.log.push("regularize");
        Ok(())
    }

    fn finish_evaluation(&mut self, mode: ExecutionMode, _mini_batch_size: usize) -> Result<f32> {
        if self.open.take() != Some(mode) {
            return Err(MlErr::ObjectiveNotStarted(mode));
        }

        self.log.push(format!("finish({mode})"));
        Ok(1.0)
    }
}

/// A model that does no math and logs every call the training loop makes.
pub struct RecordingModel {
    log: EventLog,
    comm: LocalComm,
    callbacks: Vec<SharedCallback>,
    objective: RecordingObjective,
    weights: Vec<WeightsSnapshot>,
}

impl RecordingModel {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            comm: LocalComm,
            callbacks: Vec::new(),
            objective: RecordingObjective {
                log: log.clone(),
                open: None,
            },
            weights: vec![WeightsSnapshot {
                name: "w".to_string(),
                values: vec![0.0; 2],
            }],
        }
    }

    pub fn with_callback(mut self, callback: SharedCallback) -> Self {
        self.callbacks.push(callback);
        self
    }
}

impl Model for RecordingModel {
    fn name(&self) -> &str {
        "recording"
    }

    fn comm(&self) -> &dyn Communicator {
        &self.comm
    }

    fn callbacks(&self) -> Vec<SharedCallback> {
        self.callbacks.clone()
    }

    fn add_callback(&mut self, callback: SharedCallback) {
        self.callbacks.push(callback);
    }

    fn reset_mode(&mut self, _ctx: &ExecutionContext, _mode: ExecutionMode) {}

    fn reset_epoch_statistics(&mut self, _mode: ExecutionMode) {}

    fn forward_prop(&mut self, mode: ExecutionMode, _batch: &MiniBatch) -> Result<()> {
        self.log.push(format!("forward({mode})"));
        Ok(())
    }

    fn backward_prop(&mut self) -> Result<()> {
        self.log.push("backward");
        Ok(())
    }

    fn clear_gradients(&mut self) {
        self.log.push("clear_gradients");
    }

    fn update_weights(&mut self) -> Result<()> {
        self.log.push("update_weights");
        Ok(())
    }

    fn update_layers(&mut self) -> bool {
        self.log.push("update_layers");
        true
    }

    fn evaluate_metrics(&mut self, mode: ExecutionMode, _mini_batch_size: usize) -> Result<()> {
        self.log.push(format!("metrics({mode})"));
        Ok(())
    }

    fn reconcile_weight_values(&mut self) -> Result<()> {
        self.log.push("reconcile");
        Ok(())
    }

    fn objective_function(&mut self) -> &mut dyn ObjectiveFunction {
        &mut self.objective
    }

    fn objective_value(&self, _mode: ExecutionMode) -> Option<f32> {
        Some(1.0)
    }

    fn metric_value(&self, _mode: ExecutionMode, _name: &str) -> Option<f32> {
        None
    }

    fn metric_names(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn metric_higher_is_better(&self, _name: &str) -> Option<bool> {
        None
    }

    fn weights(&self) -> Vec<WeightsSnapshot> {
        self.weights.clone()
    }

    fn set_weights(&mut self, snapshots: &[WeightsSnapshot]) -> Result<()> {
        self.weights = snapshots.to_vec();
        Ok(())
    }

    fn copy_model(&self) -> Box<dyn Model> {
        let mut copy = RecordingModel::new(&self.log);
        copy.weights = self.weights.clone();
        Box::new(copy)
    }
}

/// Serves empty mini-batches, a fixed amount per epoch for every mode it has data for.
pub struct ScriptedCoordinator {
    log: EventLog,
    batches: BTreeMap<ExecutionMode, usize>,
    cursor: BTreeMap<ExecutionMode, usize>,
    complete: BTreeMap<ExecutionMode, bool>,
}

impl ScriptedCoordinator {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            batches: BTreeMap::new(),
            cursor: BTreeMap::new(),
            complete: BTreeMap::new(),
        }
    }

    pub fn with_split(mut self, mode: ExecutionMode, batches_per_epoch: usize) -> Self {
        self.batches.insert(mode, batches_per_epoch);
        self
    }
}

impl DataCoordinator for ScriptedCoordinator {
    fn reset_mode(&mut self, _ctx: &ExecutionContext) {}

    fn fetch_data(&mut self, mode: ExecutionMode) -> Result<MiniBatch> {
        let total = *self.batches.get(&mode).ok_or(MlErr::EmptySplit(mode))?;

        let cursor = self.cursor.entry(mode).or_default();
        *cursor += 1;
        let done = *cursor == total;
        if done {
            *cursor = 0;
        }

        self.complete.insert(mode, done);
        self.log.push(format!("fetch({mode})"));

        Ok(MiniBatch::new(Array2::zeros((2, 1)), Array2::zeros((2, 1))))
    }

    fn epoch_complete(&self, mode: ExecutionMode) -> bool {
        self.complete.get(&mode).copied().unwrap_or(false)
    }

    fn is_execution_mode_valid(&self, mode: ExecutionMode) -> bool {
        self.batches.get(&mode).is_some_and(|&n| n > 0)
    }

    fn mini_batch_size(&self, _mode: ExecutionMode) -> usize {
        2
    }
}

/// Logs every loop level hook as `hook@step` and stops training on demand.
pub struct RecordingCallback {
    log: EventLog,
    interval: usize,
    stop_at_epoch: Option<usize>,
    stop_at_validation_epoch: Option<usize>,
}

impl RecordingCallback {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            interval: 1,
            stop_at_epoch: None,
            stop_at_validation_epoch: None,
        }
    }

    pub fn every(mut self, interval: usize) -> Self {
        self.interval = interval;
        self
    }

    /// Requests an early stop at the end of the given training epoch.
    pub fn stop_at_epoch(mut self, epoch: usize) -> Self {
        self.stop_at_epoch = Some(epoch);
        self
    }

    /// Requests an early stop at the end of the given validation epoch.
    pub fn stop_at_validation_epoch(mut self, epoch: usize) -> Self {
        self.stop_at_validation_epoch = Some(epoch);
        self
    }

    pub fn shared(self) -> SharedCallback {
        shared(self)
    }

    fn record(&self, hook: &str, ctx: &ExecutionContext) {
        self.log.push(format!("{hook}@{}", ctx.step()));
    }
}

impl Callback for RecordingCallback {
    fn name(&self) -> &str {
        "recording"
    }

    fn batch_interval(&self) -> usize {
        self.interval
    }

    fn on_train_begin(&mut self, _model: &mut dyn Model, ctx: &mut ExecutionContext) -> Result<()> {
        self.record("train_begin", ctx);
        Ok(())
    }

    fn on_train_end(&mut self, _model: &mut dyn Model, ctx: &mut ExecutionContext) -> Result<()> {
        self.record("train_end", ctx);
        Ok(())
    }

    fn on_epoch_begin(&mut self, _model: &mut dyn Model, ctx: &mut ExecutionContext) -> Result<()> {
        self.record("epoch_begin", ctx);
        Ok(())
    }

    fn on_epoch_end(&mut self, _model: &mut dyn Model, ctx: &mut ExecutionContext) -> Result<()> {
        self.record("epoch_end", ctx);
        if self.stop_at_epoch.is_some_and(|epoch| ctx.epoch() >= epoch) {
            ctx.set_early_stop(true);
        }
        Ok(())
    }

    fn on_batch_begin(&mut self, _model: &mut dyn Model, ctx: &mut ExecutionContext) -> Result<()> {
        self.record("batch_begin", ctx);
        Ok(())
    }

    fn on_batch_end(&mut self, _model: &mut dyn Model, ctx: &mut ExecutionContext) -> Result<()> {
        self.record("batch_end", ctx);
        Ok(())
    }

    fn on_batch_evaluate_begin(
        &mut self,
        _model: &mut dyn Model,
        ctx: &mut ExecutionContext,
    ) -> Result<()> {
        self.record("batch_evaluate_begin", ctx);
        Ok(())
    }

    fn on_batch_evaluate_end(
        &mut self,
        _model: &mut dyn Model,
        ctx: &mut ExecutionContext,
    ) -> Result<()> {
        self.record("batch_evaluate_end", ctx);
        Ok(())
    }

    fn on_validation_begin(
        &mut self,
        _model: &mut dyn Model,
        ctx: &mut ExecutionContext,
    ) -> Result<()> {
        self.record("validation_begin", ctx);
        Ok(())
    }

    fn on_validation_end(
        &mut self,
        _model: &mut dyn Model,
        ctx: &mut ExecutionContext,
    ) -> Result<()> {
        self.record("validation_end", ctx);
        if self
            .stop_at_validation_epoch
            .is_some_and(|epoch| ctx.epoch() >= epoch)
        {
            ctx.set_early_stop(true);
        }
        Ok(())
    }

    fn on_test_begin(&mut self, _model: &mut dyn Model, ctx: &mut ExecutionContext) -> Result<()> {
        self.record("test_begin", ctx);
        Ok(())
    }

    fn on_test_end(&mut self, _model: &mut dyn Model, ctx: &mut ExecutionContext) -> Result<()> {
        self.record("test_end", ctx);
        Ok(())
    }
}

/// The AND of two inputs, optionally reshuffled every epoch.
pub fn and_split(batch_size: usize, shuffle: bool) -> comms::specs::data::SplitSpec {
    use comms::specs::data::{DatasetSource, DatasetSpec, SplitSpec};

    SplitSpec {
        source: DatasetSource::Inline(DatasetSpec {
            data: vec![0., 0., 0., 0., 1., 0., 1., 0., 0., 1., 1., 1.],
            x_size: 2,
            y_size: 1,
        }),
        batch_size: std::num::NonZeroUsize::new(batch_size).unwrap(),
        shuffle,
    }
}

/// A trainer spec learning the XOR of two inputs, `ranks` ranks wide.
pub fn xor_spec(ranks: usize, algorithm: serde_json::Value) -> comms::specs::trainer::TrainerSpec {
    let xor = serde_json::json!({
        "inline": {
            "data": [0, 0, 0, 0, 1, 1, 1, 0, 1, 1, 1, 0, 0, 0, 0, 0, 1, 1, 1, 0, 1, 1, 1, 0],
            "x_size": 2,
            "y_size": 1
        }
    });

    let spec = serde_json::json!({
        "model": { "sequential": { "layers": [
            { "dense": { "dim": [2, 4], "act_fn": { "sigmoid": { "amp": 1.0 } } } },
            { "dense": { "dim": [4, 1], "act_fn": { "sigmoid": { "amp": 1.0 } } } }
        ] } },
        "optimizer": { "gradient_descent": { "learning_rate": 0.5 } },
        "loss": "mse",
        "metrics": ["mean_squared_error"],
        "data": {
            "training": { "source": xor, "batch_size": 2 },
            "validation": { "source": xor, "batch_size": 4 }
        },
        "algorithm": algorithm,
        "ranks": ranks,
        "seed": 11
    });

    serde_json::from_value(spec).unwrap()
}
