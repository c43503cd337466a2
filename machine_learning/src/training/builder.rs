use std::sync::Arc;

use comms::specs::{
    data::{DataSpec, SplitSpec},
    machine_learning::{LayerSpec, LossFnSpec, ModelSpec},
    trainer::{CallbackSpec, TrainerSpec},
};
use log::debug;
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{AlgorithmRegistry, Resources, Trainer};
use crate::{
    MlErr, Result,
    arch::{
        ActFn, CrossEntropy, Dense, LossFn, Model, Mse, Sequential, Weights, dense_params,
        flatten, unflatten,
    },
    callbacks::{CheckpointCallback, EarlyStopping, PrintStatistics, SharedCallback, shared},
    data::{Dataset, InMemoryCoordinator, ShardSpec, SplitOptions},
    distributed::Communicator,
    execution::ExecutionMode,
    optimization,
};

/// Builds `Trainer`s given a specification.
pub struct TrainerBuilder<'r> {
    registry: &'r AlgorithmRegistry,
}

impl<'r> TrainerBuilder<'r> {
    /// Creates a new `TrainerBuilder`.
    ///
    /// # Arguments
    /// * `registry` - Where the training algorithm kinds are looked up.
    pub fn new(registry: &'r AlgorithmRegistry) -> Self {
        Self { registry }
    }

    /// Builds one rank of a trainer following a spec.
    ///
    /// Every rank of the trainer must call this together, the initial weights of the
    /// master rank are broadcast to the rest.
    ///
    /// # Arguments
    /// * `spec` - The specification for the trainer.
    /// * `comm` - The communicator of the trainer's ranks.
    /// * `resources` - What the training algorithm may take while being built.
    pub fn build(
        &self,
        spec: &TrainerSpec,
        comm: Arc<dyn Communicator>,
        mut resources: Resources,
    ) -> Result<Trainer> {
        if comm.size() != spec.ranks.get() {
            return Err(MlErr::InvalidConfig(format!(
                "the trainer has {} ranks but the communicator spans {}",
                spec.ranks,
                comm.size()
            )));
        }

        let shard = ShardSpec::new(comm.rank(), spec.ranks)?;
        let coordinator = self.resolve_data(spec, shard)?;
        let model = self.resolve_model(spec, comm)?;
        let algorithm = self.registry.build(&spec.algorithm, &mut resources)?;

        Ok(Trainer::new(model, coordinator, algorithm))
    }

    fn resolve_model(&self, spec: &TrainerSpec, comm: Arc<dyn Communicator>) -> Result<Box<dyn Model>> {
        let mut rng = self.generate_rng(spec.seed);

        match &spec.model {
            ModelSpec::Sequential {
                layers: layer_specs,
            } => {
                let layers = layer_specs
                    .iter()
                    .enumerate()
                    .map(|(i, ls)| self.resolve_layer(spec, i, *ls, &mut rng))
                    .collect::<Result<Vec<_>>>()?;

                self.resolve_loss(spec, layers, comm)
            }
        }
    }

    fn resolve_layer<R: Rng>(
        &self,
        spec: &TrainerSpec,
        index: usize,
        layer: LayerSpec,
        rng: &mut R,
    ) -> Result<(Dense, Weights)> {
        match layer {
            LayerSpec::Dense { dim, act_fn } => {
                let name = format!("dense{index}");
                let values = dense_params(spec.init, dim, rng)?;
                let optimizer = optimization::from_spec(spec.optimizer, values.len());
                let weights = Weights::new(format!("{name}.params"), values, optimizer);

                Ok((Dense::new(name, dim, act_fn.map(ActFn::from)), weights))
            }
        }
    }

    fn resolve_loss(
        &self,
        spec: &TrainerSpec,
        layers: Vec<(Dense, Weights)>,
        comm: Arc<dyn Communicator>,
    ) -> Result<Box<dyn Model>> {
        match spec.loss {
            LossFnSpec::Mse => self.terminate_model(spec, layers, Mse::new(), comm),
            LossFnSpec::CrossEntropy => {
                self.terminate_model(spec, layers, CrossEntropy::new(), comm)
            }
        }
    }

    fn terminate_model<L: LossFn>(
        &self,
        spec: &TrainerSpec,
        layers: Vec<(Dense, Weights)>,
        loss: L,
        comm: Arc<dyn Communicator>,
    ) -> Result<Box<dyn Model>> {
        let mut model = Sequential::new("model", layers, loss, comm)?;

        if let Some(scale) = spec.l2_regularization {
            model = model.with_l2(scale);
        }

        for &metric in &spec.metrics {
            model = model.with_metric(metric.into());
        }

        for callback in &spec.callbacks {
            model = model.with_callback(self.resolve_callback(callback));
        }

        let mut model: Box<dyn Model> = Box::new(model);
        self.sync_weights(model.as_mut())?;
        Ok(model)
    }

    /// Makes every rank start from the master rank's weights.
    fn sync_weights(&self, model: &mut dyn Model) -> Result<()> {
        let snapshots = model.weights();
        let mut flat = flatten(&snapshots);
        model.comm().broadcast(0, &mut flat);
        model.set_weights(&unflatten(&snapshots, &flat)?)
    }

    fn resolve_callback(&self, spec: &CallbackSpec) -> SharedCallback {
        match spec {
            CallbackSpec::EarlyStopping { patience, metric } => {
                let callback = EarlyStopping::new(*patience);
                match metric {
                    Some(name) => shared(callback.on_metric(name.clone())),
                    None => shared(callback),
                }
            }
            CallbackSpec::PrintStatistics { batch_interval } => {
                shared(PrintStatistics::new(batch_interval.get()))
            }
            CallbackSpec::Checkpoint { dir, every_epochs } => {
                shared(CheckpointCallback::new(dir.clone(), every_epochs.get()))
            }
        }
    }

    fn resolve_data(&self, spec: &TrainerSpec, shard: ShardSpec) -> Result<InMemoryCoordinator> {
        let DataSpec {
            training,
            validation,
            testing,
            tournament,
            prefetch,
        } = &spec.data;

        let dims = self.model_dims(&spec.model)?;
        let seed = spec.seed.unwrap_or_else(rand::random);

        let splits = [
            (ExecutionMode::Training, Some(training)),
            (ExecutionMode::Validation, validation.as_ref()),
            (ExecutionMode::Testing, testing.as_ref()),
            (ExecutionMode::Tournament, tournament.as_ref()),
        ];

        let mut coordinator = InMemoryCoordinator::new();
        for (mode, split) in splits {
            let Some(split) = split else {
                continue;
            };

            let (dataset, options) = self.resolve_split(mode, split, dims, shard, seed, *prefetch)?;
            coordinator.add_split(mode, dataset, options);
        }

        Ok(coordinator)
    }

    fn resolve_split(
        &self,
        mode: ExecutionMode,
        spec: &SplitSpec,
        (x_size, y_size): (usize, usize),
        shard: ShardSpec,
        seed: u64,
        prefetch: bool,
    ) -> Result<(Dataset, SplitOptions)> {
        let dataset = Dataset::from_source(spec.source.clone())?;

        if dataset.x_size() != x_size {
            return Err(MlErr::SizeMismatch {
                what: "dataset features",
                got: dataset.x_size(),
                expected: x_size,
            });
        }

        if dataset.y_size() != y_size {
            return Err(MlErr::SizeMismatch {
                what: "dataset labels",
                got: dataset.y_size(),
                expected: y_size,
            });
        }

        let batch_size = spec.batch_size;
        if !shard.balanced_batches(dataset.len(), batch_size.get()) {
            return Err(MlErr::InvalidConfig(format!(
                "the {mode} split of {} samples in batches of {batch_size} gives the {} ranks different amounts of mini-batches",
                dataset.len(),
                shard.ranks
            )));
        }

        let mut options = SplitOptions::new(batch_size).shard(shard).prefetch(prefetch);
        if spec.shuffle {
            options = options.shuffle(seed);
        }

        debug!(
            mode = mode.as_str(),
            samples = dataset.len(),
            batch_size = batch_size.get();
            "resolved data split"
        );

        Ok((dataset, options))
    }

    /// The input and output widths of the model.
    fn model_dims(&self, spec: &ModelSpec) -> Result<(usize, usize)> {
        match spec {
            ModelSpec::Sequential { layers } => {
                let dim = |layer: &LayerSpec| match *layer {
                    LayerSpec::Dense { dim, .. } => dim,
                };

                match (layers.first(), layers.last()) {
                    (Some(first), Some(last)) => Ok((dim(first).0, dim(last).1)),
                    _ => Err(MlErr::InvalidConfig("the model has no layers".to_string())),
                }
            }
        }
    }

    fn generate_rng(&self, seed: Option<u64>) -> StdRng {
        match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}
