use comms::specs::training::MutationSpec;
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};

use crate::{MlErr, Result, arch::Model};

/// Alters a partner model before it competes in the tournament.
pub trait MutationStrategy: Send {
    fn mutate(&mut self, model: &mut dyn Model, round: usize) -> Result<()>;
}

/// Leaves the partner model untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMutation;

impl MutationStrategy for NullMutation {
    fn mutate(&mut self, _model: &mut dyn Model, _round: usize) -> Result<()> {
        Ok(())
    }
}

/// Adds gaussian noise to every weight value.
///
/// The noise of a round only depends on the seed and the round, so every rank of a trainer
/// applies the same perturbation.
#[derive(Debug, Clone, Copy)]
pub struct PerturbWeights {
    scale: f32,
    seed: u64,
}

impl PerturbWeights {
    pub fn new(scale: f32, seed: u64) -> Self {
        Self { scale, seed }
    }
}

impl MutationStrategy for PerturbWeights {
    fn mutate(&mut self, model: &mut dyn Model, round: usize) -> Result<()> {
        let normal = Normal::new(0.0, self.scale)
            .map_err(|e| MlErr::InvalidConfig(format!("invalid perturbation scale: {e}")))?;
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(round as u64));

        let mut weights = model.weights();
        weights
            .iter_mut()
            .flat_map(|w| w.values.iter_mut())
            .for_each(|v| *v += normal.sample(&mut rng));

        model.set_weights(&weights)
    }
}

/// Creates the mutation strategy of a trainer.
///
/// # Arguments
/// * `spec` - The configured strategy.
/// * `seed` - A seed unique to the trainer.
pub fn from_spec(spec: MutationSpec, seed: u64) -> Box<dyn MutationStrategy> {
    match spec {
        MutationSpec::Null => Box::new(NullMutation),
        MutationSpec::PerturbWeights { scale } => Box::new(PerturbWeights::new(scale, seed)),
    }
}
