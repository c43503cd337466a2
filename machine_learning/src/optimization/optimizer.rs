use comms::specs::machine_learning::OptimizerSpec;
use serde::{Deserialize, Serialize};

use super::{Adam, GradientDescent, GradientDescentWithMomentum};
use crate::{MlErr, Result};

/// The update rule applied to one weights object.
pub trait Optimizer: Send {
    /// Takes a step over `params` given their `grad`.
    ///
    /// # Errors
    /// `MlErr::SizeMismatch` if the slices or the optimizer state differ in length.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()>;

    /// The state accumulated over the previous updates.
    fn state(&self) -> OptimizerState;

    /// Replaces the accumulated state with `state`.
    ///
    /// # Errors
    /// `MlErr::InvalidConfig` if `state` belongs to another kind of optimizer,
    /// `MlErr::SizeMismatch` if its buffers have the wrong length.
    fn load_state(&mut self, state: &OptimizerState) -> Result<()>;

    /// Clones the optimizer together with its accumulated state.
    fn box_clone(&self) -> Box<dyn Optimizer>;
}

/// The accumulated state of an optimizer, as saved to checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerState {
    Stateless,
    Momentum {
        velocity: Vec<f32>,
    },
    Adam {
        beta1_t: f32,
        beta2_t: f32,
        v: Vec<f32>,
        s: Vec<f32>,
    },
}

impl OptimizerState {
    fn kind(&self) -> &'static str {
        match self {
            OptimizerState::Stateless => "stateless",
            OptimizerState::Momentum { .. } => "momentum",
            OptimizerState::Adam { .. } => "adam",
        }
    }
}

pub(super) fn wrong_state(expected: &'static str, state: &OptimizerState) -> MlErr {
    MlErr::InvalidConfig(format!(
        "cannot load {} optimizer state into a {expected} optimizer",
        state.kind()
    ))
}

impl Clone for Box<dyn Optimizer> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

pub(super) fn check_len(what: &'static str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(MlErr::SizeMismatch {
            what,
            got,
            expected,
        });
    }

    Ok(())
}

/// Creates a fresh optimizer for a weights object of `len` parameters.
pub fn from_spec(spec: OptimizerSpec, len: usize) -> Box<dyn Optimizer> {
    match spec {
        OptimizerSpec::GradientDescent { learning_rate } => {
            Box::new(GradientDescent::new(learning_rate))
        }
        OptimizerSpec::GradientDescentWithMomentum {
            learning_rate,
            momentum,
        } => Box::new(GradientDescentWithMomentum::new(len, learning_rate, momentum)),
        OptimizerSpec::Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
        } => Box::new(Adam::new(len, learning_rate, beta1, beta2, epsilon)),
    }
}
