use serde::{Deserialize, Serialize};

use super::{ExecutionContext, ExecutionMode, SgdState};
use crate::{MlErr, Result, arch::Model, data::DataCoordinator};

/// The progress an algorithm keeps outside of the execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmState {
    Sgd(SgdState),
    Ltfb { local: SgdState, round: usize },
}

impl AlgorithmState {
    pub fn kind(&self) -> &'static str {
        match self {
            AlgorithmState::Sgd(_) => "sgd",
            AlgorithmState::Ltfb { .. } => "ltfb",
        }
    }
}

pub(crate) fn foreign_state(algorithm: &'static str, state: &AlgorithmState) -> MlErr {
    MlErr::Checkpoint(format!(
        "cannot restore {} algorithm state into {algorithm}",
        state.kind()
    ))
}

/// A named strategy that drives a model over the data of a coordinator.
pub trait TrainingAlgorithm: Send {
    /// The instance name given in the configuration.
    fn name(&self) -> &str;

    /// The kind the algorithm is registered under.
    fn kind(&self) -> &'static str;

    /// Runs the algorithm in `mode`, advancing `ctx`.
    fn apply(
        &mut self,
        ctx: &mut ExecutionContext,
        model: &mut dyn Model,
        dc: &mut dyn DataCoordinator,
        mode: ExecutionMode,
    ) -> Result<()>;

    /// A fresh context to start a run with.
    fn new_execution_context(&self) -> ExecutionContext {
        ExecutionContext::new(ExecutionMode::Invalid, 0)
    }

    /// The progress the algorithm keeps outside of the context, for checkpoints.
    fn state(&self) -> Option<AlgorithmState> {
        None
    }

    /// Puts back progress captured by `state`.
    ///
    /// # Errors
    /// `MlErr::Checkpoint` if `state` was captured from another kind of algorithm.
    fn restore_state(&mut self, state: &AlgorithmState) -> Result<()> {
        Err(foreign_state(self.kind(), state))
    }
}
