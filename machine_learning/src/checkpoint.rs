//! Saving and restoring a training run.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    MlErr, Result,
    arch::{Model, WeightsSnapshot},
    data::{DataCoordinator, SplitPosition},
    execution::{AlgorithmState, ExecutionContext, ExecutionMode},
    optimization::OptimizerState,
};

/// Everything needed to resume a run where it stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub context: ExecutionContext,
    #[serde(default)]
    pub algorithm: Option<AlgorithmState>,
    #[serde(default)]
    pub data: Vec<(ExecutionMode, SplitPosition)>,
    pub weights: Vec<WeightsSnapshot>,
    #[serde(default)]
    pub optimizers: Vec<(String, OptimizerState)>,
}

impl Checkpoint {
    /// Captures the context, the weights and the optimizer state of `model`.
    pub fn capture(ctx: &ExecutionContext, model: &dyn Model) -> Self {
        Self {
            context: ctx.clone(),
            algorithm: None,
            data: Vec::new(),
            weights: model.weights(),
            optimizers: model.optimizer_states(),
        }
    }

    /// Adds the persistent state of the training algorithm.
    pub fn with_algorithm(mut self, state: AlgorithmState) -> Self {
        self.algorithm = Some(state);
        self
    }

    /// Adds the position of every split of `dc`.
    pub fn with_data(mut self, dc: &dyn DataCoordinator) -> Self {
        self.data = dc.positions();
        self
    }

    /// Writes the checkpoint as JSON, creating the parent directories if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Puts the saved context, weights, optimizer state and data positions back in place.
    ///
    /// Optimizer state is left untouched when the checkpoint carries none.
    pub fn restore(
        &self,
        ctx: &mut ExecutionContext,
        model: &mut dyn Model,
        dc: &mut dyn DataCoordinator,
    ) -> Result<()> {
        model
            .set_weights(&self.weights)
            .map_err(|e| MlErr::Checkpoint(format!("restoring weights: {e}")))?;

        if !self.optimizers.is_empty() {
            model
                .set_optimizer_states(&self.optimizers)
                .map_err(|e| MlErr::Checkpoint(format!("restoring optimizers: {e}")))?;
        }
        dc.restore_positions(&self.data)?;
        *ctx = self.context.clone();

        Ok(())
    }
}
