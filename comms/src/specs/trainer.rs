use std::{num::NonZeroUsize, path::PathBuf};

use serde::{Deserialize, Serialize};

use super::{
    data::DataSpec,
    machine_learning::{InitSpec, LossFnSpec, MetricSpec, ModelSpec, OptimizerSpec},
    training::TrainingAlgorithmSpec,
};

fn one() -> NonZeroUsize {
    NonZeroUsize::MIN
}

/// The specification for a model callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackSpec {
    EarlyStopping {
        patience: usize,
        /// The metric to watch, the objective when unset.
        #[serde(default)]
        metric: Option<String>,
    },
    PrintStatistics {
        #[serde(default = "one")]
        batch_interval: NonZeroUsize,
    },
    Checkpoint {
        dir: PathBuf,
        #[serde(default = "one")]
        every_epochs: NonZeroUsize,
    },
}

/// Another trainer taking part in the tournament.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSpec {
    pub trainer: usize,
    pub addr: String,
}

/// The tournament network of a trainer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeersSpec {
    pub trainer: usize,
    pub listen: String,
    pub peers: Vec<PeerSpec>,
}

/// The specification for a whole trainer process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerSpec {
    pub model: ModelSpec,
    pub optimizer: OptimizerSpec,
    pub loss: LossFnSpec,
    #[serde(default)]
    pub l2_regularization: Option<f32>,
    #[serde(default)]
    pub metrics: Vec<MetricSpec>,
    #[serde(default)]
    pub callbacks: Vec<CallbackSpec>,
    #[serde(default)]
    pub init: InitSpec,
    pub data: DataSpec,
    pub algorithm: TrainingAlgorithmSpec,
    /// The amount of ranks training this trainer's model data parallel.
    #[serde(default = "one")]
    pub ranks: NonZeroUsize,
    pub seed: Option<u64>,
    #[serde(default)]
    pub peers: Option<PeersSpec>,
}
