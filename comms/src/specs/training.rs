use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// The specification for the stopping criteria of a training algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationSpec {
    MaxBatches(usize),
    MaxEpochs(usize),
    MaxSeconds(f64),
}

/// The specification for the plain SGD training loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SgdSpec {
    pub stopping_criteria: TerminationSpec,
    #[serde(default)]
    pub suppress_timer_output: bool,
}

/// How a received partner model is altered before the tournament.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationSpec {
    #[default]
    Null,
    PerturbWeights {
        scale: f32,
    },
}

/// The specification for the LTFB tournament meta-algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LtfbSpec {
    pub local_algorithm: SgdSpec,
    pub batches_per_round: NonZeroUsize,
    pub stopping_criteria: TerminationSpec,
    #[serde(default)]
    pub mutation: MutationSpec,
    #[serde(default)]
    pub seed: u64,
    /// The weights objects swapped with the partner, every one of them when unset.
    #[serde(default)]
    pub weights_names: Option<Vec<String>>,
}

/// The kind specific part of a training algorithm specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmSpec {
    Sgd(SgdSpec),
    Ltfb(LtfbSpec),
}

impl AlgorithmSpec {
    /// The name the algorithm kind is registered under.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sgd(_) => "sgd",
            Self::Ltfb(_) => "ltfb",
        }
    }
}

/// The specification for the `TrainingAlgorithm` trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingAlgorithmSpec {
    pub name: String,
    pub algorithm: AlgorithmSpec,
}
