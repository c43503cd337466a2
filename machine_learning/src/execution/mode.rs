use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// The phase a model or data coordinator is operating in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Training,
    Validation,
    Testing,
    Prediction,
    Tournament,
    #[default]
    Invalid,
}

impl ExecutionMode {
    /// Whether the mode is one of the objective evaluating, non training modes.
    pub fn is_evaluation(self) -> bool {
        matches!(self, Self::Validation | Self::Tournament | Self::Testing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Validation => "validation",
            Self::Testing => "testing",
            Self::Prediction => "prediction",
            Self::Tournament => "tournament",
            Self::Invalid => "invalid",
        }
    }
}

impl Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
