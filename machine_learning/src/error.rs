use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use crate::execution::ExecutionMode;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    InvalidExecutionMode {
        mode: ExecutionMode,
        during: &'static str,
    },
    InvalidConfig(String),
    UnknownAlgorithm(String),
    EmptySplit(ExecutionMode),
    ObjectiveNotStarted(ExecutionMode),
    Exchange(String),
    Checkpoint(String),
    Io(io::Error),
    Json(serde_json::Error),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::InvalidExecutionMode { mode, during } => {
                write!(f, "Invalid execution mode {mode} for {during}")
            }
            MlErr::InvalidConfig(reason) => write!(f, "Invalid configuration: {reason}"),
            MlErr::UnknownAlgorithm(kind) => {
                write!(f, "No training algorithm is registered as {kind:?}")
            }
            MlErr::EmptySplit(mode) => write!(f, "There is no {mode} data to fetch from"),
            MlErr::ObjectiveNotStarted(mode) => write!(
                f,
                "Tried to finish a {mode} objective evaluation that was never started"
            ),
            MlErr::Exchange(reason) => write!(f, "Model exchange failed: {reason}"),
            MlErr::Checkpoint(reason) => write!(f, "Checkpoint failed: {reason}"),
            MlErr::Io(e) => write!(f, "{e}"),
            MlErr::Json(e) => write!(f, "{e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Io(e) => Some(e),
            MlErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MlErr {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for MlErr {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<MlErr> for io::Error {
    fn from(e: MlErr) -> Self {
        match e {
            MlErr::Io(e) => e,
            e => io::Error::other(e),
        }
    }
}
