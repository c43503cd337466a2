//! Training algorithms and the state they run on.

mod algorithm;
mod context;
mod mode;
mod sgd;
mod termination;
mod timer;

pub use algorithm::{AlgorithmState, TrainingAlgorithm};
pub(crate) use algorithm::foreign_state;
pub use context::ExecutionContext;
pub use mode::ExecutionMode;
pub use sgd::{SgdState, SgdTrainingAlgorithm};
pub use termination::TerminationCriteria;
pub use timer::TimerMap;
pub(crate) use timer::timed;
