//! Turns a `TrainerSpec` into a ready to run trainer.

mod builder;
mod registry;
mod trainer;

pub use builder::TrainerBuilder;
pub use registry::{AlgorithmFactory, AlgorithmRegistry, Resources};
pub use trainer::Trainer;
