//! Models and everything they are built from.

pub mod activations;
mod init;
pub mod layers;
pub mod loss;
mod metrics;
mod model;
mod objective;
mod sequential;
mod statistics;
mod weights;

pub use activations::ActFn;
pub use init::dense_params;
pub use layers::Dense;
pub use loss::{CrossEntropy, LossFn, Mse};
pub use metrics::Metric;
pub use model::Model;
pub use objective::{Objective, ObjectiveFunction};
pub use sequential::Sequential;
pub use weights::{Weights, WeightsHandle, WeightsSnapshot, flatten, unflatten};
