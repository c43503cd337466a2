//! Observers of the training loop.

mod callback;
mod checkpoint;
pub(crate) mod dispatch;
mod early_stopping;
mod print_statistics;

pub use callback::{Callback, SharedCallback, shared};
pub use checkpoint::CheckpointCallback;
pub use early_stopping::EarlyStopping;
pub use print_statistics::PrintStatistics;
