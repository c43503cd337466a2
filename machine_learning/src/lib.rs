pub mod arch;
pub mod callbacks;
pub mod checkpoint;
pub mod data;
pub mod distributed;
pub mod error;
pub mod execution;
pub mod ltfb;
pub mod optimization;
mod testing;
pub mod training;

pub use error::{MlErr, Result};
