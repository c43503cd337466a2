//! Mini-batch production for every execution mode.

mod coordinator;
mod dataset;
mod in_memory;
mod prefetch;
mod sampler;
mod shard;

pub use coordinator::DataCoordinator;
pub use dataset::{Dataset, MiniBatch};
pub use in_memory::{InMemoryCoordinator, SplitOptions};
pub use sampler::SplitPosition;
pub use shard::{ShardSpec, shard_range};
