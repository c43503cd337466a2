use super::{MiniBatch, SplitPosition};
use crate::{
    Result,
    execution::{ExecutionContext, ExecutionMode},
};

/// The source of mini-batches for the training loop.
///
/// `epoch_complete` reports on the batch most recently returned by `fetch_data` for that mode.
pub trait DataCoordinator: Send {
    /// Points the coordinator at the mode of `ctx`.
    fn reset_mode(&mut self, ctx: &ExecutionContext);

    /// Produces the next mini-batch of `mode`.
    fn fetch_data(&mut self, mode: ExecutionMode) -> Result<MiniBatch>;

    /// Whether the last fetched batch of `mode` was the last one of its epoch.
    fn epoch_complete(&self, mode: ExecutionMode) -> bool;

    /// Whether there is any data to read for `mode`.
    fn is_execution_mode_valid(&self, mode: ExecutionMode) -> bool;

    /// The configured mini-batch size of `mode`, zero when there is no data for it.
    fn mini_batch_size(&self, mode: ExecutionMode) -> usize;

    /// The resumable position of every split.
    fn positions(&self) -> Vec<(ExecutionMode, SplitPosition)> {
        Vec::new()
    }

    /// Moves every listed split back to a previously saved position.
    fn restore_positions(&mut self, _positions: &[(ExecutionMode, SplitPosition)]) -> Result<()> {
        Ok(())
    }
}
