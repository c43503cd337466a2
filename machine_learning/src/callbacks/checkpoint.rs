use std::path::PathBuf;

use log::info;

use super::Callback;
use crate::{Result, arch::Model, checkpoint::Checkpoint, execution::ExecutionContext};

/// Saves the context and weights from the master rank every `every_epochs` training epochs.
#[derive(Debug, Clone)]
pub struct CheckpointCallback {
    dir: PathBuf,
    every_epochs: usize,
}

impl CheckpointCallback {
    pub fn new(dir: impl Into<PathBuf>, every_epochs: usize) -> Self {
        Self {
            dir: dir.into(),
            every_epochs: every_epochs.max(1),
        }
    }

    /// Where the checkpoint of `epoch` is written.
    pub fn path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("epoch-{epoch}.json"))
    }
}

impl Callback for CheckpointCallback {
    fn name(&self) -> &str {
        "checkpoint"
    }

    fn on_epoch_end(&mut self, model: &mut dyn Model, ctx: &mut ExecutionContext) -> Result<()> {
        let epoch = ctx.epoch();

        if epoch % self.every_epochs != 0 || !model.comm().am_master() {
            return Ok(());
        }

        let path = self.path(epoch);
        Checkpoint::capture(ctx, model).save(&path)?;
        info!(epoch = epoch; "saved checkpoint to {}", path.display());

        Ok(())
    }
}
