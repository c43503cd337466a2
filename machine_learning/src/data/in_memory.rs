use std::{collections::BTreeMap, num::NonZeroUsize, ops::Range, sync::Arc};

use log::debug;

use super::{
    DataCoordinator, Dataset, MiniBatch, ShardSpec, SplitPosition,
    prefetch::Prefetcher,
    sampler::{EpochSampler, Fetched},
};
use crate::{
    MlErr, Result,
    execution::{ExecutionContext, ExecutionMode},
};

/// How a single split is read.
#[derive(Debug, Clone, Copy)]
pub struct SplitOptions {
    pub batch_size: NonZeroUsize,
    pub shard: ShardSpec,
    /// Reshuffles every epoch with this seed when set.
    pub shuffle_seed: Option<u64>,
    pub prefetch: bool,
}

impl SplitOptions {
    pub fn new(batch_size: NonZeroUsize) -> Self {
        Self {
            batch_size,
            shard: ShardSpec::whole(),
            shuffle_seed: None,
            prefetch: false,
        }
    }

    pub fn shard(mut self, shard: ShardSpec) -> Self {
        self.shard = shard;
        self
    }

    pub fn shuffle(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    pub fn prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }
}

enum Source {
    Inline(EpochSampler),
    Background(Prefetcher<Fetched>),
}

struct Split {
    dataset: Arc<Dataset>,
    shard: Range<usize>,
    options: SplitOptions,
    source: Source,
    position: SplitPosition,
    epoch_complete: bool,
}

impl Split {
    fn new(mode: ExecutionMode, dataset: Arc<Dataset>, options: SplitOptions) -> Self {
        let shard = options.shard.range(dataset.len());
        let source = Self::source(mode, &dataset, &shard, &options, SplitPosition::default());

        Self {
            dataset,
            shard,
            options,
            source,
            position: SplitPosition::default(),
            epoch_complete: false,
        }
    }

    fn source(
        mode: ExecutionMode,
        dataset: &Arc<Dataset>,
        shard: &Range<usize>,
        options: &SplitOptions,
        position: SplitPosition,
    ) -> Source {
        let mut sampler = EpochSampler::new(
            Arc::clone(dataset),
            shard.clone(),
            options.batch_size.get(),
            options.shuffle_seed,
            position,
        );

        match options.prefetch {
            true => Source::Background(Prefetcher::spawn(mode, move || sampler.next_batch())),
            false => Source::Inline(sampler),
        }
    }

    fn next(&mut self) -> Result<Fetched> {
        match &mut self.source {
            Source::Inline(sampler) => Ok(sampler.next_batch()),
            Source::Background(prefetcher) => prefetcher.next(),
        }
    }
}

/// A data coordinator serving every split from memory.
///
/// Each split is sharded across the ranks of the trainer and read in order, optionally
/// reshuffled on every epoch and optionally prefetched on a background thread.
pub struct InMemoryCoordinator {
    splits: BTreeMap<ExecutionMode, Split>,
    mode: ExecutionMode,
}

impl InMemoryCoordinator {
    pub fn new() -> Self {
        Self {
            splits: BTreeMap::new(),
            mode: ExecutionMode::Invalid,
        }
    }

    /// Adds or replaces the data of `mode`.
    ///
    /// # Arguments
    /// * `mode` - The execution mode the data is read in.
    /// * `dataset` - The whole dataset, only this rank's shard of it is read.
    /// * `options` - How the split is batched, shuffled and prefetched.
    pub fn add_split(&mut self, mode: ExecutionMode, dataset: Dataset, options: SplitOptions) {
        let split = Split::new(mode, Arc::new(dataset), options);
        debug!(mode = mode.as_str(), samples = split.shard.len(); "added data split");
        self.splits.insert(mode, split);
    }

    pub fn with_split(mut self, mode: ExecutionMode, dataset: Dataset, options: SplitOptions) -> Self {
        self.add_split(mode, dataset, options);
        self
    }

    /// The mode of the last context the coordinator was reset to.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }
}

impl Default for InMemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl DataCoordinator for InMemoryCoordinator {
    fn reset_mode(&mut self, ctx: &ExecutionContext) {
        self.mode = ctx.execution_mode();
    }

    fn fetch_data(&mut self, mode: ExecutionMode) -> Result<MiniBatch> {
        let split = self
            .splits
            .get_mut(&mode)
            .filter(|split| !split.shard.is_empty())
            .ok_or(MlErr::EmptySplit(mode))?;

        let Fetched {
            batch,
            epoch_complete,
            position,
        } = split.next()?;

        split.epoch_complete = epoch_complete;
        split.position = position;
        Ok(batch)
    }

    fn epoch_complete(&self, mode: ExecutionMode) -> bool {
        self.splits
            .get(&mode)
            .is_some_and(|split| split.epoch_complete)
    }

    fn is_execution_mode_valid(&self, mode: ExecutionMode) -> bool {
        self.splits
            .get(&mode)
            .is_some_and(|split| !split.shard.is_empty())
    }

    fn mini_batch_size(&self, mode: ExecutionMode) -> usize {
        self.splits
            .get(&mode)
            .map(|split| split.options.batch_size.get())
            .unwrap_or_default()
    }

    fn positions(&self) -> Vec<(ExecutionMode, SplitPosition)> {
        self.splits
            .iter()
            .map(|(&mode, split)| (mode, split.position))
            .collect()
    }

    fn restore_positions(&mut self, positions: &[(ExecutionMode, SplitPosition)]) -> Result<()> {
        for &(mode, position) in positions {
            let split = self
                .splits
                .get_mut(&mode)
                .ok_or(MlErr::EmptySplit(mode))?;

            split.source =
                Split::source(mode, &split.dataset, &split.shard, &split.options, position);
            split.position = position;
            split.epoch_complete = false;
        }

        Ok(())
    }
}
