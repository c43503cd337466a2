use std::{ops::Range, sync::Arc};

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use super::{Dataset, MiniBatch};

/// Where in its epoch a split is, enough to resume the exact sample order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPosition {
    pub epoch: usize,
    pub cursor: usize,
}

/// A mini-batch together with the state of the split right after producing it.
#[derive(Debug)]
pub(super) struct Fetched {
    pub batch: MiniBatch,
    pub epoch_complete: bool,
    pub position: SplitPosition,
}

/// Walks one shard of a dataset in mini-batches, reshuffling on every epoch.
#[derive(Debug, Clone)]
pub(super) struct EpochSampler {
    dataset: Arc<Dataset>,
    shard: Range<usize>,
    batch_size: usize,
    shuffle_seed: Option<u64>,
    order: Vec<usize>,
    position: SplitPosition,
}

impl EpochSampler {
    pub fn new(
        dataset: Arc<Dataset>,
        shard: Range<usize>,
        batch_size: usize,
        shuffle_seed: Option<u64>,
        position: SplitPosition,
    ) -> Self {
        let mut sampler = Self {
            dataset,
            shard,
            batch_size,
            shuffle_seed,
            order: Vec::new(),
            position,
        };

        sampler.reorder();
        sampler
    }

    /// The sample order of an epoch only depends on the seed and the epoch number.
    fn reorder(&mut self) {
        self.order.clear();
        self.order.extend(self.shard.clone());

        if let Some(seed) = self.shuffle_seed {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(self.position.epoch as u64));
            self.order.shuffle(&mut rng);
        }
    }

    pub fn next_batch(&mut self) -> Fetched {
        let len = self.order.len();
        let start = self.position.cursor.min(len);
        let end = (start + self.batch_size).min(len);

        let batch = self.dataset.gather(&self.order[start..end]);
        let epoch_complete = end == len;

        if epoch_complete {
            self.position = SplitPosition {
                epoch: self.position.epoch + 1,
                cursor: 0,
            };
            self.reorder();
        } else {
            self.position.cursor = end;
        }

        Fetched {
            batch,
            epoch_complete,
            position: self.position,
        }
    }
}
