use std::{num::NonZeroUsize, ops::Range};

use crate::{MlErr, Result};

/// Splits `total` samples among `ranks` and returns the contiguous shard of `rank`.
///
/// The shards are disjoint, cover `0..total` and their sizes differ by at most one.
pub fn shard_range(total: usize, rank: usize, ranks: usize) -> Range<usize> {
    let base = total / ranks;
    let rem = total % ranks;

    let start = rank * base + rank.min(rem);
    let end = start + base + usize::from(rank < rem);

    start..end
}

/// The slice of every split a rank of a trainer reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSpec {
    pub rank: usize,
    pub ranks: NonZeroUsize,
}

impl ShardSpec {
    pub fn new(rank: usize, ranks: NonZeroUsize) -> Result<Self> {
        if rank >= ranks.get() {
            return Err(MlErr::InvalidConfig(format!(
                "rank {rank} is out of range for {ranks} ranks"
            )));
        }

        Ok(Self { rank, ranks })
    }

    /// The shard of a trainer with a single rank.
    pub fn whole() -> Self {
        Self {
            rank: 0,
            ranks: NonZeroUsize::MIN,
        }
    }

    pub fn range(self, total: usize) -> Range<usize> {
        shard_range(total, self.rank, self.ranks.get())
    }

    /// Whether every rank gets the same amount of mini-batches per epoch out of `total` samples.
    ///
    /// The ranks reduce once per mini-batch, so a rank with an extra batch would wait forever.
    pub fn balanced_batches(self, total: usize, batch_size: usize) -> bool {
        let ranks = self.ranks.get();
        let batches = |rank| shard_range(total, rank, ranks).len().div_ceil(batch_size);

        (0..ranks).all(|rank| batches(rank) == batches(0))
    }
}
