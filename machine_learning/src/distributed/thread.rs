use std::{
    num::NonZeroUsize,
    ops::AddAssign,
    sync::{Arc, Barrier},
};

use parking_lot::Mutex;

use super::Communicator;

struct Shared {
    barrier: Barrier,
    acc32: Mutex<Vec<f32>>,
    acc64: Mutex<Vec<f64>>,
}

/// A communicator for ranks running as threads of the same process.
///
/// The reductions go through a shared accumulator guarded by a barrier, so every rank reads
/// back the exact same sums.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    shared: Arc<Shared>,
}

impl ThreadComm {
    /// Creates the communicators for a whole group of ranks.
    ///
    /// # Arguments
    /// * `size` - The amount of ranks in the group.
    ///
    /// # Returns
    /// One `ThreadComm` per rank, ordered by rank.
    pub fn group(size: NonZeroUsize) -> Vec<Self> {
        let size = size.get();
        let shared = Arc::new(Shared {
            barrier: Barrier::new(size),
            acc32: Mutex::new(Vec::new()),
            acc64: Mutex::new(Vec::new()),
        });

        (0..size)
            .map(|rank| Self {
                rank,
                size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    fn reduce<T>(&self, acc: &Mutex<Vec<T>>, buf: &mut [T])
    where
        T: Copy + Default + AddAssign,
    {
        let barrier = &self.shared.barrier;

        if barrier.wait().is_leader() {
            let mut acc = acc.lock();
            acc.clear();
            acc.resize(buf.len(), T::default());
        }

        barrier.wait();

        acc.lock()
            .iter_mut()
            .zip(buf.iter())
            .for_each(|(a, b)| *a += *b);

        barrier.wait();

        buf.iter_mut()
            .zip(acc.lock().iter())
            .for_each(|(b, a)| *b = *a);

        barrier.wait();
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn allreduce_sum(&self, buf: &mut [f32]) {
        self.reduce(&self.shared.acc32, buf);
    }

    fn allreduce_sum_f64(&self, buf: &mut [f64]) {
        self.reduce(&self.shared.acc64, buf);
    }

    fn broadcast(&self, root: usize, buf: &mut [f32]) {
        let Shared { barrier, acc32, .. } = &*self.shared;

        barrier.wait();

        if self.rank == root {
            let mut acc = acc32.lock();
            acc.clear();
            acc.extend_from_slice(buf);
        }

        barrier.wait();

        if self.rank != root {
            buf.iter_mut()
                .zip(acc32.lock().iter())
                .for_each(|(b, a)| *b = *a);
        }

        barrier.wait();
    }
}
