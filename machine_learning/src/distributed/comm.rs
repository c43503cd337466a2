/// The collective operations the ranks of a trainer use to stay in lockstep.
///
/// Every rank of the group must call the same collectives in the same order with buffers
/// of the same length.
pub trait Communicator: Send + Sync {
    /// This rank's index within the trainer.
    fn rank(&self) -> usize;

    /// The amount of ranks in the trainer.
    fn size(&self) -> usize;

    /// Whether this rank prints and writes on behalf of the trainer.
    fn am_master(&self) -> bool {
        self.rank() == 0
    }

    /// Blocks until every rank reaches the barrier.
    fn barrier(&self);

    /// Replaces every element of `buf` with its sum across all ranks.
    fn allreduce_sum(&self, buf: &mut [f32]);

    /// Replaces every element of `buf` with its sum across all ranks.
    fn allreduce_sum_f64(&self, buf: &mut [f64]);

    /// Overwrites `buf` on every rank with the contents of `root`'s `buf`.
    fn broadcast(&self, root: usize, buf: &mut [f32]);

    /// Replaces every element of `buf` with its mean across all ranks.
    fn allreduce_mean(&self, buf: &mut [f32]) {
        self.allreduce_sum(buf);

        let size = self.size() as f32;
        if size > 1.0 {
            buf.iter_mut().for_each(|x| *x /= size);
        }
    }
}
