use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

/// The trainer `trainer` is paired with in `round`, if any.
///
/// Every trainer draws the same permutation out of the seed and the round and pairs
/// neighbouring positions, so the pairing is symmetric. With an odd amount of trainers
/// the one left over sits the round out.
pub fn partner(seed: u64, round: usize, trainer: usize, num_trainers: usize) -> Option<usize> {
    let mut order: Vec<usize> = (0..num_trainers).collect();
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(round as u64));
    order.shuffle(&mut rng);

    let pos = order.iter().position(|&t| t == trainer)?;
    order.get(pos ^ 1).copied()
}
