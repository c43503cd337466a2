//! Local training with periodic pairwise tournaments between trainers.

mod exchange;
mod mutation;
mod pairing;
mod tournament;

pub use exchange::{ChannelExchange, OnoExchange, PeerExchange};
pub use mutation::{MutationStrategy, NullMutation, PerturbWeights, from_spec};
pub use pairing::partner;
pub use tournament::{Ltfb, Roster};
