//! Collective communication between the ranks of one trainer.

mod comm;
mod local;
mod thread;

pub use comm::Communicator;
pub use local::LocalComm;
pub use thread::ThreadComm;
