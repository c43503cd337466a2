//! Serializable descriptions of everything a trainer process is configured with.

pub mod data;
pub mod machine_learning;
pub mod trainer;
pub mod training;
