//! Process monitoring used by the memory statistic

pub mod memory_probe;

pub use memory_probe::{FixedMemoryProbe, ProcessMemoryProbe};
