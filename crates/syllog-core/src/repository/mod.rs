//! Storage interfaces implemented by the infrastructure layer.

mod checkpoint;
mod memory;

pub use checkpoint::CheckpointRepository;
pub use memory::MemoryCheckpointRepository;
