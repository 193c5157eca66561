//! Physical store implementations.

mod dir;
mod memory;

pub use dir::DirStore;
pub use memory::MemoryStore;
