/// The block storage abstraction.
mod block_storage;
/// File-backed storage.
mod file;
/// Memory-backed storage.
mod memory;

pub use block_storage::*;
pub use file::*;
pub use memory::*;
