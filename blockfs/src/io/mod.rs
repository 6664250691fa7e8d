mod block;
mod diskemu;
mod memory;

pub use block::{BlockNumber, BlockStorage};
pub use diskemu::{FileBlockEmulator, FileBlockEmulatorBuilder, DEFAULT_BLOCK_SIZE};
pub use memory::MemoryBlockDevice;
