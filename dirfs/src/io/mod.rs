mod block;
mod diskemu;
mod mem;

pub use block::{Block, BlockNumber, BlockStorage};
pub use diskemu::{FileBlockEmulator, FileBlockEmulatorBuilder};
pub use mem::MemBlockEmulator;
