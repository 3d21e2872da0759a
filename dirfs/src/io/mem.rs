use crate::error::{FsError, Result};
use crate::io::{Block, BlockNumber, BlockStorage};
use crate::layout::BLOCK_SIZE;

/// Heap backed block storage. Useful for tests and scratch volumes.
#[derive(Debug, Clone)]
pub struct MemBlockEmulator {
    buffer: Vec<u8>,
}

impl MemBlockEmulator {
    /// A zeroed device of `nblocks` blocks.
    pub fn new(nblocks: usize) -> Self {
        Self {
            buffer: vec![0; nblocks * BLOCK_SIZE],
        }
    }

    /// Wraps an existing image. The image length must be a whole number of blocks.
    pub fn from_bytes(buffer: Vec<u8>) -> Result<Self> {
        if buffer.len() % BLOCK_SIZE != 0 {
            let found = buffer.len() as u64;
            return Err(FsError::InvalidGeometry {
                expected: found - found % BLOCK_SIZE as u64,
                found,
            });
        }
        Ok(Self { buffer })
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    fn span(&self, blocknr: BlockNumber) -> Result<std::ops::Range<usize>> {
        self.check_range(blocknr)?;
        let start = blocknr * BLOCK_SIZE;
        Ok(start..start + BLOCK_SIZE)
    }
}

impl BlockStorage for MemBlockEmulator {
    fn block_count(&self) -> usize {
        self.buffer.len() / BLOCK_SIZE
    }

    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut Block) -> Result<()> {
        let span = self.span(blocknr)?;
        buf.copy_from_slice(&self.buffer[span]);
        Ok(())
    }

    fn write_block(&mut self, blocknr: BlockNumber, buf: &Block) -> Result<()> {
        let span = self.span(blocknr)?;
        self.buffer[span].copy_from_slice(buf);
        Ok(())
    }

    fn sync_disk(&mut self) -> Result<()> {
        Ok(())
    }
}
