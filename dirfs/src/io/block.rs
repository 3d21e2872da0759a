use crate::error::{FsError, Result};
use crate::layout::BLOCK_SIZE;

/// The block number to access ranging from 0 (the first block) to n - 1 (the last
/// block) where n is number of blocks available.
pub type BlockNumber = usize;

/// One block worth of bytes. All transfers at this layer are whole blocks.
pub type Block = [u8; BLOCK_SIZE];

/// Tried to map as closely as possible to the prescribed interface found here:
/// http://web.mit.edu/6.033/1997/handouts/html/04sfs.html.
///
/// Partial block updates are left to callers: read the block, change it in memory and
/// write the whole block back.
pub trait BlockStorage {
    /// The total number of blocks available on the device.
    fn block_count(&self) -> usize;
    /// Reads disk block number into provided buffer.
    ///
    /// # Errors
    ///
    /// Attempting to read a block out of range will return [`FsError::OutOfRange`].
    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut Block) -> Result<()>;
    /// Writes provided buffer into the specified block number.
    ///
    /// # Errors
    ///
    /// Attempting to write a block out of range will return [`FsError::OutOfRange`].
    fn write_block(&mut self, blocknr: BlockNumber, buf: &Block) -> Result<()>;
    /// Flush any buffered disk IO from memory. This is useful if it must guaranteed
    /// the disk writes actually occurred, for instance, if being re-read from
    /// disk.
    fn sync_disk(&mut self) -> Result<()>;

    fn check_range(&self, blocknr: BlockNumber) -> Result<()> {
        if blocknr >= self.block_count() {
            return Err(FsError::OutOfRange(blocknr));
        }
        Ok(())
    }
}
