use crate::alloc::BitmapAllocator;
use crate::error::{FsError, Result};
use crate::io::{Block, BlockNumber, BlockStorage};
use crate::layout::{
    BlockKind, BlockView, OnDisk, RootRecord, BLOCK_SIZE, DISK_BLOCKS, DISK_SIZE, ROOT_BLOCK,
};

/// A fixed 10240 block, 512 byte block volume with a two level hierarchy: the root holds
/// directories, directories hold files.
///
/// The volume handle owns the device and the in-memory allocation bitmap. Every operation
/// takes `&mut self`, so one owner performs one operation at a time.
pub struct Volume<T: BlockStorage> {
    pub(crate) dev: T,
    pub(crate) allocator: BitmapAllocator,
}

impl<T: BlockStorage> Volume<T> {
    /// Initializes the file system onto owned block storage.
    ///
    /// Writes an empty root record and a freshly initialized bitmap. Blocks in between are
    /// left as they are; they only gain meaning once something points at them.
    pub fn format(mut dev: T) -> Result<Self> {
        check_geometry(&dev)?;

        dev.write_block(ROOT_BLOCK, &RootRecord::default().encode())?;
        let mut allocator = BitmapAllocator::new();
        allocator.initialize_if_needed();
        allocator.flush(&mut dev)?;
        dev.sync_disk()?;

        info!("formatted volume ({} blocks free)", allocator.free_blocks());
        Ok(Volume { dev, allocator })
    }

    /// Opens a formatted device, loading the bitmap and initializing it if it never was.
    pub fn open(mut dev: T) -> Result<Self> {
        check_geometry(&dev)?;

        let mut allocator = BitmapAllocator::load(&mut dev)?;
        if allocator.initialize_if_needed() {
            warn!("bitmap was not initialized; reserved root and bitmap blocks");
        }

        info!("opened volume ({} blocks free)", allocator.free_blocks());
        Ok(Volume { dev, allocator })
    }

    /// Persists the bitmap. Until this runs, allocations exist only in memory.
    pub fn sync(&mut self) -> Result<()> {
        self.allocator.flush(&mut self.dev)?;
        self.dev.sync_disk()
    }

    /// Flushes the bitmap and hands the device back.
    pub fn close(mut self) -> Result<T> {
        self.sync()?;
        info!("closed volume");
        Ok(self.dev)
    }

    pub fn free_blocks(&self) -> usize {
        self.allocator.free_blocks()
    }

    pub fn allocator(&self) -> &BitmapAllocator {
        &self.allocator
    }

    /// Reads block `blocknr` as whatever the caller says it is. The block itself carries no
    /// type, so a wrong `kind` yields garbage or a corruption error, never a guess.
    pub fn inspect(&mut self, blocknr: BlockNumber, kind: BlockKind) -> Result<BlockView> {
        let mut block: Block = [0; BLOCK_SIZE];
        self.dev.read_block(blocknr, &mut block)?;
        BlockView::decode(kind, blocknr, &block)
    }

    pub(crate) fn load<R: OnDisk>(&mut self, blocknr: BlockNumber) -> Result<R> {
        let mut block: Block = [0; BLOCK_SIZE];
        self.dev.read_block(blocknr, &mut block)?;
        R::decode(blocknr, &block)
    }

    pub(crate) fn store<R: OnDisk>(&mut self, blocknr: BlockNumber, record: &R) -> Result<()> {
        debug!("writing block {}", blocknr);
        self.dev.write_block(blocknr, &record.encode())
    }

    /// Runs `op`, releasing every block it allocated if it fails.
    ///
    /// `op` must persist whatever links its new blocks as its final step: once that write has
    /// landed the blocks are referenced and must stay reserved.
    pub(crate) fn with_rollback<R, F>(&mut self, op: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        let snapshot = self.allocator.snapshot();
        let result = op(self);
        if let Err(ref err) = result {
            warn!("rolling back allocations: {}", err);
            self.allocator.restore(snapshot);
        }
        result
    }
}

fn check_geometry<T: BlockStorage>(dev: &T) -> Result<()> {
    if dev.block_count() != DISK_BLOCKS {
        return Err(FsError::InvalidGeometry {
            expected: DISK_SIZE as u64,
            found: (dev.block_count() * BLOCK_SIZE) as u64,
        });
    }
    Ok(())
}
