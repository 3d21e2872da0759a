use crate::error::{FsError, Result};
use crate::io::{Block, BlockNumber, BlockStorage};
use crate::layout::{BITMAP_BLOCKS, BITMAP_LEN, BITMAP_START, BLOCK_SIZE, DISK_BLOCKS, ROOT_BLOCK};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Bits tracked by the bitmap. The bitmap region holds more bits than the volume has
/// blocks; bits at or past `DISK_BLOCKS` never name a block.
pub const BITMAP_BITS: usize = BITMAP_LEN * 8;

/// The final bit of the bitmap is set once the bitmap has been initialized.
const INIT_MARKER: usize = BITMAP_BITS - 1;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum State {
    Free,
    Used,
}

#[repr(C)]
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Clone, Copy, PartialEq, Eq)]
pub struct Bitmap {
    /// One bit per block, most significant bit first: block `n` is bit `n % 8` from the
    /// top of byte `n / 8`.
    bitmap: [u8; BITMAP_LEN],
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("used", &self.count_used())
            .finish()
    }
}

fn mask(bit: usize) -> u8 {
    0x80 >> (bit % 8)
}

impl Bitmap {
    pub fn new() -> Self {
        Self {
            bitmap: [0; BITMAP_LEN],
        }
    }

    /// Reads a bitmap from a buffer of exactly `BITMAP_LEN` bytes.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        Bitmap::read_from_bytes(buf).map_err(|_| {
            FsError::corrupt(
                BITMAP_START,
                format!("bitmap is {} bytes, expected {}", buf.len(), BITMAP_LEN),
            )
        })
    }

    pub fn serialize(&self) -> &[u8] {
        self.as_bytes()
    }

    pub fn get(&self, bit: usize) -> State {
        assert!(bit < BITMAP_BITS);
        match self.bitmap[bit / 8] & mask(bit) {
            0 => State::Free,
            _ => State::Used,
        }
    }

    pub fn set_reserved(&mut self, bit: usize) {
        assert!(bit < BITMAP_BITS);
        self.bitmap[bit / 8] |= mask(bit);
    }

    pub fn count_used(&self) -> usize {
        self.bitmap.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// First clear bit below `limit` in increasing (byte, bit within byte) order.
    fn first_free(&self, limit: usize) -> Option<usize> {
        let (idx, byte) = self
            .bitmap
            .iter()
            .enumerate()
            .find(|(_, byte)| **byte != u8::MAX)?;
        let bit = idx * 8 + byte.leading_ones() as usize;
        if bit < limit {
            Some(bit)
        } else {
            None
        }
    }
}

impl Default for Bitmap {
    fn default() -> Self {
        Bitmap::new()
    }
}

/// Saved allocator state, used to release blocks reserved by an operation that failed
/// before anything on disk referenced them.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot(Bitmap);

/// Free block tracking for the whole volume.
///
/// The bitmap is authoritative in memory for the duration of a session and is only
/// written back by [`BitmapAllocator::flush`]. Allocations made after the last flush are
/// lost if the process dies.
#[derive(Debug, Clone, Default)]
pub struct BitmapAllocator {
    bitmap: Bitmap,
}

impl BitmapAllocator {
    /// An allocator with every bit clear. Call [`initialize_if_needed`] before allocating.
    ///
    /// [`initialize_if_needed`]: BitmapAllocator::initialize_if_needed
    pub fn new() -> Self {
        Self::from_bitmap(Bitmap::new())
    }

    pub fn from_bitmap(bitmap: Bitmap) -> Self {
        Self { bitmap }
    }

    /// Loads the bitmap region from the final blocks of the device.
    pub fn load<T: BlockStorage>(dev: &mut T) -> Result<Self> {
        let mut region = vec![0; BITMAP_LEN];
        let mut block: Block = [0; BLOCK_SIZE];
        for (i, chunk) in region.chunks_mut(BLOCK_SIZE).enumerate() {
            dev.read_block(BITMAP_START + i, &mut block)?;
            chunk.copy_from_slice(&block);
        }
        debug!("loaded bitmap from blocks {}..{}", BITMAP_START, DISK_BLOCKS);
        Ok(Self::from_bitmap(Bitmap::parse(&region)?))
    }

    pub fn is_initialized(&self) -> bool {
        self.bitmap.get(INIT_MARKER) == State::Used
    }

    /// Reserves the root block and the bitmap's own blocks unless the marker says this was
    /// already done. Returns whether anything changed.
    ///
    /// The three trailing bits of the bitmap (the marker among them) are set as well; images
    /// written by earlier tools carry them and they lie outside the volume.
    pub fn initialize_if_needed(&mut self) -> bool {
        if self.is_initialized() {
            return false;
        }
        self.bitmap.set_reserved(ROOT_BLOCK);
        for blocknr in BITMAP_START..BITMAP_START + BITMAP_BLOCKS {
            self.bitmap.set_reserved(blocknr);
        }
        for bit in BITMAP_BITS - 3..BITMAP_BITS {
            self.bitmap.set_reserved(bit);
        }
        info!("initialized allocation bitmap");
        true
    }

    pub fn state(&self, blocknr: BlockNumber) -> Result<State> {
        check_block(blocknr)?;
        Ok(self.bitmap.get(blocknr))
    }

    /// Returns the first free block without reserving it.
    pub fn find_free(&self) -> Result<BlockNumber> {
        let blocknr = self
            .bitmap
            .first_free(DISK_BLOCKS)
            .ok_or(FsError::OutOfSpace)?;
        debug_assert_ne!(blocknr, ROOT_BLOCK, "root block is never free");
        Ok(blocknr)
    }

    pub fn mark_used(&mut self, blocknr: BlockNumber) -> Result<()> {
        check_block(blocknr)?;
        self.bitmap.set_reserved(blocknr);
        Ok(())
    }

    /// Finds a free block and marks it used in one step, so no other caller can be handed
    /// the same block.
    pub fn allocate(&mut self) -> Result<BlockNumber> {
        self.initialize_if_needed();
        let blocknr = self.find_free()?;
        self.mark_used(blocknr)?;
        debug!("allocated block {}", blocknr);
        Ok(blocknr)
    }

    pub fn free_blocks(&self) -> usize {
        (0..DISK_BLOCKS)
            .filter(|&blocknr| self.bitmap.get(blocknr) == State::Free)
            .count()
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.bitmap)
    }

    /// Rolls back to `snapshot`. Only sound while nothing persisted references the blocks
    /// reserved since the snapshot was taken.
    pub fn restore(&mut self, snapshot: Snapshot) {
        let released = self
            .bitmap
            .count_used()
            .saturating_sub(snapshot.0.count_used());
        if released > 0 {
            warn!("releasing {} unlinked block(s)", released);
        }
        self.bitmap = snapshot.0;
    }

    /// Writes the in-memory bitmap into its fixed region on the device.
    pub fn flush<T: BlockStorage>(&self, dev: &mut T) -> Result<()> {
        let mut block: Block = [0; BLOCK_SIZE];
        for (i, chunk) in self.bitmap.serialize().chunks(BLOCK_SIZE).enumerate() {
            block.copy_from_slice(chunk);
            dev.write_block(BITMAP_START + i, &block)?;
        }
        debug!("flushed bitmap ({} blocks free)", self.free_blocks());
        Ok(())
    }
}

fn check_block(blocknr: BlockNumber) -> Result<()> {
    if blocknr >= DISK_BLOCKS {
        return Err(FsError::OutOfRange(blocknr));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemBlockEmulator;

    fn allocator() -> BitmapAllocator {
        let mut alloc = BitmapAllocator::new();
        alloc.initialize_if_needed();
        alloc
    }

    #[test]
    fn can_read_and_write_values_to_bitmap() {
        let mut bmp = Bitmap::new();

        bmp.set_reserved(2);

        assert_eq!(bmp.get(0), State::Free);
        assert_eq!(bmp.get(2), State::Used);
        assert_eq!(bmp.serialize()[0], 0b0010_0000);
    }

    #[test]
    fn can_set_values_at_ends_of_bitmap() {
        let mut bmp = Bitmap::new();

        bmp.set_reserved(0);
        bmp.set_reserved(BITMAP_BITS - 1);

        assert_eq!(bmp.get(0), State::Used);
        assert_eq!(bmp.get(BITMAP_BITS - 1), State::Used);
        assert_eq!(bmp.serialize()[0], 0x80);
        assert_eq!(bmp.serialize()[BITMAP_LEN - 1], 0x01);
    }

    #[test]
    fn can_serialize_and_deserialize_state() {
        let mut bmp = Bitmap::new();
        bmp.set_reserved(10);
        bmp.set_reserved(11);
        bmp.set_reserved(12);

        let read_bmp = Bitmap::parse(bmp.serialize()).unwrap();
        assert_eq!(read_bmp, bmp);
        assert!(Bitmap::parse(&[0; 12]).is_err());
    }

    #[test]
    fn initialization_reserves_root_and_bitmap_blocks() {
        let alloc = allocator();
        assert!(alloc.is_initialized());
        assert_eq!(alloc.state(ROOT_BLOCK).unwrap(), State::Used);
        for blocknr in BITMAP_START..DISK_BLOCKS {
            assert_eq!(alloc.state(blocknr).unwrap(), State::Used);
        }
        assert_eq!(alloc.state(1).unwrap(), State::Free);
        assert_eq!(alloc.bitmap().serialize()[BITMAP_LEN - 1], 0b0000_0111);
        assert_eq!(alloc.free_blocks(), DISK_BLOCKS - 1 - BITMAP_BLOCKS);
    }

    #[test]
    fn initialization_is_idempotent() {
        let mut once = BitmapAllocator::new();
        assert!(once.initialize_if_needed());

        let mut twice = BitmapAllocator::new();
        twice.initialize_if_needed();
        assert!(!twice.initialize_if_needed());

        assert_eq!(once.bitmap(), twice.bitmap());
    }

    #[test]
    fn initialization_keeps_existing_allocations() {
        let mut bmp = Bitmap::new();
        bmp.set_reserved(42);
        let mut alloc = BitmapAllocator::from_bitmap(bmp);
        alloc.initialize_if_needed();
        assert_eq!(alloc.state(42).unwrap(), State::Used);
    }

    #[test]
    fn find_free_never_returns_root_block() {
        let mut alloc = allocator();
        let first = alloc.find_free().unwrap();
        assert_eq!(first, 1);
        for _ in 0..100 {
            assert_ne!(alloc.allocate().unwrap(), ROOT_BLOCK);
        }
    }

    #[test]
    fn find_free_scans_in_block_order() {
        let mut alloc = allocator();
        for blocknr in 1..20 {
            alloc.mark_used(blocknr).unwrap();
        }
        assert_eq!(alloc.find_free().unwrap(), 20);
        // find_free alone does not reserve.
        assert_eq!(alloc.find_free().unwrap(), 20);
    }

    #[test]
    fn exhausted_volume_is_out_of_space() {
        let mut alloc = allocator();
        let available = alloc.free_blocks();
        for _ in 0..available {
            let blocknr = alloc.allocate().unwrap();
            assert!(blocknr < BITMAP_START);
        }
        assert!(matches!(alloc.find_free(), Err(FsError::OutOfSpace)));
        assert!(matches!(alloc.allocate(), Err(FsError::OutOfSpace)));
    }

    #[test]
    fn mark_used_rejects_blocks_outside_volume() {
        let mut alloc = allocator();
        assert!(matches!(
            alloc.mark_used(DISK_BLOCKS),
            Err(FsError::OutOfRange(DISK_BLOCKS))
        ));
    }

    #[test]
    fn restore_releases_blocks_reserved_after_snapshot() {
        let mut alloc = allocator();
        let kept = alloc.allocate().unwrap();
        let snapshot = alloc.snapshot();
        let dropped = alloc.allocate().unwrap();

        alloc.restore(snapshot);

        assert_eq!(alloc.state(kept).unwrap(), State::Used);
        assert_eq!(alloc.state(dropped).unwrap(), State::Free);
    }

    #[test]
    fn flush_and_load_round_trip_through_device() {
        let mut dev = MemBlockEmulator::new(DISK_BLOCKS);
        let mut alloc = allocator();
        alloc.mark_used(77).unwrap();
        alloc.flush(&mut dev).unwrap();

        let offset = BITMAP_START * BLOCK_SIZE;
        assert_eq!(dev.as_bytes()[offset], 0x80);
        assert_eq!(dev.as_bytes()[offset + 77 / 8], 0x80 >> (77 % 8));

        let loaded = BitmapAllocator::load(&mut dev).unwrap();
        assert_eq!(loaded.bitmap(), alloc.bitmap());
    }
}
