//! Reading and writing file contents through the index block.

use std::cmp::min;

use crate::dir::FileLocation;
use crate::error::{FsError, Result};
use crate::fs::Volume;
use crate::io::{Block, BlockNumber, BlockStorage};
use crate::layout::{Cursor, DirRecord, IndexBlock, BLOCK_SIZE, MAX_FILE_SIZE, ROOT_BLOCK};

impl<T: BlockStorage> Volume<T> {
    /// Reads up to `buf.len()` bytes of the file starting at `offset`.
    ///
    /// Reads never extend past the stored size, so a read at or beyond the end returns 0.
    /// An index block that ends before the stored size yields a short read.
    pub fn read(
        &mut self,
        dir_block: BlockNumber,
        name: &str,
        ext: &str,
        buf: &mut [u8],
        offset: usize,
    ) -> Result<usize> {
        let file = self.lookup_file(dir_block, name, ext)?;
        if file.index_block == ROOT_BLOCK {
            return Err(FsError::NotFound);
        }
        if offset >= file.size || buf.is_empty() {
            return Ok(0);
        }

        let len = min(buf.len(), file.size - offset);
        let index: IndexBlock = self.load(file.index_block)?;
        let mut cursor = index.locate(offset).ok_or_else(|| {
            FsError::corrupt(
                file.index_block,
                format!("no data block for offset {} of {}", offset, file.size),
            )
        })?;

        let mut done = 0;
        while done < len {
            let blocknr = match index.get(cursor.slot) {
                Some(blocknr) => blocknr,
                None => {
                    warn!(
                        "index block {} ends at slot {}, short read of {} bytes",
                        file.index_block, cursor.slot, done
                    );
                    break;
                }
            };
            let block: Block = self.load(blocknr)?;
            let n = min(BLOCK_SIZE - cursor.pos, len - done);
            buf[done..done + n].copy_from_slice(&block[cursor.pos..cursor.pos + n]);
            done += n;
            cursor = cursor.next_block();
        }

        debug!("read {} bytes at {} from {}.{}", done, offset, name, ext);
        Ok(done)
    }

    /// Writes all of `buf` at `offset`, growing the file if the write ends past its size.
    ///
    /// `offset` may be at most the current size. Every data block the write needs is
    /// reserved before any byte moves.
    pub fn write(
        &mut self,
        dir_block: BlockNumber,
        name: &str,
        ext: &str,
        buf: &[u8],
        offset: usize,
    ) -> Result<usize> {
        if buf.is_empty() {
            return Err(FsError::EmptyWrite);
        }
        let file = self.lookup_file(dir_block, name, ext)?;
        if file.index_block == ROOT_BLOCK {
            return Err(FsError::NotFound);
        }
        if offset > file.size {
            return Err(FsError::PastEnd {
                offset,
                size: file.size,
            });
        }
        let end = offset
            .checked_add(buf.len())
            .filter(|&end| end <= MAX_FILE_SIZE)
            .ok_or(FsError::FileTooLarge { max: MAX_FILE_SIZE })?;

        let mut index: IndexBlock = self.load(file.index_block)?;
        let owned = index.len();
        let needed = IndexBlock::blocks_for(end).max(owned);

        self.with_rollback(|vol| {
            for _ in owned..needed {
                let blocknr = vol.allocator.allocate()?;
                index.push(blocknr)?;
            }
            vol.transfer(&file, &index, owned, buf, offset)?;
            if index.len() > owned {
                vol.store(file.index_block, &index)?;
            }
            Ok(())
        })?;

        if end > file.size {
            let mut dir: DirRecord = self.load(dir_block)?;
            let entry = dir
                .position(name, ext)
                .and_then(|slot| dir.files.get_mut(slot))
                .ok_or(FsError::NotFound)?;
            entry.size = end;
            self.store(dir_block, &dir)?;
        }

        debug!(
            "wrote {} bytes at {} to {}.{} ({} data blocks)",
            buf.len(),
            offset,
            name,
            ext,
            needed
        );
        Ok(buf.len())
    }

    /// Copies `buf` into the data blocks and zero fills the blocks reserved past its end.
    /// Slots from `owned` on are fresh and have never been written.
    fn transfer(
        &mut self,
        file: &FileLocation,
        index: &IndexBlock,
        owned: usize,
        buf: &[u8],
        offset: usize,
    ) -> Result<()> {
        let mut cursor = Cursor::at(offset);
        let mut done = 0;
        while done < buf.len() {
            let blocknr = index.get(cursor.slot).ok_or_else(|| {
                FsError::corrupt(file.index_block, format!("slot {} unpopulated", cursor.slot))
            })?;
            let n = min(BLOCK_SIZE - cursor.pos, buf.len() - done);
            let mut block: Block = if cursor.slot >= owned || n == BLOCK_SIZE {
                [0; BLOCK_SIZE]
            } else {
                self.load(blocknr)?
            };
            block[cursor.pos..cursor.pos + n].copy_from_slice(&buf[done..done + n]);
            self.store(blocknr, &block)?;
            done += n;
            cursor = cursor.next_block();
        }

        let zeroes: Block = [0; BLOCK_SIZE];
        for &blocknr in index.blocks().iter().skip(cursor.slot.max(owned)) {
            self.store(blocknr, &zeroes)?;
        }
        Ok(())
    }
}
