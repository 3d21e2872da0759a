use crate::error::{FsError, Result};
use crate::io::{Block, BlockNumber, BlockStorage};
use crate::layout::BLOCK_SIZE;
use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::io::{BufWriter, ErrorKind, SeekFrom};
use std::path::Path;

/// Emulates block disk storage in userspace using a file as block storage.
pub struct FileBlockEmulator {
    /// The file must be a fixed-size file some exact multiple of the size of a block.
    fd: File,
    /// The total number of blocks available in the file store.
    block_count: usize,
}

impl FileBlockEmulator {
    /// Opens an existing image at the specified path. The image must already be exactly
    /// `nblocks` blocks long; this method does not create or resize files.
    pub fn open_disk<P: AsRef<Path>>(path: P, nblocks: usize) -> Result<Self> {
        // Return error if the file does not exist rather than create one.
        let fd = OpenOptions::new().read(true).write(true).open(path)?;
        check_len(&fd, nblocks)?;
        Ok(FileBlockEmulator {
            fd,
            block_count: nblocks,
        })
    }

    /// Returns ownership of the underlying file descriptor to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }

    fn seek_block(&mut self, blocknr: BlockNumber) -> Result<()> {
        self.check_range(blocknr)?;
        self.fd
            .seek(SeekFrom::Start((blocknr * BLOCK_SIZE) as u64))?;
        Ok(())
    }
}

fn check_len(fd: &File, nblocks: usize) -> Result<()> {
    let expected = (nblocks * BLOCK_SIZE) as u64;
    let found = fd.metadata()?.len();
    if found != expected {
        return Err(FsError::InvalidGeometry { expected, found });
    }
    Ok(())
}

impl BlockStorage for FileBlockEmulator {
    fn block_count(&self) -> usize {
        self.block_count
    }

    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut Block) -> Result<()> {
        self.seek_block(blocknr)?;
        self.fd.read_exact(buf)?;
        Ok(())
    }

    fn write_block(&mut self, blocknr: BlockNumber, buf: &Block) -> Result<()> {
        self.seek_block(blocknr)?;
        self.fd.write_all(buf)?;
        Ok(())
    }

    fn sync_disk(&mut self) -> Result<()> {
        self.fd.sync_all()?;
        Ok(())
    }
}

pub struct FileBlockEmulatorBuilder {
    fd: File,
    block_count: usize,
    clear_medium: bool,
}

impl From<File> for FileBlockEmulatorBuilder {
    fn from(fd: File) -> Self {
        FileBlockEmulatorBuilder {
            fd,
            block_count: 0,
            clear_medium: true,
        }
    }
}

impl FileBlockEmulatorBuilder {
    /// Sets the number of desired blocks in the block store device.
    pub fn with_block_count(mut self, blocks: usize) -> Self {
        self.block_count = blocks;
        self
    }

    /// Whether to zero the file before handing it out. Defaults to true. When disabled the
    /// file must already have the configured size.
    pub fn clear_medium(mut self, clear: bool) -> Self {
        self.clear_medium = clear;
        self
    }

    /// This builder assumes ownership of the file descriptor used and, unless told
    /// otherwise, does destructive things to prepare the file for use.
    pub fn build(mut self) -> Result<FileBlockEmulator> {
        if self.block_count == 0 {
            return Err(FsError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                "block count must be non-zero",
            )));
        }
        if self.clear_medium {
            self.zero_medium()?;
        } else {
            check_len(&self.fd, self.block_count)?;
        }
        Ok(FileBlockEmulator {
            fd: self.fd,
            block_count: self.block_count,
        })
    }

    fn zero_medium(&mut self) -> Result<()> {
        self.fd.seek(SeekFrom::Start(0))?;
        let zeroes = [0x00; BLOCK_SIZE];
        {
            // Buffer the block writes so a 5MiB image is not 10k syscalls.
            let mut bfd = BufWriter::new(&self.fd);
            for _ in 0..self.block_count {
                bfd.write_all(&zeroes)?;
            }
            bfd.flush()?;
        }
        self.fd.set_len((self.block_count * BLOCK_SIZE) as u64)?;
        Ok(())
    }
}
