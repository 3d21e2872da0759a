//! Fixed on-disk layout of a volume.
//!
//! # Layout
//! ==========================================================================
//! | Root (block 0) | directory, index and data blocks | Bitmap (3 blocks) |
//! ==========================================================================
//!
//! Nothing on disk records what kind of block a block is. The kind follows from which
//! structure points at it, so every read names the shape it expects through [`OnDisk`].
//! All integers are little endian and every structure is packed to exactly one block.

use std::mem::size_of;

use zerocopy::byteorder::{LittleEndian, I32, I64, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{FsError, Result};
use crate::io::{Block, BlockNumber};
use crate::table::FixedTable;

pub const BLOCK_SIZE: usize = 512;
pub const DISK_BLOCKS: usize = 10240;
pub const DISK_SIZE: usize = DISK_BLOCKS * BLOCK_SIZE;

/// Block 0 holds the root record for the lifetime of the volume and is never handed out
/// by the allocator. That is what makes 0 usable as the "unallocated" sentinel in index
/// blocks.
pub const ROOT_BLOCK: BlockNumber = 0;

pub const BITMAP_BLOCKS: usize = 3;
pub const BITMAP_START: BlockNumber = DISK_BLOCKS - BITMAP_BLOCKS;
pub const BITMAP_LEN: usize = BITMAP_BLOCKS * BLOCK_SIZE;

// 8.3 names.
pub const MAX_FILENAME: usize = 8;
pub const MAX_EXTENSION: usize = 3;

pub const MAX_DIRS_IN_ROOT: usize = (BLOCK_SIZE - size_of::<i32>()) / size_of::<RawDirLink>();
pub const MAX_FILES_IN_DIR: usize = (BLOCK_SIZE - size_of::<i32>()) / size_of::<RawFileLink>();
pub const MAX_ENTRIES_IN_INDEX: usize = BLOCK_SIZE / size_of::<i64>();
pub const MAX_FILE_SIZE: usize = MAX_ENTRIES_IN_INDEX * BLOCK_SIZE;

const ROOT_PADDING: usize =
    BLOCK_SIZE - size_of::<i32>() - MAX_DIRS_IN_ROOT * size_of::<RawDirLink>();
const DIR_PADDING: usize =
    BLOCK_SIZE - size_of::<i32>() - MAX_FILES_IN_DIR * size_of::<RawFileLink>();

#[repr(C)]
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Clone, Copy)]
struct RawDirLink {
    dname: [u8; MAX_FILENAME + 1],
    start_block: I64<LittleEndian>,
}

#[repr(C)]
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Clone, Copy)]
struct RawRoot {
    n_directories: I32<LittleEndian>,
    directories: [RawDirLink; MAX_DIRS_IN_ROOT],
    padding: [u8; ROOT_PADDING],
}

#[repr(C)]
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Clone, Copy)]
struct RawFileLink {
    fname: [u8; MAX_FILENAME + 1],
    fext: [u8; MAX_EXTENSION + 1],
    fsize: U64<LittleEndian>,
    index_block: I64<LittleEndian>,
}

#[repr(C)]
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Clone, Copy)]
struct RawDirectory {
    n_files: I32<LittleEndian>,
    files: [RawFileLink; MAX_FILES_IN_DIR],
    padding: [u8; DIR_PADDING],
}

#[repr(C)]
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Clone, Copy)]
struct RawIndex {
    entries: [I64<LittleEndian>; MAX_ENTRIES_IN_INDEX],
}

const _: () = assert!(size_of::<RawRoot>() == BLOCK_SIZE);
const _: () = assert!(size_of::<RawDirectory>() == BLOCK_SIZE);
const _: () = assert!(size_of::<RawIndex>() == BLOCK_SIZE);

/// A block-sized structure with a known on-disk encoding.
pub trait OnDisk: Sized {
    /// Decodes the structure from the contents of block `blocknr`. The block number is only
    /// used to report corruption.
    fn decode(blocknr: BlockNumber, block: &Block) -> Result<Self>;

    fn encode(&self) -> Block;
}

/// How the caller wants a block interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Root,
    Directory,
    Index,
    Data,
}

/// A block decoded as the [`BlockKind`] the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockView {
    Root(RootRecord),
    Directory(DirRecord),
    Index(IndexBlock),
    Data(Box<Block>),
}

impl BlockView {
    pub fn decode(kind: BlockKind, blocknr: BlockNumber, block: &Block) -> Result<Self> {
        Ok(match kind {
            BlockKind::Root => BlockView::Root(RootRecord::decode(blocknr, block)?),
            BlockKind::Directory => BlockView::Directory(DirRecord::decode(blocknr, block)?),
            BlockKind::Index => BlockView::Index(IndexBlock::decode(blocknr, block)?),
            BlockKind::Data => BlockView::Data(Box::new(*block)),
        })
    }
}

impl OnDisk for Block {
    fn decode(_blocknr: BlockNumber, block: &Block) -> Result<Self> {
        Ok(*block)
    }

    fn encode(&self) -> Block {
        *self
    }
}

fn pack_name<const W: usize>(name: &str) -> [u8; W] {
    // Keep at least one trailing NUL.
    let mut field = [0; W];
    let len = name.len().min(W - 1);
    field[..len].copy_from_slice(&name.as_bytes()[..len]);
    field
}

fn unpack_name(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn block_ptr(blocknr: BlockNumber, raw: i64) -> Result<BlockNumber> {
    if raw < 0 || raw as u64 >= DISK_BLOCKS as u64 {
        return Err(FsError::corrupt(
            blocknr,
            format!("block pointer {} outside the volume", raw),
        ));
    }
    Ok(raw as BlockNumber)
}

fn entry_count(blocknr: BlockNumber, raw: i32, capacity: usize) -> Result<usize> {
    if raw < 0 || raw as usize > capacity {
        return Err(FsError::corrupt(
            blocknr,
            format!("entry count {} outside 0..={}", raw, capacity),
        ));
    }
    Ok(raw as usize)
}

/// Entry of the root record naming one subdirectory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirLink {
    pub name: String,
    pub start_block: BlockNumber,
}

/// The single record in block 0 listing all subdirectories. The root never holds files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootRecord {
    pub dirs: FixedTable<DirLink, MAX_DIRS_IN_ROOT>,
}

impl RootRecord {
    pub fn find(&self, name: &str) -> Option<&DirLink> {
        self.dirs.iter().find(|dir| dir.name == name)
    }
}

impl OnDisk for RootRecord {
    fn decode(blocknr: BlockNumber, block: &Block) -> Result<Self> {
        let raw = RawRoot::read_from_bytes(&block[..])
            .map_err(|_| FsError::corrupt(blocknr, "root record size mismatch"))?;
        let count = entry_count(blocknr, raw.n_directories.get(), MAX_DIRS_IN_ROOT)?;

        let mut root = RootRecord::default();
        for entry in &raw.directories[..count] {
            let start_block = block_ptr(blocknr, entry.start_block.get())?;
            if start_block == ROOT_BLOCK {
                return Err(FsError::corrupt(blocknr, "directory points at the root block"));
            }
            let link = DirLink {
                name: unpack_name(&entry.dname),
                start_block,
            };
            // count <= capacity was checked above.
            let _ = root.dirs.push(link);
        }
        Ok(root)
    }

    fn encode(&self) -> Block {
        let empty = RawDirLink {
            dname: [0; MAX_FILENAME + 1],
            start_block: I64::new(0),
        };
        let mut raw = RawRoot {
            n_directories: I32::new(self.dirs.len() as i32),
            directories: [empty; MAX_DIRS_IN_ROOT],
            padding: [0; ROOT_PADDING],
        };
        for (slot, dir) in raw.directories.iter_mut().zip(self.dirs.iter()) {
            slot.dname = pack_name(&dir.name);
            slot.start_block = I64::new(dir.start_block as i64);
        }

        let mut block = [0; BLOCK_SIZE];
        block.copy_from_slice(raw.as_bytes());
        block
    }
}

/// Entry of a subdirectory record describing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLink {
    pub name: String,
    pub ext: String,
    pub size: usize,
    pub index_block: BlockNumber,
}

impl FileLink {
    pub fn matches(&self, name: &str, ext: &str) -> bool {
        self.name == name && self.ext == ext
    }

    /// The name as shown in directory listings, `name.ext`.
    pub fn display_name(&self) -> String {
        if self.ext.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, self.ext)
        }
    }
}

/// One subdirectory block. Subdirectories hold files only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirRecord {
    pub files: FixedTable<FileLink, MAX_FILES_IN_DIR>,
}

impl DirRecord {
    pub fn position(&self, name: &str, ext: &str) -> Option<usize> {
        self.files.position(|file| file.matches(name, ext))
    }

    pub fn find(&self, name: &str, ext: &str) -> Option<&FileLink> {
        self.position(name, ext).and_then(|slot| self.files.get(slot))
    }
}

impl OnDisk for DirRecord {
    fn decode(blocknr: BlockNumber, block: &Block) -> Result<Self> {
        let raw = RawDirectory::read_from_bytes(&block[..])
            .map_err(|_| FsError::corrupt(blocknr, "directory record size mismatch"))?;
        let count = entry_count(blocknr, raw.n_files.get(), MAX_FILES_IN_DIR)?;

        let mut dir = DirRecord::default();
        for entry in &raw.files[..count] {
            let size = entry.fsize.get();
            if size > MAX_FILE_SIZE as u64 {
                return Err(FsError::corrupt(
                    blocknr,
                    format!("file size {} exceeds {}", size, MAX_FILE_SIZE),
                ));
            }
            let link = FileLink {
                name: unpack_name(&entry.fname),
                ext: unpack_name(&entry.fext),
                size: size as usize,
                index_block: block_ptr(blocknr, entry.index_block.get())?,
            };
            let _ = dir.files.push(link);
        }
        Ok(dir)
    }

    fn encode(&self) -> Block {
        let empty = RawFileLink {
            fname: [0; MAX_FILENAME + 1],
            fext: [0; MAX_EXTENSION + 1],
            fsize: U64::new(0),
            index_block: I64::new(0),
        };
        let mut raw = RawDirectory {
            n_files: I32::new(self.files.len() as i32),
            files: [empty; MAX_FILES_IN_DIR],
            padding: [0; DIR_PADDING],
        };
        for (slot, file) in raw.files.iter_mut().zip(self.files.iter()) {
            slot.fname = pack_name(&file.name);
            slot.fext = pack_name(&file.ext);
            slot.fsize = U64::new(file.size as u64);
            slot.index_block = I64::new(file.index_block as i64);
        }

        let mut block = [0; BLOCK_SIZE];
        block.copy_from_slice(raw.as_bytes());
        block
    }
}

/// Position inside a file: which index slot, and the byte within that slot's data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub slot: usize,
    pub pos: usize,
}

impl Cursor {
    pub fn at(offset: usize) -> Self {
        Cursor {
            slot: offset / BLOCK_SIZE,
            pos: offset % BLOCK_SIZE,
        }
    }

    /// The start of the following block.
    pub fn next_block(self) -> Self {
        Cursor {
            slot: self.slot + 1,
            pos: 0,
        }
    }
}

/// The single level index of one file: data block numbers in file order.
///
/// Only the populated prefix is kept in memory. On disk the remaining entries are 0, the
/// sentinel, and a populated entry after a sentinel is corruption.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexBlock {
    entries: FixedTable<BlockNumber, MAX_ENTRIES_IN_INDEX>,
}

impl IndexBlock {
    pub fn starting_at(first: BlockNumber) -> Self {
        let mut index = IndexBlock::default();
        let _ = index.entries.push(first);
        index
    }

    /// Data blocks a file owns once it is `len` bytes long. A block filled to its last
    /// byte already has its successor allocated, up to the index capacity.
    pub fn blocks_for(len: usize) -> usize {
        (len / BLOCK_SIZE + 1).min(MAX_ENTRIES_IN_INDEX)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<BlockNumber> {
        self.entries.get(slot).copied()
    }

    pub fn blocks(&self) -> &[BlockNumber] {
        self.entries.as_slice()
    }

    pub fn push(&mut self, blocknr: BlockNumber) -> Result<usize> {
        self.entries.push(blocknr).map_err(|_| FsError::FileTooLarge {
            max: MAX_FILE_SIZE,
        })
    }

    /// Finds the slot and intra-block position holding byte `offset`, if that slot is
    /// populated.
    pub fn locate(&self, offset: usize) -> Option<Cursor> {
        let cursor = Cursor::at(offset);
        if cursor.slot < self.entries.len() {
            Some(cursor)
        } else {
            None
        }
    }
}

impl OnDisk for IndexBlock {
    fn decode(blocknr: BlockNumber, block: &Block) -> Result<Self> {
        let raw = RawIndex::read_from_bytes(&block[..])
            .map_err(|_| FsError::corrupt(blocknr, "index block size mismatch"))?;

        let mut index = IndexBlock::default();
        let mut ended = false;
        for entry in raw.entries.iter().map(|e| e.get()) {
            if entry == ROOT_BLOCK as i64 {
                ended = true;
            } else if ended {
                return Err(FsError::corrupt(blocknr, "populated entry after sentinel"));
            } else {
                let _ = index.entries.push(block_ptr(blocknr, entry)?);
            }
        }
        Ok(index)
    }

    fn encode(&self) -> Block {
        let mut raw = RawIndex {
            entries: [I64::new(0); MAX_ENTRIES_IN_INDEX],
        };
        for (slot, &blocknr) in raw.entries.iter_mut().zip(self.entries.iter()) {
            *slot = I64::new(blocknr as i64);
        }

        let mut block = [0; BLOCK_SIZE];
        block.copy_from_slice(raw.as_bytes());
        block
    }
}
