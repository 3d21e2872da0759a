//! Path based operation table over a dirfs volume, shaped after the FUSE high level API.
//!
//! Every operation takes an absolute path, resolves it against the two level hierarchy and
//! reports failures as an [`Errno`].

#[macro_use]
extern crate log;

mod errno;
mod path;

use std::sync::{Mutex, MutexGuard};

use dirfs::io::{BlockStorage, FileBlockEmulator};
use dirfs::layout::{BlockKind, BlockView, BLOCK_SIZE, DISK_BLOCKS};
use dirfs::{BlockNumber, FsError, Session, SessionOptions};

pub use crate::errno::Errno;
pub use crate::path::FsPath;

pub const DIR_PERM: u16 = 0o755;
pub const FILE_PERM: u16 = 0o666;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    RegularFile,
}

/// What `getattr` reports about a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub kind: FileKind,
    pub size: u64,
    pub perm: u16,
    pub nlink: u32,
}

impl Attr {
    fn directory() -> Self {
        Attr {
            kind: FileKind::Directory,
            size: 0,
            perm: DIR_PERM,
            nlink: 2,
        }
    }

    fn file(size: usize) -> Self {
        Attr {
            kind: FileKind::RegularFile,
            size: size as u64,
            perm: FILE_PERM,
            nlink: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub block_size: usize,
    pub blocks: usize,
    pub free_blocks: usize,
}

pub type OpResult<T> = Result<T, Errno>;

/// The operation table. Calls from any number of threads are serialized on one lock.
pub struct Operations<T: BlockStorage = FileBlockEmulator> {
    session: Mutex<Session<T>>,
}

impl Operations<FileBlockEmulator> {
    /// Opens the image and starts the session.
    pub fn init(options: &SessionOptions) -> OpResult<Self> {
        let session = options.open().map_err(|err| {
            error!("cannot open {}: {}", options.image().display(), err);
            Errno::from(err)
        })?;
        Ok(Operations::new(session))
    }
}

impl<T: BlockStorage> Operations<T> {
    pub fn new(session: Session<T>) -> Self {
        Operations {
            session: Mutex::new(session),
        }
    }

    /// Ends the session, flushing the allocation bitmap.
    pub fn destroy(self) -> OpResult<()> {
        let session = self.session.into_inner().map_err(|_| Errno::EIO)?;
        session.close().map_err(|err| {
            error!("failed to flush bitmap: {}", err);
            Errno::EIO
        })
    }

    fn volume(&self) -> OpResult<MutexGuard<'_, Session<T>>> {
        self.session.lock().map_err(|_| {
            error!("volume lock poisoned");
            Errno::EIO
        })
    }

    pub fn getattr(&self, path: &str) -> OpResult<Attr> {
        debug!("getattr {}", path);
        let mut fs = self.volume()?;
        let attr = match FsPath::parse(path) {
            FsPath::Root => Ok(Attr::directory()),
            FsPath::Dir(dir) => fs.lookup_directory(dir).map(|_| Attr::directory()),
            FsPath::File { dir, name, ext } => fs
                .lookup_directory(dir)
                .and_then(|dir| fs.lookup_file(dir, name, ext))
                .map(|file| Attr::file(file.size)),
            FsPath::Nested => Err(FsError::NotFound),
        };
        // Nothing can be stored under a malformed name.
        attr.map_err(|err| match err {
            FsError::InvalidName(_) => Errno::ENOENT,
            err => Errno::from(err),
        })
    }

    /// Names in a directory, starting with `.` and `..`.
    pub fn readdir(&self, path: &str) -> OpResult<Vec<String>> {
        debug!("readdir {}", path);
        let mut fs = self.volume()?;
        let names = match FsPath::parse(path) {
            FsPath::Root => fs.list_root()?,
            FsPath::Dir(dir) => {
                let dir = fs.lookup_directory(dir)?;
                fs.list_directory(dir)?
            }
            FsPath::File { .. } | FsPath::Nested => return Err(Errno::ENOTDIR),
        };

        let mut entries = vec![".".to_string(), "..".to_string()];
        entries.extend(names);
        Ok(entries)
    }

    /// Creates a directory. Directories exist only directly under the root.
    pub fn mkdir(&self, path: &str) -> OpResult<()> {
        debug!("mkdir {}", path);
        match FsPath::parse(path) {
            FsPath::Root => Err(Errno::EEXIST),
            FsPath::Dir(dir) => {
                self.volume()?.create_directory(dir)?;
                Ok(())
            }
            FsPath::File { .. } | FsPath::Nested => Err(Errno::EPERM),
        }
    }

    /// Creates an empty regular file. Files need a directory and an extension.
    pub fn mknod(&self, path: &str) -> OpResult<()> {
        debug!("mknod {}", path);
        match FsPath::parse(path) {
            FsPath::File { dir, name, ext } if !ext.is_empty() => {
                let mut fs = self.volume()?;
                let dir = fs.lookup_directory(dir)?;
                fs.create_file(dir, name, ext)?;
                Ok(())
            }
            _ => Err(Errno::EPERM),
        }
    }

    pub fn read(&self, path: &str, buf: &mut [u8], offset: usize) -> OpResult<usize> {
        debug!("read {} ({} bytes at {})", path, buf.len(), offset);
        match FsPath::parse(path) {
            FsPath::Root | FsPath::Dir(_) => Err(Errno::EISDIR),
            FsPath::Nested => Err(Errno::ENOENT),
            FsPath::File { dir, name, ext } => {
                let mut fs = self.volume()?;
                let dir = fs.lookup_directory(dir)?;
                Ok(fs.read(dir, name, ext, buf, offset)?)
            }
        }
    }

    pub fn write(&self, path: &str, buf: &[u8], offset: usize) -> OpResult<usize> {
        debug!("write {} ({} bytes at {})", path, buf.len(), offset);
        if buf.is_empty() {
            return Err(Errno::EPERM);
        }
        match FsPath::parse(path) {
            FsPath::File { dir, name, ext } => {
                let mut fs = self.volume()?;
                let dir = fs.lookup_directory(dir)?;
                Ok(fs.write(dir, name, ext, buf, offset)?)
            }
            _ => Err(Errno::ENOENT),
        }
    }

    pub fn statfs(&self) -> OpResult<StatFs> {
        let fs = self.volume()?;
        Ok(StatFs {
            block_size: BLOCK_SIZE,
            blocks: DISK_BLOCKS,
            free_blocks: fs.free_blocks(),
        })
    }

    /// Decodes a raw block as the given kind.
    pub fn dump(&self, blocknr: BlockNumber, kind: BlockKind) -> OpResult<BlockView> {
        Ok(self.volume()?.inspect(blocknr, kind)?)
    }

    // Removal and resizing are not supported. These accept the call and change nothing.

    pub fn rmdir(&self, path: &str) -> OpResult<()> {
        debug!("rmdir {} ignored", path);
        Ok(())
    }

    pub fn unlink(&self, path: &str) -> OpResult<()> {
        debug!("unlink {} ignored", path);
        Ok(())
    }

    pub fn truncate(&self, path: &str, size: usize) -> OpResult<()> {
        debug!("truncate {} to {} ignored", path, size);
        Ok(())
    }

    pub fn open(&self, _path: &str) -> OpResult<()> {
        Ok(())
    }

    pub fn flush(&self, _path: &str) -> OpResult<()> {
        Ok(())
    }
}
