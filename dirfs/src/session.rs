use std::fs::OpenOptions;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::fs::Volume;
use crate::io::{BlockStorage, FileBlockEmulator, FileBlockEmulatorBuilder};
use crate::layout::DISK_BLOCKS;

/// How to open the image backing a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    image: PathBuf,
    create: bool,
    format: bool,
}

impl SessionOptions {
    pub fn new<P: AsRef<Path>>(image: P) -> Self {
        SessionOptions {
            image: image.as_ref().to_path_buf(),
            create: false,
            format: false,
        }
    }

    /// Create and format the image if it does not exist yet.
    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Format the image even if it exists, discarding its contents.
    pub fn format(mut self, format: bool) -> Self {
        self.format = format;
        self
    }

    pub fn image(&self) -> &Path {
        &self.image
    }

    pub fn open(&self) -> Result<Session> {
        let exists = self.image.exists();
        let volume = if self.format || (self.create && !exists) {
            // Formatting resizes the image, so its current length does not matter.
            let fd = OpenOptions::new()
                .read(true)
                .write(true)
                .create(self.create)
                .open(&self.image)?;
            let dev = FileBlockEmulatorBuilder::from(fd)
                .with_block_count(DISK_BLOCKS)
                .build()?;
            if !exists {
                info!("created image {}", self.image.display());
            }
            Volume::format(dev)?
        } else {
            Volume::open(FileBlockEmulator::open_disk(&self.image, DISK_BLOCKS)?)?
        };

        info!("session started on {}", self.image.display());
        Ok(Session::from_volume(volume))
    }
}

/// An open volume that flushes its bitmap when it goes away.
///
/// [`Session::close`] reports flush failures. A session that is simply dropped still
/// flushes but can only log a failure.
pub struct Session<T: BlockStorage = FileBlockEmulator> {
    volume: Volume<T>,
    closed: bool,
}

impl<T: BlockStorage> Session<T> {
    pub fn from_volume(volume: Volume<T>) -> Self {
        Session {
            volume,
            closed: false,
        }
    }

    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.volume.sync()?;
        info!("session closed");
        Ok(())
    }
}

impl<T: BlockStorage> Deref for Session<T> {
    type Target = Volume<T>;

    fn deref(&self) -> &Volume<T> {
        &self.volume
    }
}

impl<T: BlockStorage> DerefMut for Session<T> {
    fn deref_mut(&mut self) -> &mut Volume<T> {
        &mut self.volume
    }
}

impl<T: BlockStorage> Drop for Session<T> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.volume.sync() {
            warn!("failed to flush bitmap on drop: {}", err);
        }
    }
}
