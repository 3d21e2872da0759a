use crate::io::BlockNumber;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("found no file or directory")]
    NotFound,
    #[error("entry already exists")]
    AlreadyExists,
    #[error("name {name:?} is longer than {max} characters")]
    NameTooLong { name: String, max: usize },
    #[error("invalid name: {0:?}")]
    InvalidName(String),
    #[error("root directory is full")]
    RootFull,
    #[error("directory is full")]
    DirFull,
    #[error("no free blocks left on the volume")]
    OutOfSpace,
    #[error("file would exceed the maximum size of {max} bytes")]
    FileTooLarge { max: usize },
    #[error("offset {offset} is past the end of a {size} byte file")]
    PastEnd { offset: usize, size: usize },
    #[error("nothing to write")]
    EmptyWrite,
    #[error("block {0} is out of range")]
    OutOfRange(BlockNumber),
    #[error("block {block} is corrupt: {reason}")]
    Corrupt { block: BlockNumber, reason: String },
    #[error("volume is {found} bytes, expected {expected}")]
    InvalidGeometry { expected: u64, found: u64 },
    #[error("block device error")]
    Io(#[from] std::io::Error),
}

impl FsError {
    pub(crate) fn corrupt<S: Into<String>>(block: BlockNumber, reason: S) -> Self {
        FsError::Corrupt {
            block,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FsError>;
