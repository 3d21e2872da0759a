use std::fmt;
use std::io;
use std::os::raw::c_int;

use dirfs::FsError;

/// A POSIX error number as returned to the caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Errno(pub c_int);

impl Errno {
    pub const ENOENT: Errno = Errno(libc::ENOENT);
    pub const EEXIST: Errno = Errno(libc::EEXIST);
    pub const EPERM: Errno = Errno(libc::EPERM);
    pub const EISDIR: Errno = Errno(libc::EISDIR);
    pub const ENOTDIR: Errno = Errno(libc::ENOTDIR);
    pub const EIO: Errno = Errno(libc::EIO);

    pub fn code(self) -> c_int {
        self.0
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", io::Error::from_raw_os_error(self.0))
    }
}

impl std::error::Error for Errno {}

impl From<FsError> for Errno {
    fn from(err: FsError) -> Self {
        let code = match &err {
            FsError::NotFound => libc::ENOENT,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::NameTooLong { .. } => libc::ENAMETOOLONG,
            FsError::InvalidName(_) => libc::EINVAL,
            FsError::RootFull | FsError::DirFull | FsError::OutOfSpace => libc::ENOSPC,
            FsError::FileTooLarge { .. } | FsError::PastEnd { .. } => libc::EFBIG,
            FsError::EmptyWrite => libc::EPERM,
            FsError::OutOfRange(_) | FsError::Corrupt { .. } | FsError::InvalidGeometry { .. } => {
                error!("volume failure: {}", err);
                libc::EIO
            }
            FsError::Io(io) => {
                error!("device failure: {}", io);
                io.raw_os_error().unwrap_or(libc::EIO)
            }
        };
        Errno(code)
    }
}
