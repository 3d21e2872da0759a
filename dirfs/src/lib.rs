//! A two level file system on a flat image of 10240 blocks of 512 bytes.
//!
//! Block 0 is the root record listing up to 29 directories. Each directory block lists
//! up to 17 files and every file has one index block naming up to 64 data blocks. The
//! last three blocks hold the allocation bitmap.
//!
//! ```no_run
//! use dirfs::{Session, SessionOptions};
//!
//! let mut fs = SessionOptions::new(".disk").create(true).open()?;
//! let docs = fs.create_directory("docs")?;
//! fs.create_file(docs, "a", "txt")?;
//! fs.write(docs, "a", "txt", b"hello", 0)?;
//! fs.close()?;
//! # Ok::<(), dirfs::FsError>(())
//! ```

#[macro_use]
extern crate log;

pub mod alloc;
mod dir;
mod error;
mod file;
pub mod fs;
pub mod io;
pub mod layout;
mod session;
mod table;

pub use crate::dir::FileLocation;
pub use crate::error::{FsError, Result};
pub use crate::fs::Volume;
pub use crate::io::{BlockNumber, BlockStorage};
pub use crate::session::{Session, SessionOptions};
pub use crate::table::FixedTable;
