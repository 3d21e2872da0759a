use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use dirfs::layout::BlockKind;

#[derive(Debug, Parser)]
#[command(version, about = "Inspect and edit a dirfs volume image")]
pub struct Cli {
    /// The volume image
    #[arg(long, short, env = "DIRFS_IMAGE", default_value = ".disk")]
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the image if missing and format it
    Mkfs,
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Show the attributes of a path
    Stat { path: String },
    /// Create a directory under the root
    Mkdir { path: String },
    /// Create an empty file
    Touch { path: String },
    /// Write a host file, or stdin, into a file
    Write {
        path: String,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Read from here instead of stdin
        source: Option<PathBuf>,
    },
    /// Print the contents of a file
    Cat {
        path: String,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        size: Option<usize>,
    },
    /// Show block usage
    Df,
    /// Decode a raw block
    Dump {
        block: usize,
        #[arg(long = "as", value_enum, default_value_t = Kind::Data)]
        kind: Kind,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Kind {
    Root,
    Dir,
    Index,
    Data,
}

impl From<Kind> for BlockKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Root => BlockKind::Root,
            Kind::Dir => BlockKind::Directory,
            Kind::Index => BlockKind::Index,
            Kind::Data => BlockKind::Data,
        }
    }
}
