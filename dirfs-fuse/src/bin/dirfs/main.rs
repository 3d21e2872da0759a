mod cli;

use std::fs;
use std::io::{self, Read, Write};
use std::process::ExitCode;

use clap::Parser;
use dirfs::layout::{BlockView, MAX_FILE_SIZE};
use dirfs::SessionOptions;
use dirfs_fuse::{FileKind, Operations};

use self::cli::{Cli, Command};

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("dirfs: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut options = SessionOptions::new(&cli.image);
    if let Command::Mkfs = cli.command {
        options = options.create(true).format(true);
    }

    let ops = Operations::init(&options)?;
    let result = dispatch(&ops, cli.command);
    ops.destroy()?;
    result
}

fn dispatch(ops: &Operations, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Mkfs => {
            let stat = ops.statfs()?;
            println!("formatted {} blocks, {} free", stat.blocks, stat.free_blocks);
        }
        Command::Ls { path } => {
            for name in ops.readdir(&path)? {
                println!("{}", name);
            }
        }
        Command::Stat { path } => {
            let attr = ops.getattr(&path)?;
            let kind = match attr.kind {
                FileKind::Directory => "directory",
                FileKind::RegularFile => "regular file",
            };
            println!("  File: {}", path);
            println!("  Type: {}", kind);
            println!("  Size: {}", attr.size);
            println!(" Links: {}", attr.nlink);
            println!("Access: {:04o}", attr.perm);
        }
        Command::Mkdir { path } => ops.mkdir(&path)?,
        Command::Touch { path } => ops.mknod(&path)?,
        Command::Write {
            path,
            offset,
            source,
        } => {
            let data = match source {
                Some(source) => fs::read(source)?,
                None => {
                    let mut data = Vec::new();
                    io::stdin().read_to_end(&mut data)?;
                    data
                }
            };
            let written = ops.write(&path, &data, offset)?;
            log::info!("wrote {} bytes to {}", written, path);
        }
        Command::Cat { path, offset, size } => {
            // No read returns more than a full file.
            let mut buf = vec![0; size.unwrap_or(MAX_FILE_SIZE).min(MAX_FILE_SIZE)];
            let n = ops.read(&path, &mut buf, offset)?;
            io::stdout().write_all(&buf[..n])?;
        }
        Command::Df => {
            let stat = ops.statfs()?;
            let used = stat.blocks - stat.free_blocks;
            println!("{:>10} {:>10} {:>10} {:>10}", "Blocks", "Used", "Free", "BlockSize");
            println!(
                "{:>10} {:>10} {:>10} {:>10}",
                stat.blocks, used, stat.free_blocks, stat.block_size
            );
        }
        Command::Dump { block, kind } => match ops.dump(block, kind.into())? {
            BlockView::Root(root) => {
                for dir in root.dirs.iter() {
                    println!("{:<8} -> {}", dir.name, dir.start_block);
                }
            }
            BlockView::Directory(dir) => {
                for file in dir.files.iter() {
                    println!(
                        "{:<12} {:>6} bytes, index {}",
                        file.display_name(),
                        file.size,
                        file.index_block
                    );
                }
            }
            BlockView::Index(index) => {
                for (slot, blocknr) in index.blocks().iter().enumerate() {
                    println!("{:>2}: {}", slot, blocknr);
                }
            }
            BlockView::Data(data) => hexdump(&data[..]),
        },
    }
    Ok(())
}

fn hexdump(data: &[u8]) {
    for (row, chunk) in data.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        let text: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
            .collect();
        println!("{:04x}  {}  {}", row * 16, hex.join(" "), text);
    }
}
