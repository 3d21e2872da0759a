//! Root and subdirectory tables.

use crate::error::{FsError, Result};
use crate::fs::Volume;
use crate::io::{Block, BlockNumber, BlockStorage};
use crate::layout::{
    DirLink, DirRecord, FileLink, IndexBlock, RootRecord, BLOCK_SIZE, MAX_EXTENSION, MAX_FILENAME,
    ROOT_BLOCK,
};

/// Where a file's contents live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLocation {
    pub index_block: BlockNumber,
    pub size: usize,
}

pub(crate) fn check_name(name: &str, max: usize) -> Result<()> {
    if name.len() > max {
        return Err(FsError::NameTooLong {
            name: name.to_string(),
            max,
        });
    }
    if name.is_empty() {
        return Err(FsError::InvalidName(name.to_string()));
    }
    check_chars(name)
}

pub(crate) fn check_extension(ext: &str) -> Result<()> {
    if ext.len() > MAX_EXTENSION {
        return Err(FsError::NameTooLong {
            name: ext.to_string(),
            max: MAX_EXTENSION,
        });
    }
    check_chars(ext)
}

fn check_chars(name: &str) -> Result<()> {
    if name.bytes().any(|b| b == b'/' || b == b'.' || b == 0) {
        return Err(FsError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl<T: BlockStorage> Volume<T> {
    /// Creates an empty directory under the root and returns its block.
    pub fn create_directory(&mut self, name: &str) -> Result<BlockNumber> {
        check_name(name, MAX_FILENAME)?;
        let mut root: RootRecord = self.load(ROOT_BLOCK)?;
        if root.find(name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        if root.dirs.is_full() {
            return Err(FsError::RootFull);
        }

        let start_block = self.with_rollback(|vol| {
            let start_block = vol.allocator.allocate()?;
            vol.store(start_block, &DirRecord::default())?;
            root.dirs
                .push(DirLink {
                    name: name.to_string(),
                    start_block,
                })
                .map_err(|_| FsError::RootFull)?;
            vol.store(ROOT_BLOCK, &root)?;
            Ok(start_block)
        })?;

        info!("created directory {:?} at block {}", name, start_block);
        Ok(start_block)
    }

    pub fn lookup_directory(&mut self, name: &str) -> Result<BlockNumber> {
        check_name(name, MAX_FILENAME)?;
        let root: RootRecord = self.load(ROOT_BLOCK)?;
        root.find(name)
            .map(|dir| dir.start_block)
            .ok_or(FsError::NotFound)
    }

    /// Names of all directories, in creation order.
    pub fn list_root(&mut self) -> Result<Vec<String>> {
        let root: RootRecord = self.load(ROOT_BLOCK)?;
        Ok(root.dirs.iter().map(|dir| dir.name.clone()).collect())
    }

    /// `name.ext` of every file in the directory at `dir_block`, in creation order.
    pub fn list_directory(&mut self, dir_block: BlockNumber) -> Result<Vec<String>> {
        let dir: DirRecord = self.load(dir_block)?;
        Ok(dir.files.iter().map(FileLink::display_name).collect())
    }

    /// Creates an empty file: one index block whose first entry points at one zeroed data
    /// block.
    pub fn create_file(&mut self, dir_block: BlockNumber, name: &str, ext: &str) -> Result<()> {
        check_name(name, MAX_FILENAME)?;
        check_extension(ext)?;
        let mut dir: DirRecord = self.load(dir_block)?;
        if dir.find(name, ext).is_some() {
            return Err(FsError::AlreadyExists);
        }
        if dir.files.is_full() {
            return Err(FsError::DirFull);
        }

        let index_block = self.with_rollback(|vol| {
            let index_block = vol.allocator.allocate()?;
            let data_block = vol.allocator.allocate()?;

            // Contents first, the directory entry that makes them reachable last.
            let zeroes: Block = [0; BLOCK_SIZE];
            vol.store(data_block, &zeroes)?;
            vol.store(index_block, &IndexBlock::starting_at(data_block))?;
            dir.files
                .push(FileLink {
                    name: name.to_string(),
                    ext: ext.to_string(),
                    size: 0,
                    index_block,
                })
                .map_err(|_| FsError::DirFull)?;
            vol.store(dir_block, &dir)?;
            Ok(index_block)
        })?;

        info!(
            "created file {:?}.{:?} in block {} (index block {})",
            name, ext, dir_block, index_block
        );
        Ok(())
    }

    pub fn lookup_file(
        &mut self,
        dir_block: BlockNumber,
        name: &str,
        ext: &str,
    ) -> Result<FileLocation> {
        check_name(name, MAX_FILENAME)?;
        check_extension(ext)?;
        let dir: DirRecord = self.load(dir_block)?;
        dir.find(name, ext)
            .map(|file| FileLocation {
                index_block: file.index_block,
                size: file.size,
            })
            .ok_or(FsError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::State;
    use crate::io::MemBlockEmulator;
    use crate::layout::{DISK_BLOCKS, MAX_DIRS_IN_ROOT, MAX_FILES_IN_DIR};

    fn volume() -> Volume<MemBlockEmulator> {
        Volume::format(MemBlockEmulator::new(DISK_BLOCKS)).unwrap()
    }

    #[test]
    fn created_directory_can_be_looked_up() {
        let mut fs = volume();
        for name in &["a", "docs", "eightchr"] {
            let start = fs.create_directory(name).unwrap();
            assert_ne!(start, ROOT_BLOCK);
            assert_eq!(fs.lookup_directory(name).unwrap(), start);
        }
        assert_eq!(fs.list_root().unwrap(), vec!["a", "docs", "eightchr"]);
    }

    #[test]
    fn duplicate_directory_is_rejected() {
        let mut fs = volume();
        fs.create_directory("docs").unwrap();
        let free = fs.free_blocks();

        assert!(matches!(
            fs.create_directory("docs"),
            Err(FsError::AlreadyExists)
        ));
        assert_eq!(fs.free_blocks(), free);
    }

    #[test]
    fn long_or_malformed_directory_names_are_rejected() {
        let mut fs = volume();
        assert!(matches!(
            fs.create_directory("ninechars"),
            Err(FsError::NameTooLong { max: 8, .. })
        ));
        assert!(matches!(fs.create_directory(""), Err(FsError::InvalidName(_))));
        assert!(matches!(fs.create_directory("a.b"), Err(FsError::InvalidName(_))));
        assert!(fs.list_root().unwrap().is_empty());
    }

    #[test]
    fn root_holds_a_fixed_number_of_directories() {
        let mut fs = volume();
        for i in 0..MAX_DIRS_IN_ROOT {
            fs.create_directory(&format!("d{}", i)).unwrap();
        }
        let free = fs.free_blocks();
        assert!(matches!(fs.create_directory("extra"), Err(FsError::RootFull)));
        assert_eq!(fs.free_blocks(), free);
    }

    #[test]
    fn missing_directory_is_not_found() {
        let mut fs = volume();
        assert!(matches!(fs.lookup_directory("nope"), Err(FsError::NotFound)));
    }

    #[test]
    fn created_file_is_empty_with_one_data_block() {
        let mut fs = volume();
        let docs = fs.create_directory("docs").unwrap();
        let free = fs.free_blocks();

        fs.create_file(docs, "a", "txt").unwrap();

        let file = fs.lookup_file(docs, "a", "txt").unwrap();
        assert_eq!(file.size, 0);
        assert_eq!(fs.free_blocks(), free - 2);
        let index: IndexBlock = fs.load(file.index_block).unwrap();
        assert_eq!(index.len(), 1);
        let data = index.get(0).unwrap();
        assert_eq!(fs.allocator().state(data).unwrap(), State::Used);
        assert_eq!(fs.list_directory(docs).unwrap(), vec!["a.txt"]);
    }

    #[test]
    fn same_name_different_extension_is_a_different_file() {
        let mut fs = volume();
        let docs = fs.create_directory("docs").unwrap();
        fs.create_file(docs, "a", "txt").unwrap();
        fs.create_file(docs, "a", "md").unwrap();
        fs.create_file(docs, "a", "").unwrap();

        assert!(matches!(
            fs.create_file(docs, "a", "txt"),
            Err(FsError::AlreadyExists)
        ));
        assert_eq!(fs.list_directory(docs).unwrap(), vec!["a.txt", "a.md", "a"]);
    }

    #[test]
    fn long_file_names_are_rejected() {
        let mut fs = volume();
        let docs = fs.create_directory("docs").unwrap();
        assert!(matches!(
            fs.create_file(docs, "ninechars", "txt"),
            Err(FsError::NameTooLong { max: 8, .. })
        ));
        assert!(matches!(
            fs.create_file(docs, "a", "text"),
            Err(FsError::NameTooLong { max: 3, .. })
        ));
        assert!(fs.list_directory(docs).unwrap().is_empty());
    }

    #[test]
    fn directory_holds_a_fixed_number_of_files() {
        let mut fs = volume();
        let docs = fs.create_directory("docs").unwrap();
        for i in 0..MAX_FILES_IN_DIR {
            fs.create_file(docs, &format!("f{}", i), "txt").unwrap();
        }
        assert!(matches!(
            fs.create_file(docs, "extra", "txt"),
            Err(FsError::DirFull)
        ));
    }

    #[test]
    fn file_creation_on_full_volume_leaks_nothing() {
        let mut fs = volume();
        let docs = fs.create_directory("docs").unwrap();
        // Leave exactly one free block: enough for the index block, not the data block.
        while fs.free_blocks() > 1 {
            fs.allocator.allocate().unwrap();
        }

        assert!(matches!(
            fs.create_file(docs, "a", "txt"),
            Err(FsError::OutOfSpace)
        ));
        assert_eq!(fs.free_blocks(), 1);
        assert!(matches!(fs.lookup_file(docs, "a", "txt"), Err(FsError::NotFound)));
    }

    #[test]
    fn files_are_scoped_to_their_directory() {
        let mut fs = volume();
        let docs = fs.create_directory("docs").unwrap();
        let misc = fs.create_directory("misc").unwrap();
        fs.create_file(docs, "a", "txt").unwrap();

        assert!(matches!(fs.lookup_file(misc, "a", "txt"), Err(FsError::NotFound)));
        fs.create_file(misc, "a", "txt").unwrap();
        assert_ne!(
            fs.lookup_file(docs, "a", "txt").unwrap().index_block,
            fs.lookup_file(misc, "a", "txt").unwrap().index_block
        );
    }
}
