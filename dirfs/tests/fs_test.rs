use dirfs::layout::DISK_SIZE;
use dirfs::{FsError, SessionOptions};
use tempfile::TempDir;

fn image() -> (TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join(".disk");
    (dir, image)
}

#[test]
fn contents_survive_reopening_the_image() {
    let (_dir, image) = image();
    let text = b"Lorem ipsum dolor sit amet, consectetur adipiscing elit. ".repeat(20);

    let mut fs = SessionOptions::new(&image).create(true).open().unwrap();
    let docs = fs.create_directory("docs").unwrap();
    fs.create_file(docs, "lorem", "txt").unwrap();
    fs.write(docs, "lorem", "txt", &text, 0).unwrap();
    fs.close().unwrap();

    let mut fs = SessionOptions::new(&image).open().unwrap();
    let docs = fs.lookup_directory("docs").unwrap();
    assert_eq!(fs.list_directory(docs).unwrap(), vec!["lorem.txt"]);
    let mut buf = vec![0; text.len() + 10];
    let n = fs.read(docs, "lorem", "txt", &mut buf, 0).unwrap();
    assert_eq!(&buf[..n], &text[..]);
    fs.close().unwrap();
}

#[test]
fn reopened_volume_does_not_reuse_blocks() {
    let (_dir, image) = image();
    let mut fs = SessionOptions::new(&image).create(true).open().unwrap();
    let docs = fs.create_directory("docs").unwrap();
    fs.close().unwrap();

    let mut fs = SessionOptions::new(&image).open().unwrap();
    let misc = fs.create_directory("misc").unwrap();
    assert_ne!(docs, misc);
    fs.create_file(misc, "a", "txt").unwrap();
    fs.write(misc, "a", "txt", b"x", 0).unwrap();

    let mut buf = [0; 1];
    assert!(matches!(
        fs.read(docs, "a", "txt", &mut buf, 0),
        Err(FsError::NotFound)
    ));
}

#[test]
fn image_of_wrong_size_is_rejected() {
    let (_dir, image) = image();
    std::fs::write(&image, vec![0; 4096]).unwrap();

    match SessionOptions::new(&image).open() {
        Err(FsError::InvalidGeometry { expected, found }) => {
            assert_eq!(expected, DISK_SIZE as u64);
            assert_eq!(found, 4096);
        }
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("opened a 4096 byte image"),
    }
}

#[test]
fn zeroed_image_opens_as_empty_volume() {
    let (_dir, image) = image();
    std::fs::write(&image, vec![0; DISK_SIZE]).unwrap();

    let mut fs = SessionOptions::new(&image).open().unwrap();
    assert!(fs.list_root().unwrap().is_empty());
    assert!(fs.allocator().is_initialized());
    fs.create_directory("docs").unwrap();
}
