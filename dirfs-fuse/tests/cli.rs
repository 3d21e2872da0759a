use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

fn dirfs(image: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dirfs"))
        .arg("--image")
        .arg(image)
        .args(args)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "dirfs failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).unwrap()
}

#[test]
fn commands_share_one_image() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join(".disk");
    let source = dir.path().join("hello.txt");
    std::fs::write(&source, b"hello from the host\n").unwrap();

    stdout(&dirfs(&image, &["mkfs"]));
    stdout(&dirfs(&image, &["mkdir", "/docs"]));
    stdout(&dirfs(&image, &["touch", "/docs/hello.txt"]));
    stdout(&dirfs(
        &image,
        &["write", "/docs/hello.txt", source.to_str().unwrap()],
    ));

    assert_eq!(stdout(&dirfs(&image, &["ls", "/"])), ".\n..\ndocs\n");
    assert_eq!(
        stdout(&dirfs(&image, &["ls", "/docs"])),
        ".\n..\nhello.txt\n"
    );
    assert_eq!(
        stdout(&dirfs(&image, &["cat", "/docs/hello.txt"])),
        "hello from the host\n"
    );
    assert_eq!(
        stdout(&dirfs(
            &image,
            &["cat", "/docs/hello.txt", "--offset", "6", "--size", "4"]
        )),
        "from"
    );
    assert!(stdout(&dirfs(&image, &["stat", "/docs/hello.txt"])).contains("Size: 20"));
}

#[test]
fn write_reads_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join(".disk");
    stdout(&dirfs(&image, &["mkfs"]));
    stdout(&dirfs(&image, &["mkdir", "/docs"]));
    stdout(&dirfs(&image, &["touch", "/docs/a.txt"]));

    let mut child = Command::new(env!("CARGO_BIN_EXE_dirfs"))
        .arg("--image")
        .arg(&image)
        .args(["write", "/docs/a.txt"])
        .stdin(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(b"piped").unwrap();
    assert!(child.wait().unwrap().success());

    assert_eq!(stdout(&dirfs(&image, &["cat", "/docs/a.txt"])), "piped");
}

#[test]
fn errors_exit_non_zero_with_description() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join(".disk");
    stdout(&dirfs(&image, &["mkfs"]));

    let output = dirfs(&image, &["ls", "/nope"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No such file or directory"), "{}", stderr);

    let output = dirfs(&dir.path().join("missing"), &["ls", "/"]);
    assert!(!output.status.success());
}

#[test]
fn image_path_comes_from_environment() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("env.disk");

    let output = Command::new(env!("CARGO_BIN_EXE_dirfs"))
        .env("DIRFS_IMAGE", &image)
        .arg("mkfs")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(std::fs::metadata(&image).unwrap().len(), 5 * 1024 * 1024);
}

#[test]
fn cat_caps_oversized_requests() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join(".disk");
    stdout(&dirfs(&image, &["mkfs"]));
    stdout(&dirfs(&image, &["mkdir", "/docs"]));
    stdout(&dirfs(&image, &["touch", "/docs/a.txt"]));
    let source = dir.path().join("a.txt");
    std::fs::write(&source, b"abc").unwrap();
    stdout(&dirfs(
        &image,
        &["write", "/docs/a.txt", source.to_str().unwrap()],
    ));

    let size = usize::MAX.to_string();
    assert_eq!(
        stdout(&dirfs(&image, &["cat", "/docs/a.txt", "--size", &size])),
        "abc"
    );
}

#[test]
fn mkfs_reformats_an_image_of_the_wrong_size() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join(".disk");
    std::fs::write(&image, vec![0xFF; 4096]).unwrap();
    assert!(!dirfs(&image, &["ls", "/"]).status.success());

    stdout(&dirfs(&image, &["mkfs"]));
    assert_eq!(std::fs::metadata(&image).unwrap().len(), 5 * 1024 * 1024);
    assert_eq!(stdout(&dirfs(&image, &["ls", "/"])), ".\n..\n");
}
