/// A path split into the at most three components the volume understands.
///
/// `/dir/name.ext` splits at the first `.` after the file name, so `/dir/name` is a file
/// with an empty extension and `/dir/a.b.c` carries the extension `b.c`, which the volume
/// rejects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsPath<'a> {
    Root,
    Dir(&'a str),
    File {
        dir: &'a str,
        name: &'a str,
        ext: &'a str,
    },
    /// Anything below file depth, or not starting at `/`.
    Nested,
}

impl<'a> FsPath<'a> {
    pub fn parse(path: &'a str) -> Self {
        let rest = match path.strip_prefix('/') {
            Some(rest) => rest,
            None => return FsPath::Nested,
        };
        if rest.is_empty() {
            return FsPath::Root;
        }

        let (dir, file) = match rest.split_once('/') {
            Some((dir, file)) => (dir, file),
            None => (rest, ""),
        };
        if file.is_empty() {
            return FsPath::Dir(dir);
        }
        if file.contains('/') {
            return FsPath::Nested;
        }

        let (name, ext) = file.split_once('.').unwrap_or((file, ""));
        FsPath::File { dir, name, ext }
    }
}
