// # Positioned File I/O
//
// Low-level file access used by the swapper: open/create with optional
// Direct I/O, positioned scalar and vectored reads/writes, advisory
// locking, and filesystem block-size discovery. Nothing in this module
// maintains a seek cursor; every call carries its own offset, so handles
// are shared freely across threads.

mod channel;

pub use channel::{FileChannel, MAX_IOVECS};
pub(crate) use channel::is_closed_channel;

use std::io;
use std::path::Path;

/// How a channel should be opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenConfig {
    /// Create the file if it does not exist.
    pub create: bool,
    /// Open with O_DIRECT (Linux only; validated by the swapper).
    pub direct_io: bool,
}

/// Remove the backing file.
pub fn delete_file(path: &Path) -> io::Result<()> {
    std::fs::remove_file(path)
}

/// Block size of the filesystem holding `path`. Falls back to the parent
/// directory when the file does not exist yet, since the block size is a
/// property of the filesystem rather than the file.
#[cfg(unix)]
pub fn block_size(path: &Path) -> io::Result<u64> {
    use std::os::unix::fs::MetadataExt;

    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.blksize()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let parent = path.parent().unwrap_or_else(|| Path::new("."));
            Ok(std::fs::metadata(parent)?.blksize())
        }
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
pub fn block_size(_path: &Path) -> io::Result<u64> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "block size discovery is not available on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    #[cfg(unix)]
    fn block_size_of_missing_file_uses_parent() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("not-created-yet.db");
        let bs = block_size(&missing).unwrap();
        assert!(bs > 0);
        assert_eq!(bs, block_size(dir.path()).unwrap());
    }

    #[test]
    fn delete_file_removes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.db");
        std::fs::write(&path, b"x").unwrap();
        delete_file(&path).unwrap();
        assert!(!path.exists());
    }
}
