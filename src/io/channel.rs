// # File Channel
//
// One open handle to the backing file. A channel can be marked closed at
// any time; the descriptor itself stays alive until the last reference is
// dropped, so positioned calls already in flight remain well-defined while
// every call issued afterwards observes the closed state instead. That
// closed-channel error is the sole trigger of the swapper's reopen
// protocol.

use super::OpenConfig;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(unix)]
use fs4::fs_std::FileExt as _;
#[cfg(unix)]
use std::io::{IoSlice, IoSliceMut};
#[cfg(unix)]
use std::os::unix::fs::FileExt as _;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;
#[cfg(target_os = "linux")]
use std::os::unix::fs::OpenOptionsExt;

#[cfg(windows)]
use std::os::windows::fs::FileExt as _;

/// Upper bound on iovec entries per gather/scatter syscall (IOV_MAX).
pub const MAX_IOVECS: usize = 1024;

/// Error returned for I/O issued against a closed channel.
pub(crate) fn closed_channel() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "file channel is closed")
}

/// Whether `err` reports I/O against a closed channel.
pub(crate) fn is_closed_channel(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotConnected
}

/// One open, positioned-I/O handle to the backing file.
pub struct FileChannel {
    file: File,
    open: AtomicBool,
}

impl FileChannel {
    pub fn open(path: &Path, cfg: OpenConfig) -> io::Result<FileChannel> {
        let mut opts = OpenOptions::new();
        opts.read(true).write(true).create(cfg.create);

        #[cfg(target_os = "linux")]
        if cfg.direct_io {
            opts.custom_flags(libc::O_DIRECT);
        }

        let file = opts.open(path)?;
        Ok(FileChannel {
            file,
            open: AtomicBool::new(true),
        })
    }

    /// Whether the channel still accepts I/O.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    #[inline]
    fn ensure_open(&self) -> io::Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(closed_channel())
        }
    }

    /// Positioned read. Returns 0 at end of file.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.ensure_open()?;
        loop {
            #[cfg(unix)]
            let result = self.file.read_at(buf, offset);
            #[cfg(windows)]
            let result = self.file.seek_read(buf, offset);

            match result {
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    /// Positioned write of the whole buffer; does not return until every
    /// byte has been handed to the kernel or the write failed.
    pub fn write_all_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        self.ensure_open()?;

        #[cfg(unix)]
        return self.file.write_all_at(buf, offset);

        #[cfg(windows)]
        {
            let mut buf = buf;
            let mut offset = offset;
            while !buf.is_empty() {
                match self.file.seek_write(buf, offset) {
                    Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                    Ok(n) => {
                        buf = &buf[n..];
                        offset += n as u64;
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        }
    }

    /// Positioned scatter read into up to [`MAX_IOVECS`] buffers. Returns
    /// the byte count delivered by the kernel; 0 means end of file.
    #[cfg(unix)]
    pub fn read_vectored_at(&self, bufs: &mut [IoSliceMut<'_>], offset: u64) -> io::Result<usize> {
        self.ensure_open()?;
        debug_assert!(bufs.len() <= MAX_IOVECS);
        loop {
            // IoSliceMut is guaranteed ABI-compatible with iovec.
            let n = unsafe {
                libc::preadv(
                    self.file.as_raw_fd(),
                    bufs.as_ptr() as *const libc::iovec,
                    bufs.len() as libc::c_int,
                    offset as libc::off_t,
                )
            };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    /// Positioned gather write from up to [`MAX_IOVECS`] buffers. May
    /// transfer fewer bytes than requested; callers loop.
    #[cfg(unix)]
    pub fn write_vectored_at(&self, bufs: &[IoSlice<'_>], offset: u64) -> io::Result<usize> {
        self.ensure_open()?;
        debug_assert!(bufs.len() <= MAX_IOVECS);
        loop {
            let n = unsafe {
                libc::pwritev(
                    self.file.as_raw_fd(),
                    bufs.as_ptr() as *const libc::iovec,
                    bufs.len() as libc::c_int,
                    offset as libc::off_t,
                )
            };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    /// Current file length in bytes.
    pub fn size(&self) -> io::Result<u64> {
        self.ensure_open()?;
        Ok(self.file.metadata()?.len())
    }

    pub fn truncate(&self, size: u64) -> io::Result<()> {
        self.ensure_open()?;
        self.file.set_len(size)
    }

    /// Flush file contents to stable storage. With `metadata` false the
    /// cheaper data-only sync (fdatasync) is used.
    pub fn force(&self, metadata: bool) -> io::Result<()> {
        self.ensure_open()?;
        if metadata {
            self.file.sync_all()
        } else {
            self.file.sync_data()
        }
    }

    /// Try to take the advisory exclusive lock on this handle. `Ok(false)`
    /// means another handle holds it.
    #[cfg(unix)]
    pub fn try_lock(&self) -> io::Result<bool> {
        self.ensure_open()?;
        self.file.try_lock_exclusive()
    }

    /// Mark the channel closed and release any advisory lock it holds.
    /// The first close reports the unlock outcome; later calls are no-ops.
    pub fn close(&self) -> io::Result<()> {
        if self.open.swap(false, Ordering::AcqRel) {
            #[cfg(unix)]
            self.file.unlock()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for FileChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileChannel")
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create(path: &Path) -> FileChannel {
        FileChannel::open(
            path,
            OpenConfig {
                create: true,
                direct_io: false,
            },
        )
        .unwrap()
    }

    #[test]
    fn positioned_round_trip() {
        let dir = tempdir().unwrap();
        let chan = create(&dir.path().join("c.db"));

        chan.write_all_at(b"hello", 100).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(chan.read_at(&mut buf, 100).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(chan.size().unwrap(), 105);
    }

    #[test]
    fn read_past_eof_returns_zero() {
        let dir = tempdir().unwrap();
        let chan = create(&dir.path().join("c.db"));

        let mut buf = [0u8; 16];
        assert_eq!(chan.read_at(&mut buf, 4096).unwrap(), 0);
    }

    #[test]
    fn closed_channel_refuses_io() {
        let dir = tempdir().unwrap();
        let chan = create(&dir.path().join("c.db"));

        chan.close().unwrap();
        assert!(!chan.is_open());

        let err = chan.write_all_at(b"x", 0).unwrap_err();
        assert!(is_closed_channel(&err));
        let err = chan.read_at(&mut [0u8; 1], 0).unwrap_err();
        assert!(is_closed_channel(&err));
        let err = chan.size().unwrap_err();
        assert!(is_closed_channel(&err));

        // Idempotent.
        chan.close().unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn vectored_round_trip() {
        let dir = tempdir().unwrap();
        let chan = create(&dir.path().join("c.db"));

        let a = [1u8; 512];
        let b = [2u8; 512];
        let bufs = [IoSlice::new(&a), IoSlice::new(&b)];
        let n = chan.write_vectored_at(&bufs, 0).unwrap();
        assert_eq!(n, 1024);

        let mut x = [0u8; 512];
        let mut y = [0u8; 512];
        let mut read_bufs = [IoSliceMut::new(&mut x), IoSliceMut::new(&mut y)];
        let n = chan.read_vectored_at(&mut read_bufs, 0).unwrap();
        assert_eq!(n, 1024);
        assert!(x.iter().all(|&v| v == 1));
        assert!(y.iter().all(|&v| v == 2));
    }

    #[test]
    #[cfg(unix)]
    fn second_handle_cannot_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.db");
        let first = create(&path);
        let second = create(&path);

        assert!(first.try_lock().unwrap());
        assert!(!second.try_lock().unwrap());

        // Closing the holder releases the lock.
        first.close().unwrap();
        assert!(second.try_lock().unwrap());
    }
}
