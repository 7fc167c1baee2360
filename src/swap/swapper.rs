// # Single-File Page Swapper
//
// Translates page-granular reads and writes into positioned I/O against one
// backing file. Hot paths never block on a lock: stripe selection is
// arithmetic, the logical file length lives in an atomic, and positioned
// calls carry their own offsets. The single serialized section is channel
// reopen, entered only after a stripe was closed underneath an in-flight
// operation.
//
// Reads past the logical end of file deterministically zero-fill the
// caller's buffer, so upper layers treat the page run as a contiguous
// sparse file and never observe undefined bytes.

use crate::error::{Result, SwapError};
use crate::io::{self, is_closed_channel, FileChannel, OpenConfig};
use crate::swap::stripes::{default_stripe_count, stripe_count_for_power, StripeSet};
use crate::swap::{EvictionCallback, PageSwapper, SwapStats, SwapStatsSnapshot};
use crate::{PageId, SwapConfig};
use parking_lot::Mutex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(unix)]
use crate::io::MAX_IOVECS;
#[cfg(unix)]
use std::io::{IoSlice, IoSliceMut};

/// How many times an operation survives its channel being closed
/// underneath it before giving up.
const MAX_REOPEN_ATTEMPTS: u32 = 42;

/// Page-granular positioned I/O over one backing file.
///
/// One instance exists per open file in the cache. All I/O entry points
/// take `&self` and are safe to call from any number of threads.
pub struct SingleFileSwapper {
    path: PathBuf,
    page_size: usize,
    stripes: StripeSet,
    /// Logical file length in bytes. Raised monotonically ahead of writes;
    /// reset only by truncate.
    file_size: AtomicU64,
    /// Whether positioned gather/scatter syscalls are available.
    has_fast_path: bool,
    /// Flags for reopening a stripe channel.
    reopen_cfg: OpenConfig,
    on_evict: Mutex<Option<EvictionCallback>>,
    closed: AtomicBool,
    /// Serializes channel replacement; I/O paths never take it.
    reopen_lock: Mutex<()>,
    stats: SwapStats,
}

impl SingleFileSwapper {
    /// Open the swapper over `path`, creating the file if needed.
    ///
    /// `page_size` is a positive power of two, enforced by the enclosing
    /// cache. On Unix the token stripe takes an advisory exclusive lock;
    /// a second live swapper over the same file fails with
    /// [`SwapError::FileLock`].
    pub fn open(
        path: impl AsRef<Path>,
        page_size: usize,
        config: &SwapConfig,
        on_evict: Option<EvictionCallback>,
    ) -> Result<SingleFileSwapper> {
        debug_assert!(page_size.is_power_of_two());
        let path = path.as_ref().to_path_buf();

        if config.use_direct_io {
            validate_direct_io(&path, page_size)?;
        }

        let count = if config.no_channel_striping {
            1
        } else {
            config
                .stripe_power
                .map(stripe_count_for_power)
                .unwrap_or_else(default_stripe_count)
        };
        let open_cfg = OpenConfig {
            create: true,
            direct_io: config.use_direct_io,
        };
        let stripes = StripeSet::open(&path, open_cfg, count, config.stripe_shift)?;

        let token = stripes.token();
        let file_size = token.size()?;

        let swapper = SingleFileSwapper {
            path,
            page_size,
            stripes,
            file_size: AtomicU64::new(file_size),
            has_fast_path: cfg!(unix),
            reopen_cfg: OpenConfig {
                create: false,
                direct_io: config.use_direct_io,
            },
            on_evict: Mutex::new(on_evict),
            closed: AtomicBool::new(false),
            reopen_lock: Mutex::new(()),
            stats: SwapStats::default(),
        };
        swapper.acquire_lock(&token)?;
        Ok(swapper)
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Install the eviction callback, replacing any previous one.
    pub fn set_eviction_callback(&self, callback: EvictionCallback) {
        *self.on_evict.lock() = Some(callback);
    }

    pub fn stats(&self) -> SwapStatsSnapshot {
        self.stats.snapshot()
    }

    /// Current logical file length in bytes.
    pub fn current_file_size(&self) -> u64 {
        self.file_size.load(Ordering::Acquire)
    }

    /// Raise the logical file length to at least `new_size`, never
    /// lowering it. Done ahead of the write itself so a concurrent
    /// size-observing reader cannot miss the new region.
    fn advance_file_size(&self, new_size: u64) {
        self.file_size.fetch_max(new_size, Ordering::AcqRel);
    }

    /// Take the advisory exclusive lock on the token stripe. Skipped on
    /// Windows, where a file lock would confine I/O to the locking handle
    /// and defeat striping; whole-database lockout there is the lock
    /// file's job, one level up.
    #[cfg(unix)]
    fn acquire_lock(&self, chan: &FileChannel) -> Result<()> {
        match chan.try_lock() {
            Ok(true) => Ok(()),
            Ok(false) => Err(SwapError::FileLock {
                path: self.path.clone(),
                source: None,
            }),
            Err(e) => Err(SwapError::FileLock {
                path: self.path.clone(),
                source: Some(e),
            }),
        }
    }

    #[cfg(not(unix))]
    fn acquire_lock(&self, _chan: &FileChannel) -> Result<()> {
        Ok(())
    }

    /// Run `op` against the current channel of `stripe`, transparently
    /// reopening and retrying when the channel was closed underneath the
    /// call. All other failures propagate untouched. A reopen that itself
    /// fails re-raises the closed-channel error that sent us here, with
    /// the reopen failure attached as its cause.
    fn with_channel<T>(
        &self,
        stripe: usize,
        mut op: impl FnMut(&FileChannel) -> std::io::Result<T>,
    ) -> Result<T> {
        let mut attempts = MAX_REOPEN_ATTEMPTS;
        loop {
            let chan = self.stripes.channel(stripe);
            match op(&chan) {
                Ok(v) => return Ok(v),
                Err(e) if is_closed_channel(&e) => {
                    if attempts == 0 {
                        return Err(SwapError::Interrupted {
                            attempts: MAX_REOPEN_ATTEMPTS,
                            source: e,
                        });
                    }
                    attempts -= 1;
                    if let Err(reopen_err) = self.reopen_stripe(stripe) {
                        return Err(match reopen_err {
                            closed @ SwapError::Closed { .. } => closed,
                            failure => SwapError::ReopenFailed {
                                original: e,
                                source: Box::new(failure),
                            },
                        });
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Replace the channel of a stripe that was closed underneath an
    /// operation. No-op when another thread already healed the slot;
    /// refuses once the swapper itself is closed.
    fn reopen_stripe(&self, stripe: usize) -> Result<()> {
        let _guard = self.reopen_lock.lock();

        if self.stripes.channel(stripe).is_open() {
            return Ok(());
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(SwapError::Closed {
                path: self.path.clone(),
            });
        }

        let chan = Arc::new(FileChannel::open(&self.path, self.reopen_cfg)?);
        if stripe == 0 {
            // Closing the previous token handle dropped the region lock.
            self.acquire_lock(&chan)?;
        }
        self.stripes.replace(stripe, chan);
        self.stats.reopens.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(stripe, path = %self.path.display(), "reopened swapper channel");
        Ok(())
    }

    /// Scalar read with zero-fill: reads while the file has bytes, then
    /// zeroes the rest of the page.
    fn read_into(&self, chan: &FileChannel, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        if offset < self.current_file_size() {
            let mut done = 0;
            while done < buf.len() {
                let n = chan.read_at(&mut buf[done..], offset + done as u64)?;
                if n == 0 {
                    break;
                }
                done += n;
            }
            buf[done..].fill(0);
            Ok(done)
        } else {
            buf.fill(0);
            Ok(0)
        }
    }

    /// Scatter-read a run of pages in chunks of [`MAX_IOVECS`], restarting
    /// from the run's first byte if the channel has to be reopened.
    #[cfg(unix)]
    fn read_run(
        &self,
        chan: &FileChannel,
        offset: u64,
        pages: &mut [&mut [u8]],
    ) -> std::io::Result<usize> {
        let ps = self.page_size;
        let to_read = ps * pages.len();
        let mut done = 0usize;
        while done < to_read {
            let first = done / ps;
            let within = done % ps;
            let mut iovs: Vec<IoSliceMut<'_>> =
                Vec::with_capacity((pages.len() - first).min(MAX_IOVECS));
            for (i, page) in pages[first..].iter_mut().take(MAX_IOVECS).enumerate() {
                let start = if i == 0 { within } else { 0 };
                iovs.push(IoSliceMut::new(&mut page[start..ps]));
            }
            let n = chan.read_vectored_at(&mut iovs, offset + done as u64)?;
            if n == 0 {
                break;
            }
            done += n;
        }
        if done < to_read {
            zero_from(pages, ps, done);
        }
        Ok(done)
    }

    /// Gather-write a run of pages in chunks of [`MAX_IOVECS`].
    #[cfg(unix)]
    fn write_run(
        &self,
        chan: &FileChannel,
        offset: u64,
        pages: &[&[u8]],
    ) -> std::io::Result<usize> {
        let ps = self.page_size;
        let to_write = ps * pages.len();
        let mut done = 0usize;
        while done < to_write {
            let first = done / ps;
            let within = done % ps;
            let mut iovs: Vec<IoSlice<'_>> =
                Vec::with_capacity((pages.len() - first).min(MAX_IOVECS));
            for (i, page) in pages[first..].iter().take(MAX_IOVECS).enumerate() {
                let start = if i == 0 { within } else { 0 };
                iovs.push(IoSlice::new(&page[start..ps]));
            }
            let n = chan.write_vectored_at(&iovs, offset + done as u64)?;
            if n == 0 {
                return Err(std::io::ErrorKind::WriteZero.into());
            }
            done += n;
        }
        Ok(to_write)
    }

    /// Close the channel serving `page_id`, as an asynchronous closure
    /// arriving from outside would. The next operation on the stripe goes
    /// through the reopen protocol.
    #[cfg(test)]
    pub(crate) fn break_stripe_for(&self, page_id: PageId) {
        let _ = self
            .stripes
            .channel(self.stripes.index_of(page_id))
            .close();
    }
}

impl PageSwapper for SingleFileSwapper {
    fn read(&self, page_id: PageId, buf: &mut [u8]) -> Result<usize> {
        let page = &mut buf[..self.page_size];
        let offset = page_id * self.page_size as u64;
        let n = self.with_channel(self.stripes.index_of(page_id), |chan| {
            self.read_into(chan, offset, page)
        })?;
        self.stats.reads.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    fn read_vectored(&self, start_page: PageId, pages: &mut [&mut [u8]]) -> Result<usize> {
        if pages.is_empty() {
            return Ok(0);
        }

        #[cfg(unix)]
        if self.has_fast_path {
            let offset = start_page * self.page_size as u64;
            let n = self.with_channel(self.stripes.index_of(start_page), |chan| {
                self.read_run(chan, offset, pages)
            })?;
            self.stats.vectored_reads.fetch_add(1, Ordering::Relaxed);
            self.stats.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
            return Ok(n);
        }

        // No gather/scatter primitive on this platform: page-at-a-time
        // reads preserve the exact semantics, zero-fill included.
        let mut total = 0;
        for (i, page) in pages.iter_mut().enumerate() {
            total += self.read(start_page + i as u64, page)?;
        }
        Ok(total)
    }

    fn write(&self, page_id: PageId, buf: &[u8]) -> Result<usize> {
        let page = &buf[..self.page_size];
        let offset = page_id * self.page_size as u64;
        self.advance_file_size(offset + self.page_size as u64);
        self.with_channel(self.stripes.index_of(page_id), |chan| {
            chan.write_all_at(page, offset)
        })?;
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_written
            .fetch_add(self.page_size as u64, Ordering::Relaxed);
        Ok(self.page_size)
    }

    fn write_vectored(&self, start_page: PageId, pages: &[&[u8]]) -> Result<usize> {
        if pages.is_empty() {
            return Ok(0);
        }
        let offset = start_page * self.page_size as u64;
        self.advance_file_size(offset + (self.page_size * pages.len()) as u64);

        #[cfg(unix)]
        if self.has_fast_path {
            let n = self.with_channel(self.stripes.index_of(start_page), |chan| {
                self.write_run(chan, offset, pages)
            })?;
            self.stats.vectored_writes.fetch_add(1, Ordering::Relaxed);
            self.stats
                .bytes_written
                .fetch_add(n as u64, Ordering::Relaxed);
            return Ok(n);
        }

        let mut total = 0;
        for (i, page) in pages.iter().enumerate() {
            total += self.write(start_page + i as u64, page)?;
        }
        Ok(total)
    }

    fn evicted(&self, page_id: PageId) {
        let callback = self.on_evict.lock();
        if let Some(callback) = callback.as_ref() {
            callback(page_id);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn force(&self) -> Result<()> {
        // The swapper never changes metadata outside truncate, so the
        // data-only sync suffices.
        self.with_channel(0, |chan| chan.force(false))
    }

    fn last_page_id(&self) -> i64 {
        let size = self.current_file_size();
        let ps = self.page_size as u64;
        if size == 0 {
            -1
        } else if size % ps == 0 {
            (size / ps) as i64 - 1
        } else {
            (size / ps) as i64
        }
    }

    fn truncate(&self) -> Result<()> {
        self.file_size.store(0, Ordering::Release);
        self.with_channel(0, |chan| chan.truncate(0))
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);

        let mut first: Option<std::io::Error> = None;
        for stripe in 0..self.stripes.len() {
            if let Err(e) = self.stripes.channel(stripe).close() {
                if first.is_none() {
                    first = Some(e);
                } else {
                    tracing::warn!(stripe, error = %e, "suppressed failure closing swapper channel");
                }
            }
        }

        // Release the callback so translation structures it captured can
        // go away while evicting threads drain the remaining pages.
        *self.on_evict.lock() = None;

        match first {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn close_and_delete(&self) -> Result<()> {
        self.close()?;
        io::delete_file(&self.path)?;
        Ok(())
    }
}

/// Swapper identity is the backing file alone; the cache de-duplicates
/// mappings keyed on it.
impl PartialEq for SingleFileSwapper {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for SingleFileSwapper {}

impl Hash for SingleFileSwapper {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Debug for SingleFileSwapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFileSwapper")
            .field("path", &self.path)
            .field("page_size", &self.page_size)
            .field("stripes", &self.stripes.len())
            .field("file_size", &self.current_file_size())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Zero every byte of the run from byte position `from` onward.
#[cfg(unix)]
fn zero_from(pages: &mut [&mut [u8]], page_size: usize, mut from: usize) {
    let total = page_size * pages.len();
    while from < total {
        let page = from / page_size;
        let start = from % page_size;
        pages[page][start..page_size].fill(0);
        from += page_size - start;
    }
}

fn validate_direct_io(path: &Path, page_size: usize) -> Result<()> {
    if !cfg!(target_os = "linux") {
        return Err(SwapError::Configuration(
            "direct I/O requires Linux".to_string(),
        ));
    }
    let block = io::block_size(path)?;
    if block == 0 || page_size as u64 % block != 0 {
        return Err(SwapError::Configuration(format!(
            "page size {page_size} is not a multiple of the {block}-byte filesystem block"
        )));
    }
    Ok(())
}
