// # Page Swapping
//
// The lowest layer of the page cache: translates page-granular reads and
// writes into positioned I/O against one backing file. Upper layers supply
// dirty pages for eviction and demand pages on faults; this layer owns the
// channel stripes, the logical file length, the exclusive file lock and the
// reopen protocol for channels closed underneath in-flight operations.

mod stats;
mod stripes;
mod swapper;

pub use stats::SwapStatsSnapshot;
pub use swapper::SingleFileSwapper;

pub(crate) use stats::SwapStats;

use crate::{PageId, Result};
use std::path::Path;

/// Callback invoked when the enclosing cache evicts a page bound to a
/// swapper.
pub type EvictionCallback = Box<dyn Fn(PageId) + Send + Sync>;

/// Page-granular positioned I/O over one backing file.
///
/// Every method is callable concurrently from any number of threads. Scalar
/// buffers must be at least `page_size` bytes; vectored calls take one such
/// buffer per page of a contiguous run.
pub trait PageSwapper: Send + Sync {
    /// Read the page into `buf`. Bytes past end of file read as zero; the
    /// return value is the count actually read from disk, 0 when the page
    /// lies entirely past the end.
    fn read(&self, page_id: PageId, buf: &mut [u8]) -> Result<usize>;

    /// Read a contiguous run of pages, one buffer per page, using a single
    /// gather syscall where the platform allows. Semantically identical to
    /// per-page [`read`](Self::read) calls, zero-fill included.
    fn read_vectored(&self, start_page: PageId, pages: &mut [&mut [u8]]) -> Result<usize>;

    /// Write one full page. Returns `page_size`.
    fn write(&self, page_id: PageId, buf: &[u8]) -> Result<usize>;

    /// Write a contiguous run of pages in one scatter syscall where the
    /// platform allows. Returns `page_size * pages.len()`.
    fn write_vectored(&self, start_page: PageId, pages: &[&[u8]]) -> Result<usize>;

    /// Notify the swapper that the cache evicted one of its pages.
    fn evicted(&self, page_id: PageId);

    /// The backing file.
    fn path(&self) -> &Path;

    /// Flush written pages to stable storage.
    fn force(&self) -> Result<()>;

    /// Largest valid page id under the current logical file size, or -1
    /// when the file holds no pages. A partial tail page counts.
    fn last_page_id(&self) -> i64;

    /// Discard all pages and reset the logical file size to zero.
    fn truncate(&self) -> Result<()>;

    /// Close every channel and drop the eviction callback. Pages bound in
    /// the cache may outlive this; the swapper stays safe to observe but
    /// refuses further I/O.
    fn close(&self) -> Result<()>;

    /// [`close`](Self::close), then delete the backing file.
    fn close_and_delete(&self) -> Result<()>;
}
