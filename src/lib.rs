// RustySwap - Single-file page swapper for database page caches
// Core library module

pub mod error;
pub mod io;
pub mod swap;

pub use error::{Result, SwapError};
pub use swap::{EvictionCallback, PageSwapper, SingleFileSwapper, SwapStatsSnapshot};

/// Page identifier. The byte offset of a page in the backing file is
/// `page_id * page_size`; callers keep the product within 63 bits.
pub type PageId = u64;

/// Swapper configuration, resolved once at construction time.
#[derive(Debug, Clone)]
pub struct SwapConfig {
    /// log2 of the channel stripe count. `None` selects the platform
    /// default: 0 everywhere positioned I/O is natively concurrent, the
    /// smallest power of two covering the CPU count on Windows.
    pub stripe_power: Option<u32>,
    /// Number of low-order page-id bits consumed before striping, so that
    /// `1 << stripe_shift` consecutive pages land on the same stripe.
    pub stripe_shift: u32,
    /// Force a single channel regardless of `stripe_power`.
    pub no_channel_striping: bool,
    /// Open the backing file with O_DIRECT. Linux only, and `page_size`
    /// must be a multiple of the filesystem block size; callers also own
    /// buffer alignment.
    pub use_direct_io: bool,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            stripe_power: None,
            stripe_shift: 4,
            no_channel_striping: false,
            use_direct_io: false,
        }
    }
}
