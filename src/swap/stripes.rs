// # Channel Stripe Set
//
// K independent handles to the same backing file, K a power of two.
// Stripe selection is pure arithmetic: `(page_id >> shift) & (K - 1)`, so
// a block of `1 << shift` consecutive pages always hits the same stripe
// and batch flushes keep their single-syscall fast path. Slots are only
// ever replaced inside the swapper's reopen critical section.

use crate::io::{FileChannel, OpenConfig};
use crate::PageId;
use parking_lot::RwLock;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Upper bound on the stripe count.
const MAX_STRIPES: usize = 64;

pub(crate) struct StripeSet {
    stripes: Box<[RwLock<Arc<FileChannel>>]>,
    shift: u32,
    mask: u64,
}

impl StripeSet {
    /// Open `count` handles to `path`. The first open may create the file;
    /// the rest expect it in place.
    pub fn open(path: &Path, cfg: OpenConfig, count: usize, shift: u32) -> io::Result<StripeSet> {
        debug_assert!(count.is_power_of_two() && count <= MAX_STRIPES);

        let mut stripes = Vec::with_capacity(count);
        stripes.push(RwLock::new(Arc::new(FileChannel::open(path, cfg)?)));
        for _ in 1..count {
            let chan = FileChannel::open(path, OpenConfig { create: false, ..cfg })?;
            stripes.push(RwLock::new(Arc::new(chan)));
        }

        Ok(StripeSet {
            stripes: stripes.into_boxed_slice(),
            shift,
            mask: (count - 1) as u64,
        })
    }

    #[inline]
    pub fn index_of(&self, page_id: PageId) -> usize {
        ((page_id >> self.shift) & self.mask) as usize
    }

    #[inline]
    pub fn channel(&self, index: usize) -> Arc<FileChannel> {
        self.stripes[index].read().clone()
    }

    /// The token stripe: holds the region lock and services force and
    /// truncate.
    #[inline]
    pub fn token(&self) -> Arc<FileChannel> {
        self.channel(0)
    }

    pub fn replace(&self, index: usize, chan: Arc<FileChannel>) {
        *self.stripes[index].write() = chan;
    }

    pub fn len(&self) -> usize {
        self.stripes.len()
    }
}

/// Platform default stripe count. Positioned I/O on Unix is natively
/// concurrent, so one handle suffices; Windows file handles serialize
/// positioned calls, so spread them across the cores.
pub(crate) fn default_stripe_count() -> usize {
    if cfg!(windows) {
        num_cpus::get().next_power_of_two().clamp(1, MAX_STRIPES)
    } else {
        1
    }
}

/// Stripe count for an explicit `stripe_power` override.
pub(crate) fn stripe_count_for_power(power: u32) -> usize {
    (1usize << power.min(6)).min(MAX_STRIPES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_set(count: usize, shift: u32) -> (StripeSet, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let set = StripeSet::open(
            &dir.path().join("striped.db"),
            OpenConfig {
                create: true,
                direct_io: false,
            },
            count,
            shift,
        )
        .unwrap();
        (set, dir)
    }

    #[test]
    fn selection_rotates_in_shift_blocks() {
        let (set, _dir) = open_set(4, 4);

        // 16 consecutive pages per stripe before rotating.
        for page in 0..16u64 {
            assert_eq!(set.index_of(page), 0);
        }
        for page in 16..32u64 {
            assert_eq!(set.index_of(page), 1);
        }
        assert_eq!(set.index_of(63), 3);
        // Wraps around after K blocks.
        assert_eq!(set.index_of(64), 0);
    }

    #[test]
    fn single_stripe_takes_everything() {
        let (set, _dir) = open_set(1, 4);
        assert_eq!(set.len(), 1);
        for page in [0u64, 7, 1 << 20, u64::MAX >> 1] {
            assert_eq!(set.index_of(page), 0);
        }
    }

    #[test]
    fn replace_installs_new_channel() {
        let (set, dir) = open_set(2, 4);

        let old = set.channel(1);
        old.close().unwrap();
        assert!(!set.channel(1).is_open());

        let fresh = FileChannel::open(
            &dir.path().join("striped.db"),
            OpenConfig {
                create: false,
                direct_io: false,
            },
        )
        .unwrap();
        set.replace(1, Arc::new(fresh));
        assert!(set.channel(1).is_open());
        // Stripe 0 untouched.
        assert!(set.token().is_open());
    }

    #[test]
    fn platform_default() {
        let count = default_stripe_count();
        assert!(count.is_power_of_two());
        if cfg!(windows) {
            assert!(count >= num_cpus::get().min(MAX_STRIPES));
        } else {
            assert_eq!(count, 1);
        }
    }

    #[test]
    fn power_override_is_capped() {
        assert_eq!(stripe_count_for_power(0), 1);
        assert_eq!(stripe_count_for_power(3), 8);
        assert_eq!(stripe_count_for_power(20), MAX_STRIPES);
    }
}
