// Swapper activity counters. Hot paths bump relaxed atomics; reporting
// takes a point-in-time snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct SwapStats {
    pub reads: AtomicU64,
    pub writes: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
    pub vectored_reads: AtomicU64,
    pub vectored_writes: AtomicU64,
    pub reopens: AtomicU64,
    pub evictions: AtomicU64,
}

/// Point-in-time copy of a swapper's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapStatsSnapshot {
    pub reads: u64,
    pub writes: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub vectored_reads: u64,
    pub vectored_writes: u64,
    pub reopens: u64,
    pub evictions: u64,
}

impl SwapStats {
    pub fn snapshot(&self) -> SwapStatsSnapshot {
        SwapStatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            vectored_reads: self.vectored_reads.load(Ordering::Relaxed),
            vectored_writes: self.vectored_writes.load(Ordering::Relaxed),
            reopens: self.reopens.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_copies_counters() {
        let stats = SwapStats::default();
        stats.reads.fetch_add(3, Ordering::Relaxed);
        stats.bytes_read.fetch_add(4096, Ordering::Relaxed);

        let snap = stats.snapshot();
        assert_eq!(snap.reads, 3);
        assert_eq!(snap.bytes_read, 4096);
        assert_eq!(snap.writes, 0);
    }
}
