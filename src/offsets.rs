//! Per-descriptor transfer cursors.
//!
//! Each in-flight transfer needs a stable cursor for the copy primitive to
//! pick up where the previous call left off. Instead of a map keyed by
//! connection, cursors live in a dense array indexed by the raw descriptor
//! number: the kernel hands out small, dense, reused integers, so a plain
//! array gives O(1) access with no per-connection allocation. The table
//! only ever grows; it is never shrunk for the lifetime of the process.

use std::os::fd::RawFd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use log::debug;

/// Growable table of transfer cursors, indexed by raw descriptor number.
pub struct OffsetTable {
    slots: RwLock<Vec<AtomicU64>>,
}

impl OffsetTable {
    /// Create a table with `capacity` zeroed slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: RwLock::new((0..capacity).map(|_| AtomicU64::new(0)).collect()),
        }
    }

    /// Current number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Guarantee that `fd` indexes a valid slot, growing if needed.
    ///
    /// The common case (table already big enough) takes only the shared
    /// lock. Growth takes the exclusive lock and re-checks the bound:
    /// another worker may have grown the table while this one waited for
    /// the lock. Existing cursors keep their values and indices across
    /// growth.
    pub fn ensure_capacity(&self, fd: RawFd) {
        let want = usize::try_from(fd).expect("negative descriptor number");
        if want < self.slots.read().unwrap().len() {
            return;
        }
        let mut slots = self.slots.write().unwrap();
        if want < slots.len() {
            return;
        }
        let mut size = slots.len().max(1);
        while size <= want {
            size *= 2;
        }
        debug!("Growing offset table to {size} slots");
        slots.resize_with(size, AtomicU64::default);
    }

    /// Handle to the cursor for descriptor `fd`.
    ///
    /// Call [`OffsetTable::ensure_capacity`] for `fd` first; accessing a
    /// slot past the end panics.
    #[must_use]
    pub fn slot(&self, fd: RawFd) -> Slot<'_> {
        Slot {
            table: self,
            index: usize::try_from(fd).expect("negative descriptor number"),
        }
    }
}

/// One cursor in the table: bytes already sent on the connection currently
/// occupying this descriptor number.
///
/// Each access takes the shared lock briefly, so a slot holder never
/// blocks table growth for the duration of a transfer. The slot's worker
/// is the only writer while its descriptor is open, hence relaxed atomics.
pub struct Slot<'a> {
    table: &'a OffsetTable,
    index: usize,
}

impl Slot<'_> {
    #[must_use]
    pub fn get(&self) -> u64 {
        self.table.slots.read().unwrap()[self.index].load(Ordering::Relaxed)
    }

    pub fn set(&self, cursor: u64) {
        self.table.slots.read().unwrap()[self.index].store(cursor, Ordering::Relaxed);
    }

    /// Zero the cursor so the descriptor number is safe to reuse.
    ///
    /// Descriptor numbers come back from the kernel as soon as they are
    /// closed; a stale cursor would make the next occupant start
    /// mid-payload.
    pub fn reset(&self) {
        self.set(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_strictly_past_requested_fd() {
        let t = OffsetTable::new(4);
        t.ensure_capacity(4);
        assert!(t.len() > 4);
        t.ensure_capacity(100);
        assert!(t.len() > 100);
    }

    #[test]
    fn fast_path_does_not_grow() {
        let t = OffsetTable::new(8);
        t.ensure_capacity(3);
        t.ensure_capacity(7);
        assert_eq!(t.len(), 8);
    }

    #[test]
    fn growth_preserves_cursors() {
        let t = OffsetTable::new(4);
        t.slot(1).set(111);
        t.slot(3).set(333);
        t.ensure_capacity(64);
        assert_eq!(t.slot(1).get(), 111);
        assert_eq!(t.slot(3).get(), 333);
        assert_eq!(t.slot(64).get(), 0);
    }

    #[test]
    fn reset_zeroes_for_descriptor_reuse() {
        let t = OffsetTable::new(4);
        let slot = t.slot(2);
        slot.set(9999);
        slot.reset();
        assert_eq!(t.slot(2).get(), 0);
    }

    #[test]
    fn concurrent_growth_loses_nothing() {
        let t = OffsetTable::new(2);
        t.slot(0).set(42);
        t.slot(1).set(43);
        std::thread::scope(|s| {
            for i in 0..16 {
                let t = &t;
                s.spawn(move || {
                    let fd: RawFd = 2 + i * 17;
                    t.ensure_capacity(fd);
                    t.slot(fd).set(u64::try_from(fd).unwrap());
                });
            }
        });
        assert!(t.len() > 2 + 15 * 17);
        assert_eq!(t.slot(0).get(), 42);
        assert_eq!(t.slot(1).get(), 43);
        for i in 0..16 {
            let fd: RawFd = 2 + i * 17;
            assert_eq!(t.slot(fd).get(), u64::try_from(fd).unwrap());
        }
    }
}
