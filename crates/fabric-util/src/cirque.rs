//! Bounded circular queue of completion records.
//!
//! ```text
//! [slot 0][slot 1] ... [slot N-1]      N = power of two
//!     ^ rcnt & mask        ^ wcnt & mask
//! ```
//!
//! `rcnt` (read count) and `wcnt` (write count) increase monotonically;
//! the slot index is `count & mask`. The queue is empty when they are
//! equal and full when they differ by `size`.
//!
//! No synchronization of its own: the owning queue serializes access
//! under its completion lock. Writing into a full queue is a producer
//! bug; the engine checks `is_full()` first and this type only asserts.

use fabric_core::error::{FabricError, FabricResult};

pub struct Cirque<T> {
    slots: Vec<T>,
    mask: u64,
    rcnt: u64,
    wcnt: u64,
}

impl<T: Copy + Default> Cirque<T> {
    /// Allocate a queue holding at least `capacity` entries.
    ///
    /// The size is rounded up to a power of two. Allocation failure is
    /// reported, not aborted on.
    pub fn create(capacity: usize) -> FabricResult<Self> {
        let size = capacity
            .max(1)
            .checked_next_power_of_two()
            .ok_or(FabricError::NoMemory)?;
        let mut slots = Vec::new();
        slots.try_reserve_exact(size).map_err(|_| FabricError::NoMemory)?;
        slots.resize(size, T::default());
        Ok(Self {
            slots,
            mask: size as u64 - 1,
            rcnt: 0,
            wcnt: 0,
        })
    }
}

impl<T> Cirque<T> {
    /// Number of slots.
    #[inline]
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn used_count(&self) -> usize {
        (self.wcnt - self.rcnt) as usize
    }

    #[inline]
    pub fn free_count(&self) -> usize {
        self.size() - self.used_count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.wcnt == self.rcnt
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.used_count() == self.size()
    }

    /// Slot index of the oldest entry.
    #[inline]
    pub fn rindex(&self) -> usize {
        (self.rcnt & self.mask) as usize
    }

    /// Slot index the next commit will publish.
    #[inline]
    pub fn windex(&self) -> usize {
        (self.wcnt & self.mask) as usize
    }

    /// Oldest entry. Only meaningful when not empty.
    #[inline]
    pub fn head(&self) -> &T {
        debug_assert!(!self.is_empty(), "head() on empty cirque");
        &self.slots[self.rindex()]
    }

    /// Slot the next `commit()` publishes. Only meaningful when not full.
    #[inline]
    pub fn tail_mut(&mut self) -> &mut T {
        debug_assert!(!self.is_full(), "tail_mut() on full cirque");
        let idx = self.windex();
        &mut self.slots[idx]
    }

    /// Publish the tail slot.
    #[inline]
    pub fn commit(&mut self) {
        debug_assert!(!self.is_full(), "commit() on full cirque");
        self.wcnt += 1;
    }

    /// Drop the head slot.
    #[inline]
    pub fn discard(&mut self) {
        debug_assert!(!self.is_empty(), "discard() on empty cirque");
        self.rcnt += 1;
    }

    /// Write `value` into the tail and commit it.
    #[inline]
    pub fn push(&mut self, value: T) {
        *self.tail_mut() = value;
        self.commit();
    }

    /// Release the slot storage. The queue reads as empty afterwards.
    pub fn free(&mut self) {
        self.slots = Vec::new();
        self.mask = 0;
        self.rcnt = 0;
        self.wcnt = 0;
    }
}
