use parking_lot::{RawMutex, lock_api::RawMutex as RawMutexTrait};

#[cfg(test)]
mod tests;

/// Default number of slots in a layer's pool.
pub const NUM_LOCKS: usize = 256;

/// A fixed array of primitive mutexes indexed by derived key.
///
/// Slots are anonymous; only their index identity matters. Keys are collapsed
/// onto slots by masking with `capacity - 1`, so the capacity must be a power
/// of two. The pool performs no allocation after construction.
pub(crate) struct LockPool {
    slots: Box<[RawMutex]>,
    mask: usize,
}

impl LockPool {
    /// Creates a pool with `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a power of two.
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "pool capacity must be a power of two, got {capacity}",
        );
        Self {
            slots: (0..capacity).map(|_| RawMutex::INIT).collect(),
            mask: capacity - 1,
        }
    }

    /// Collapses a derived key onto a slot index.
    #[inline]
    pub(crate) fn slot_of(&self, key: usize) -> usize {
        key & self.mask
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Acquires the mutex at `slot`, blocking until it is available.
    #[inline]
    pub(crate) fn lock(&self, slot: usize) {
        self.slots[slot & self.mask].lock();
    }

    /// Acquires the mutex at `slot` if it is not currently held.
    #[inline]
    pub(crate) fn try_lock(&self, slot: usize) -> bool {
        self.slots[slot & self.mask].try_lock()
    }

    /// Releases the mutex at `slot`.
    ///
    /// # Safety
    ///
    /// The mutex at `slot` must be held by the current thread, acquired
    /// through [`lock`](Self::lock) or [`try_lock`](Self::try_lock) on this
    /// pool.
    #[inline]
    pub(crate) unsafe fn unlock(&self, slot: usize) {
        // SAFETY: Forwarded to the caller.
        unsafe {
            self.slots[slot & self.mask].unlock();
        }
    }

    /// Returns whether the mutex at `slot` is held by any thread.
    #[cfg(test)]
    pub(crate) fn is_locked(&self, slot: usize) -> bool {
        self.slots[slot & self.mask].is_locked()
    }
}
