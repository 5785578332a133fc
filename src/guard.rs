use {
    crate::{detect, layer::LayerCore, pool::LockPool},
    smallvec::SmallVec,
    static_assertions::assert_not_impl_any,
    std::{
        fmt::{Debug, Formatter},
        marker::PhantomData,
    },
};


/// Marker making guards `!Send` and `!Sync`.
///
/// A slot mutex must be released by the thread that acquired it, and the
/// detector trace is thread-local.
type NotSendSync = PhantomData<*const ()>;

/// Inline capacity of the batch index buffer; batches with up to this many
/// derived keys do not allocate.
const INLINE_KEYS: usize = 16;

pub(crate) type KeyBuf = SmallVec<[usize; INLINE_KEYS]>;

/// A held single-slot acquisition.
///
/// This object is created by [`SymmetricLayer::synchronize`] and
/// [`AsymmetricLayer::read_lock`] and their variants. The slot it maps to is
/// held from the moment the creating operation returns until the guard is
/// dropped.
///
/// A guard is not copyable. Moving it transfers ownership of the held slot;
/// there is no moved-from state, so the slot is released exactly once.
///
/// # Example
///
/// ```
/// use layered_lock::SymmetricLayer;
///
/// let layer = SymmetricLayer::new("state");
/// let value = 1u32;
/// let guard = layer.synchronize(&value);
/// drop(guard);
/// ```
///
/// [`SymmetricLayer::synchronize`]: crate::SymmetricLayer::synchronize
/// [`AsymmetricLayer::read_lock`]: crate::AsymmetricLayer::read_lock
pub struct Guard<'a> {
    core: &'a LayerCore,
    slot: usize,
    _not_send: NotSendSync,
}

assert_not_impl_any!(Guard<'_>: Send, Sync);

impl<'a> Guard<'a> {
    /// Acquires the slot `key` maps to, blocking until it is available.
    pub(crate) fn acquire(core: &'a LayerCore, key: usize, site: Option<&'static str>) -> Self {
        let slot = core.pool.slot_of(key);
        detect::on_acquire(core, site);
        core.pool.lock(slot);
        Guard {
            core,
            slot,
            _not_send: PhantomData,
        }
    }

    /// Acquires the slot `key` maps to if it is not currently held.
    pub(crate) fn try_acquire(
        core: &'a LayerCore,
        key: usize,
        site: Option<&'static str>,
    ) -> Option<Self> {
        let slot = core.pool.slot_of(key);
        detect::on_acquire(core, site);
        if !core.pool.try_lock(slot) {
            detect::on_release(core);
            return None;
        }
        Some(Guard {
            core,
            slot,
            _not_send: PhantomData,
        })
    }

    #[cfg(test)]
    pub(crate) fn slot(&self) -> usize {
        self.slot
    }
}

impl Drop for Guard<'_> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: - The constructor locked this slot on this thread.
        //         - The guard is neither Copy nor Send, so no other drop can
        //           release the slot and no other thread can reach this one.
        unsafe {
            self.core.pool.unlock(self.slot);
        }
        detect::on_release(self.core);
    }
}

impl Debug for Guard<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("layer", &self.core.name)
            .field("slot", &self.slot)
            .finish()
    }
}

/// A held multi-slot acquisition.
///
/// This object is created by [`SymmetricLayer::synchronize_all`] and
/// [`AsymmetricLayer::write_lock`] and their variants. It owns the slots of
/// every derived key of the operation, acquired in ascending slot order and
/// released in reverse on drop.
///
/// Two batch guards on the same layer can be constructed concurrently with
/// arbitrarily overlapping targets without deadlocking each other: both
/// acquire their slots in the same global order.
///
/// [`SymmetricLayer::synchronize_all`]: crate::SymmetricLayer::synchronize_all
/// [`AsymmetricLayer::write_lock`]: crate::AsymmetricLayer::write_lock
pub struct BatchGuard<'a> {
    core: &'a LayerCore,
    // Sorted ascending, no duplicates.
    slots: KeyBuf,
    _not_send: NotSendSync,
}

assert_not_impl_any!(BatchGuard<'_>: Send, Sync);

impl<'a> BatchGuard<'a> {
    /// Acquires the slots of every key in `keys`, blocking as needed.
    pub(crate) fn acquire(core: &'a LayerCore, keys: KeyBuf, site: Option<&'static str>) -> Self {
        let slots = normalize(&core.pool, keys);
        detect::on_acquire(core, site);
        for &slot in &slots {
            core.pool.lock(slot);
        }
        BatchGuard {
            core,
            slots,
            _not_send: PhantomData,
        }
    }

    /// Acquires the slots of every key in `keys` if all of them are free.
    ///
    /// On failure every slot acquired so far is released again, in reverse
    /// order, before `None` is returned.
    pub(crate) fn try_acquire(
        core: &'a LayerCore,
        keys: KeyBuf,
        site: Option<&'static str>,
    ) -> Option<Self> {
        let slots = normalize(&core.pool, keys);
        detect::on_acquire(core, site);
        for (held, &slot) in slots.iter().enumerate() {
            if !core.pool.try_lock(slot) {
                for &held_slot in slots[..held].iter().rev() {
                    // SAFETY: - Every slot before the failed one was locked
                    //           by the loop above on this thread.
                    unsafe {
                        core.pool.unlock(held_slot);
                    }
                }
                detect::on_release(core);
                return None;
            }
        }
        Some(BatchGuard {
            core,
            slots,
            _not_send: PhantomData,
        })
    }

    #[cfg(test)]
    pub(crate) fn slots(&self) -> &[usize] {
        &self.slots
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        for &slot in self.slots.iter().rev() {
            // SAFETY: - The constructor locked every slot in this buffer on
            //           this thread.
            //         - The guard is neither Copy nor Send, so no other drop
            //           can release them and no other thread can reach them.
            unsafe {
                self.core.pool.unlock(slot);
            }
        }
        detect::on_release(self.core);
    }
}

impl Debug for BatchGuard<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchGuard")
            .field("layer", &self.core.name)
            .field("slots", &&self.slots[..])
            .finish()
    }
}

/// Masks keys onto pool slots, sorts them ascending, and drops duplicates.
///
/// Acquiring in ascending slot order is what makes concurrent overlapping
/// batches on one layer deadlock-free. Deduplication is required for
/// correctness, not hygiene: a slot mutex cannot be re-acquired by the thread
/// that already holds it, and distinct targets may collide on one slot.
pub(crate) fn normalize(pool: &LockPool, keys: KeyBuf) -> KeyBuf {
    let mut slots: KeyBuf = keys.iter().map(|&key| pool.slot_of(key)).collect();
    slots.sort_unstable();
    slots.dedup();
    slots
}
