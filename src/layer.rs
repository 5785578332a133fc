use {
    crate::{
        detect,
        guard::{BatchGuard, Guard, KeyBuf},
        key,
        pool::{LockPool, NUM_LOCKS},
    },
    static_assertions::assert_impl_all,
    std::{
        fmt::{Debug, Formatter},
        sync::atomic::{AtomicUsize, Ordering::Relaxed},
    },
};

#[cfg(test)]
mod tests;

/// Default read-side parallelism of an asymmetric layer.
pub const READ_SIDE_PARALLELISM: usize = 8;

/// Process-wide source of layer identities.
static LAYERS_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// State shared by both layer flavours. Guards borrow this, which pins the
/// pool in place for as long as any guard is held.
pub(crate) struct LayerCore {
    pub(crate) name: &'static str,
    pub(crate) id: usize,
    pub(crate) pool: LockPool,
    parallelism: usize,
}

impl LayerCore {
    fn new(name: &'static str, capacity: usize, parallelism: usize) -> Self {
        assert!(
            parallelism.is_power_of_two(),
            "read-side parallelism must be a power of two, got {parallelism}",
        );
        let pool = LockPool::new(capacity);
        let id = LAYERS_COUNTER.fetch_add(1, Relaxed);
        detect::check_layer_id(id);
        Self {
            name,
            id,
            pool,
            parallelism,
        }
    }
}

/// The address of an object targeted by a batch acquisition.
///
/// Built with [`Target::of`] or the [`targets!`](crate::targets) macro. Two
/// targets taken from the same cache line derive the same key on every layer,
/// so they are interchangeable for locking purposes even when their addresses
/// differ.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Target(usize);

impl Target {
    /// Captures the address of `target`.
    #[inline]
    pub fn of<T: ?Sized>(target: &T) -> Self {
        Target(target as *const T as *const () as usize)
    }

    #[inline]
    pub(crate) fn addr(self) -> usize {
        self.0
    }
}

impl<T: ?Sized> From<&T> for Target {
    #[inline]
    fn from(target: &T) -> Self {
        Target::of(target)
    }
}

/// A named layer of address-keyed mutexes with a single acquisition mode.
///
/// Acquiring a guard for an object on this layer excludes every other caller
/// presenting the same object on the same layer, without the object carrying
/// a mutex of its own. Distinct objects may occasionally share a slot; that
/// costs throughput, never correctness.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
/// use layered_lock::SymmetricLayer;
///
/// let accounts = SymmetricLayer::new("accounts");
/// let balance = AtomicU64::new(100);
///
/// let _guard = accounts.synchronize(&balance);
/// balance.store(90, Relaxed);
/// ```
pub struct SymmetricLayer {
    pub(crate) core: LayerCore,
}

assert_impl_all!(SymmetricLayer: Send, Sync);

impl SymmetricLayer {
    /// Creates a layer with the default pool capacity of [`NUM_LOCKS`] slots.
    ///
    /// `name` is used in diagnostics only.
    pub fn new(name: &'static str) -> Self {
        Self::with_capacity(name, NUM_LOCKS)
    }

    /// Creates a layer with `capacity` pool slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a power of two.
    pub fn with_capacity(name: &'static str, capacity: usize) -> Self {
        Self {
            core: LayerCore::new(name, capacity, 1),
        }
    }

    /// The diagnostic name of this layer.
    pub fn name(&self) -> &'static str {
        self.core.name
    }

    /// The number of pool slots.
    pub fn capacity(&self) -> usize {
        self.core.pool.capacity()
    }

    /// Acquires the slot of `target`, blocking while another guard holds it.
    ///
    /// # Example
    ///
    /// ```
    /// use layered_lock::SymmetricLayer;
    ///
    /// let layer = SymmetricLayer::new("state");
    /// let value = 1u32;
    /// let _guard = layer.synchronize(&value);
    /// ```
    #[inline]
    pub fn synchronize<T: ?Sized>(&self, target: &T) -> Guard<'_> {
        Guard::acquire(&self.core, key::simple(Target::of(target).addr()), None)
    }

    /// Like [`synchronize`](Self::synchronize), recording `site` in detector
    /// trace dumps.
    #[inline]
    pub fn synchronize_at<T: ?Sized>(&self, target: &T, site: &'static str) -> Guard<'_> {
        Guard::acquire(
            &self.core,
            key::simple(Target::of(target).addr()),
            Some(site),
        )
    }

    /// Acquires the slot of `target` without blocking, returning `None` if
    /// it is held.
    #[inline]
    pub fn try_synchronize<T: ?Sized>(&self, target: &T) -> Option<Guard<'_>> {
        Guard::try_acquire(&self.core, key::simple(Target::of(target).addr()), None)
    }

    /// Like [`try_synchronize`](Self::try_synchronize), recording `site` in
    /// detector trace dumps.
    #[inline]
    pub fn try_synchronize_at<T: ?Sized>(
        &self,
        target: &T,
        site: &'static str,
    ) -> Option<Guard<'_>> {
        Guard::try_acquire(
            &self.core,
            key::simple(Target::of(target).addr()),
            Some(site),
        )
    }

    /// Acquires the slots of all of `targets` as one step.
    ///
    /// The derived slots are sorted and deduplicated before acquisition, so
    /// concurrent overlapping calls on this layer cannot deadlock each other
    /// and duplicate or colliding targets are held once.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
    /// use layered_lock::{SymmetricLayer, targets};
    ///
    /// let accounts = SymmetricLayer::new("accounts");
    /// let checking = AtomicU64::new(100);
    /// let savings = AtomicU64::new(0);
    ///
    /// let _guard = accounts.synchronize_all(&targets![&checking, &savings]);
    /// checking.store(checking.load(Relaxed) - 10, Relaxed);
    /// savings.store(savings.load(Relaxed) + 10, Relaxed);
    /// ```
    pub fn synchronize_all(&self, targets: &[Target]) -> BatchGuard<'_> {
        BatchGuard::acquire(&self.core, self.batch_keys(targets), None)
    }

    /// Like [`synchronize_all`](Self::synchronize_all), recording `site` in
    /// detector trace dumps.
    pub fn synchronize_all_at(&self, targets: &[Target], site: &'static str) -> BatchGuard<'_> {
        BatchGuard::acquire(&self.core, self.batch_keys(targets), Some(site))
    }

    /// Acquires the slots of all of `targets` without blocking, returning
    /// `None` and holding nothing if any of them is held.
    pub fn try_synchronize_all(&self, targets: &[Target]) -> Option<BatchGuard<'_>> {
        BatchGuard::try_acquire(&self.core, self.batch_keys(targets), None)
    }

    /// Like [`try_synchronize_all`](Self::try_synchronize_all), recording
    /// `site` in detector trace dumps.
    pub fn try_synchronize_all_at(
        &self,
        targets: &[Target],
        site: &'static str,
    ) -> Option<BatchGuard<'_>> {
        BatchGuard::try_acquire(&self.core, self.batch_keys(targets), Some(site))
    }

    fn batch_keys(&self, targets: &[Target]) -> KeyBuf {
        targets
            .iter()
            .map(|target| key::simple2(target.addr(), 0))
            .collect()
    }
}

impl Debug for SymmetricLayer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricLayer")
            .field("name", &self.core.name)
            .field("id", &self.core.id)
            .field("capacity", &self.core.pool.capacity())
            .finish_non_exhaustive()
    }
}

/// A named layer of address-keyed mutexes with separate read and write modes.
///
/// Every object occupies `parallelism` slots on this layer. A read
/// acquisition takes the one slot selected by the current thread's bias, so
/// readers on different threads usually proceed in parallel even for the same
/// object. A write acquisition takes all `parallelism` slots of the object
/// and therefore excludes every reader and writer of it on any thread.
///
/// Readers pay one mutex acquisition; writers pay `parallelism` of them.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
/// use layered_lock::AsymmetricLayer;
///
/// let index = AsymmetricLayer::new("index");
/// let entries = AtomicU64::new(0);
///
/// {
///     let _read = index.read_lock(&entries);
///     let _ = entries.load(Relaxed);
/// }
/// let _write = index.write_lock(&entries);
/// entries.store(1, Relaxed);
/// ```
pub struct AsymmetricLayer {
    pub(crate) core: LayerCore,
}

assert_impl_all!(AsymmetricLayer: Send, Sync);

impl AsymmetricLayer {
    /// Creates a layer with [`NUM_LOCKS`] pool slots and a read-side
    /// parallelism of [`READ_SIDE_PARALLELISM`].
    ///
    /// `name` is used in diagnostics only.
    pub fn new(name: &'static str) -> Self {
        Self::with_capacity(name, NUM_LOCKS, READ_SIDE_PARALLELISM)
    }

    /// Creates a layer with `capacity` pool slots and the given read-side
    /// `parallelism`.
    ///
    /// A `parallelism` of 1 makes the layer behave like a
    /// [`SymmetricLayer`].
    ///
    /// # Panics
    ///
    /// Panics if `capacity` or `parallelism` is not a power of two.
    pub fn with_capacity(name: &'static str, capacity: usize, parallelism: usize) -> Self {
        Self {
            core: LayerCore::new(name, capacity, parallelism),
        }
    }

    /// The diagnostic name of this layer.
    pub fn name(&self) -> &'static str {
        self.core.name
    }

    /// The number of pool slots.
    pub fn capacity(&self) -> usize {
        self.core.pool.capacity()
    }

    /// The number of slots each object occupies.
    pub fn parallelism(&self) -> usize {
        self.core.parallelism
    }

    /// Acquires the current thread's read-side slot of `target`.
    ///
    /// Blocks while a writer holds `target`, or while a reader whose thread
    /// shares this thread's bias holds it.
    ///
    /// # Example
    ///
    /// ```
    /// use layered_lock::AsymmetricLayer;
    ///
    /// let layer = AsymmetricLayer::new("cache");
    /// let value = 1u32;
    /// let _read = layer.read_lock(&value);
    /// ```
    #[inline]
    pub fn read_lock<T: ?Sized>(&self, target: &T) -> Guard<'_> {
        Guard::acquire(
            &self.core,
            key::biased(Target::of(target).addr(), self.core.parallelism),
            None,
        )
    }

    /// Like [`read_lock`](Self::read_lock), recording `site` in detector
    /// trace dumps.
    #[inline]
    pub fn read_lock_at<T: ?Sized>(&self, target: &T, site: &'static str) -> Guard<'_> {
        Guard::acquire(
            &self.core,
            key::biased(Target::of(target).addr(), self.core.parallelism),
            Some(site),
        )
    }

    /// Acquires the current thread's read-side slot of `target` without
    /// blocking, returning `None` if it is held.
    #[inline]
    pub fn try_read_lock<T: ?Sized>(&self, target: &T) -> Option<Guard<'_>> {
        Guard::try_acquire(
            &self.core,
            key::biased(Target::of(target).addr(), self.core.parallelism),
            None,
        )
    }

    /// Like [`try_read_lock`](Self::try_read_lock), recording `site` in
    /// detector trace dumps.
    #[inline]
    pub fn try_read_lock_at<T: ?Sized>(
        &self,
        target: &T,
        site: &'static str,
    ) -> Option<Guard<'_>> {
        Guard::try_acquire(
            &self.core,
            key::biased(Target::of(target).addr(), self.core.parallelism),
            Some(site),
        )
    }

    /// Acquires every read-side slot of `target`, excluding its readers and
    /// writers on all threads.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
    /// use layered_lock::AsymmetricLayer;
    ///
    /// let layer = AsymmetricLayer::new("cache");
    /// let value = AtomicU64::new(0);
    /// let _write = layer.write_lock(&value);
    /// value.store(1, Relaxed);
    /// ```
    pub fn write_lock<T: ?Sized>(&self, target: &T) -> BatchGuard<'_> {
        BatchGuard::acquire(&self.core, self.batch_keys(&[Target::of(target)]), None)
    }

    /// Like [`write_lock`](Self::write_lock), recording `site` in detector
    /// trace dumps.
    pub fn write_lock_at<T: ?Sized>(&self, target: &T, site: &'static str) -> BatchGuard<'_> {
        BatchGuard::acquire(
            &self.core,
            self.batch_keys(&[Target::of(target)]),
            Some(site),
        )
    }

    /// Acquires every read-side slot of `target` without blocking, returning
    /// `None` and holding nothing if any of them is held.
    pub fn try_write_lock<T: ?Sized>(&self, target: &T) -> Option<BatchGuard<'_>> {
        BatchGuard::try_acquire(&self.core, self.batch_keys(&[Target::of(target)]), None)
    }

    /// Like [`try_write_lock`](Self::try_write_lock), recording `site` in
    /// detector trace dumps.
    pub fn try_write_lock_at<T: ?Sized>(
        &self,
        target: &T,
        site: &'static str,
    ) -> Option<BatchGuard<'_>> {
        BatchGuard::try_acquire(
            &self.core,
            self.batch_keys(&[Target::of(target)]),
            Some(site),
        )
    }

    /// Acquires every read-side slot of all of `targets` as one step.
    ///
    /// Like [`synchronize_all`](SymmetricLayer::synchronize_all), the derived
    /// slots are sorted and deduplicated, so concurrent overlapping write
    /// batches cannot deadlock each other.
    pub fn write_lock_all(&self, targets: &[Target]) -> BatchGuard<'_> {
        BatchGuard::acquire(&self.core, self.batch_keys(targets), None)
    }

    /// Like [`write_lock_all`](Self::write_lock_all), recording `site` in
    /// detector trace dumps.
    pub fn write_lock_all_at(&self, targets: &[Target], site: &'static str) -> BatchGuard<'_> {
        BatchGuard::acquire(&self.core, self.batch_keys(targets), Some(site))
    }

    /// Acquires every read-side slot of all of `targets` without blocking,
    /// returning `None` and holding nothing if any of them is held.
    pub fn try_write_lock_all(&self, targets: &[Target]) -> Option<BatchGuard<'_>> {
        BatchGuard::try_acquire(&self.core, self.batch_keys(targets), None)
    }

    /// Like [`try_write_lock_all`](Self::try_write_lock_all), recording
    /// `site` in detector trace dumps.
    pub fn try_write_lock_all_at(
        &self,
        targets: &[Target],
        site: &'static str,
    ) -> Option<BatchGuard<'_>> {
        BatchGuard::try_acquire(&self.core, self.batch_keys(targets), Some(site))
    }

    fn batch_keys(&self, targets: &[Target]) -> KeyBuf {
        let parallelism = self.core.parallelism;
        let mut keys = KeyBuf::new();
        for target in targets {
            for bias in 0..parallelism {
                keys.push(key::biased2(target.addr(), bias, parallelism));
            }
        }
        keys
    }
}

impl Debug for AsymmetricLayer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsymmetricLayer")
            .field("name", &self.core.name)
            .field("id", &self.core.id)
            .field("capacity", &self.core.pool.capacity())
            .field("parallelism", &self.core.parallelism)
            .finish_non_exhaustive()
    }
}
