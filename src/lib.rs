//! This crate provides address-keyed lock layers for objects that do not
//! carry a mutex of their own.
//!
//! # Motivation
//!
//! The following pattern is common in languages such as C and C++:
//!
//! ```c
//! struct Entry {
//!     int data;
//! };
//!
//! void touch(struct Entry *entry) {
//!     mutex_t *mutex = &lock_pool[hash(entry) % POOL_SIZE];
//!     mutex_lock(mutex);
//!     entry->data++;
//!     mutex_unlock(mutex);
//! }
//! ```
//!
//! Here, no `Entry` carries a mutex. Exclusion is keyed by the object's
//! address: two callers touching the same object hash to the same pool slot
//! and serialize, while callers touching different objects usually proceed in
//! parallel. The objects stay small, and a program can protect millions of
//! them with a fixed pool of mutexes.
//!
//! This crate provides that scheme behind scoped guards. A [`SymmetricLayer`]
//! offers one acquisition mode; an [`AsymmetricLayer`] splits it into a cheap
//! [`read_lock`](AsymmetricLayer::read_lock) biased by the calling thread and
//! a [`write_lock`](AsymmetricLayer::write_lock) that excludes every reader,
//! trading extra writer work for near-independent reader fast paths.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
//! use layered_lock::{SymmetricLayer, targets};
//!
//! let accounts = SymmetricLayer::new("accounts");
//! let checking = AtomicU64::new(100);
//! let savings = AtomicU64::new(0);
//!
//! // Exclusive access to one object:
//! {
//!     let _guard = accounts.synchronize(&checking);
//!     checking.store(90, Relaxed);
//! }
//!
//! // Deadlock-free access to several objects at once:
//! let _guard = accounts.synchronize_all(&targets![&checking, &savings]);
//! checking.store(checking.load(Relaxed) - 10, Relaxed);
//! savings.store(savings.load(Relaxed) + 10, Relaxed);
//! ```
//!
//! Guards release on every scope exit, including early returns and panics.
//! Multi-target acquisition sorts the derived pool slots and acquires them in
//! ascending order, so two threads locking overlapping target sets on the
//! same layer cannot deadlock each other.
//!
//! # Layer hierarchies
//!
//! Within one layer, nothing orders sequential single acquisitions of
//! different objects; holding one guard while acquiring another on the same
//! layer can deadlock and is refused by the detector. The supported pattern
//! is one layer per level of a locking hierarchy, acquired in a fixed order.
//! With the `deadlock-detection` feature, every thread's acquisitions are
//! traced and the order between each pair of layers is recorded
//! process-wide; a recursion, an order inversion, or a trace imbalance is
//! reported with a dump of the offending thread's trace. Without the
//! feature, the detector path compiles to nothing.

pub use {
    detect::{MAX_DEPTH, MAX_LAYERS, Violation},
    guard::{BatchGuard, Guard},
    layer::{AsymmetricLayer, READ_SIDE_PARALLELISM, SymmetricLayer, Target},
    pool::NUM_LOCKS,
};

mod detect;
mod guard;
mod key;
mod layer;
mod pool;
mod thread_token;

/// Builds the target list of a batch acquisition.
///
/// Each argument must be a reference; the macro captures its address as a
/// [`Target`]. This is how targets of different types go into one batch.
///
/// # Example
///
/// ```
/// use layered_lock::{SymmetricLayer, targets};
///
/// let layer = SymmetricLayer::new("demo");
/// let count = 1u32;
/// let label = String::from("demo");
/// let _guard = layer.synchronize_all(&targets![&count, &label]);
/// ```
#[macro_export]
macro_rules! targets {
    ($($target:expr),+ $(,)?) => {
        [$($crate::Target::of($target)),+]
    };
}

/// Expands to a `file:line` site tag for the `*_at` acquisition operations.
///
/// The tag appears in detector trace dumps. Without the `deadlock-detection`
/// feature it is accepted and ignored.
///
/// # Example
///
/// ```
/// use layered_lock::{SymmetricLayer, site};
///
/// let layer = SymmetricLayer::new("demo");
/// let value = 1u32;
/// let _guard = layer.synchronize_at(&value, site!());
/// ```
#[macro_export]
macro_rules! site {
    () => {
        concat!(file!(), ":", line!())
    };
}
