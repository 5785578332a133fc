use {
    crate::{AsymmetricLayer, SymmetricLayer, Target, key, site, targets},
    std::{
        sync::{
            Barrier,
            atomic::{AtomicUsize, Ordering::Relaxed},
        },
        thread,
        time::Duration,
    },
};

#[test]
fn accessors() {
    let sym = SymmetricLayer::with_capacity("sym", 64);
    assert_eq!(sym.name(), "sym");
    assert_eq!(sym.capacity(), 64);
    let asym = AsymmetricLayer::with_capacity("asym", 128, 4);
    assert_eq!(asym.name(), "asym");
    assert_eq!(asym.capacity(), 128);
    assert_eq!(asym.parallelism(), 4);
}

#[test]
fn layer_ids_are_distinct() {
    let a = SymmetricLayer::new("ids-a");
    let b = AsymmetricLayer::new("ids-b");
    assert_ne!(a.core.id, b.core.id);
}

#[test]
fn targets_collapse_within_a_cache_line() {
    #[repr(align(64))]
    struct Line([u8; 64]);

    let line = Line([0; 64]);
    let first = Target::of(&line.0[0]);
    let last = Target::of(&line.0[63]);
    assert_ne!(first, last);
    assert_eq!(Target::from(&line.0[0]), first);
    assert_eq!(key::simple(first.addr()), key::simple(last.addr()));
}

#[test]
fn synchronize_excludes_other_threads() {
    let layer = SymmetricLayer::new("exclusive");
    let data = AtomicUsize::new(0);
    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..1000 {
                    let _guard = layer.synchronize(&data);
                    let value = data.load(Relaxed);
                    data.store(value + 1, Relaxed);
                }
            });
        }
    });
    assert_eq!(data.load(Relaxed), 4000);
}

#[test]
fn write_lock_excludes_readers() {
    let layer = AsymmetricLayer::new("exclusion");
    let data = AtomicUsize::new(0);
    let barrier = Barrier::new(2);
    thread::scope(|s| {
        s.spawn(|| {
            let _write = layer.write_lock(&data);
            barrier.wait();
            thread::sleep(Duration::from_millis(50));
            data.store(1, Relaxed);
        });
        barrier.wait();
        // The writer holds every slot this thread's read bias can map to,
        // so this acquisition cannot succeed before the store.
        let _read = layer.read_lock(&data);
        assert_eq!(data.load(Relaxed), 1);
    });
}

#[test]
fn concurrent_writers_serialize() {
    let layer = AsymmetricLayer::new("writers");
    let data = AtomicUsize::new(0);
    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..1000 {
                    let _write = layer.write_lock(&data);
                    let value = data.load(Relaxed);
                    data.store(value + 1, Relaxed);
                }
            });
        }
    });
    assert_eq!(data.load(Relaxed), 4000);
}

#[test]
fn opposite_order_batches_complete() {
    let layer = SymmetricLayer::new("batch-order");
    let a = 0u32;
    let b = 0u32;
    let c = 0u32;
    thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..1000 {
                let _guard = layer.synchronize_all(&targets![&a, &b, &c]);
            }
        });
        s.spawn(|| {
            for _ in 0..1000 {
                let _guard = layer.synchronize_all(&targets![&c, &b, &a]);
            }
        });
    });
}

#[test]
fn mixed_read_write_stress() {
    const ITERATIONS: usize = 20_000;
    const WRITE_EVERY: usize = 512;

    let layer = AsymmetricLayer::new("stress");
    let committed = AtomicUsize::new(0);
    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let mut seen = 0;
                for i in 0..ITERATIONS {
                    if i % WRITE_EVERY == 0 {
                        let _write = layer.write_lock(&committed);
                        let value = committed.load(Relaxed);
                        committed.store(value + 1, Relaxed);
                    } else {
                        let _read = layer.read_lock(&committed);
                        let value = committed.load(Relaxed);
                        assert!(value >= seen);
                        seen = value;
                    }
                }
            });
        }
    });
    assert_eq!(committed.load(Relaxed), 4 * ITERATIONS.div_ceil(WRITE_EVERY));
}

#[test]
fn capacity_one_still_completes() {
    let layer = SymmetricLayer::with_capacity("tiny", 1);
    let a = 0u32;
    let b = 0u32;
    let guard = layer.synchronize_all(&targets![&a, &b]);
    assert_eq!(guard.slots(), &[0]);
    drop(guard);
    let _single = layer.synchronize(&a);
}

#[test]
fn capacity_one_asymmetric_write_still_completes() {
    let layer = AsymmetricLayer::with_capacity("tiny-rw", 1, 8);
    let data = 0u32;
    let write = layer.write_lock(&data);
    assert_eq!(write.slots(), &[0]);
}

#[test]
fn parallelism_one_behaves_symmetrically() {
    let layer = AsymmetricLayer::with_capacity("flat", 64, 1);
    let data = 0u32;
    let write = layer.write_lock(&data);
    assert_eq!(write.slots().len(), 1);
    let read_slot = layer
        .core
        .pool
        .slot_of(key::biased(Target::of(&data).addr(), 1));
    assert_eq!(write.slots(), &[read_slot]);
}

#[test]
fn try_write_lock_succeeds_when_uncontended() {
    let layer = AsymmetricLayer::new("try-write");
    let data = 0u32;
    let guard = layer.try_write_lock(&data);
    assert!(guard.is_some());
    drop(guard);
    let a = 0u32;
    assert!(layer.try_write_lock_all(&targets![&data, &a]).is_some());
}

#[test]
fn try_synchronize_all_succeeds_when_uncontended() {
    let layer = SymmetricLayer::new("try-batch");
    let a = 0u32;
    let b = 0u32;
    assert!(layer.try_synchronize_all(&targets![&a, &b]).is_some());
}

#[test]
fn tagged_try_variants_succeed_when_uncontended() {
    let layer = SymmetricLayer::new("try-tagged");
    let data = 0u32;
    assert!(layer.try_synchronize_at(&data, site!()).is_some());
    assert!(
        layer
            .try_synchronize_all_at(&targets![&data], site!())
            .is_some()
    );
    let biased = AsymmetricLayer::new("try-tagged-rw");
    assert!(biased.try_read_lock_at(&data, site!()).is_some());
    assert!(biased.try_write_lock_at(&data, site!()).is_some());
    assert!(
        biased
            .try_write_lock_all_at(&targets![&data], site!())
            .is_some()
    );
}

#[test]
#[should_panic(expected = "power of two")]
fn non_power_of_two_capacity_is_refused() {
    let _ = SymmetricLayer::with_capacity("bad-capacity", 12);
}

#[test]
#[should_panic(expected = "power of two")]
fn non_power_of_two_parallelism_is_refused() {
    let _ = AsymmetricLayer::with_capacity("bad-parallelism", 64, 3);
}
