use crate::pool::LockPool;

#[test]
fn lock_unlock_roundtrip() {
    let pool = LockPool::new(8);
    pool.lock(3);
    assert!(pool.is_locked(3));
    assert!(!pool.try_lock(3));
    unsafe {
        pool.unlock(3);
    }
    assert!(!pool.is_locked(3));
    assert!(pool.try_lock(3));
    unsafe {
        pool.unlock(3);
    }
}

#[test]
fn indices_wrap_around_the_mask() {
    let pool = LockPool::new(8);
    pool.lock(3 + 8);
    assert!(pool.is_locked(3));
    unsafe {
        pool.unlock(3 + 16);
    }
    assert!(!pool.is_locked(3));
}

#[test]
fn slot_of_masks() {
    let pool = LockPool::new(256);
    assert_eq!(pool.capacity(), 256);
    assert_eq!(pool.slot_of(0x1ff), 0xff);
    assert_eq!(pool.slot_of(0xff), 0xff);
    assert_eq!(pool.slot_of(0x100), 0);
}

#[test]
fn distinct_slots_are_independent() {
    let pool = LockPool::new(2);
    pool.lock(0);
    assert!(pool.try_lock(1));
    unsafe {
        pool.unlock(1);
        pool.unlock(0);
    }
}

#[test]
#[should_panic(expected = "power of two")]
fn zero_capacity_is_refused() {
    let _ = LockPool::new(0);
}

#[test]
#[should_panic(expected = "power of two")]
fn non_power_of_two_capacity_is_refused() {
    let _ = LockPool::new(48);
}
