#![cfg(feature = "bookkeeping")]

use allocstack::alloc::{BookkeepingAllocator, GrowablePoolAllocator, PoolAllocator, LIBC_ALLOCATOR};

#[test]
fn test_pool_capacity_plus_one_fails_then_reuses() {
    let mut pool = PoolAllocator::<[u64; 2]>::new_in(&LIBC_ALLOCATOR, 16).unwrap();
    let slots: Vec<_> = (0..16).map(|_| pool.allocate().unwrap()).collect();
    assert!(pool.allocate().is_none());

    unsafe { pool.deallocate(slots[5]) };
    assert_eq!(pool.allocate(), Some(slots[5]));
    assert_eq!(pool.count_allocated_elements(), 16);
}

#[test]
fn test_pool_backing_storage_released() {
    let bookkeeping = BookkeepingAllocator::new(&LIBC_ALLOCATOR);
    {
        let mut pool = PoolAllocator::<u32>::new_in(&bookkeeping, 8).unwrap();
        pool.allocate().unwrap();
    }
    let stats = bookkeeping.stats();
    assert_eq!(stats.allocate_zeroed_calls, 1);
    assert_eq!(stats.outstanding(), 0);
}

#[test]
fn test_growable_pool_two_and_a_half_chunks() {
    let bookkeeping = BookkeepingAllocator::new(&LIBC_ALLOCATOR);
    {
        let mut pool = GrowablePoolAllocator::<u64>::new_in(&bookkeeping, 10).unwrap();
        let slots: Vec<_> = (0..25).map(|_| pool.allocate().unwrap()).collect();
        assert_eq!(pool.chunk_count(), 3);
        assert_eq!(pool.count_allocated_elements(), 25);
        for slot in &slots[..5] {
            unsafe { pool.deallocate(*slot) };
        }
        assert_eq!(pool.count_allocated_elements(), 20);
        pool.reset();
        assert_eq!(pool.count_allocated_elements(), 0);
        assert_eq!(bookkeeping.stats().allocate_calls, 3);
    }
    assert_eq!(bookkeeping.stats().outstanding(), 0);
}
