//! `TypedBucketAllocator` - an object allocator over a [`BucketList`] with a free list.

use super::list::BucketList;
use crate::alloc::{AllocError, Allocator};
use crate::collections::ArrayList;
use core::fmt;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

/// Hands out stable slots for values of `T` and recycles freed ones.
///
/// Freed slots go onto an unordered free list and are reused before the
/// bucket list grows. Nothing is ever compacted.
///
/// [`for_each`](Self::for_each) has to skip freed slots. It sorts the free
/// list and binary-searches it for every slot, so a full traversal costs
/// `O(f log f + n)` for `f` free and `n` total slots. Keep it out of hot
/// loops.
pub struct TypedBucketAllocator<'a, T> {
    slots: BucketList<'a, MaybeUninit<T>>,
    free: ArrayList<'a, NonNull<T>>,
}

impl<'a, T> TypedBucketAllocator<'a, T> {
    /// Creates an empty allocator. See [`BucketList::new_in`].
    ///
    /// # Errors
    /// Fails if the directory cannot be allocated.
    pub fn new_in(
        allocator: &'a dyn Allocator,
        bucket_capacity: usize,
        initial_buckets: usize,
    ) -> Result<Self, AllocError> {
        Ok(Self {
            slots: BucketList::new_in(allocator, bucket_capacity, initial_buckets)?,
            free: ArrayList::new_in(allocator),
        })
    }

    /// Stores `value` in a free slot, or a new one, and returns its address.
    ///
    /// # Errors
    /// Fails if the bucket list cannot grow; `value` is dropped.
    pub fn allocate(&mut self, value: T) -> Result<NonNull<T>, AllocError> {
        if let Some(slot) = self.free.pop() {
            // SAFETY: free slots are uninitialized storage owned by `self.slots`.
            unsafe { slot.as_ptr().write(value) };
            return Ok(slot);
        }
        self.slots.push(MaybeUninit::new(value)).map(NonNull::cast)
    }

    /// Moves the value out of `ptr` and puts the slot on the free list.
    ///
    /// # Errors
    /// Fails if the free list cannot grow. The slot is then left untouched.
    ///
    /// # Safety
    /// `ptr` must have come from [`allocate`](Self::allocate) on this
    /// allocator and must not have been deallocated since.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<T>) -> Result<T, AllocError> {
        self.free.reserve(1)?;
        let value = ptr.as_ptr().read();
        self.free.push(ptr)?;
        Ok(value)
    }

    /// Number of live values.
    pub fn count_elements(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Number of slots waiting on the free list.
    pub fn free_slots(&self) -> usize {
        self.free.len()
    }

    /// Calls `f` on every live value, in slot order.
    pub fn for_each(&mut self, mut f: impl FnMut(&mut T)) {
        self.free.sort_unstable();
        for index in 0..self.slots.len() {
            let slot = self.slots.slot(index).cast::<T>();
            if self.free.binary_search(&slot).is_err() {
                // SAFETY: slots not on the free list hold a live value.
                f(unsafe { &mut *slot.as_ptr() });
            }
        }
    }

    /// Drops every live value and forgets all slots. Buckets are kept.
    pub fn clear(&mut self) {
        if core::mem::needs_drop::<T>() {
            // SAFETY: `for_each` only visits live values, and the slots are
            // forgotten right after.
            self.for_each(|value| unsafe { core::ptr::drop_in_place(value) });
        }
        self.free.clear();
        self.slots.clear();
    }
}

impl<T> Drop for TypedBucketAllocator<'_, T> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T> fmt::Debug for TypedBucketAllocator<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedBucketAllocator")
            .field("live", &self.count_elements())
            .field("free", &self.free.len())
            .field("buckets", &self.slots.materialized_buckets())
            .finish()
    }
}
