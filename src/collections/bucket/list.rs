//! `BucketList` - pointer-stable growable storage built from fixed-size buckets.

use crate::alloc::{AllocError, Allocator};
use crate::collections::ArrayList;
use core::fmt;
use core::iter::FusedIterator;
use core::ops::{Index, IndexMut};
use core::ptr::{self, NonNull};

/// A growable sequence whose element addresses never move.
///
/// Elements live in a directory of buckets, each holding `bucket_capacity`
/// values. Appending writes into the active bucket; a bucket is allocated the
/// first time the cursor reaches it and is kept across [`clear`](Self::clear)
/// for reuse. When the directory runs out of slots it doubles, and the new
/// slots start out unmaterialized.
///
/// ```
/// use allocstack::alloc::LIBC_ALLOCATOR;
/// use allocstack::collections::BucketList;
///
/// let mut list = BucketList::new_in(&LIBC_ALLOCATOR, 4, 1).unwrap();
/// let first = list.push(10).unwrap();
/// for i in 0..100 {
///     list.push(i).unwrap();
/// }
/// assert_eq!(list.ptr_at(0), first);
/// assert_eq!(list.len(), 101);
/// ```
pub struct BucketList<'a, T> {
    pub(super) allocator: &'a dyn Allocator,
    pub(super) buckets: ArrayList<'a, Option<NonNull<T>>>,
    pub(super) bucket_capacity: usize,
    pub(super) active_bucket: usize,
    pub(super) next_slot: usize,
}

impl<'a, T> BucketList<'a, T> {
    /// Creates an empty list whose directory starts with `initial_buckets`
    /// (at least one) unmaterialized slots.
    ///
    /// # Errors
    /// Fails if the directory cannot be allocated.
    ///
    /// # Panics
    /// Panics if `bucket_capacity` is zero.
    pub fn new_in(
        allocator: &'a dyn Allocator,
        bucket_capacity: usize,
        initial_buckets: usize,
    ) -> Result<Self, AllocError> {
        assert!(bucket_capacity != 0, "bucket capacity must be > 0");
        let mut buckets = ArrayList::new_in(allocator);
        buckets.resize_with(initial_buckets.max(1), || None)?;
        Ok(Self {
            allocator,
            buckets,
            bucket_capacity,
            active_bucket: 0,
            next_slot: 0,
        })
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.active_bucket * self.bucket_capacity + self.next_slot
    }

    /// Returns `true` if there are no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.active_bucket == 0 && self.next_slot == 0
    }

    /// Elements per bucket.
    #[inline]
    pub const fn bucket_capacity(&self) -> usize {
        self.bucket_capacity
    }

    /// Number of directory slots, materialized or not.
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of directory slots that currently own a bucket.
    pub fn materialized_buckets(&self) -> usize {
        self.buckets.iter().filter(|b| b.is_some()).count()
    }

    /// Appends `value` and returns its stable address.
    ///
    /// # Errors
    /// Fails if a bucket or a larger directory cannot be allocated; `value`
    /// is dropped.
    pub fn push(&mut self, value: T) -> Result<NonNull<T>, AllocError> {
        if self.active_bucket == self.buckets.len() {
            let doubled = self.buckets.len() * 2;
            self.buckets.resize_with(doubled, || None)?;
            tracing::trace!(target: "allocstack::bucket", directory = doubled, "directory grown");
        }
        let bucket = self.materialize(self.active_bucket)?;
        // SAFETY: `next_slot < bucket_capacity` and the slot is unoccupied.
        let slot = unsafe {
            let slot = bucket.as_ptr().add(self.next_slot);
            slot.write(value);
            NonNull::new_unchecked(slot)
        };
        self.next_slot += 1;
        if self.next_slot == self.bucket_capacity {
            self.active_bucket += 1;
            self.next_slot = 0;
        }
        Ok(slot)
    }

    fn materialize(&mut self, index: usize) -> Result<NonNull<T>, AllocError> {
        if let Some(bucket) = self.buckets[index] {
            return Ok(bucket);
        }
        let bucket = self.allocator.allocate_array::<T>(self.bucket_capacity)?;
        self.buckets[index] = Some(bucket);
        Ok(bucket)
    }

    /// Address of element `index`. Stays valid until the element is removed.
    ///
    /// # Panics
    /// Panics if `index >= len`.
    #[track_caller]
    pub fn ptr_at(&self, index: usize) -> NonNull<T> {
        let len = self.len();
        assert!(index < len, "bucket list index {index} out of bounds (len {len})");
        self.slot(index)
    }

    pub(super) fn slot(&self, index: usize) -> NonNull<T> {
        let (bucket, offset) = (index / self.bucket_capacity, index % self.bucket_capacity);
        let Some(bucket) = self.buckets[bucket] else {
            unreachable!("slot {index} lies in an unmaterialized bucket");
        };
        // SAFETY: `offset < bucket_capacity`.
        unsafe { NonNull::new_unchecked(bucket.as_ptr().add(offset)) }
    }

    /// Returns a reference to element `index`, or `None` if out of bounds.
    pub fn get(&self, index: usize) -> Option<&T> {
        // SAFETY: slots below `len` are initialized.
        (index < self.len()).then(|| unsafe { &*self.slot(index).as_ptr() })
    }

    /// Returns a mutable reference to element `index`, or `None` if out of bounds.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        // SAFETY: slots below `len` are initialized and `self` is borrowed mutably.
        (index < self.len()).then(|| unsafe { &mut *self.slot(index).as_ptr() })
    }

    /// Removes element `index` by moving the last element into its place.
    ///
    /// Order is not preserved.
    ///
    /// # Panics
    /// Panics if `index >= len`.
    #[track_caller]
    pub fn remove_index(&mut self, index: usize) -> T {
        let hole = self.ptr_at(index);
        let last = self.slot(self.len() - 1);
        // SAFETY: both slots are initialized; `last` is logically removed
        // below, so its bits are moved rather than duplicated.
        let value = unsafe {
            let value = hole.as_ptr().read();
            if hole != last {
                ptr::copy_nonoverlapping(last.as_ptr(), hole.as_ptr(), 1);
            }
            value
        };
        self.retreat();
        value
    }

    fn retreat(&mut self) {
        if self.next_slot == 0 {
            self.active_bucket -= 1;
            self.next_slot = self.bucket_capacity - 1;
        } else {
            self.next_slot -= 1;
        }
    }

    /// Drops every element and rewinds the cursor. Buckets are kept.
    pub fn clear(&mut self) {
        self.drop_range(0, self.len());
        self.forget_elements();
    }

    pub(super) fn drop_range(&mut self, start: usize, end: usize) {
        if !core::mem::needs_drop::<T>() {
            return;
        }
        for index in start..end {
            // SAFETY: the caller names a range of initialized slots.
            unsafe { ptr::drop_in_place(self.slot(index).as_ptr()) };
        }
    }

    /// Rewinds the cursor without dropping anything.
    pub(super) fn forget_elements(&mut self) {
        self.active_bucket = 0;
        self.next_slot = 0;
    }

    /// Iterates over the elements in index order.
    pub fn iter(&self) -> Iter<'_, 'a, T> {
        Iter {
            list: self,
            index: 0,
            end: self.len(),
        }
    }

    /// Calls `f` on every element in index order.
    pub fn for_each(&self, f: impl FnMut(&T)) {
        self.iter().for_each(f);
    }

    /// Calls `f` on every element in index order, mutably.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut T)) {
        for index in 0..self.len() {
            // SAFETY: initialized slot, exclusive borrow.
            f(unsafe { &mut *self.slot(index).as_ptr() });
        }
    }

    pub(super) fn release_bucket(&mut self, index: usize) {
        if let Some(bucket) = self.buckets[index].take() {
            // SAFETY: buckets come from `self.allocator`.
            unsafe { self.allocator.deallocate_array(bucket) };
        }
    }
}

impl<T> Drop for BucketList<'_, T> {
    fn drop(&mut self) {
        self.clear();
        // Buckets from a larger earlier life-cycle may sit past the cursor.
        for index in 0..self.buckets.len() {
            self.release_bucket(index);
        }
    }
}

impl<T> Index<usize> for BucketList<'_, T> {
    type Output = T;

    #[track_caller]
    fn index(&self, index: usize) -> &T {
        // SAFETY: `ptr_at` checks the bound.
        unsafe { &*self.ptr_at(index).as_ptr() }
    }
}

impl<T> IndexMut<usize> for BucketList<'_, T> {
    #[track_caller]
    fn index_mut(&mut self, index: usize) -> &mut T {
        // SAFETY: `ptr_at` checks the bound.
        unsafe { &mut *self.ptr_at(index).as_ptr() }
    }
}

impl<T: fmt::Debug> fmt::Debug for BucketList<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator over a [`BucketList`].
pub struct Iter<'l, 'a, T> {
    list: &'l BucketList<'a, T>,
    index: usize,
    end: usize,
}

impl<'l, T> Iterator for Iter<'l, '_, T> {
    type Item = &'l T;

    fn next(&mut self) -> Option<&'l T> {
        if self.index == self.end {
            return None;
        }
        let slot = self.list.slot(self.index);
        self.index += 1;
        // SAFETY: `index < len`.
        Some(unsafe { &*slot.as_ptr() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.index;
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, '_, T> {}
impl<T> FusedIterator for Iter<'_, '_, T> {}

impl<'l, 'a, T> IntoIterator for &'l BucketList<'a, T> {
    type Item = &'l T;
    type IntoIter = Iter<'l, 'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::LIBC_ALLOCATOR;
    use std::rc::Rc;

    #[test]
    fn test_addresses_are_stable() {
        let mut list = BucketList::new_in(&LIBC_ALLOCATOR, 3, 1).unwrap();
        let ptrs: Vec<_> = (0..5).map(|i| list.push(i).unwrap()).collect();
        for i in 5..200 {
            list.push(i).unwrap();
        }
        for (i, ptr) in ptrs.iter().enumerate() {
            assert_eq!(list.ptr_at(i), *ptr);
            assert_eq!(unsafe { *ptr.as_ptr() }, i);
        }
        assert!(list.bucket_count() >= 200 / 3);
    }

    #[test]
    fn test_remove_swaps_last_in() {
        let mut list = BucketList::new_in(&LIBC_ALLOCATOR, 2, 1).unwrap();
        for c in ['a', 'b', 'c', 'd'] {
            list.push(c).unwrap();
        }
        assert_eq!(list.remove_index(0), 'a');
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), ['d', 'b', 'c']);
        assert_eq!(list.remove_index(2), 'c');
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_clear_keeps_buckets() {
        let mut list = BucketList::new_in(&LIBC_ALLOCATOR, 4, 1).unwrap();
        for i in 0..10 {
            list.push(i).unwrap();
        }
        let materialized = list.materialized_buckets();
        assert_eq!(materialized, 3);
        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.materialized_buckets(), materialized);
        list.push(7).unwrap();
        assert_eq!(list[0], 7);
    }

    #[test]
    fn test_drop_runs_destructors_after_clear_cycle() {
        let marker = Rc::new(());
        {
            let mut list = BucketList::new_in(&LIBC_ALLOCATOR, 2, 1).unwrap();
            for _ in 0..9 {
                list.push(Rc::clone(&marker)).unwrap();
            }
            list.clear();
            assert_eq!(Rc::strong_count(&marker), 1);
            list.push(Rc::clone(&marker)).unwrap();
            assert_eq!(Rc::strong_count(&marker), 2);
        }
        assert_eq!(Rc::strong_count(&marker), 1);
    }

    #[test]
    fn test_get_and_index_mut() {
        let mut list = BucketList::new_in(&LIBC_ALLOCATOR, 8, 0).unwrap();
        list.push(1u32).unwrap();
        assert_eq!(list.get(1), None);
        *list.get_mut(0).unwrap() += 1;
        list[0] *= 10;
        assert_eq!(list.get(0), Some(&20));
        list.for_each_mut(|v| *v += 1);
        let mut seen = Vec::new();
        list.for_each(|v| seen.push(*v));
        assert_eq!(seen, [21]);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_out_of_range_panics() {
        let list = BucketList::<u8>::new_in(&LIBC_ALLOCATOR, 4, 1).unwrap();
        let _value = list[0];
    }
}
