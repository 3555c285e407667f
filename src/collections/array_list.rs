//! `ArrayList` - a growable array whose storage comes from a `dyn Allocator`.
//!
//! This is the crate's internal workhorse: decorator registries, bucket
//! directories and free lists all live in one. Growth goes through
//! [`Allocator::resize`] and falls back to allocate-copy-free when the backing
//! allocator cannot resize (e.g. an arena block that is not the newest).

use crate::alloc::{AllocError, Allocator};
use core::fmt;
use core::mem;
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};
use core::slice;

const MIN_CAPACITY: usize = 4;

/// A contiguous growable array backed by an explicit allocator.
pub struct ArrayList<'a, T> {
    allocator: &'a dyn Allocator,
    data: NonNull<T>,
    len: usize,
    capacity: usize,
}

impl<'a, T> ArrayList<'a, T> {
    const IS_ZST: bool = mem::size_of::<T>() == 0;

    /// Creates an empty list that allocates lazily from `allocator`.
    pub fn new_in(allocator: &'a dyn Allocator) -> Self {
        Self {
            allocator,
            data: NonNull::dangling(),
            len: 0,
            capacity: if Self::IS_ZST { usize::MAX } else { 0 },
        }
    }

    /// Creates a list with room for `capacity` elements.
    ///
    /// # Errors
    /// Fails if `allocator` cannot provide the storage.
    pub fn with_capacity_in(capacity: usize, allocator: &'a dyn Allocator) -> Result<Self, AllocError> {
        let mut list = Self::new_in(allocator);
        list.reserve(capacity)?;
        Ok(list)
    }

    /// The allocator backing this list.
    pub fn allocator(&self) -> &'a dyn Allocator {
        self.allocator
    }

    /// Number of elements.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if there are no elements.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements the current storage can hold.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ensures room for `additional` more elements.
    ///
    /// # Errors
    /// Fails if the storage cannot grow.
    pub fn reserve(&mut self, additional: usize) -> Result<(), AllocError> {
        let needed = self.len.checked_add(additional).ok_or(AllocError::InvalidLayout)?;
        if needed <= self.capacity {
            return Ok(());
        }
        let new_capacity = needed.max(self.capacity.saturating_mul(2)).max(MIN_CAPACITY);
        self.grow_to(new_capacity)
    }

    fn grow_to(&mut self, new_capacity: usize) -> Result<(), AllocError> {
        let data = if self.capacity == 0 {
            self.allocator.allocate_array::<T>(new_capacity)?
        } else {
            // SAFETY: `self.data` is a live array from `self.allocator`.
            match unsafe { self.allocator.resize_array(self.data, new_capacity) } {
                Ok(data) => data,
                Err(_) => {
                    let fresh = self.allocator.allocate_array::<T>(new_capacity)?;
                    // SAFETY: both arrays hold at least `len` slots and do not overlap.
                    unsafe {
                        ptr::copy_nonoverlapping(self.data.as_ptr(), fresh.as_ptr(), self.len);
                        self.allocator.deallocate_array(self.data);
                    }
                    fresh
                }
            }
        };
        self.data = data;
        self.capacity = new_capacity;
        Ok(())
    }

    /// Appends `value`.
    ///
    /// # Errors
    /// Fails if the storage cannot grow; `value` is dropped.
    pub fn push(&mut self, value: T) -> Result<(), AllocError> {
        self.reserve(1)?;
        // SAFETY: `len < capacity` after `reserve`.
        unsafe { self.data.as_ptr().add(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    /// Removes and returns the last element.
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: slot `len` was initialized and is now logically removed.
        Some(unsafe { self.data.as_ptr().add(self.len).read() })
    }

    /// Inserts `value` at `index`, shifting later elements right.
    ///
    /// # Errors
    /// Fails if the storage cannot grow.
    ///
    /// # Panics
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, value: T) -> Result<(), AllocError> {
        assert!(index <= self.len, "insert index {index} out of bounds (len {})", self.len);
        self.reserve(1)?;
        // SAFETY: `index <= len < capacity`.
        unsafe {
            let at = self.data.as_ptr().add(index);
            ptr::copy(at, at.add(1), self.len - index);
            at.write(value);
        }
        self.len += 1;
        Ok(())
    }

    /// Removes the element at `index`, shifting later elements left.
    ///
    /// # Panics
    /// Panics if `index >= len`.
    pub fn remove(&mut self, index: usize) -> T {
        assert!(index < self.len, "remove index {index} out of bounds (len {})", self.len);
        // SAFETY: `index < len`.
        unsafe {
            let at = self.data.as_ptr().add(index);
            let value = at.read();
            ptr::copy(at.add(1), at, self.len - index - 1);
            self.len -= 1;
            value
        }
    }

    /// Grows or shrinks to `new_len`, filling new slots with `f()`.
    ///
    /// # Errors
    /// Fails if the storage cannot grow.
    pub fn resize_with(&mut self, new_len: usize, mut f: impl FnMut() -> T) -> Result<(), AllocError> {
        if new_len <= self.len {
            self.truncate(new_len);
            return Ok(());
        }
        self.reserve(new_len - self.len)?;
        while self.len < new_len {
            // SAFETY: `len < new_len <= capacity`.
            unsafe { self.data.as_ptr().add(self.len).write(f()) };
            self.len += 1;
        }
        Ok(())
    }

    /// Drops every element past `len`.
    pub fn truncate(&mut self, len: usize) {
        while self.len > len {
            drop(self.pop());
        }
    }

    /// Drops every element, keeping the storage.
    pub fn clear(&mut self) {
        self.truncate(0);
    }
}

impl<T> Deref for ArrayList<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        // SAFETY: the first `len` slots are initialized.
        unsafe { slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }
}

impl<T> DerefMut for ArrayList<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: the first `len` slots are initialized.
        unsafe { slice::from_raw_parts_mut(self.data.as_ptr(), self.len) }
    }
}

impl<T> Drop for ArrayList<'_, T> {
    fn drop(&mut self) {
        self.clear();
        if !Self::IS_ZST && self.capacity != 0 {
            // SAFETY: storage came from `self.allocator`.
            unsafe { self.allocator.deallocate_array(self.data) };
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ArrayList<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{LinearAllocator, LinearConfig, LIBC_ALLOCATOR};
    use std::rc::Rc;

    #[test]
    fn test_push_pop_insert_remove() {
        let mut list = ArrayList::new_in(&LIBC_ALLOCATOR);
        for i in 0..10 {
            list.push(i).unwrap();
        }
        assert_eq!(list.len(), 10);
        list.insert(0, 100).unwrap();
        assert_eq!(list[0], 100);
        assert_eq!(list.remove(0), 100);
        assert_eq!(list.pop(), Some(9));
        assert_eq!(&list[..3], &[0, 1, 2]);
    }

    #[test]
    fn test_growth_over_arena_falls_back_to_copy() {
        let arena = LinearAllocator::with_config(LinearConfig::uniform(256), &LIBC_ALLOCATOR).unwrap();
        let mut a = ArrayList::new_in(&arena);
        let mut b = ArrayList::new_in(&arena);
        for i in 0..100u32 {
            a.push(i).unwrap();
            b.push(i * 2).unwrap();
        }
        assert!(a.iter().copied().eq(0..100));
        assert!(b.iter().copied().eq((0..100).map(|i| i * 2)));
    }

    #[test]
    fn test_drop_runs_destructors() {
        let marker = Rc::new(());
        {
            let mut list = ArrayList::new_in(&LIBC_ALLOCATOR);
            for _ in 0..5 {
                list.push(Rc::clone(&marker)).unwrap();
            }
            assert_eq!(Rc::strong_count(&marker), 6);
            list.truncate(2);
            assert_eq!(Rc::strong_count(&marker), 3);
        }
        assert_eq!(Rc::strong_count(&marker), 1);
    }

    #[test]
    fn test_resize_with_and_sort() {
        let mut list = ArrayList::new_in(&LIBC_ALLOCATOR);
        list.resize_with(4, || None::<u8>).unwrap();
        assert!(list.iter().all(Option::is_none));
        list[2] = Some(1);
        list[0] = Some(9);
        list.sort_unstable();
        assert_eq!(list[3], Some(9));
    }

    #[test]
    fn test_zero_sized_elements() {
        let mut list = ArrayList::new_in(&LIBC_ALLOCATOR);
        for _ in 0..1000 {
            list.push(()).unwrap();
        }
        assert_eq!(list.len(), 1000);
    }
}
