//! `PoolAllocator` - a fixed-capacity pool of equally sized slots.
//!
//! Slots are carved from one zeroed array. Free slots store the distance to
//! the next free slot *minus one*, so the all-zero array is already a valid
//! free list (every slot points at its successor) and only the last slot
//! needs the `-1` end marker.

use crate::alloc::allocator::{AllocError, Allocator};
use core::fmt;
use core::mem::{self, ManuallyDrop};
use core::ptr::{self, NonNull};

const END_OF_LIST: i32 = -1;

/// One slot: either a payload or a free-list link.
///
/// Which variant is active is decided by the pool's free list alone.
#[repr(C)]
union PoolCell<T> {
    #[allow(dead_code)]
    element: ManuallyDrop<T>,
    relative_next_free: i32,
}

/// A pool of `capacity` slots for `T`, allocated once from a backing allocator.
///
/// Slots are handed out uninitialized and the pool never runs destructors:
/// callers write a value after [`allocate`](Self::allocate) and drop it (if
/// needed) before [`deallocate`](Self::deallocate).
pub struct PoolAllocator<'a, T> {
    allocator: &'a dyn Allocator,
    cells: NonNull<PoolCell<T>>,
    capacity: usize,
    next_free: i32,
}

impl<'a, T> PoolAllocator<'a, T> {
    /// Allocates storage for `capacity` slots from `allocator`.
    ///
    /// # Errors
    /// [`AllocError::InvalidLayout`] if `capacity` is zero or does not fit the
    /// free-list encoding, otherwise the backing allocator's error.
    pub fn new_in(allocator: &'a dyn Allocator, capacity: usize) -> Result<Self, AllocError> {
        if capacity == 0 || i32::try_from(capacity).is_err() {
            return Err(AllocError::InvalidLayout);
        }
        let cells = allocator.allocate_array_zeroed::<PoolCell<T>>(capacity)?;
        let mut pool = Self {
            allocator,
            cells,
            capacity,
            next_free: 0,
        };
        pool.terminate_free_list();
        Ok(pool)
    }

    fn terminate_free_list(&mut self) {
        // SAFETY: `capacity > 0`, the last cell is in bounds.
        unsafe { self.cell(self.capacity - 1).relative_next_free = END_OF_LIST };
    }

    /// # Safety
    /// `index < capacity`.
    unsafe fn cell(&mut self, index: usize) -> &mut PoolCell<T> {
        &mut *self.cells.as_ptr().add(index)
    }

    /// Total number of slots.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Takes a free slot, or returns `None` if the pool is exhausted.
    pub fn allocate(&mut self) -> Option<NonNull<T>> {
        if self.next_free == END_OF_LIST {
            return None;
        }
        let index = self.next_free as usize;
        // SAFETY: `next_free` always names an in-bounds free cell.
        let cell = unsafe { self.cell(index) };
        let relative = unsafe { cell.relative_next_free };
        let slot = NonNull::from(cell).cast::<T>();
        self.next_free = if relative == END_OF_LIST {
            END_OF_LIST
        } else {
            self.next_free + relative + 1
        };
        Some(slot)
    }

    /// Returns `ptr`'s slot to the pool.
    ///
    /// # Panics
    /// Panics if `ptr` is not a slot of this pool.
    ///
    /// # Safety
    /// `ptr` must be a slot obtained from [`allocate`](Self::allocate) that is
    /// not already free. Any value in it is forgotten.
    #[track_caller]
    pub unsafe fn deallocate(&mut self, ptr: NonNull<T>) {
        let Some(index) = self.index_of(ptr) else {
            panic!("attempting to free {ptr:p} which is not a slot of this pool");
        };
        // Fits: `index < capacity <= i32::MAX`.
        let index = index as i32;
        self.cell(index as usize).relative_next_free = self.next_free - index - 1;
        self.next_free = index;
    }

    fn index_of(&self, ptr: NonNull<T>) -> Option<usize> {
        let base = self.cells.as_ptr() as usize;
        let offset = (ptr.as_ptr() as usize).checked_sub(base)?;
        let stride = mem::size_of::<PoolCell<T>>();
        (offset % stride == 0 && offset / stride < self.capacity).then_some(offset / stride)
    }

    /// Returns `true` if `ptr` addresses one of this pool's slots.
    pub fn contains(&self, ptr: NonNull<T>) -> bool {
        self.index_of(ptr).is_some()
    }

    /// Marks every slot free again.
    pub fn reset(&mut self) {
        // SAFETY: the array holds `capacity` cells.
        unsafe { ptr::write_bytes(self.cells.as_ptr(), 0, self.capacity) };
        self.next_free = 0;
        self.terminate_free_list();
    }

    /// Number of slots currently handed out. Walks the free list.
    pub fn count_allocated_elements(&self) -> usize {
        let mut count = self.capacity;
        let mut index = self.next_free;
        while index != END_OF_LIST {
            count -= 1;
            // SAFETY: free-list entries are in-bounds free cells.
            let relative = unsafe { (*self.cells.as_ptr().add(index as usize)).relative_next_free };
            if relative == END_OF_LIST {
                break;
            }
            index += relative + 1;
        }
        count
    }
}

impl<T> Drop for PoolAllocator<'_, T> {
    fn drop(&mut self) {
        // SAFETY: `cells` came from `self.allocator`.
        unsafe { self.allocator.deallocate_array(self.cells) };
    }
}

impl<T> fmt::Debug for PoolAllocator<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("capacity", &self.capacity)
            .field("allocated", &self.count_allocated_elements())
            .finish()
    }
}
