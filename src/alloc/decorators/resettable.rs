//! `ResettableAllocator` - remembers outstanding blocks for bulk release.

use crate::alloc::allocator::{AllocError, Allocator, AllocatorKind};
use crate::collections::ArrayList;
use core::alloc::Layout;
use core::cell::RefCell;
use core::fmt;
use core::ptr::NonNull;

/// Forwards to `next` and keeps an address-sorted set of live blocks.
///
/// [`deallocate_everything_still_allocated`](Self::deallocate_everything_still_allocated)
/// releases the whole set at once. Freeing a pointer the set does not hold
/// (already released, or never handed out) does nothing.
///
/// The set itself is allocated from `next`.
pub struct ResettableAllocator<'a> {
    next: &'a dyn Allocator,
    live: RefCell<ArrayList<'a, NonNull<u8>>>,
}

impl<'a> ResettableAllocator<'a> {
    /// Wraps `next`.
    pub fn new(next: &'a dyn Allocator) -> Self {
        Self {
            next,
            live: RefCell::new(ArrayList::new_in(next)),
        }
    }

    /// Number of blocks currently outstanding.
    pub fn outstanding(&self) -> usize {
        self.live.borrow().len()
    }

    /// Returns `true` if `ptr` is an outstanding block.
    pub fn is_live(&self, ptr: NonNull<u8>) -> bool {
        self.live.borrow().binary_search(&ptr).is_ok()
    }

    /// Releases every outstanding block through `next`.
    pub fn deallocate_everything_still_allocated(&self) {
        let mut live = self.live.borrow_mut();
        tracing::debug!(target: "allocstack::resettable", count = live.len(), "bulk release");
        while let Some(ptr) = live.pop() {
            // SAFETY: every tracked block came from `self.next` and is live.
            unsafe { self.next.deallocate(ptr) };
        }
    }

    fn track(&self, ptr: NonNull<u8>) -> Result<(), AllocError> {
        let mut live = self.live.borrow_mut();
        let index = live.binary_search(&ptr).unwrap_or_else(|i| i);
        live.insert(index, ptr)
    }

    fn untrack(&self, ptr: NonNull<u8>) -> bool {
        let mut live = self.live.borrow_mut();
        match live.binary_search(&ptr) {
            Ok(index) => {
                live.remove(index);
                true
            }
            Err(_) => false,
        }
    }

    fn tracked(&self, result: Result<NonNull<u8>, AllocError>) -> Result<NonNull<u8>, AllocError> {
        let ptr = result?;
        if let Err(err) = self.track(ptr) {
            // SAFETY: `ptr` was just allocated by `self.next`.
            unsafe { self.next.deallocate(ptr) };
            return Err(err);
        }
        Ok(ptr)
    }
}

impl Allocator for ResettableAllocator<'_> {
    fn kind(&self) -> AllocatorKind {
        AllocatorKind::Resettable
    }

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.tracked(self.next.allocate(layout))
    }

    fn allocate_zeroed(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.tracked(self.next.allocate_zeroed(layout))
    }

    unsafe fn resize(&self, ptr: NonNull<u8>, new_layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let new = self.next.resize(ptr, new_layout)?;
        let _ = self.untrack(ptr);
        if let Err(err) = self.track(new) {
            self.next.deallocate(new);
            return Err(err);
        }
        Ok(new)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        if self.untrack(ptr) {
            self.next.deallocate(ptr);
        }
    }

    fn next(&self) -> Option<&dyn Allocator> {
        Some(self.next)
    }
}

impl Drop for ResettableAllocator<'_> {
    fn drop(&mut self) {
        let live = self.live.get_mut().len();
        if live != 0 {
            tracing::debug!(target: "allocstack::resettable", live, "dropped with outstanding blocks");
        }
    }
}

impl fmt::Debug for ResettableAllocator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResettableAllocator")
            .field("outstanding", &self.outstanding())
            .finish()
    }
}
