//! `PanickingAllocator` - turns allocation failures into panics.

use crate::alloc::allocator::{AllocError, Allocator, AllocatorKind};
use core::alloc::Layout;
use core::ptr::NonNull;

/// Forwards to `next` and panics whenever it fails.
///
/// Code running under this allocator never observes an [`AllocError`]. With
/// `panic = "abort"` (the release profile) a failure terminates the process.
#[derive(Clone, Copy)]
pub struct PanickingAllocator<'a> {
    next: &'a dyn Allocator,
}

impl<'a> PanickingAllocator<'a> {
    /// Wraps `next`.
    pub fn new(next: &'a dyn Allocator) -> Self {
        Self { next }
    }
}

#[cold]
#[track_caller]
fn fail(operation: &str, layout: Layout, err: AllocError) -> ! {
    panic!(
        "{operation} of {} bytes (align {}) failed: {err}",
        layout.size(),
        layout.align()
    )
}

impl Allocator for PanickingAllocator<'_> {
    fn kind(&self) -> AllocatorKind {
        AllocatorKind::Panicking
    }

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        match self.next.allocate(layout) {
            Ok(ptr) => Ok(ptr),
            Err(err) => fail("allocate", layout, err),
        }
    }

    fn allocate_zeroed(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        match self.next.allocate_zeroed(layout) {
            Ok(ptr) => Ok(ptr),
            Err(err) => fail("allocate_zeroed", layout, err),
        }
    }

    unsafe fn resize(&self, ptr: NonNull<u8>, new_layout: Layout) -> Result<NonNull<u8>, AllocError> {
        match self.next.resize(ptr, new_layout) {
            Ok(ptr) => Ok(ptr),
            Err(err) => fail("resize", new_layout, err),
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        self.next.deallocate(ptr);
    }

    fn next(&self) -> Option<&dyn Allocator> {
        Some(self.next)
    }
}
