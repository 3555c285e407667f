//! `PrintingAllocator` - logs every call before forwarding it.

use crate::alloc::allocator::{AllocError, Allocator, AllocatorKind};
use core::alloc::Layout;
use core::ptr::NonNull;

/// Emits one `tracing` event per call, then forwards to `next`.
///
/// Events go to the `allocstack::printing` target at `INFO` level.
#[derive(Clone, Copy)]
pub struct PrintingAllocator<'a> {
    next: &'a dyn Allocator,
}

impl<'a> PrintingAllocator<'a> {
    /// Wraps `next`.
    pub fn new(next: &'a dyn Allocator) -> Self {
        Self { next }
    }
}

impl Allocator for PrintingAllocator<'_> {
    fn kind(&self) -> AllocatorKind {
        AllocatorKind::Printing
    }

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let result = self.next.allocate(layout);
        tracing::info!(
            target: "allocstack::printing",
            size = layout.size(),
            align = layout.align(),
            result = ?result.map(NonNull::as_ptr),
            "allocate"
        );
        result
    }

    fn allocate_zeroed(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let result = self.next.allocate_zeroed(layout);
        tracing::info!(
            target: "allocstack::printing",
            size = layout.size(),
            align = layout.align(),
            result = ?result.map(NonNull::as_ptr),
            "allocate zeroed"
        );
        result
    }

    unsafe fn resize(&self, ptr: NonNull<u8>, new_layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let result = self.next.resize(ptr, new_layout);
        tracing::info!(
            target: "allocstack::printing",
            old = ?ptr.as_ptr(),
            size = new_layout.size(),
            align = new_layout.align(),
            result = ?result.map(NonNull::as_ptr),
            "resize"
        );
        result
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        tracing::info!(target: "allocstack::printing", ptr = ?ptr.as_ptr(), "deallocate");
        self.next.deallocate(ptr);
    }

    fn next(&self) -> Option<&dyn Allocator> {
        Some(self.next)
    }
}
