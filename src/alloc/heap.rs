//! `LibcAllocator` - the root of every allocator chain.
//!
//! Forwards to the C runtime heap (`malloc`, `calloc`, `realloc`, `free`).
//! It wraps nothing and is the bottom entry of every thread's selection stack.

use crate::alloc::allocator::{AllocError, Allocator, AllocatorKind};
use core::alloc::Layout;
use core::ffi::c_void;
use core::ptr::NonNull;

/// Largest alignment guaranteed by `malloc` on this target.
#[cfg(target_pointer_width = "64")]
pub const MALLOC_ALIGN: usize = 16;
/// Largest alignment guaranteed by `malloc` on this target.
#[cfg(not(target_pointer_width = "64"))]
pub const MALLOC_ALIGN: usize = 8;

/// The process-wide root allocator.
pub static LIBC_ALLOCATOR: LibcAllocator = LibcAllocator::new();

/// Allocator backed by the C runtime heap.
///
/// Alignments above [`MALLOC_ALIGN`] are served with `posix_memalign` on unix
/// targets; such blocks cannot be resized.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibcAllocator {
    _private: (),
}

impl LibcAllocator {
    /// Creates a libc allocator value.
    pub const fn new() -> Self {
        Self { _private: () }
    }

    #[cfg(unix)]
    fn allocate_overaligned(layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let mut out: *mut c_void = core::ptr::null_mut();
        // SAFETY: `align` is a power of two and a multiple of `size_of::<*mut c_void>()`
        // because it exceeds `MALLOC_ALIGN`.
        let rc = unsafe { libc::posix_memalign(&mut out, layout.align(), layout.size().max(1)) };
        if rc != 0 {
            return Err(AllocError::out_of_memory(layout));
        }
        NonNull::new(out.cast::<u8>()).ok_or(AllocError::out_of_memory(layout))
    }

    #[cfg(not(unix))]
    fn allocate_overaligned(layout: Layout) -> Result<NonNull<u8>, AllocError> {
        Err(AllocError::UnsupportedAlignment { align: layout.align() })
    }
}

impl Allocator for LibcAllocator {
    fn kind(&self) -> AllocatorKind {
        AllocatorKind::Libc
    }

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.align() > MALLOC_ALIGN {
            return Self::allocate_overaligned(layout);
        }
        // `malloc(0)` may legally return null.
        let ptr = unsafe { libc::malloc(layout.size().max(1)) };
        NonNull::new(ptr.cast::<u8>()).ok_or(AllocError::out_of_memory(layout))
    }

    fn allocate_zeroed(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.align() > MALLOC_ALIGN {
            let ptr = Self::allocate_overaligned(layout)?;
            // SAFETY: fresh block of `layout.size()` bytes.
            unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0, layout.size()) };
            return Ok(ptr);
        }
        let ptr = unsafe { libc::calloc(1, layout.size().max(1)) };
        NonNull::new(ptr.cast::<u8>()).ok_or(AllocError::out_of_memory(layout))
    }

    unsafe fn resize(&self, ptr: NonNull<u8>, new_layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if new_layout.align() > MALLOC_ALIGN {
            return Err(AllocError::UnsupportedAlignment {
                align: new_layout.align(),
            });
        }
        let new = libc::realloc(ptr.as_ptr().cast::<c_void>(), new_layout.size().max(1));
        NonNull::new(new.cast::<u8>()).ok_or(AllocError::out_of_memory(new_layout))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        libc::free(ptr.as_ptr().cast::<c_void>());
    }
}
