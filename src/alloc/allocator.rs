//! The byte-level [`Allocator`] interface, its error type and the
//! lifetime-erased [`AllocatorHandle`] the selection stack stores.

use core::alloc::Layout;
use core::fmt;
use core::mem;
use core::ptr::{self, NonNull};

/// The closed set of allocator strategies.
///
/// Every concrete allocator reports exactly one kind. Kinds are used for
/// diagnostics and for scratch-arena selection; dispatch itself goes through
/// the [`Allocator`] trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum AllocatorKind {
    /// Root allocator backed by the C runtime heap.
    Libc,
    /// Segmented bump arena.
    Linear,
    /// Logs every call, then forwards.
    Printing,
    /// Counts calls per operation, then forwards.
    #[cfg(feature = "bookkeeping")]
    Bookkeeping,
    /// Turns every failure into a panic.
    Panicking,
    /// Tracks outstanding blocks for bulk release.
    Resettable,
    /// Tracks outstanding blocks and their sizes for leak reports.
    #[cfg(feature = "leak-detection")]
    LeakDetecting,
}

impl AllocatorKind {
    /// Returns `true` for allocators that wrap another allocator.
    pub const fn is_decorator(self) -> bool {
        !matches!(self, Self::Libc | Self::Linear)
    }
}

impl fmt::Display for AllocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Libc => "libc",
            Self::Linear => "linear",
            Self::Printing => "printing",
            #[cfg(feature = "bookkeeping")]
            Self::Bookkeeping => "bookkeeping",
            Self::Panicking => "panicking",
            Self::Resettable => "resettable",
            #[cfg(feature = "leak-detection")]
            Self::LeakDetecting => "leak-detecting",
        };
        f.write_str(name)
    }
}

/// The error type for allocation failures.
///
/// Errors are the recoverable tier: a caller may retry with another allocator
/// or propagate. [`PanickingAllocator`](crate::alloc::PanickingAllocator)
/// converts them into panics at a chosen boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    /// The backing store could not satisfy the request.
    #[error("out of memory: requested {size} bytes (align {align})")]
    OutOfMemory {
        /// Requested size in bytes.
        size: usize,
        /// Requested alignment.
        align: usize,
    },

    /// `count * size_of::<T>()` overflowed or produced an invalid layout.
    #[error("invalid allocation layout")]
    InvalidLayout,

    /// The allocator cannot honour the requested alignment.
    #[error("unsupported alignment {align}")]
    UnsupportedAlignment {
        /// Requested alignment.
        align: usize,
    },

    /// An in-place arena resize would run past the end of its segment.
    #[error("segment exhausted: resize needs {requested} bytes, {available} available")]
    SegmentExhausted {
        /// Bytes the resized block would need from its start.
        requested: usize,
        /// Bytes available from the block start to the segment end.
        available: usize,
    },
}

impl AllocError {
    /// Builds an [`AllocError::OutOfMemory`] for `layout`.
    pub const fn out_of_memory(layout: Layout) -> Self {
        Self::OutOfMemory {
            size: layout.size(),
            align: layout.align(),
        }
    }
}

/// A byte-level allocator.
///
/// This is the dispatch seam of the crate: the selection stack, the
/// decorators, the bucket structures and the pools all talk to their backing
/// store through `&dyn Allocator`. Implementations are plain values with
/// interior mutability (`Cell`/`RefCell`); none of them are `Sync`.
///
/// Unlike `core::alloc::GlobalAlloc`, deallocation does not take a layout:
/// every allocator must be able to release a block from its address alone.
pub trait Allocator {
    /// Reports the strategy of this allocator.
    fn kind(&self) -> AllocatorKind;

    /// Allocates a block for `layout`.
    ///
    /// # Errors
    /// Returns an [`AllocError`] if the request cannot be satisfied.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Allocates a zero-filled block for `layout`.
    ///
    /// # Errors
    /// Returns an [`AllocError`] if the request cannot be satisfied.
    fn allocate_zeroed(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.allocate(layout)?;
        // SAFETY: `ptr` is a fresh block of at least `layout.size()` bytes.
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, layout.size()) };
        Ok(ptr)
    }

    /// Resizes the block at `ptr` to `new_layout.size()` bytes.
    ///
    /// On success the returned block holds the old contents up to the smaller
    /// of the two sizes and `ptr` must no longer be used (unless it was
    /// returned again). On failure `ptr` is still valid.
    ///
    /// # Errors
    /// Returns an [`AllocError`] if the block cannot be resized.
    ///
    /// # Safety
    /// `ptr` must denote a live block allocated by this allocator.
    unsafe fn resize(&self, ptr: NonNull<u8>, new_layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Releases the block at `ptr`.
    ///
    /// # Safety
    /// `ptr` must have been returned by this allocator and must not be used
    /// afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>);

    /// Returns the allocator this one forwards to, if any.
    fn next(&self) -> Option<&dyn Allocator> {
        None
    }
}

impl<'a> dyn Allocator + 'a {
    /// Allocates an uninitialized array of `count` values of `T`.
    ///
    /// # Errors
    /// Returns [`AllocError::InvalidLayout`] on size overflow, or the backing
    /// allocator's error.
    pub fn allocate_array<T>(&self, count: usize) -> Result<NonNull<T>, AllocError> {
        let layout = array_layout::<T>(count)?;
        self.allocate(layout).map(NonNull::cast)
    }

    /// Allocates a zeroed array of `count` values of `T`.
    ///
    /// # Errors
    /// See [`allocate_array`](Self::allocate_array).
    pub fn allocate_array_zeroed<T>(&self, count: usize) -> Result<NonNull<T>, AllocError> {
        let layout = array_layout::<T>(count)?;
        self.allocate_zeroed(layout).map(NonNull::cast)
    }

    /// Resizes an array previously returned by this allocator to `count` values.
    ///
    /// # Errors
    /// See [`Allocator::resize`].
    ///
    /// # Safety
    /// See [`Allocator::resize`].
    pub unsafe fn resize_array<T>(&self, ptr: NonNull<T>, count: usize) -> Result<NonNull<T>, AllocError> {
        let layout = array_layout::<T>(count)?;
        self.resize(ptr.cast(), layout).map(NonNull::cast)
    }

    /// Releases an array previously returned by this allocator.
    ///
    /// # Safety
    /// See [`Allocator::deallocate`].
    pub unsafe fn deallocate_array<T>(&self, ptr: NonNull<T>) {
        self.deallocate(ptr.cast());
    }

    /// Walks the forwarding chain starting at this allocator.
    pub fn chain(&self) -> Chain<'_> {
        Chain { current: Some(self) }
    }

    /// Returns `true` if `self` and `other` are the same allocator instance.
    pub fn same_as(&self, other: &dyn Allocator) -> bool {
        ptr::addr_eq(self, other)
    }
}

/// Iterator over a decorator chain, outermost first.
pub struct Chain<'a> {
    current: Option<&'a dyn Allocator>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a dyn Allocator;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = current.next();
        Some(current)
    }
}

/// Layout of `[T; count]`.
pub(crate) fn array_layout<T>(count: usize) -> Result<Layout, AllocError> {
    Layout::array::<T>(count).map_err(|_| AllocError::InvalidLayout)
}

/// A copyable reference to an allocator together with its kind.
///
/// Handles are what the selection stack stores. They carry no lifetime: a
/// handle obtained from [`grab_current_allocator`](crate::alloc::grab_current_allocator)
/// is only valid while the allocator it names is still selected.
#[derive(Clone, Copy)]
pub struct AllocatorHandle {
    kind: AllocatorKind,
    ptr: NonNull<dyn Allocator>,
}

impl AllocatorHandle {
    /// Builds a handle to `allocator`, erasing its lifetime.
    ///
    /// # Safety
    /// The handle must not be dereferenced after `allocator` is dropped.
    pub(crate) unsafe fn from_ref(allocator: &dyn Allocator) -> Self {
        let ptr = NonNull::from(allocator);
        Self {
            kind: allocator.kind(),
            // SAFETY: only the lifetime bound of the trait object changes.
            ptr: unsafe { mem::transmute::<NonNull<dyn Allocator + '_>, NonNull<dyn Allocator>>(ptr) },
        }
    }

    /// Returns the kind of the allocator behind this handle.
    pub const fn kind(&self) -> AllocatorKind {
        self.kind
    }

    /// Returns the address of the allocator value.
    pub fn addr(&self) -> usize {
        self.ptr.cast::<u8>().as_ptr() as usize
    }

    /// Returns `true` if this handle names `allocator`.
    pub fn is(&self, allocator: &dyn Allocator) -> bool {
        ptr::addr_eq(self.ptr.as_ptr(), allocator)
    }

    /// Dereferences the handle.
    ///
    /// # Safety
    /// The allocator must still be alive for `'a`.
    pub unsafe fn as_ref<'a>(&self) -> &'a dyn Allocator {
        unsafe { &*self.ptr.as_ptr() }
    }
}

impl fmt::Debug for AllocatorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocatorHandle")
            .field("kind", &self.kind)
            .field("addr", &format_args!("{:#x}", self.addr()))
            .finish()
    }
}

impl PartialEq for AllocatorHandle {
    fn eq(&self, other: &Self) -> bool {
        ptr::addr_eq(self.ptr.as_ptr(), other.ptr.as_ptr())
    }
}

impl Eq for AllocatorHandle {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{LibcAllocator, PrintingAllocator};

    #[test]
    fn test_kind_display_and_decorator_flag() {
        assert_eq!(AllocatorKind::Libc.to_string(), "libc");
        assert!(!AllocatorKind::Linear.is_decorator());
        assert!(AllocatorKind::Printing.is_decorator());
        assert!(AllocatorKind::Panicking.is_decorator());
    }

    #[test]
    fn test_array_layout_overflow() {
        assert_eq!(array_layout::<u64>(usize::MAX), Err(AllocError::InvalidLayout));
        let layout = array_layout::<u32>(4).unwrap();
        assert_eq!(layout.size(), 16);
        assert_eq!(layout.align(), 4);
    }

    #[test]
    fn test_typed_helpers_round_trip() {
        let libc = LibcAllocator::new();
        let alloc: &dyn Allocator = &libc;
        let ptr = alloc.allocate_array_zeroed::<u32>(8).unwrap();
        unsafe {
            assert!(core::slice::from_raw_parts(ptr.as_ptr(), 8).iter().all(|&v| v == 0));
            ptr.as_ptr().add(7).write(7);
            let grown = alloc.resize_array(ptr, 32).unwrap();
            assert_eq!(*grown.as_ptr().add(7), 7);
            alloc.deallocate_array(grown);
        }
    }

    #[test]
    fn test_chain_walks_to_root() {
        let libc = LibcAllocator::new();
        let printing = PrintingAllocator::new(&libc);
        let kinds: Vec<_> = (&printing as &dyn Allocator).chain().map(|a| a.kind()).collect();
        assert_eq!(kinds, vec![AllocatorKind::Printing, AllocatorKind::Libc]);
    }

    #[test]
    fn test_handle_identity() {
        let libc = LibcAllocator::new();
        let a = PrintingAllocator::new(&libc);
        let b = PrintingAllocator::new(&libc);
        let ha = unsafe { AllocatorHandle::from_ref(&a) };
        let hb = unsafe { AllocatorHandle::from_ref(&b) };
        assert!(ha.is(&a));
        assert!(!ha.is(&b));
        assert_ne!(ha, hb);
        assert_eq!(hb.kind(), AllocatorKind::Printing);
        assert!((&a as &dyn Allocator).same_as(unsafe { ha.as_ref() }));
    }
}
