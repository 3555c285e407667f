//! `LinearAllocator` - a segmented bump arena.
//!
//! Requests are served by advancing a cursor through the active segment.
//! When a segment is full a new one is obtained from the wrapped allocator and
//! the old one is kept alive behind it, so earlier pointers stay valid.
//!
//! Every block is preceded by an 8-byte header holding its size, which is
//! what lets [`resize`](Allocator::resize) copy a block it did not hand out
//! last. Only the most recent block can be grown in place or popped; freeing
//! anything else is a no-op.

use crate::alloc::allocator::{AllocError, Allocator, AllocatorKind};
use crate::alloc::config::{align_up, LinearConfig, DEFAULT_SEGMENT_SIZE, HEADER_SIZE, SEGMENT_ALIGN};
use core::alloc::Layout;
use core::cell::RefCell;
use core::fmt;
use core::ptr::{self, NonNull};

/// One buffer of the arena.
struct Segment {
    data: NonNull<u8>,
    capacity: usize,
    cursor: usize,
    prev: Option<Box<Segment>>,
}

impl Segment {
    fn new(next: &dyn Allocator, capacity: usize) -> Result<Box<Self>, AllocError> {
        let layout = Layout::from_size_align(capacity, SEGMENT_ALIGN).map_err(|_| AllocError::InvalidLayout)?;
        let data = next.allocate(layout)?;
        Ok(Box::new(Self {
            data,
            capacity,
            cursor: 0,
            prev: None,
        }))
    }

    fn base(&self) -> usize {
        self.data.as_ptr() as usize
    }

    /// Bumps the cursor for `layout`, writing the size header.
    fn try_alloc(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        let base = self.base();
        let data = align_up(base + self.cursor + HEADER_SIZE, layout.align());
        let end = data.checked_add(layout.size())?;
        if end - base > self.capacity {
            return None;
        }
        self.cursor = end - base;
        // SAFETY: `data - HEADER_SIZE .. end` lies inside this segment.
        unsafe {
            let ptr = self.data.as_ptr().add(data - base);
            write_header(ptr, layout.size());
            Some(NonNull::new_unchecked(ptr))
        }
    }

    fn contains(&self, ptr: NonNull<u8>) -> bool {
        let addr = ptr.as_ptr() as usize;
        addr >= self.base() && addr < self.base() + self.capacity
    }
}

/// Position inside a [`LinearAllocator`], see [`LinearAllocator::mark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaMark {
    segment_depth: usize,
    cursor: usize,
}

impl ArenaMark {
    /// Number of segments that existed when the mark was taken.
    pub const fn segment_depth(&self) -> usize {
        self.segment_depth
    }

    /// Cursor of the active segment when the mark was taken.
    pub const fn cursor(&self) -> usize {
        self.cursor
    }
}

#[derive(Clone, Copy)]
struct LastAlloc {
    ptr: NonNull<u8>,
    /// Cursor before the allocation, padding included.
    start: usize,
}

struct ArenaState {
    current: Box<Segment>,
    depth: usize,
    last_alloc: Option<LastAlloc>,
}

/// A segmented bump allocator.
///
/// # Example
/// ```
/// use allocstack::alloc::{Allocator, LinearAllocator, LIBC_ALLOCATOR};
/// use core::alloc::Layout;
///
/// let arena = LinearAllocator::new(1024, &LIBC_ALLOCATOR).unwrap();
/// let a = arena.allocate(Layout::new::<u64>()).unwrap();
/// let before = arena.cursor();
/// let b = arena.allocate(Layout::new::<u64>()).unwrap();
///
/// // Only the newest block can be popped.
/// unsafe { arena.deallocate(a) };
/// assert!(arena.cursor() > before);
/// unsafe { arena.deallocate(b) };
/// assert_eq!(arena.cursor(), before);
/// ```
pub struct LinearAllocator<'a> {
    next: &'a dyn Allocator,
    segment_size: usize,
    state: RefCell<ArenaState>,
}

impl<'a> LinearAllocator<'a> {
    /// Creates an arena whose first segment holds `initial_size` bytes.
    ///
    /// Grown segments use [`DEFAULT_SEGMENT_SIZE`].
    ///
    /// # Errors
    /// Fails if `next` cannot provide the first segment.
    pub fn new(initial_size: usize, next: &'a dyn Allocator) -> Result<Self, AllocError> {
        Self::with_config(
            LinearConfig {
                initial_size,
                segment_size: DEFAULT_SEGMENT_SIZE,
            },
            next,
        )
    }

    /// Creates an arena sized by `config`.
    ///
    /// # Errors
    /// Fails if `next` cannot provide the first segment.
    pub fn with_config(config: LinearConfig, next: &'a dyn Allocator) -> Result<Self, AllocError> {
        let current = Segment::new(next, config.initial_size)?;
        Ok(Self {
            next,
            segment_size: config.segment_size,
            state: RefCell::new(ArenaState {
                current,
                depth: 1,
                last_alloc: None,
            }),
        })
    }

    /// Cursor of the active segment.
    pub fn cursor(&self) -> usize {
        self.state.borrow().current.cursor
    }

    /// Number of live segments.
    pub fn segment_count(&self) -> usize {
        self.state.borrow().depth
    }

    /// Total capacity over all live segments.
    pub fn capacity(&self) -> usize {
        let state = self.state.borrow();
        let mut total = 0;
        let mut segment = Some(&*state.current);
        while let Some(s) = segment {
            total += s.capacity;
            segment = s.prev.as_deref();
        }
        total
    }

    /// Returns `true` if `ptr` lies inside any live segment.
    pub fn owns(&self, ptr: NonNull<u8>) -> bool {
        let state = self.state.borrow();
        let mut segment = Some(&*state.current);
        while let Some(s) = segment {
            if s.contains(ptr) {
                return true;
            }
            segment = s.prev.as_deref();
        }
        false
    }

    /// Captures the current position.
    pub fn mark(&self) -> ArenaMark {
        let state = self.state.borrow();
        ArenaMark {
            segment_depth: state.depth,
            cursor: state.current.cursor,
        }
    }

    /// Releases everything allocated since `mark`.
    ///
    /// Marks must be rewound in LIFO order; rewinding to a mark taken after a
    /// [`reset`](Self::reset) or an earlier rewind is not detected.
    pub fn rewind(&self, mark: ArenaMark) {
        let mut state = self.state.borrow_mut();
        debug_assert!(mark.segment_depth >= 1 && mark.segment_depth <= state.depth);
        while state.depth > mark.segment_depth {
            self.pop_segment(&mut state);
        }
        state.current.cursor = mark.cursor;
        state.last_alloc = None;
    }

    /// Releases every segment but the first and empties it.
    pub fn reset(&self) {
        let mut state = self.state.borrow_mut();
        while state.depth > 1 {
            self.pop_segment(&mut state);
        }
        state.current.cursor = 0;
        state.last_alloc = None;
        tracing::trace!(target: "allocstack::linear", capacity = state.current.capacity, "arena reset");
    }

    fn pop_segment(&self, state: &mut ArenaState) {
        if let Some(prev) = state.current.prev.take() {
            let released = core::mem::replace(&mut state.current, prev);
            // SAFETY: the segment buffer came from `self.next`.
            unsafe { self.next.deallocate(released.data) };
            state.depth -= 1;
        }
    }

    fn grow(&self, state: &mut ArenaState, layout: Layout) -> Result<(), AllocError> {
        let needed = layout
            .size()
            .checked_add(HEADER_SIZE + layout.align())
            .ok_or(AllocError::InvalidLayout)?;
        let capacity = self.segment_size.max(needed);
        let segment = Segment::new(self.next, capacity)?;
        tracing::trace!(
            target: "allocstack::linear",
            capacity,
            depth = state.depth + 1,
            "arena grew a segment"
        );
        let previous = core::mem::replace(&mut state.current, segment);
        state.current.prev = Some(previous);
        state.depth += 1;
        Ok(())
    }
}

impl Allocator for LinearAllocator<'_> {
    fn kind(&self) -> AllocatorKind {
        AllocatorKind::Linear
    }

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let mut state = self.state.borrow_mut();
        let start = state.current.cursor;
        if let Some(ptr) = state.current.try_alloc(layout) {
            state.last_alloc = Some(LastAlloc { ptr, start });
            return Ok(ptr);
        }

        self.grow(&mut state, layout)?;
        let ptr = state
            .current
            .try_alloc(layout)
            .ok_or(AllocError::out_of_memory(layout))?;
        state.last_alloc = Some(LastAlloc { ptr, start: 0 });
        Ok(ptr)
    }

    unsafe fn resize(&self, ptr: NonNull<u8>, new_layout: Layout) -> Result<NonNull<u8>, AllocError> {
        {
            let mut state = self.state.borrow_mut();
            let is_last = state.last_alloc.is_some_and(|last| last.ptr == ptr);
            if is_last && (ptr.as_ptr() as usize) % new_layout.align() == 0 {
                let offset = ptr.as_ptr() as usize - state.current.base();
                let available = state.current.capacity - offset;
                if new_layout.size() > available {
                    return Err(AllocError::SegmentExhausted {
                        requested: new_layout.size(),
                        available,
                    });
                }
                state.current.cursor = offset + new_layout.size();
                write_header(ptr.as_ptr(), new_layout.size());
                return Ok(ptr);
            }
        }

        let old_size = read_header(ptr.as_ptr());
        let new = self.allocate(new_layout)?;
        ptr::copy_nonoverlapping(ptr.as_ptr(), new.as_ptr(), old_size.min(new_layout.size()));
        Ok(new)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        let mut state = self.state.borrow_mut();
        if let Some(last) = state.last_alloc {
            if last.ptr == ptr {
                state.current.cursor = last.start;
                state.last_alloc = None;
            }
        }
    }
}

impl Drop for LinearAllocator<'_> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let mut segment = Some(&*state.current);
        // Release buffers; the boxes themselves drop with `state`.
        while let Some(s) = segment {
            // SAFETY: every segment buffer came from `self.next`.
            unsafe { self.next.deallocate(s.data) };
            segment = s.prev.as_deref();
        }
    }
}

impl fmt::Debug for LinearAllocator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearAllocator")
            .field("segments", &self.segment_count())
            .field("cursor", &self.cursor())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Writes the size header in front of `data`.
///
/// # Safety
/// `data - HEADER_SIZE .. data` must be writable.
unsafe fn write_header(data: *mut u8, size: usize) {
    data.sub(HEADER_SIZE).cast::<u64>().write_unaligned(size as u64);
}

/// Reads the size header in front of `data`.
///
/// # Safety
/// `data` must be a block returned by a [`LinearAllocator`].
unsafe fn read_header(data: *const u8) -> usize {
    data.sub(HEADER_SIZE).cast::<u64>().read_unaligned() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::LIBC_ALLOCATOR;

    fn small_arena(size: usize) -> LinearAllocator<'static> {
        LinearAllocator::with_config(LinearConfig::uniform(size), &LIBC_ALLOCATOR).unwrap()
    }

    #[test]
    fn test_header_records_size() {
        let arena = small_arena(256);
        let ptr = arena.allocate(Layout::from_size_align(24, 8).unwrap()).unwrap();
        assert_eq!(unsafe { read_header(ptr.as_ptr()) }, 24);
        assert_eq!(ptr.as_ptr() as usize % 8, 0);
    }

    #[test]
    fn test_alignment_padding() {
        let arena = small_arena(512);
        arena.allocate(Layout::from_size_align(3, 1).unwrap()).unwrap();
        let ptr = arena.allocate(Layout::from_size_align(16, 64).unwrap()).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 64, 0);
    }

    #[test]
    fn test_pop_last_restores_cursor() {
        let arena = small_arena(256);
        arena.allocate(Layout::new::<u8>()).unwrap();
        let before = arena.cursor();
        let ptr = arena.allocate(Layout::new::<u64>()).unwrap();
        unsafe { arena.deallocate(ptr) };
        assert_eq!(arena.cursor(), before);
        // A second pop of the same pointer is ignored.
        unsafe { arena.deallocate(ptr) };
        assert_eq!(arena.cursor(), before);
    }

    #[test]
    fn test_resize_last_in_place_and_exhaustion() {
        let arena = small_arena(128);
        let ptr = arena.allocate(Layout::from_size_align(16, 8).unwrap()).unwrap();
        let grown = unsafe { arena.resize(ptr, Layout::from_size_align(64, 8).unwrap()) }.unwrap();
        assert_eq!(grown, ptr);
        assert_eq!(unsafe { read_header(ptr.as_ptr()) }, 64);

        let err = unsafe { arena.resize(ptr, Layout::from_size_align(1024, 8).unwrap()) };
        assert!(matches!(err, Err(AllocError::SegmentExhausted { requested: 1024, .. })));
        assert_eq!(arena.segment_count(), 1);
    }

    #[test]
    fn test_resize_non_last_copies() {
        let arena = small_arena(1024);
        let a = arena.allocate(Layout::array::<u8>(8).unwrap()).unwrap();
        unsafe { ptr::copy_nonoverlapping(b"abcdefgh".as_ptr(), a.as_ptr(), 8) };
        let _b = arena.allocate(Layout::new::<u64>()).unwrap();
        let moved = unsafe { arena.resize(a, Layout::array::<u8>(32).unwrap()) }.unwrap();
        assert_ne!(moved, a);
        let bytes = unsafe { core::slice::from_raw_parts(moved.as_ptr(), 8) };
        assert_eq!(bytes, b"abcdefgh");
    }

    #[test]
    fn test_growth_and_oversized_segment() {
        let arena = small_arena(64);
        arena.allocate(Layout::array::<u8>(40).unwrap()).unwrap();
        arena.allocate(Layout::array::<u8>(40).unwrap()).unwrap();
        assert_eq!(arena.segment_count(), 2);

        let big = arena.allocate(Layout::array::<u8>(1000).unwrap()).unwrap();
        assert_eq!(arena.segment_count(), 3);
        assert!(arena.owns(big));
        assert!(arena.capacity() >= 64 + 64 + 1000);
    }

    #[test]
    fn test_mark_and_rewind_across_segments() {
        let arena = small_arena(64);
        arena.allocate(Layout::array::<u8>(16).unwrap()).unwrap();
        let mark = arena.mark();
        for _ in 0..8 {
            arena.allocate(Layout::array::<u8>(32).unwrap()).unwrap();
        }
        assert!(arena.segment_count() > 1);
        arena.rewind(mark);
        assert_eq!(arena.segment_count(), 1);
        assert_eq!(arena.cursor(), mark.cursor());
    }

    #[test]
    fn test_debug_format() {
        let arena = small_arena(64);
        let debug = format!("{arena:?}");
        assert!(debug.contains("LinearAllocator"));
        assert!(debug.contains("segments"));
    }
}
