//! `GrowablePoolAllocator` - a slot pool that grows in fixed-size chunks.

use crate::alloc::allocator::{AllocError, Allocator};
use core::alloc::Layout;
use core::fmt;
use core::mem::ManuallyDrop;
use core::ptr::NonNull;

union GrowableCell<T> {
    next_free: Option<NonNull<GrowableCell<T>>>,
    // Only sizes and aligns the cell; slots are handed out as raw `T`.
    #[allow(dead_code)]
    element: ManuallyDrop<T>,
}

#[repr(C)]
struct ChunkHeader {
    next_chunk: Option<NonNull<ChunkHeader>>,
}

/// A pool of `T` slots that allocates another chunk whenever it runs dry.
///
/// Each chunk is one block from the backing allocator: a header linking it
/// to the previous chunk, followed by `elements_per_chunk` cells. Free cells
/// form a single intrusive list across all chunks. Like
/// [`PoolAllocator`](crate::alloc::PoolAllocator), slots are handed out
/// uninitialized and destructors are never run.
pub struct GrowablePoolAllocator<'a, T> {
    allocator: &'a dyn Allocator,
    chunks: Option<NonNull<ChunkHeader>>,
    free_list: Option<NonNull<GrowableCell<T>>>,
    elements_per_chunk: usize,
    chunk_layout: Layout,
    cells_offset: usize,
    chunk_count: usize,
}

impl<'a, T> GrowablePoolAllocator<'a, T> {
    /// Creates an empty pool; the first chunk is allocated on first use.
    ///
    /// # Errors
    /// [`AllocError::InvalidLayout`] if `elements_per_chunk` is zero or the
    /// chunk size overflows.
    pub fn new_in(allocator: &'a dyn Allocator, elements_per_chunk: usize) -> Result<Self, AllocError> {
        if elements_per_chunk == 0 {
            return Err(AllocError::InvalidLayout);
        }
        let cells = Layout::array::<GrowableCell<T>>(elements_per_chunk).map_err(|_| AllocError::InvalidLayout)?;
        let (chunk_layout, cells_offset) = Layout::new::<ChunkHeader>()
            .extend(cells)
            .map_err(|_| AllocError::InvalidLayout)?;
        Ok(Self {
            allocator,
            chunks: None,
            free_list: None,
            elements_per_chunk,
            chunk_layout: chunk_layout.pad_to_align(),
            cells_offset,
            chunk_count: 0,
        })
    }

    /// Slots per chunk.
    pub const fn elements_per_chunk(&self) -> usize {
        self.elements_per_chunk
    }

    /// Number of chunks allocated so far.
    pub const fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    fn cells_of(&self, chunk: NonNull<ChunkHeader>) -> NonNull<GrowableCell<T>> {
        // SAFETY: `cells_offset` lies within `chunk_layout`.
        unsafe { NonNull::new_unchecked(chunk.as_ptr().cast::<u8>().add(self.cells_offset)).cast() }
    }

    /// Threads every cell of `chunk` onto the front of the free list.
    fn init_chunk(&mut self, chunk: NonNull<ChunkHeader>) {
        let cells = self.cells_of(chunk);
        let mut next = self.free_list;
        for index in (0..self.elements_per_chunk).rev() {
            // SAFETY: `index < elements_per_chunk`.
            let cell = unsafe { NonNull::new_unchecked(cells.as_ptr().add(index)) };
            unsafe { cell.as_ptr().write(GrowableCell { next_free: next }) };
            next = Some(cell);
        }
        self.free_list = next;
    }

    fn allocate_new_chunk(&mut self) -> Result<(), AllocError> {
        let chunk = self.allocator.allocate(self.chunk_layout)?.cast::<ChunkHeader>();
        // SAFETY: fresh block large enough for the header.
        unsafe {
            chunk.as_ptr().write(ChunkHeader {
                next_chunk: self.chunks,
            });
        }
        self.chunks = Some(chunk);
        self.chunk_count += 1;
        self.init_chunk(chunk);
        tracing::debug!(
            target: "allocstack::pool",
            chunks = self.chunk_count,
            elements_per_chunk = self.elements_per_chunk,
            "pool chunk allocated"
        );
        Ok(())
    }

    /// Takes a free slot, allocating a new chunk if none is left.
    ///
    /// # Errors
    /// Fails only if the backing allocator cannot provide a new chunk.
    pub fn allocate(&mut self) -> Result<NonNull<T>, AllocError> {
        if self.free_list.is_none() {
            self.allocate_new_chunk()?;
        }
        let Some(cell) = self.free_list else {
            unreachable!("a fresh chunk always refills the free list");
        };
        // SAFETY: cells on the free list hold a link.
        self.free_list = unsafe { (*cell.as_ptr()).next_free };
        Ok(cell.cast())
    }

    /// Returns `ptr`'s slot to the pool.
    ///
    /// # Safety
    /// `ptr` must come from [`allocate`](Self::allocate) on this pool and must
    /// not already be free. Any value in it is forgotten.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<T>) {
        let cell = ptr.cast::<GrowableCell<T>>();
        cell.as_ptr().write(GrowableCell {
            next_free: self.free_list,
        });
        self.free_list = Some(cell);
    }

    /// Marks every slot in every chunk free again. Chunks are kept.
    pub fn reset(&mut self) {
        self.free_list = None;
        let mut chunk = self.chunks;
        while let Some(current) = chunk {
            self.init_chunk(current);
            // SAFETY: chunk headers stay valid until drop.
            chunk = unsafe { (*current.as_ptr()).next_chunk };
        }
    }

    /// Number of slots currently handed out.
    ///
    /// Walks the free list, so it costs `O(chunks + free slots)`.
    pub fn count_allocated_elements(&self) -> usize {
        let mut free = 0;
        let mut cell = self.free_list;
        while let Some(current) = cell {
            free += 1;
            // SAFETY: free cells hold a link.
            cell = unsafe { (*current.as_ptr()).next_free };
        }
        self.chunk_count * self.elements_per_chunk - free
    }
}

impl<T> Drop for GrowablePoolAllocator<'_, T> {
    fn drop(&mut self) {
        let mut chunk = self.chunks.take();
        while let Some(current) = chunk {
            // SAFETY: header is valid until the chunk is released below.
            chunk = unsafe { (*current.as_ptr()).next_chunk };
            unsafe { self.allocator.deallocate(current.cast()) };
        }
    }
}

impl<T> fmt::Debug for GrowablePoolAllocator<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrowablePoolAllocator")
            .field("elements_per_chunk", &self.elements_per_chunk)
            .field("chunks", &self.chunk_count)
            .field("allocated", &self.count_allocated_elements())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{LinearAllocator, LIBC_ALLOCATOR};

    #[test]
    fn test_grows_by_chunks() {
        let mut pool = GrowablePoolAllocator::<u64>::new_in(&LIBC_ALLOCATOR, 4).unwrap();
        assert_eq!(pool.chunk_count(), 0);
        let slots: Vec<_> = (0..10).map(|_| pool.allocate().unwrap()).collect();
        assert_eq!(pool.chunk_count(), 3);
        assert_eq!(pool.count_allocated_elements(), 10);
        for (i, slot) in slots.iter().enumerate() {
            unsafe { slot.as_ptr().write(i as u64) };
        }
        for (i, slot) in slots.iter().enumerate() {
            assert_eq!(unsafe { *slot.as_ptr() }, i as u64);
        }
    }

    #[test]
    fn test_freed_slot_is_reused_before_growing() {
        let mut pool = GrowablePoolAllocator::<u32>::new_in(&LIBC_ALLOCATOR, 2).unwrap();
        let a = pool.allocate().unwrap();
        let _b = pool.allocate().unwrap();
        unsafe { pool.deallocate(a) };
        assert_eq!(pool.allocate().unwrap(), a);
        assert_eq!(pool.chunk_count(), 1);
    }

    #[test]
    fn test_reset_keeps_chunks() {
        let mut pool = GrowablePoolAllocator::<[u8; 24]>::new_in(&LIBC_ALLOCATOR, 3).unwrap();
        for _ in 0..7 {
            pool.allocate().unwrap();
        }
        assert_eq!(pool.chunk_count(), 3);
        pool.reset();
        assert_eq!(pool.count_allocated_elements(), 0);
        for _ in 0..9 {
            pool.allocate().unwrap();
        }
        assert_eq!(pool.chunk_count(), 3);
    }

    #[test]
    fn test_chunks_come_from_backing_allocator() {
        let arena = LinearAllocator::new(4096, &LIBC_ALLOCATOR).unwrap();
        let mut pool = GrowablePoolAllocator::<u64>::new_in(&arena, 8).unwrap();
        let slot = pool.allocate().unwrap();
        assert!(arena.owns(slot.cast()));
    }
}
