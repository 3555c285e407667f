//! Allocators and the machinery for choosing between them.
//!
//! - [`Allocator`]: the byte-level interface everything dispatches through
//! - [`LibcAllocator`]: the root, backed by the C heap
//! - [`LinearAllocator`]: segmented bump arena with marks
//! - [`stack`]: the per-thread selection stack and the free functions that use it
//! - [`scratch`]: two per-thread arenas for transient work
//! - [`decorators`]: wrappers that log, count, panic, reset or detect leaks
//! - [`PoolAllocator`] / [`GrowablePoolAllocator`]: fixed-size object slots

pub mod allocator;
pub mod bump;
pub mod config;
pub mod decorators;
pub mod growable_pool;
pub mod heap;
pub mod pool;
pub mod scratch;
pub mod stack;

pub use allocator::{AllocError, Allocator, AllocatorHandle, AllocatorKind, Chain};
pub use bump::{ArenaMark, LinearAllocator};
pub use config::{
    align_up, LinearConfig, DEFAULT_SEGMENT_SIZE, HEADER_SIZE, HEX_DUMP_LIMIT, POISON_BYTE, SCRATCH_SEGMENT_SIZE,
    SEGMENT_ALIGN,
};
#[cfg(feature = "bookkeeping")]
pub use decorators::{AllocationStats, BookkeepingAllocator};
#[cfg(feature = "leak-detection")]
pub use decorators::{InvalidFreePolicy, LeakDetectingAllocator, LeakEntry, LeakReport};
pub use decorators::{PanickingAllocator, PrintingAllocator, ResettableAllocator};
pub use growable_pool::GrowablePoolAllocator;
pub use heap::{LibcAllocator, LIBC_ALLOCATOR, MALLOC_ALIGN};
pub use pool::PoolAllocator;
pub use scratch::{scratch_end, scratch_start, with_scratch, ScratchCheckpoint};
pub use stack::{
    allocate, allocate_array, allocate_array_zeroed, allocate_zeroed, allocator_stack_depth, deallocate,
    deallocate_array, grab_current_allocator, pop_allocator, push_allocator, resize, resize_array,
    with_allocator, with_current_allocator,
};
