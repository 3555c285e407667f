//! `BookkeepingAllocator` - counts calls per operation.

use crate::alloc::allocator::{AllocError, Allocator, AllocatorKind};
use core::alloc::Layout;
use core::cell::Cell;
use core::fmt;
use core::ptr::NonNull;

/// Per-operation call counts of a [`BookkeepingAllocator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AllocationStats {
    /// Calls to `allocate`.
    pub allocate_calls: u64,
    /// Calls to `allocate_zeroed`.
    pub allocate_zeroed_calls: u64,
    /// Calls to `resize`.
    pub resize_calls: u64,
    /// Calls to `deallocate`.
    pub deallocate_calls: u64,
}

impl AllocationStats {
    /// Allocation calls of either flavour.
    pub const fn total_allocations(&self) -> u64 {
        self.allocate_calls + self.allocate_zeroed_calls
    }

    /// Allocations not yet matched by a deallocation.
    ///
    /// Saturates at zero when more frees than allocations were recorded.
    pub const fn outstanding(&self) -> u64 {
        self.total_allocations().saturating_sub(self.deallocate_calls)
    }
}

impl fmt::Display for AllocationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    allocate: {}", self.allocate_calls)?;
        writeln!(f, "  allocate_0: {}", self.allocate_zeroed_calls)?;
        writeln!(f, "      resize: {}", self.resize_calls)?;
        write!(f, "  deallocate: {}", self.deallocate_calls)
    }
}

/// Counts every call, then forwards to `next`. Failed calls are counted too.
pub struct BookkeepingAllocator<'a> {
    next: &'a dyn Allocator,
    allocate_calls: Cell<u64>,
    allocate_zeroed_calls: Cell<u64>,
    resize_calls: Cell<u64>,
    deallocate_calls: Cell<u64>,
}

impl<'a> BookkeepingAllocator<'a> {
    /// Wraps `next` with all counters at zero.
    pub fn new(next: &'a dyn Allocator) -> Self {
        Self {
            next,
            allocate_calls: Cell::new(0),
            allocate_zeroed_calls: Cell::new(0),
            resize_calls: Cell::new(0),
            deallocate_calls: Cell::new(0),
        }
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> AllocationStats {
        AllocationStats {
            allocate_calls: self.allocate_calls.get(),
            allocate_zeroed_calls: self.allocate_zeroed_calls.get(),
            resize_calls: self.resize_calls.get(),
            deallocate_calls: self.deallocate_calls.get(),
        }
    }

    /// Zeroes all counters.
    pub fn reset_stats(&self) {
        self.allocate_calls.set(0);
        self.allocate_zeroed_calls.set(0);
        self.resize_calls.set(0);
        self.deallocate_calls.set(0);
    }

    /// Logs the counters at `INFO` level.
    pub fn print_statistics(&self) {
        let stats = self.stats();
        tracing::info!(
            target: "allocstack::bookkeeping",
            allocate = stats.allocate_calls,
            allocate_zeroed = stats.allocate_zeroed_calls,
            resize = stats.resize_calls,
            deallocate = stats.deallocate_calls,
            "bookkeeping allocator statistics"
        );
    }
}

fn bump(counter: &Cell<u64>) {
    counter.set(counter.get() + 1);
}

impl Allocator for BookkeepingAllocator<'_> {
    fn kind(&self) -> AllocatorKind {
        AllocatorKind::Bookkeeping
    }

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        bump(&self.allocate_calls);
        self.next.allocate(layout)
    }

    fn allocate_zeroed(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        bump(&self.allocate_zeroed_calls);
        self.next.allocate_zeroed(layout)
    }

    unsafe fn resize(&self, ptr: NonNull<u8>, new_layout: Layout) -> Result<NonNull<u8>, AllocError> {
        bump(&self.resize_calls);
        self.next.resize(ptr, new_layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        bump(&self.deallocate_calls);
        self.next.deallocate(ptr);
    }

    fn next(&self) -> Option<&dyn Allocator> {
        Some(self.next)
    }
}

impl fmt::Debug for BookkeepingAllocator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BookkeepingAllocator")
            .field("stats", &self.stats())
            .finish()
    }
}
