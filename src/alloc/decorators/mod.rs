//! Allocators that wrap another allocator.
//!
//! A decorator holds a shared reference to the allocator it forwards to, so
//! chains are built bottom-up and cannot form cycles. All decorators report
//! their inner allocator through [`Allocator::next`](crate::alloc::Allocator::next).

#[cfg(feature = "bookkeeping")]
mod bookkeeping;
#[cfg(feature = "leak-detection")]
mod leak_detecting;
mod panicking;
mod printing;
mod resettable;

#[cfg(feature = "bookkeeping")]
pub use bookkeeping::{AllocationStats, BookkeepingAllocator};
#[cfg(feature = "leak-detection")]
pub use leak_detecting::{InvalidFreePolicy, LeakDetectingAllocator, LeakEntry, LeakReport};
pub use panicking::PanickingAllocator;
pub use printing::PrintingAllocator;
pub use resettable::ResettableAllocator;
