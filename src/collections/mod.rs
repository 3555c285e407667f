//! Containers whose storage comes from an explicit [`Allocator`](crate::alloc::Allocator).
//!
//! - [`ArrayList`]: contiguous growable array
//! - [`bucket`]: pointer-stable bucket lists, queues and object slots

pub mod array_list;
pub mod bucket;

pub use array_list::ArrayList;
pub use bucket::{BucketList, BucketQueue, TypedBucketAllocator};
