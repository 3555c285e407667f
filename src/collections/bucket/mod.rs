//! Bucket-of-buckets storage.
//!
//! - [`BucketList`]: pointer-stable growable sequence
//! - [`BucketQueue`]: FIFO on top of a bucket list
//! - [`TypedBucketAllocator`]: object slots with a free list

mod list;
mod queue;
mod typed;

pub use list::{BucketList, Iter};
pub use queue::BucketQueue;
pub use typed::TypedBucketAllocator;
