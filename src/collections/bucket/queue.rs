//! `BucketQueue` - a FIFO over a [`BucketList`].

use super::list::BucketList;
use crate::alloc::{AllocError, Allocator};
use core::fmt;

/// A first-in first-out queue built on [`BucketList`].
///
/// Once the head moves past the first bucket, that bucket is released and the
/// directory shifts down by one slot. A queue that drains completely rewinds
/// all of its indices, so a long-lived producer/consumer pair does not walk
/// the directory forever.
pub struct BucketQueue<'a, T> {
    list: BucketList<'a, T>,
    head: usize,
}

impl<'a, T> BucketQueue<'a, T> {
    /// Creates an empty queue. See [`BucketList::new_in`].
    ///
    /// # Errors
    /// Fails if the directory cannot be allocated.
    pub fn new_in(
        allocator: &'a dyn Allocator,
        bucket_capacity: usize,
        initial_buckets: usize,
    ) -> Result<Self, AllocError> {
        Ok(Self {
            list: BucketList::new_in(allocator, bucket_capacity, initial_buckets)?,
            head: 0,
        })
    }

    /// Number of queued elements.
    pub fn len(&self) -> usize {
        self.list.len() - self.head
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of directory slots currently owning a bucket.
    pub fn materialized_buckets(&self) -> usize {
        self.list.materialized_buckets()
    }

    /// Appends `value` at the tail.
    ///
    /// # Errors
    /// Fails if the underlying list cannot grow.
    pub fn push_back(&mut self, value: T) -> Result<(), AllocError> {
        self.list.push(value).map(drop)
    }

    /// The element at the head, if any.
    pub fn peek(&self) -> Option<&T> {
        self.list.get(self.head)
    }

    /// Removes and returns the element at the head.
    pub fn get_next(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: `head < len`; the slot is logically consumed by advancing `head`.
        let value = unsafe { self.list.slot(self.head).as_ptr().read() };
        self.head += 1;

        if self.head == self.list.len() {
            self.head = 0;
            self.list.forget_elements();
        } else if self.head >= self.list.bucket_capacity {
            self.list.release_bucket(0);
            self.list.buckets.rotate_left(1);
            self.list.active_bucket -= 1;
            self.head -= self.list.bucket_capacity;
            tracing::trace!(target: "allocstack::bucket", "queue released head bucket");
        }
        Some(value)
    }

    /// Drops every queued element. Buckets are kept.
    pub fn clear(&mut self) {
        let (head, len) = (self.head, self.list.len());
        self.list.drop_range(head, len);
        self.list.forget_elements();
        self.head = 0;
    }
}

impl<T> Drop for BucketQueue<'_, T> {
    fn drop(&mut self) {
        // Slots before `head` were moved out; only the live range is dropped.
        self.clear();
    }
}

impl<T: fmt::Debug> fmt::Debug for BucketQueue<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.list.iter().skip(self.head)).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::LIBC_ALLOCATOR;
    use std::rc::Rc;

    #[test]
    fn test_fifo_order() {
        let mut queue = BucketQueue::new_in(&LIBC_ALLOCATOR, 4, 1).unwrap();
        for i in 0..10 {
            queue.push_back(i).unwrap();
        }
        assert_eq!(queue.peek(), Some(&0));
        let drained: Vec<_> = core::iter::from_fn(|| queue.get_next()).collect();
        assert_eq!(drained, (0..10).collect::<Vec<_>>());
        assert!(queue.is_empty());
        assert_eq!(queue.get_next(), None);
    }

    #[test]
    fn test_head_bucket_is_released() {
        let mut queue = BucketQueue::new_in(&LIBC_ALLOCATOR, 2, 1).unwrap();
        for i in 0..6 {
            queue.push_back(i).unwrap();
        }
        assert_eq!(queue.materialized_buckets(), 3);
        assert_eq!(queue.get_next(), Some(0));
        assert_eq!(queue.get_next(), Some(1));
        assert_eq!(queue.materialized_buckets(), 2);
        assert_eq!(queue.len(), 4);
        queue.push_back(6).unwrap();
        assert_eq!(queue.get_next(), Some(2));
        assert_eq!(queue.peek(), Some(&3));
    }

    #[test]
    fn test_interleaved_producer_consumer() {
        let mut queue = BucketQueue::new_in(&LIBC_ALLOCATOR, 3, 1).unwrap();
        let mut expected = 0;
        for round in 0..50 {
            for i in 0..3 {
                queue.push_back(round * 3 + i).unwrap();
            }
            for _ in 0..2 {
                assert_eq!(queue.get_next(), Some(expected));
                expected += 1;
            }
        }
        assert_eq!(queue.len(), 50);
        // Only the buckets covering the live range stay materialized.
        assert!(queue.materialized_buckets() <= 50 / 3 + 2);
    }

    #[test]
    fn test_drop_only_drops_live_range() {
        let marker = Rc::new(());
        {
            let mut queue = BucketQueue::new_in(&LIBC_ALLOCATOR, 2, 1).unwrap();
            for _ in 0..5 {
                queue.push_back(Rc::clone(&marker)).unwrap();
            }
            drop(queue.get_next());
            assert_eq!(Rc::strong_count(&marker), 5);
        }
        assert_eq!(Rc::strong_count(&marker), 1);
    }
}
