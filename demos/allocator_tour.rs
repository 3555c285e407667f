//! Walks through the allocator stack: arenas, scratch scopes, decorators,
//! bucket lists and pools.
//!
//! Run with `RUST_LOG=trace` to see every event.

use allocstack::alloc::{
    self, with_allocator, BookkeepingAllocator, GrowablePoolAllocator, LeakDetectingAllocator, LinearAllocator,
    LinearConfig, PrintingAllocator, LIBC_ALLOCATOR,
};
use allocstack::collections::{BucketList, BucketQueue};
use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let bookkeeping = BookkeepingAllocator::new(&LIBC_ALLOCATOR);
    let printing = PrintingAllocator::new(&bookkeeping);

    let config: LinearConfig = serde_json::from_str(r#"{ "initial_size": 1024, "segment_size": 4096 }"#)
        .context("parsing arena config")?;
    let arena = LinearAllocator::with_config(config, &printing).context("creating arena")?;

    let words = with_allocator(&arena, || -> Result<usize> {
        let mut list = BucketList::new_in(&arena, 8, 1)?;
        for word in "the quick brown fox jumps over the lazy dog".split(' ') {
            list.push(word)?;
        }
        Ok(list.len())
    })?;
    tracing::info!(words, segments = arena.segment_count(), "bucket list built in arena");

    let checksum = alloc::with_scratch(None, |_| -> Result<u64> {
        let numbers = alloc::allocate_array::<u64>(256)?;
        let mut sum = 0;
        for i in 0..256 {
            unsafe {
                numbers.as_ptr().add(i).write(i as u64);
                sum += *numbers.as_ptr().add(i);
            }
        }
        Ok(sum)
    })?;
    tracing::info!(checksum, "scratch work done");

    let mut queue = BucketQueue::new_in(&LIBC_ALLOCATOR, 4, 1)?;
    for job in 0..10 {
        queue.push_back(job)?;
    }
    while let Some(job) = queue.get_next() {
        tracing::debug!(job, "processed");
    }

    let detector = LeakDetectingAllocator::new(&LIBC_ALLOCATOR);
    let mut pool = GrowablePoolAllocator::<[u8; 32]>::new_in(&detector, 4)?;
    for _ in 0..10 {
        pool.allocate()?;
    }
    tracing::info!(chunks = pool.chunk_count(), "pool grown");
    detector.print_leak_statistics();
    drop(pool);
    anyhow::ensure!(detector.leak_report().is_clean(), "pool leaked chunks");

    drop(arena);
    bookkeeping.print_statistics();
    println!("{}", bookkeeping.stats());
    Ok(())
}
