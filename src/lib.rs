//! # `allocstack` - Composable Allocators with an Ambient Selection Stack
//!
//! A small allocator framework for single-threaded programs that want to pick
//! their memory strategy per scope instead of per call site.
//!
//! ## Key Features
//!
//! - **One interface**: every strategy implements [`Allocator`], and every
//!   client talks to `&dyn Allocator`
//! - **Ambient selection**: a per-thread stack decides which allocator the free
//!   functions ([`alloc::allocate`], [`alloc::resize`], ...) use
//! - **Arenas and scratch space**: a segmented bump arena with marks, plus two
//!   per-thread scratch arenas for transient work
//! - **Decorators**: logging, call counting, panic-on-failure, bulk reset and
//!   leak detection, stackable in any order
//! - **Object storage**: pointer-stable bucket lists and fixed-slot pools built
//!   on top of any allocator
//!
//! ## Architecture
//!
//! Allocators form chains. A decorator borrows the allocator it forwards to,
//! so chains are finite and acyclic by construction and always end in a
//! non-wrapping allocator such as [`LibcAllocator`] or [`LinearAllocator`].
//!
//! The selection stack stores lifetime-erased [`AllocatorHandle`]s rooted at
//! [`LIBC_ALLOCATOR`]. [`with_allocator`] pushes for the extent of a closure
//! and pops on every exit path, which is what keeps those handles valid.
//!
//! Failures are values ([`AllocError`]) until a [`PanickingAllocator`] turns
//! them into panics at a boundary the caller picks.
//!
//! ## Example
//!
//! ```rust
//! use allocstack::alloc::{self, LinearAllocator, with_allocator, LIBC_ALLOCATOR};
//!
//! let arena = LinearAllocator::new(4096, &LIBC_ALLOCATOR).unwrap();
//! with_allocator(&arena, || {
//!     let values = alloc::allocate_array::<u32>(16).unwrap();
//!     assert!(arena.owns(values.cast()));
//! });
//! // Everything the closure allocated goes away with the arena.
//! ```
//!
//! [`Allocator`]: alloc::Allocator
//! [`AllocatorHandle`]: alloc::AllocatorHandle
//! [`AllocError`]: alloc::AllocError
//! [`LibcAllocator`]: alloc::LibcAllocator
//! [`LinearAllocator`]: alloc::LinearAllocator
//! [`LIBC_ALLOCATOR`]: alloc::LIBC_ALLOCATOR
//! [`PanickingAllocator`]: alloc::PanickingAllocator
//! [`with_allocator`]: alloc::with_allocator

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]

pub mod alloc;
pub mod collections;

pub use alloc::{AllocError, Allocator, AllocatorKind, LinearAllocator, LIBC_ALLOCATOR};
pub use collections::{ArrayList, BucketList, BucketQueue, TypedBucketAllocator};

// Compile-time assertions for layout assumptions
const _: () = {
    use core::mem;

    // The arena header stores a `u64` length in front of every block.
    assert!(alloc::HEADER_SIZE == mem::size_of::<u64>());

    // Segment alignment must cover every malloc-aligned request.
    assert!(alloc::SEGMENT_ALIGN >= alloc::MALLOC_ALIGN);
    assert!(alloc::SEGMENT_ALIGN.is_power_of_two());

    // Handles are a kind plus one fat pointer.
    assert!(mem::size_of::<alloc::AllocatorHandle>() <= mem::size_of::<usize>() * 3);
};
