//! The ambient allocator-selection stack.
//!
//! Each thread owns a stack of [`AllocatorHandle`]s whose bottom entry is the
//! root [`LibcAllocator`](crate::alloc::LibcAllocator). The free functions in
//! this module ([`allocate`], [`resize`], ...) dispatch to whatever allocator
//! is on top of the current thread's stack.
//!
//! # Safety
//!
//! The stack stores lifetime-erased handles. [`with_allocator`] is the safe
//! entry point: it pushes for the dynamic extent of a closure and pops on
//! every exit path, so the allocator is guaranteed to outlive its entry. The
//! raw [`push_allocator`]/[`pop_allocator`] pair leaves that obligation to the
//! caller.

use crate::alloc::allocator::{array_layout, AllocError, Allocator, AllocatorHandle};
use crate::alloc::heap::LIBC_ALLOCATOR;
use core::alloc::Layout;
use core::cell::RefCell;
use core::ptr::NonNull;

thread_local! {
    static ALLOCATOR_STACK: RefCell<Vec<AllocatorHandle>> = RefCell::new(vec![
        // SAFETY: the root is a `static`.
        unsafe { AllocatorHandle::from_ref(&LIBC_ALLOCATOR) },
    ]);
}

/// Returns the allocator on top of the current thread's stack.
pub fn grab_current_allocator() -> AllocatorHandle {
    ALLOCATOR_STACK.with(|stack| {
        stack.borrow().last().copied().unwrap_or_else(|| {
            // SAFETY: the root is a `static`.
            unsafe { AllocatorHandle::from_ref(&LIBC_ALLOCATOR) }
        })
    })
}

/// Returns the number of entries on the current thread's stack, root included.
pub fn allocator_stack_depth() -> usize {
    ALLOCATOR_STACK.with(|stack| stack.borrow().len())
}

/// Pushes `allocator` as the current allocator.
///
/// # Safety
/// `allocator` must stay alive until the matching [`pop_allocator`] call.
/// Prefer [`with_allocator`].
pub unsafe fn push_allocator(allocator: &dyn Allocator) {
    let handle = AllocatorHandle::from_ref(allocator);
    tracing::trace!(target: "allocstack::stack", kind = %handle.kind(), "push allocator");
    ALLOCATOR_STACK.with(|stack| stack.borrow_mut().push(handle));
}

/// Pops the current allocator and returns its handle.
///
/// # Panics
/// Panics if only the root allocator is left: the thread must never run
/// without an allocator.
pub fn pop_allocator() -> AllocatorHandle {
    let popped = ALLOCATOR_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        if stack.len() <= 1 {
            return None;
        }
        stack.pop()
    });
    match popped {
        Some(handle) => {
            tracing::trace!(target: "allocstack::stack", kind = %handle.kind(), "pop allocator");
            handle
        }
        None => panic!("attempting to pop the last allocator on the stack"),
    }
}

/// Runs `f` with `allocator` selected as the current allocator.
///
/// The previous selection is restored when `f` returns, including when it
/// unwinds.
pub fn with_allocator<R>(allocator: &dyn Allocator, f: impl FnOnce() -> R) -> R {
    struct PopGuard;
    impl Drop for PopGuard {
        fn drop(&mut self) {
            pop_allocator();
        }
    }

    // SAFETY: `allocator` outlives this call and the guard pops before return.
    unsafe { push_allocator(allocator) };
    let _guard = PopGuard;
    f()
}

/// Runs `f` with a reference to the current allocator.
pub fn with_current_allocator<R>(f: impl FnOnce(&dyn Allocator) -> R) -> R {
    let handle = grab_current_allocator();
    // SAFETY: every entry above the root was pushed for a scope that is still
    // active on this thread.
    f(unsafe { handle.as_ref() })
}

/// Allocates `layout` from the current allocator.
///
/// # Errors
/// Propagates the current allocator's error.
pub fn allocate(layout: Layout) -> Result<NonNull<u8>, AllocError> {
    with_current_allocator(|a| a.allocate(layout))
}

/// Allocates a zeroed block from the current allocator.
///
/// # Errors
/// Propagates the current allocator's error.
pub fn allocate_zeroed(layout: Layout) -> Result<NonNull<u8>, AllocError> {
    with_current_allocator(|a| a.allocate_zeroed(layout))
}

/// Resizes a block owned by the current allocator.
///
/// # Errors
/// Propagates the current allocator's error.
///
/// # Safety
/// `ptr` must have been allocated by the current allocator.
pub unsafe fn resize(ptr: NonNull<u8>, new_layout: Layout) -> Result<NonNull<u8>, AllocError> {
    with_current_allocator(|a| a.resize(ptr, new_layout))
}

/// Releases a block owned by the current allocator.
///
/// # Safety
/// `ptr` must have been allocated by the current allocator.
pub unsafe fn deallocate(ptr: NonNull<u8>) {
    with_current_allocator(|a| a.deallocate(ptr));
}

/// Allocates `count` uninitialized values of `T` from the current allocator.
///
/// # Errors
/// [`AllocError::InvalidLayout`] on overflow, otherwise the allocator's error.
pub fn allocate_array<T>(count: usize) -> Result<NonNull<T>, AllocError> {
    allocate(array_layout::<T>(count)?).map(NonNull::cast)
}

/// Allocates `count` zeroed values of `T` from the current allocator.
///
/// # Errors
/// [`AllocError::InvalidLayout`] on overflow, otherwise the allocator's error.
pub fn allocate_array_zeroed<T>(count: usize) -> Result<NonNull<T>, AllocError> {
    allocate_zeroed(array_layout::<T>(count)?).map(NonNull::cast)
}

/// Resizes an array owned by the current allocator to `count` values.
///
/// # Errors
/// [`AllocError::InvalidLayout`] on overflow, otherwise the allocator's error.
///
/// # Safety
/// See [`resize`].
pub unsafe fn resize_array<T>(ptr: NonNull<T>, count: usize) -> Result<NonNull<T>, AllocError> {
    resize(ptr.cast(), array_layout::<T>(count)?).map(NonNull::cast)
}

/// Releases an array owned by the current allocator.
///
/// # Safety
/// See [`deallocate`].
pub unsafe fn deallocate_array<T>(ptr: NonNull<T>) {
    deallocate(ptr.cast());
}
