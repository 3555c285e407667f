//! Scratch arenas for transient allocations.
//!
//! Every thread owns two stock [`LinearAllocator`]s. A scratch scope records
//! the position of one of them and rewinds it when the scope ends, releasing
//! everything allocated in between.
//!
//! Two arenas exist so that a function running inside an outer scratch scope
//! can ask for "the other one" and never bump the same cursor as its caller:
//! [`scratch_start`] skips both the arena of the `previous` checkpoint and the
//! currently selected allocator.
//!
//! Scopes opened on the same arena must end in LIFO order. Ending them out of
//! order is not detected.
//!
//! The arenas are created on a thread's first scratch use and leaked, so
//! [`ScratchCheckpoint::arena`] can return a `'static` reference. Each such
//! thread keeps at least two `SCRATCH_SEGMENT_SIZE` segments alive until the
//! process exits; rewinding returns space to the arena, never to libc.

use crate::alloc::allocator::Allocator;
use crate::alloc::bump::{ArenaMark, LinearAllocator};
use crate::alloc::config::{LinearConfig, SCRATCH_SEGMENT_SIZE};
use crate::alloc::heap::LIBC_ALLOCATOR;
use crate::alloc::stack::{grab_current_allocator, with_allocator};
use core::fmt;
use core::marker::PhantomData;

type ScratchArenas = [LinearAllocator<'static>; 2];

thread_local! {
    // Leaked once per thread so checkpoints can hand out `'static` references.
    static SCRATCH_ARENAS: &'static ScratchArenas = Box::leak(Box::new(new_scratch_arenas()));
}

fn new_scratch_arenas() -> ScratchArenas {
    let config = LinearConfig::uniform(SCRATCH_SEGMENT_SIZE);
    let make = || match LinearAllocator::with_config(config, &LIBC_ALLOCATOR) {
        Ok(arena) => arena,
        Err(err) => panic!("cannot create scratch arena: {err}"),
    };
    [make(), make()]
}

fn scratch_arenas() -> &'static ScratchArenas {
    SCRATCH_ARENAS.with(|arenas| *arenas)
}

/// A saved position in one of the two scratch arenas.
///
/// Created by [`scratch_start`], consumed by [`scratch_end`]. Not `Send`: the
/// arenas belong to the creating thread.
#[must_use = "a scratch checkpoint must be passed to `scratch_end`"]
pub struct ScratchCheckpoint {
    index: usize,
    mark: ArenaMark,
    _not_send: PhantomData<*const ()>,
}

impl ScratchCheckpoint {
    /// The arena this checkpoint belongs to.
    pub fn arena(&self) -> &'static LinearAllocator<'static> {
        &scratch_arenas()[self.index]
    }

    /// Which of the two stock arenas was picked (0 or 1).
    pub const fn arena_index(&self) -> usize {
        self.index
    }

    /// The saved position.
    pub const fn mark(&self) -> ArenaMark {
        self.mark
    }
}

impl fmt::Debug for ScratchCheckpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScratchCheckpoint")
            .field("arena", &self.index)
            .field("mark", &self.mark)
            .finish()
    }
}

/// Opens a scratch scope on a stock arena that is neither the arena of
/// `previous` nor the currently selected allocator.
pub fn scratch_start(previous: Option<&ScratchCheckpoint>) -> ScratchCheckpoint {
    let arenas = scratch_arenas();
    let current = grab_current_allocator();
    let index = (0..arenas.len())
        .find(|&i| previous.map_or(true, |p| p.index != i) && !current.is(&arenas[i]))
        // Both are excluded only if `previous` is one arena and the other is
        // selected; neither choice is then alias-free, keep the unselected one.
        .unwrap_or_else(|| usize::from(current.is(&arenas[0])));
    let mark = arenas[index].mark();
    tracing::trace!(target: "allocstack::scratch", arena = index, cursor = mark.cursor(), "scratch start");
    ScratchCheckpoint {
        index,
        mark,
        _not_send: PhantomData,
    }
}

/// Closes a scratch scope, releasing everything allocated in it.
pub fn scratch_end(checkpoint: ScratchCheckpoint) {
    tracing::trace!(target: "allocstack::scratch", arena = checkpoint.index, "scratch end");
    checkpoint.arena().rewind(checkpoint.mark);
}

/// Runs `f` inside a scratch scope with the scratch arena selected as the
/// current allocator. The scope ends on every exit path of `f`.
pub fn with_scratch<R>(
    previous: Option<&ScratchCheckpoint>,
    f: impl FnOnce(&ScratchCheckpoint) -> R,
) -> R {
    struct EndGuard(ScratchCheckpoint);
    impl Drop for EndGuard {
        fn drop(&mut self) {
            tracing::trace!(target: "allocstack::scratch", arena = self.0.index, "scratch end");
            self.0.arena().rewind(self.0.mark);
        }
    }

    let guard = EndGuard(scratch_start(previous));
    let arena: &dyn Allocator = guard.0.arena();
    with_allocator(arena, || f(&guard.0))
}
