//! `LeakDetectingAllocator` - tracks live blocks and reports what was never freed.

use crate::alloc::allocator::{AllocError, Allocator, AllocatorKind};
use crate::alloc::config::{HEX_DUMP_LIMIT, POISON_BYTE};
use crate::collections::ArrayList;
use core::alloc::Layout;
use core::cell::RefCell;
use core::fmt::{self, Write as _};
use core::ptr::{self, NonNull};

/// What to do when a pointer the detector never handed out is freed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum InvalidFreePolicy {
    /// Panic with the offending address.
    #[default]
    Panic,
    /// Log a warning and drop the request without forwarding it.
    Warn,
}

#[derive(Debug, Clone, Copy)]
struct AllocationInfo {
    ptr: NonNull<u8>,
    size: usize,
}

/// One outstanding block in a [`LeakReport`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LeakEntry {
    /// Address of the block.
    pub addr: usize,
    /// Size the block was requested with.
    pub size: usize,
    /// Up to [`HEX_DUMP_LIMIT`] bytes of content, space separated.
    pub hex_dump: String,
}

/// Blocks still outstanding at the time of the report, in address order.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct LeakReport {
    /// One entry per block.
    pub entries: Vec<LeakEntry>,
    /// Sum of all entry sizes.
    pub total_bytes: usize,
    /// Number of entries.
    pub count: usize,
}

impl LeakReport {
    /// Returns `true` if nothing leaked.
    pub fn is_clean(&self) -> bool {
        self.count == 0
    }
}

impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} allocation(s) still live, {} bytes", self.count, self.total_bytes)?;
        for entry in &self.entries {
            writeln!(f, "  {:#x} ({} bytes): {}", entry.addr, entry.size, entry.hex_dump)?;
        }
        Ok(())
    }
}

fn hex_dump(ptr: NonNull<u8>, size: usize) -> String {
    let shown = size.min(HEX_DUMP_LIMIT);
    // SAFETY: the block is live and every byte of it was written at
    // allocation time (poison or zero) or by the user since.
    let bytes = unsafe { core::slice::from_raw_parts(ptr.as_ptr(), shown) };
    let mut out = String::with_capacity(shown * 3 + 4);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02x}");
    }
    if size > shown {
        out.push_str(" ...");
    }
    out
}

/// Forwards to `next`, remembering the address and size of every live block.
///
/// Fresh blocks from `allocate` and grown tails from `resize` are filled with
/// [`POISON_BYTE`], so a leak report shows which bytes were never written.
pub struct LeakDetectingAllocator<'a> {
    next: &'a dyn Allocator,
    policy: InvalidFreePolicy,
    live: RefCell<ArrayList<'a, AllocationInfo>>,
}

impl<'a> LeakDetectingAllocator<'a> {
    /// Wraps `next`; invalid frees panic.
    pub fn new(next: &'a dyn Allocator) -> Self {
        Self::with_policy(next, InvalidFreePolicy::Panic)
    }

    /// Wraps `next` with an explicit invalid-free policy.
    pub fn with_policy(next: &'a dyn Allocator, policy: InvalidFreePolicy) -> Self {
        Self {
            next,
            policy,
            live: RefCell::new(ArrayList::new_in(next)),
        }
    }

    /// The configured invalid-free policy.
    pub fn policy(&self) -> InvalidFreePolicy {
        self.policy
    }

    /// Number of live blocks.
    pub fn outstanding(&self) -> usize {
        self.live.borrow().len()
    }

    /// Sum of the sizes of all live blocks.
    pub fn outstanding_bytes(&self) -> usize {
        self.live.borrow().iter().map(|info| info.size).sum()
    }

    /// Builds a report of every live block.
    pub fn leak_report(&self) -> LeakReport {
        let live = self.live.borrow();
        let entries: Vec<LeakEntry> = live
            .iter()
            .map(|info| LeakEntry {
                addr: info.ptr.as_ptr() as usize,
                size: info.size,
                hex_dump: hex_dump(info.ptr, info.size),
            })
            .collect();
        LeakReport {
            total_bytes: entries.iter().map(|e| e.size).sum(),
            count: entries.len(),
            entries,
        }
    }

    /// Logs the leak report at `INFO` level, one event per block.
    pub fn print_leak_statistics(&self) {
        let report = self.leak_report();
        tracing::info!(
            target: "allocstack::leaks",
            count = report.count,
            total_bytes = report.total_bytes,
            "leak report"
        );
        for entry in &report.entries {
            tracing::info!(
                target: "allocstack::leaks",
                addr = format_args!("{:#x}", entry.addr),
                size = entry.size,
                bytes = %entry.hex_dump,
                "still allocated"
            );
        }
    }

    /// Releases every live block through `next`.
    pub fn deallocate_everything_still_allocated(&self) {
        let mut live = self.live.borrow_mut();
        while let Some(info) = live.pop() {
            // SAFETY: tracked blocks came from `self.next` and are live.
            unsafe { self.next.deallocate(info.ptr) };
        }
    }

    fn find(&self, ptr: NonNull<u8>) -> Result<usize, usize> {
        self.live.borrow().binary_search_by_key(&ptr, |info| info.ptr)
    }

    fn track(&self, ptr: NonNull<u8>, size: usize) -> Result<(), AllocError> {
        let index = self.find(ptr).unwrap_or_else(|i| i);
        self.live.borrow_mut().insert(index, AllocationInfo { ptr, size })
    }

    fn tracked(&self, ptr: NonNull<u8>, size: usize) -> Result<NonNull<u8>, AllocError> {
        if let Err(err) = self.track(ptr, size) {
            // SAFETY: `ptr` was just allocated by `self.next`.
            unsafe { self.next.deallocate(ptr) };
            return Err(err);
        }
        Ok(ptr)
    }

    #[track_caller]
    fn invalid_free(&self, ptr: NonNull<u8>) {
        match self.policy {
            InvalidFreePolicy::Panic => panic!("attempting to free {ptr:p} which was not allocated"),
            InvalidFreePolicy::Warn => {
                tracing::warn!(target: "allocstack::leaks", addr = ?ptr, "attempting to free a pointer which was not allocated");
            }
        }
    }
}

impl Allocator for LeakDetectingAllocator<'_> {
    fn kind(&self) -> AllocatorKind {
        AllocatorKind::LeakDetecting
    }

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.next.allocate(layout)?;
        // SAFETY: fresh block of `layout.size()` bytes.
        unsafe { ptr::write_bytes(ptr.as_ptr(), POISON_BYTE, layout.size()) };
        self.tracked(ptr, layout.size())
    }

    fn allocate_zeroed(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.next.allocate_zeroed(layout)?;
        self.tracked(ptr, layout.size())
    }

    unsafe fn resize(&self, ptr: NonNull<u8>, new_layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let Ok(index) = self.find(ptr) else {
            self.invalid_free(ptr);
            return Err(AllocError::InvalidLayout);
        };
        let old_size = self.live.borrow()[index].size;
        let new = self.next.resize(ptr, new_layout)?;
        let new_size = new_layout.size();
        if new_size > old_size {
            ptr::write_bytes(new.as_ptr().add(old_size), POISON_BYTE, new_size - old_size);
        }
        self.live.borrow_mut().remove(index);
        if let Err(err) = self.track(new, new_size) {
            self.next.deallocate(new);
            return Err(err);
        }
        Ok(new)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>) {
        match self.find(ptr) {
            Ok(index) => {
                self.live.borrow_mut().remove(index);
                self.next.deallocate(ptr);
            }
            Err(_) => self.invalid_free(ptr),
        }
    }

    fn next(&self) -> Option<&dyn Allocator> {
        Some(self.next)
    }
}

impl fmt::Debug for LeakDetectingAllocator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeakDetectingAllocator")
            .field("policy", &self.policy)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::LIBC_ALLOCATOR;

    #[test]
    fn test_report_lists_live_blocks() {
        let detector = LeakDetectingAllocator::new(&LIBC_ALLOCATOR);
        let a = detector.allocate(Layout::array::<u8>(4).unwrap()).unwrap();
        let b = detector.allocate_zeroed(Layout::array::<u8>(100).unwrap()).unwrap();
        let c = detector.allocate(Layout::new::<u64>()).unwrap();
        unsafe {
            a.as_ptr().write(0xAB);
            detector.deallocate(c);
        }

        let report = detector.leak_report();
        assert_eq!(report.count, 2);
        assert_eq!(report.total_bytes, 104);
        let small = report.entries.iter().find(|e| e.addr == a.as_ptr() as usize).unwrap();
        assert_eq!(small.hex_dump, "ab cd cd cd");
        let big = report.entries.iter().find(|e| e.addr == b.as_ptr() as usize).unwrap();
        assert!(big.hex_dump.starts_with("00 00"));
        assert!(big.hex_dump.ends_with(" ..."));

        detector.deallocate_everything_still_allocated();
        assert!(detector.leak_report().is_clean());
    }

    #[test]
    fn test_resize_updates_size_and_poisons_tail() {
        let detector = LeakDetectingAllocator::new(&LIBC_ALLOCATOR);
        let ptr = detector.allocate_zeroed(Layout::array::<u8>(2).unwrap()).unwrap();
        let grown = unsafe { detector.resize(ptr, Layout::array::<u8>(4).unwrap()) }.unwrap();
        assert_eq!(detector.outstanding_bytes(), 4);
        assert_eq!(detector.leak_report().entries[0].hex_dump, "00 00 cd cd");
        unsafe { detector.deallocate(grown) };
        assert_eq!(detector.outstanding(), 0);
    }

    #[test]
    #[should_panic(expected = "which was not allocated")]
    fn test_invalid_free_panics() {
        let detector = LeakDetectingAllocator::new(&LIBC_ALLOCATOR);
        let mut local = 0u8;
        unsafe { detector.deallocate(NonNull::from(&mut local)) };
    }

    #[test]
    fn test_invalid_free_warns() {
        let detector = LeakDetectingAllocator::with_policy(&LIBC_ALLOCATOR, InvalidFreePolicy::Warn);
        let mut local = 0u8;
        unsafe { detector.deallocate(NonNull::from(&mut local)) };
        assert_eq!(detector.outstanding(), 0);
    }

    #[test]
    fn test_report_serializes() {
        let detector = LeakDetectingAllocator::new(&LIBC_ALLOCATOR);
        let _ = detector.allocate(Layout::array::<u8>(3).unwrap()).unwrap();
        let json = serde_json::to_value(detector.leak_report()).unwrap();
        assert_eq!(json["count"], 1);
        assert_eq!(json["total_bytes"], 3);
        assert_eq!(json["entries"][0]["hex_dump"], "cd cd cd");
        detector.deallocate_everything_still_allocated();
    }
}
