#![cfg(all(feature = "bookkeeping", feature = "leak-detection"))]

use allocstack::alloc::{with_allocator, Allocator, BookkeepingAllocator, PrintingAllocator, LIBC_ALLOCATOR};
use std::alloc::Layout;
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn capture(f: impl FnOnce()) -> String {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(captured.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    captured.contents()
}

#[test]
fn test_printing_logs_every_call() {
    let output = capture(|| {
        let printing = PrintingAllocator::new(&LIBC_ALLOCATOR);
        let ptr = printing.allocate(Layout::array::<u8>(48).unwrap()).unwrap();
        let ptr = unsafe { printing.resize(ptr, Layout::array::<u8>(96).unwrap()) }.unwrap();
        unsafe { printing.deallocate(ptr) };
    });
    assert!(output.contains("allocstack::printing"));
    assert!(output.contains("allocate"));
    assert!(output.contains("resize"));
    assert!(output.contains("deallocate"));
}

#[test]
fn test_stack_push_pop_traced() {
    let printing = PrintingAllocator::new(&LIBC_ALLOCATOR);
    let output = capture(|| with_allocator(&printing, || {}));
    assert!(output.contains("push allocator"));
    assert!(output.contains("pop allocator"));
}

#[test]
fn test_bookkeeping_statistics_logged() {
    let bookkeeping = BookkeepingAllocator::new(&LIBC_ALLOCATOR);
    let ptr = bookkeeping.allocate(Layout::new::<u64>()).unwrap();
    unsafe { bookkeeping.deallocate(ptr) };
    let output = capture(|| bookkeeping.print_statistics());
    assert!(output.contains("bookkeeping allocator statistics"));
    assert!(output.contains("allocate=1"));
    assert!(output.contains("deallocate=1"));
}

#[test]
fn test_leak_report_logged() {
    use allocstack::alloc::LeakDetectingAllocator;

    let detector = LeakDetectingAllocator::new(&LIBC_ALLOCATOR);
    detector.allocate(Layout::array::<u8>(5).unwrap()).unwrap();
    let output = capture(|| detector.print_leak_statistics());
    assert!(output.contains("leak report"));
    assert!(output.contains("cd cd cd cd cd"));
    detector.deallocate_everything_still_allocated();
}

#[test]
fn test_unknown_free_warns_under_warn_policy() {
    use allocstack::alloc::{InvalidFreePolicy, LeakDetectingAllocator};

    let detector = LeakDetectingAllocator::with_policy(&LIBC_ALLOCATOR, InvalidFreePolicy::Warn);
    let foreign = LIBC_ALLOCATOR.allocate(Layout::new::<u64>()).unwrap();
    let output = capture(|| unsafe { detector.deallocate(foreign) });
    assert!(output.contains("WARN"));
    assert!(output.contains("allocstack::leaks"));
    assert!(output.contains("not allocated"));
    assert_eq!(detector.outstanding(), 0);
    unsafe { LIBC_ALLOCATOR.deallocate(foreign) };
}
