//! Boot-time heap.
//!
//! The kernel allocator proper — page tables, PMM-backed growth — is
//! outside this crate's scope; what the `_start` binary needs is enough
//! of a `GlobalAlloc` to let `alloc` work at all. A fixed static buffer
//! claimed once at boot, ported down from the teacher's talc-based path
//! in `allocator.rs` with the page-allocator/PMM half removed.

use spin::Mutex;
use talc::{ErrOnOom, Span, Talc};

const HEAP_SIZE: usize = 4 * 1024 * 1024;

static mut HEAP: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

#[global_allocator]
static ALLOCATOR: Talcky = Talcky;

static TALC: Mutex<Talc<ErrOnOom>> = Mutex::new(Talc::new(ErrOnOom));

/// Claims the static heap buffer. Must run once, before the first
/// allocation.
pub fn init() {
    unsafe {
        let span = Span::from_base_size(core::ptr::addr_of_mut!(HEAP) as *mut u8, HEAP_SIZE);
        TALC.lock().claim(span).expect("failed to claim boot heap");
    }
}

struct Talcky;

unsafe impl core::alloc::GlobalAlloc for Talcky {
    unsafe fn alloc(&self, layout: core::alloc::Layout) -> *mut u8 {
        unsafe { TALC.lock().malloc(layout).map_or(core::ptr::null_mut(), |p| p.as_ptr()) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: core::alloc::Layout) {
        unsafe {
            if let Some(ptr) = core::ptr::NonNull::new(ptr) {
                TALC.lock().free(ptr, layout);
            }
        }
    }
}
