#![no_std]
#![no_main]

extern crate alloc;

mod allocator;

use alloc::boxed::Box;
use alloc::vec;
use core::panic::PanicInfo;

use vfskern::backend::{self, Backend, BackendDescriptor};
use vfskern::block::{self, MemoryBlockDevice};
use vfskern::config;
use vfskern::console;
use vfskern::dumbfs::DumbFs;
use vfskern::selftest;
use vfskern::vfs;

static DUMBFS: DumbFs = DumbFs;

#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    loop {}
}

/// The bytes of the root ramdisk image. A real boot loader hands this in;
/// here it's the same literal archive the self-tests exercise, so a fresh
/// boot always has something mounted at `/` to look at.
fn initrd_image() -> alloc::vec::Vec<u8> {
    let mut bytes = alloc::vec::Vec::new();
    bytes.extend_from_slice(&2u32.to_le_bytes());
    bytes.extend_from_slice(&9u32.to_le_bytes());
    bytes.extend_from_slice(&5u32.to_le_bytes());
    bytes.extend_from_slice(b"a\0");
    bytes.extend_from_slice(b"hello");
    bytes.extend_from_slice(&10u32.to_le_bytes());
    bytes.extend_from_slice(&5u32.to_le_bytes());
    bytes.extend_from_slice(b"bb\0");
    bytes.extend_from_slice(b"world");
    bytes
}

#[unsafe(no_mangle)]
pub extern "C" fn _start() -> ! {
    allocator::init();

    backend::init(vec![BackendDescriptor {
        name: DUMBFS.name(),
        ops: &DUMBFS,
    }]);
    block::register_device(config::ROOT_DEVICE_NAME, Box::new(MemoryBlockDevice::new(initrd_image())));

    assert!(
        vfs::mount("/", "/", config::ROOT_BACKEND_NAME, config::ROOT_DEVICE_NAME).is_ok(),
        "failed to mount root filesystem"
    );
    console::print("filesystem mounted on '/'\n");

    let (_passed, failed) = selftest::run_all();
    assert_eq!(failed, 0, "VFS self-test failures at boot");

    loop {}
}
