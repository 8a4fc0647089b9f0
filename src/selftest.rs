//! Boot-time self-check runner (§6, §8 scenarios), run once after the root
//! filesystem is mounted. Ported from the teacher's `run_all_tests`
//! pattern in `tests.rs`/`fs_tests.rs`: a `run_test!` macro tallying
//! pass/fail against a fixed check list, logged through [`console`].

use alloc::boxed::Box;
use alloc::format;
use alloc::vec::Vec;

use crate::block::{self, MemoryBlockDevice};
use crate::console;
use crate::error::VfsError;
use crate::path;
use crate::vfs;

/// `[file_count=2, {entry_size=9,file_size=5}"a\0""hello",
/// {entry_size=10,file_size=5}"bb\0""world"]` — the §8 scenario 4/6
/// literal archive, also used for the boot-time smoke check.
fn sample_archive() -> Vec<u8> {
    let mut bytes = Vec::new();
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

/// Runs every self-check, logging a pass/fail line each, and returns
/// `(passed, failed)`.
pub fn run_all() -> (u32, u32) {
    log("\n[VFS self-test] starting\n");

    let mut passed = 0u32;
    let mut failed = 0u32;

    macro_rules! run_test {
        ($test_fn:expr, $name:expr) => {
            if $test_fn() {
                passed += 1;
                log(&format!("[VFS self-test] {} - PASSED\n", $name));
            } else {
                failed += 1;
                log(&format!("[VFS self-test] {} - FAILED\n", $name));
            }
        };
    }

    run_test!(test_normalization_table, "normalization_table");
    run_test!(test_mount_twice_is_already_mounted, "mount_twice_is_already_mounted");
    run_test!(test_busy_then_unmount_after_close, "busy_then_unmount_after_close");
    run_test!(test_open_read_seek, "open_read_seek");
    run_test!(test_readdir_sequence, "readdir_sequence");

    log(&format!(
        "[VFS self-test] complete: {passed} passed, {failed} failed\n"
    ));
    (passed, failed)
}

fn test_normalization_table() -> bool {
    let cases: &[(&str, &str)] = &[
        ("///", "/"),
        ("/a/./b/../c", "/a/c"),
        ("/a/b/../../..", "/"),
        ("/a//b", "/a/b"),
        ("/.hidden/..x", "/.hidden/..x"),
    ];
    cases.iter().all(|(input, expected)| path::normalize(input) == *expected)
        && path::normalize(&path::resolve_input("/x", "a/b")) == "/x/a/b"
}

fn test_mount_twice_is_already_mounted() -> bool {
    block::register_device("selftest-dev-a", Box::new(MemoryBlockDevice::new(sample_archive())));
    if vfs::mount("/", "/selftest-a", "dumbfs", "selftest-dev-a").is_err() {
        return false;
    }

    block::register_device("selftest-dev-a2", Box::new(MemoryBlockDevice::new(sample_archive())));
    let result = vfs::mount("/", "/selftest-a", "dumbfs", "selftest-dev-a2");

    let ok = matches!(result, Err(VfsError::AlreadyMounted));
    let _ = vfs::unmount("/", "/selftest-a");
    ok
}

fn test_busy_then_unmount_after_close() -> bool {
    block::register_device("selftest-dev-b", Box::new(MemoryBlockDevice::new(sample_archive())));
    if vfs::mount("/", "/selftest-b", "dumbfs", "selftest-dev-b").is_err() {
        return false;
    }

    let handle = match vfs::open("/", "/selftest-b/a") {
        Ok(h) => h,
        Err(_) => return false,
    };

    let busy = matches!(vfs::unmount("/", "/selftest-b"), Err(VfsError::TargetBusy));
    if vfs::close(handle).is_err() {
        return false;
    }

    busy && vfs::unmount("/", "/selftest-b").is_ok()
}

fn test_open_read_seek() -> bool {
    block::register_device("selftest-dev-c", Box::new(MemoryBlockDevice::new(sample_archive())));
    if vfs::mount("/", "/selftest-c", "dumbfs", "selftest-dev-c").is_err() {
        return false;
    }

    let handle = match vfs::open("/", "/selftest-c/a") {
        Ok(h) => h,
        Err(_) => return false,
    };

    let mut buf = [0u8; 5];
    let read_ok = vfs::read(&handle, &mut buf) == Ok(5) && &buf == b"hello";
    let seek_ok = vfs::seek(&handle, 100) == Ok(5);

    let _ = vfs::close(handle);
    let _ = vfs::unmount("/", "/selftest-c");
    read_ok && seek_ok
}

fn test_readdir_sequence() -> bool {
    block::register_device("selftest-dev-d", Box::new(MemoryBlockDevice::new(sample_archive())));
    if vfs::mount("/", "/selftest-d", "dumbfs", "selftest-dev-d").is_err() {
        return false;
    }

    let root = match vfs::open("/", "/selftest-d") {
        Ok(h) => h,
        Err(_) => return false,
    };
    let dir = match vfs::opendir(root) {
        Ok(d) => d,
        Err((h, _)) => {
            let _ = vfs::close(h);
            let _ = vfs::unmount("/", "/selftest-d");
            return false;
        }
    };

    let first = vfs::readdir(&dir).map(|e| e.name);
    let second = vfs::readdir(&dir).map(|e| e.name);
    let third = vfs::readdir(&dir);

    let ok = first.as_deref() == Ok("a") && second.as_deref() == Ok("bb") && third.is_err();

    let _ = vfs::closedir(dir);
    let _ = vfs::unmount("/", "/selftest-d");
    ok
}

fn log(msg: &str) {
    console::print(msg);
}
