//! The VFS facade (§4.4): the public operations every caller goes
//! through. Grounded on `original_source/kernel/fs.c`'s `fs_mount` /
//! `fs_unmount` / `fs_open` / ... family, with the cleanup-on-error-path
//! discipline preserved and the unmount race fixed per §9's Design Notes.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;

use crate::backend::{self, Opaque};
use crate::block;
use crate::error::{VfsError, VfsResult};
use crate::mount::{self, DirEntry, DirHandle, FileHandle, HandleType, MountTable};
use crate::path;

static TABLE: MountTable = MountTable::new();

fn canonicalize(cwd: &str, input: &str) -> String {
    path::normalize(&path::resolve_input(cwd, input))
}

/// Mounts `backend_name` on `path`, bound to the block device `device_name`
/// (§4.4 steps 1-7).
pub fn mount(cwd: &str, path: &str, backend_name: &str, device_name: &str) -> VfsResult<()> {
    let canonical = canonicalize(cwd, path);

    let backend = backend::find_backend(backend_name).ok_or(VfsError::NotFound)?;

    if TABLE.exists(&canonical) {
        return Err(VfsError::AlreadyMounted);
    }

    let device = block::bdev_open(device_name).ok_or(VfsError::NotFound)?;

    let placeholder: Opaque = Box::new(());
    let new_mount = MountTable::new_mount(canonical, device, backend, placeholder);
    TABLE.insert(Arc::clone(&new_mount));

    match backend.mount(new_mount.device()) {
        Ok(fs_data) => {
            new_mount.set_fs_data(fs_data);
            Ok(())
        }
        Err(err) => {
            // backend.mount never ran to completion, so there is no real
            // fs_data for the backend to tear down: undo the insert
            // directly instead of going through `release`.
            TABLE.abandon(&new_mount);
            Err(err)
        }
    }
}

/// Unmounts the filesystem at `path` if it has no other holders (§4.4).
pub fn unmount(cwd: &str, path: &str) -> VfsResult<()> {
    let canonical = canonicalize(cwd, path);
    let (found, _tail) = TABLE.find(&canonical).ok_or(VfsError::NotFound)?;

    // `find` just bumped ref_count to at least 2, so this can never itself
    // be the decrement that drives it to zero.
    TABLE.release(&found);

    if MountTable::ref_count(&found) > 1 {
        return Err(VfsError::TargetBusy);
    }

    TABLE.release(&found);
    Ok(())
}

/// Opens the file at `path` (§4.4).
pub fn open(cwd: &str, path: &str) -> VfsResult<FileHandle> {
    let canonical = canonicalize(cwd, path);
    let (found, tail) = TABLE.find(&canonical).ok_or(VfsError::NotFound)?;

    let opened = {
        let device = found.device().lock();
        found.backend().open(device.as_ref(), found.fs_data(), &tail)
    };

    match opened {
        Ok(opened) => {
            let kind = if opened.is_directory {
                HandleType::DIRECTORY
            } else {
                HandleType::REGULAR_FILE
            };
            Ok(FileHandle {
                mount: found,
                kind,
                file_data: spin::Mutex::new(opened.file_data),
            })
        }
        Err(err) => {
            TABLE.release(&found);
            Err(err)
        }
    }
}

/// Promotes `file` to a directory handle (§4.4). On error the file handle
/// is handed back to the caller unharmed.
pub fn opendir(file: FileHandle) -> Result<DirHandle, (FileHandle, VfsError)> {
    if !file.kind.contains(HandleType::DIRECTORY) {
        return Err((file, VfsError::NotDirectory));
    }

    let dir_data = file.mount.backend().opendir(file.mount.fs_data(), &file.file_data);
    match dir_data {
        Ok(dir_data) => Ok(DirHandle {
            file,
            dir_data: spin::Mutex::new(dir_data),
        }),
        Err(err) => Err((file, err)),
    }
}

/// Reads up to `dest.len()` bytes from `file` (§4.4).
pub fn read(file: &FileHandle, dest: &mut [u8]) -> VfsResult<usize> {
    mount::require(file.kind, HandleType::REGULAR_FILE)?;
    let device = file.mount.device().lock();
    file.mount
        .backend()
        .read(device.as_ref(), file.mount.fs_data(), &file.file_data, dest)
}

/// Moves `file`'s seek position, clamped to end-of-file (§4.4).
pub fn seek(file: &FileHandle, offset: u64) -> VfsResult<u64> {
    mount::require(file.kind, HandleType::REGULAR_FILE)?;
    Ok(file.mount.backend().seek(file.mount.fs_data(), &file.file_data, offset))
}

/// Closes `file`, always releasing the mount reference regardless of
/// whether the backend's close reports a commit failure (§4.4).
pub fn close(file: FileHandle) -> VfsResult<()> {
    let result = file.mount.backend().close(file.mount.fs_data(), file.file_data.into_inner());
    TABLE.release(&file.mount);
    result
}

/// Closes `dir`, then closes its underlying file handle (§4.4). A commit
/// failure on the underlying close is surfaced; closing the directory
/// cursor itself cannot fail.
pub fn closedir(dir: DirHandle) -> VfsResult<()> {
    dir.file.mount.backend().closedir(dir.file.mount.fs_data(), dir.dir_data.into_inner());
    close(dir.file)
}

/// Yields the next entry of `dir`, or `EndOfDirectory` once exhausted
/// (§4.4).
pub fn readdir(dir: &DirHandle) -> VfsResult<DirEntry> {
    let device = dir.file.mount.device().lock();
    dir.file
        .mount
        .backend()
        .readdir(device.as_ref(), dir.file.mount.fs_data(), &dir.dir_data)
}

/// Live mount count, for diagnostics and the §8 testable properties.
pub fn mount_count() -> usize {
    TABLE.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendDescriptor;
    use crate::block::MemoryBlockDevice;
    use crate::dumbfs::DumbFs;
    use alloc::vec::Vec;
    use std::sync::Once;

    static DUMBFS: DumbFs = DumbFs;
    static INIT: Once = Once::new();

    fn ensure_backend_registered() {
        INIT.call_once(|| {
            backend::init(alloc::vec![BackendDescriptor {
                name: "dumbfs",
                ops: &DUMBFS,
            }]);
        });
    }

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

    fn mount_fresh_archive(device_name: &str, mount_path: &str) {
        ensure_backend_registered();
        block::register_device(device_name, Box::new(MemoryBlockDevice::new(sample_archive())));
        mount("/", mount_path, "dumbfs", device_name).unwrap();
    }

    #[test]
    fn mount_then_mount_again_is_already_mounted() {
        mount_fresh_archive("dev-a", "/scenario-a");
        block::register_device("dev-a-2", Box::new(MemoryBlockDevice::new(sample_archive())));
        assert_eq!(
            mount("/", "/scenario-a", "dumbfs", "dev-a-2").unwrap_err(),
            VfsError::AlreadyMounted
        );
        unmount("/", "/scenario-a").unwrap();
    }

    #[test]
    fn mount_unknown_backend_is_not_found() {
        ensure_backend_registered();
        block::register_device("dev-b", Box::new(MemoryBlockDevice::new(sample_archive())));
        assert_eq!(
            mount("/", "/scenario-b", "ext4", "dev-b").unwrap_err(),
            VfsError::NotFound
        );
    }

    #[test]
    fn unmount_busy_while_handle_open_then_ok_after_close() {
        mount_fresh_archive("dev-c", "/scenario-c");

        let handle = open("/", "/scenario-c/a").unwrap();
        assert_eq!(unmount("/", "/scenario-c").unwrap_err(), VfsError::TargetBusy);

        close(handle).unwrap();
        unmount("/", "/scenario-c").unwrap();
    }

    #[test]
    fn open_read_seek_roundtrip_matches_scenario_four() {
        mount_fresh_archive("dev-d", "/scenario-d");

        let handle = open("/", "/scenario-d/a").unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(read(&handle, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(seek(&handle, 100).unwrap(), 5);

        close(handle).unwrap();
        unmount("/", "/scenario-d").unwrap();
    }

    #[test]
    fn readdir_yields_both_entries_then_end_of_directory() {
        mount_fresh_archive("dev-e", "/scenario-e");

        let root = open("/", "/scenario-e").unwrap();
        let dir = opendir(root).unwrap();

        assert_eq!(readdir(&dir).unwrap().name, "a");
        assert_eq!(readdir(&dir).unwrap().name, "bb");
        assert_eq!(readdir(&dir).unwrap_err(), VfsError::EndOfDirectory);

        closedir(dir).unwrap();
        unmount("/", "/scenario-e").unwrap();
    }

    #[test]
    fn opendir_on_regular_file_is_not_directory() {
        mount_fresh_archive("dev-f", "/scenario-f");

        let file = open("/", "/scenario-f/a").unwrap();
        match opendir(file) {
            Err((handle, err)) => {
                assert_eq!(err, VfsError::NotDirectory);
                close(handle).unwrap();
            }
            Ok(_) => panic!("expected NotDirectory"),
        }
        unmount("/", "/scenario-f").unwrap();
    }

    #[test]
    fn read_on_directory_handle_is_bad_handler() {
        mount_fresh_archive("dev-g", "/scenario-g");

        let root = open("/", "/scenario-g").unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(read(&root, &mut buf).unwrap_err(), VfsError::BadHandler);
        close(root).unwrap();
        unmount("/", "/scenario-g").unwrap();
    }

    #[test]
    fn open_after_unmount_is_not_found() {
        mount_fresh_archive("dev-h", "/scenario-h");
        unmount("/", "/scenario-h").unwrap();
        assert_eq!(open("/", "/scenario-h/a").unwrap_err(), VfsError::NotFound);
    }

    #[test]
    fn concurrent_open_and_unmount_never_observe_an_intermediate_state() {
        use std::sync::Barrier;
        use std::thread;

        ensure_backend_registered();
        block::register_device("dev-i", Box::new(MemoryBlockDevice::new(sample_archive())));
        mount("/", "/scenario-i", "dumbfs", "dev-i").unwrap();

        let barrier = std::sync::Arc::new(Barrier::new(2));
        let b1 = std::sync::Arc::clone(&barrier);

        let opener = thread::spawn(move || {
            b1.wait();
            open("/", "/scenario-i/a")
        });
        barrier.wait();
        let unmount_result = unmount("/", "/scenario-i");
        let open_result = opener.join().unwrap();

        match (open_result, unmount_result) {
            (Ok(handle), Err(VfsError::TargetBusy)) => {
                close(handle).unwrap();
                unmount("/", "/scenario-i").unwrap();
            }
            (Err(VfsError::NotFound), Ok(())) => {}
            other => panic!("unexpected interleaving: {other:?}"),
        }
    }
}
