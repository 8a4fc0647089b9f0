//! The mount table: its lifetime, locking, and longest-prefix lookup
//! (§3, §4.3, §5). This is the hardest part of the spec.
//!
//! Grounded on the teacher's `src/vfs/mod.rs::MountTable` for overall shape
//! (a vector of entries, longest-path-wins resolution) and directly on
//! `original_source/kernel/fs.c`'s `find_mount`/`put_mount` for the exact
//! lifetime protocol. `ref_count` lives behind a per-mount `Mutex<usize>` —
//! the `lock` §3's data model gives every `Mount` — rather than a bare
//! atomic: `find`'s confirm-and-bump and `release`'s decrement-and-check
//! both run under that lock, so the two can never interleave. An atomic
//! counter alone isn't enough here: a `fetch_sub` that reaches zero and a
//! concurrent `find`'s `fetch_add` have no mutual exclusion between them,
//! which is exactly the race the source's own `put_mount` has (the one
//! flagged under "Open question — unmount ordering").

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use bitflags::bitflags;
use spin::{Mutex, RwLock};

use crate::backend::{Backend, Opaque, OpaqueCell};
use crate::block::BlockDevice;
use crate::console;
use crate::error::{VfsError, VfsResult};

bitflags! {
    /// What kind of thing a [`FileHandle`] refers to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HandleType: u8 {
        const REGULAR_FILE = 0b01;
        const DIRECTORY    = 0b10;
    }
}

/// The readdir yield (§3): a name and whether the entry is itself a
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// A live mount point (§3).
///
/// `ref_count` starts at 1 (the table's own slot) at construction and is
/// the authoritative holder count the spec's Glossary describes: it is
/// bumped by every successful [`MountTable::find`] and every handle
/// derived from one, and dropped to zero exactly once, by whichever
/// `release` call observes the transition — that thread, and only that
/// thread, tears the mount down. The `Mutex` guarding it is this mount's
/// `lock` (§3): both `find`'s bump and `release`'s decrement-and-check
/// run with it held.
pub struct Mount {
    path: String,
    device: Mutex<Box<dyn BlockDevice>>,
    backend: &'static dyn Backend,
    fs_data: OpaqueCell,
    ref_count: Mutex<usize>,
}

impl core::fmt::Debug for Mount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Mount")
            .field("path", &self.path)
            .field("ref_count", &self.ref_count)
            .finish_non_exhaustive()
    }
}

/// Stands in for a torn-down mount's device for the remainder of its
/// `Arc`'s lifetime. Nothing reaches it: `ref_count` hitting zero means no
/// handle can still be holding the mount to call through to it.
struct ClosedDevice;

impl BlockDevice for ClosedDevice {
    fn read(&self, _dest: &mut [u8], _offset: u64) -> VfsResult<usize> {
        Err(VfsError::BadDevice)
    }
}

impl Mount {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn backend(&self) -> &'static dyn Backend {
        self.backend
    }

    pub fn fs_data(&self) -> &OpaqueCell {
        &self.fs_data
    }

    pub fn device(&self) -> &Mutex<Box<dyn BlockDevice>> {
        &self.device
    }

    pub(crate) fn set_fs_data(&self, fs_data: Opaque) {
        *self.fs_data.lock() = fs_data;
    }
}

/// A caller-facing open file (§3). Holds a strong reference to exactly one
/// mount, contributing one unit to its `ref_count` for as long as it lives.
pub struct FileHandle {
    pub(crate) mount: Arc<Mount>,
    pub(crate) kind: HandleType,
    pub(crate) file_data: OpaqueCell,
}

impl core::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FileHandle")
            .field("mount", &self.mount)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl FileHandle {
    pub fn kind(&self) -> HandleType {
        self.kind
    }
}

/// A directory handle: a file handle known to be a directory, plus the
/// backend's per-directory cursor.
pub struct DirHandle {
    pub(crate) file: FileHandle,
    pub(crate) dir_data: OpaqueCell,
}

/// The set of live mounts, guarded by a reader/writer lock (`mounts_lock`
/// in §5). Readers: [`find`](MountTable::find). Writers:
/// [`insert`](MountTable::insert), [`remove`](MountTable::remove), and
/// teardown inside [`release`](MountTable::release).
pub struct MountTable {
    mounts: RwLock<Vec<Arc<Mount>>>,
}

impl MountTable {
    pub const fn new() -> Self {
        Self {
            mounts: RwLock::new(Vec::new()),
        }
    }

    /// Builds an unmounted, ref-count-1 mount ready for
    /// [`insert`](Self::insert). Not visible to [`find`](Self::find) until
    /// inserted.
    pub fn new_mount(
        path: String,
        device: Box<dyn BlockDevice>,
        backend: &'static dyn Backend,
        fs_data: Opaque,
    ) -> Arc<Mount> {
        Arc::new(Mount {
            path,
            device: Mutex::new(device),
            backend,
            fs_data: Mutex::new(fs_data),
            ref_count: Mutex::new(1),
        })
    }

    /// Appends `mount` under the write lock. Callers insert before running
    /// the backend's `mount` hook so a concurrent `find` never observes a
    /// half-initialized mount once it's in the table (§4.4 step 6).
    pub fn insert(&self, mount: Arc<Mount>) {
        self.mounts.write().push(mount);
    }

    /// Returns true if a mount already exists at `path` (exact match).
    pub fn exists(&self, path: &str) -> bool {
        self.mounts.read().iter().any(|m| m.path == path)
    }

    /// Removes `mount` from the table by identity, under the write lock.
    /// Used both to unwind a mount whose backend-level `mount` hook failed,
    /// and to drive teardown from [`release`](Self::release).
    fn remove(&self, mount: &Arc<Mount>) {
        let mut mounts = self.mounts.write();
        if let Some(idx) = mounts.iter().position(|m| Arc::ptr_eq(m, mount)) {
            mounts.remove(idx);
        }
    }

    /// Finds the mount whose `path` is the longest prefix of `abs_path`,
    /// under the read lock. On a match, takes the mount's own lock to
    /// confirm and bump `ref_count` — while still holding the table's read
    /// lock, so no concurrent `release` can be mid-teardown of this mount —
    /// and returns the mount along with the tail path (the mount prefix and
    /// one leading separator consumed).
    pub fn find(&self, abs_path: &str) -> Option<(Arc<Mount>, String)> {
        let mounts = self.mounts.read();
        let mut best: Option<&Arc<Mount>> = None;
        for mount in mounts.iter() {
            if abs_path.starts_with(mount.path.as_str())
                && best.is_none_or(|b| mount.path.len() > b.path.len())
            {
                best = Some(mount);
            }
        }
        let mount = best?;
        *mount.ref_count.lock() += 1;
        let tail = abs_path[mount.path.len()..].trim_start_matches('/');
        Some((Arc::clone(mount), String::from(tail)))
    }

    /// Decrements `mount`'s reference count by one under the mount's own
    /// lock. If that decrement took the count to zero, escalates to the
    /// table's write lock and re-checks: a concurrent `find` needs only the
    /// read lock to bump the count back up, so it could have slipped in
    /// between the mount-lock release above and the write-lock acquire
    /// here. Once both the write lock and the mount lock are held
    /// together, no `find` can be touching this mount — `find` can't hold
    /// the read lock while this call holds the write lock — so a recheck
    /// that still sees zero is final: the mount is removed, the backend's
    /// `unmount` runs, and the device is dropped (closing it), all before
    /// either lock is released.
    ///
    /// Returns `true` if this call tore the mount down.
    pub fn release(&self, mount: &Arc<Mount>) -> bool {
        {
            let mut count = mount.ref_count.lock();
            debug_assert!(*count >= 1, "ref_count underflow on release");
            *count -= 1;
            if *count != 0 {
                return false;
            }
        }

        let mut mounts = self.mounts.write();
        let count = mount.ref_count.lock();
        if *count != 0 {
            return false;
        }

        if let Some(idx) = mounts.iter().position(|m| Arc::ptr_eq(m, mount)) {
            mounts.remove(idx);
        }
        drop(mounts);
        drop(count);

        let fs_data = core::mem::replace(&mut *mount.fs_data.lock(), Box::new(()));
        mount.backend.unmount(fs_data);
        let device: Box<dyn BlockDevice> = core::mem::replace(&mut *mount.device.lock(), Box::new(ClosedDevice));
        drop(device);
        log("mount torn down");
        true
    }

    /// Removes `mount` from the table without invoking the backend's
    /// `unmount` hook. Used only when a backend's `mount` call itself
    /// failed, leaving no real `fs_data` for any teardown hook to act on.
    pub fn abandon(&self, mount: &Arc<Mount>) {
        self.remove(mount);
    }

    /// Number of holders of `mount`: the table's own slot plus every live
    /// handle and in-flight `find` bump. Exposed for the testable property
    /// in §8 ("sum of per-mount ref_count = live handles + live mounts").
    pub fn ref_count(mount: &Arc<Mount>) -> usize {
        *mount.ref_count.lock()
    }

    /// Number of mounts currently reachable from the table.
    pub fn len(&self) -> usize {
        self.mounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates a handle is of the expected kind, returning `BadHandler`
/// otherwise. Shared by every facade operation that requires a specific
/// handle type (§4.4).
pub(crate) fn require(kind: HandleType, required: HandleType) -> VfsResult<()> {
    if kind.contains(required) {
        Ok(())
    } else {
        Err(VfsError::BadHandler)
    }
}

fn log(msg: &str) {
    console::print(msg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemoryBlockDevice;
    use crate::dumbfs::DumbFs;

    static DUMBFS: DumbFs = DumbFs;

    fn fresh_mount(table: &MountTable, path: &str) -> Arc<Mount> {
        let device: Box<dyn BlockDevice> = Box::new(MemoryBlockDevice::new(alloc::vec![0u8; 4]));
        let fs_data: Opaque = Box::new(0u32);
        let mount = MountTable::new_mount(String::from(path), device, &DUMBFS, fs_data);
        table.insert(Arc::clone(&mount));
        mount
    }

    #[test]
    fn find_picks_longest_prefix() {
        let table = MountTable::new();
        fresh_mount(&table, "/");
        fresh_mount(&table, "/mnt");

        let (mount, tail) = table.find("/mnt/data").unwrap();
        assert_eq!(mount.path(), "/mnt");
        assert_eq!(tail, "data");

        table.release(&mount);
    }

    #[test]
    fn find_on_exact_mount_path_has_empty_tail() {
        let table = MountTable::new();
        fresh_mount(&table, "/");

        let (mount, tail) = table.find("/").unwrap();
        assert_eq!(tail, "");
        table.release(&mount);
    }

    #[test]
    fn find_bumps_and_release_drives_teardown_at_zero() {
        let table = MountTable::new();
        let mount = fresh_mount(&table, "/");
        assert_eq!(MountTable::ref_count(&mount), 1);

        let (found, _) = table.find("/").unwrap();
        assert_eq!(MountTable::ref_count(&mount), 2);

        assert!(!table.release(&found));
        assert_eq!(MountTable::ref_count(&mount), 1);
        assert_eq!(table.len(), 1);

        assert!(table.release(&mount));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn find_on_unmounted_path_is_none() {
        let table = MountTable::new();
        fresh_mount(&table, "/a");
        assert!(table.find("/b").is_none());
    }

    #[test]
    fn concurrent_find_and_release_never_double_tears_down() {
        use std::sync::Arc as StdArc;
        use std::thread;

        let table = StdArc::new(MountTable::new());
        let mount = fresh_mount(&table, "/");
        // One extra bump so both threads have something to release.
        let (extra, _) = table.find("/").unwrap();

        let t1 = {
            let table = StdArc::clone(&table);
            let mount = Arc::clone(&mount);
            thread::spawn(move || table.release(&mount))
        };
        let t2 = {
            let table = StdArc::clone(&table);
            thread::spawn(move || table.release(&extra))
        };

        let torn_down = [t1.join().unwrap(), t2.join().unwrap()];
        assert_eq!(torn_down.iter().filter(|&&b| b).count(), 1);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn concurrent_find_never_observes_a_torn_down_mount() {
        use std::sync::Arc as StdArc;
        use std::thread;

        let table = StdArc::new(MountTable::new());
        let mount = fresh_mount(&table, "/");

        let finder = {
            let table = StdArc::clone(&table);
            thread::spawn(move || {
                for _ in 0..1000 {
                    if let Some((found, _)) = table.find("/") {
                        // A torn-down mount's `fs_data` would be the `()`
                        // placeholder `release` swaps in; if `find` could
                        // ever hand back a mount mid-teardown this
                        // downcast would fail.
                        assert!(found.fs_data().lock().downcast_ref::<u32>().is_some());
                        table.release(&found);
                    }
                }
            })
        };

        // Races the table's own slot down to zero against the loop above.
        table.release(&mount);
        finder.join().unwrap();
    }
}
