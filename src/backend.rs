//! Backend operation table and registry (§4.2, §6).

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::any::Any;
use once_cell::race::OnceBox;
use spin::Mutex;

use crate::block::BlockDevice;
use crate::error::VfsResult;
use crate::mount::DirEntry;

/// Backend-owned state, type-erased. A backend downcasts this back to its
/// own concrete type; no other code ever inspects it.
pub type Opaque = Box<dyn Any + Send + Sync>;

/// Per-open state a backend's file and directory operations mutate, guarded
/// by a lock so a handle can be safely shared across threads.
pub type OpaqueCell = Mutex<Opaque>;

/// What `Backend::open` produces: the handle kind and the backend's
/// per-file state.
pub struct OpenedFile {
    pub is_directory: bool,
    pub file_data: Opaque,
}

impl core::fmt::Debug for OpenedFile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OpenedFile")
            .field("is_directory", &self.is_directory)
            .finish_non_exhaustive()
    }
}

/// The contract every filesystem implementation fulfills (§6's backend
/// operation table), generalized from the teacher's whole-path
/// `Filesystem` trait (`src/vfs/mod.rs`) to the handle/tail-path shape this
/// spec's mount-and-dispatch model needs.
pub trait Backend: Send + Sync {
    /// The name this backend is registered under (§4.2).
    fn name(&self) -> &'static str;

    /// Produce the backend's per-mount state from a freshly opened device.
    fn mount(&self, device: &Mutex<Box<dyn BlockDevice>>) -> VfsResult<Opaque>;

    /// Release per-mount state. Called exactly once, when a mount's
    /// reference count reaches zero.
    fn unmount(&self, fs_data: Opaque);

    /// Resolve `tail` (the path remaining after the mount prefix) against
    /// this mount's state and produce a new handle. `device` is the
    /// mount's block device, already locked by the caller for the
    /// duration of this call.
    fn open(&self, device: &dyn BlockDevice, fs_data: &OpaqueCell, tail: &str) -> VfsResult<OpenedFile>;

    /// Transfer up to `dest.len()` bytes, returning the count actually
    /// transferred and advancing the backend's seek position.
    fn read(
        &self,
        device: &dyn BlockDevice,
        fs_data: &OpaqueCell,
        file_data: &OpaqueCell,
        dest: &mut [u8],
    ) -> VfsResult<usize>;

    /// Move the seek position, clamped to end-of-file, returning the
    /// position actually reached.
    fn seek(&self, fs_data: &OpaqueCell, file_data: &OpaqueCell, offset: u64) -> u64;

    /// Release per-file state. The returned status reports commit failure,
    /// not close failure — the handle is gone regardless.
    fn close(&self, fs_data: &OpaqueCell, file_data: Opaque) -> VfsResult<()>;

    /// Allocate a directory cursor for a handle already known to be a
    /// directory.
    fn opendir(&self, fs_data: &OpaqueCell, file_data: &OpaqueCell) -> VfsResult<Opaque>;

    /// Yield the next directory entry, or `EndOfDirectory` once exhausted.
    fn readdir(&self, device: &dyn BlockDevice, fs_data: &OpaqueCell, dir_data: &OpaqueCell) -> VfsResult<DirEntry>;

    /// Release a directory cursor. Cannot fail.
    fn closedir(&self, fs_data: &OpaqueCell, dir_data: Opaque);
}

/// A registry entry pairing a backend name with its operation table.
/// Immutable and process-lifetime once the registry is populated.
pub struct BackendDescriptor {
    pub name: &'static str,
    pub ops: &'static dyn Backend,
}

static REGISTRY: OnceBox<Vec<BackendDescriptor>> = OnceBox::new();

/// Populates the process-wide backend registry. Must be called exactly
/// once, before any `vfs::mount` call; a second call is a no-op (the
/// registry is fixed after initialization, per §4.2).
pub fn init(descriptors: Vec<BackendDescriptor>) {
    let _ = REGISTRY.set(Box::new(descriptors));
}

/// Looks up a backend by exact name match.
pub fn find_backend(name: &str) -> Option<&'static dyn Backend> {
    REGISTRY
        .get()
        .and_then(|descriptors| descriptors.iter().find(|d| d.name == name))
        .map(|d| d.ops)
}
