//! VFS error taxonomy.

/// Error kinds returned by the VFS core and its backends.
///
/// `OK` has no variant here: success is `Ok(_)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsError {
    /// Allocation failed.
    NoMemory,
    /// Path, backend name, or device name did not resolve to anything live.
    NotFound,
    /// A mount already exists at the requested canonical path.
    AlreadyMounted,
    /// `unmount` was called while other holders (open handles) remain.
    TargetBusy,
    /// `opendir`/`readdir`/`closedir` invoked on a handle without `DIRECTORY`.
    NotDirectory,
    /// An operation was invoked on a handle of the wrong kind.
    BadHandler,
    /// The block device returned fewer bytes than requested, or an I/O error.
    BadDevice,
    /// `readdir` has yielded every entry.
    EndOfDirectory,
}

impl core::fmt::Display for VfsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            VfsError::NoMemory => write!(f, "out of memory"),
            VfsError::NotFound => write!(f, "not found"),
            VfsError::AlreadyMounted => write!(f, "already mounted"),
            VfsError::TargetBusy => write!(f, "target busy"),
            VfsError::NotDirectory => write!(f, "not a directory"),
            VfsError::BadHandler => write!(f, "operation invoked on wrong handle kind"),
            VfsError::BadDevice => write!(f, "block device read failed or was short"),
            VfsError::EndOfDirectory => write!(f, "end of directory"),
        }
    }
}

impl core::error::Error for VfsError {}

/// Convenience alias used throughout the crate.
pub type VfsResult<T> = Result<T, VfsError>;
