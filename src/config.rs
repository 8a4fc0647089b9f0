//! VFS configuration constants
//!
//! This module contains tunable parameters for the VFS core and its
//! filesystem-init sequence. Modify these values to adjust behavior.

#![allow(dead_code)]

/// Name of the backend mounted on `/` during filesystem init.
pub const ROOT_BACKEND_NAME: &str = "dumbfs";

/// Name of the block device bound to the root mount during filesystem init.
pub const ROOT_DEVICE_NAME: &str = "initrd";

/// Upper bound on a single path component or archive file name, in bytes.
///
/// Used to size the fixed buffer `readdir` truncates names into (§4.5: "the
/// entry name buffer capacity minus one, null-terminated"). Names longer
/// than this are truncated, not rejected.
pub const MAX_NAME_LEN: usize = 255;
