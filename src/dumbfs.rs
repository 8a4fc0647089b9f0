//! The reference backend: a read-only flat archive (§4.5).
//!
//! Grounded directly on `original_source/lib/fs/dumbfs.c`. The wire format
//! is bit-exact with the source; `entry_size` is attacker-controlled and
//! every offset derived from it is bounds-checked against the device
//! (every read is a short-read-checked `read_exact`) before its bytes are
//! trusted, per the spec's closing note on §4.5.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::any::Any;
use spin::Mutex;

use crate::backend::{Backend, Opaque, OpaqueCell, OpenedFile};
use crate::block::BlockDevice;
use crate::config::MAX_NAME_LEN;
use crate::error::{VfsError, VfsResult};
use crate::mount::DirEntry;

const HEADER_LEN: u64 = 8; // entry_size: u32, file_size: u32

struct EntryHeader {
    entry_size: u32,
    file_size: u32,
}

fn read_exact(device: &dyn BlockDevice, dest: &mut [u8], offset: u64) -> VfsResult<()> {
    let n = device.read(dest, offset)?;
    if n != dest.len() {
        return Err(VfsError::BadDevice);
    }
    Ok(())
}

fn read_header(device: &dyn BlockDevice, offset: u64) -> VfsResult<EntryHeader> {
    let mut raw = [0u8; HEADER_LEN as usize];
    read_exact(device, &mut raw, offset)?;
    Ok(EntryHeader {
        entry_size: u32::from_le_bytes(raw[0..4].try_into().unwrap()),
        file_size: u32::from_le_bytes(raw[4..8].try_into().unwrap()),
    })
}

/// Per-mount state: the archive's declared file count, read once at mount
/// time.
struct FsData {
    file_count: u32,
}

/// Per-file state: where the payload starts on-device and how long it is,
/// plus the current seek position.
struct FileData {
    payload_offset: u64,
    file_size: u64,
    seek_offset: u64,
}

/// Per-directory cursor: the byte offset of the next entry header and how
/// many entries remain to be yielded.
struct DirData {
    cursor: u64,
    remaining: u32,
}

fn downcast<T: Any>(opaque: &Opaque) -> &T {
    opaque.downcast_ref::<T>().expect("backend state type mismatch")
}

fn downcast_mut<T: Any>(opaque: &mut Opaque) -> &mut T {
    opaque.downcast_mut::<T>().expect("backend state type mismatch")
}

/// Read-only flat archive backend (§4.5).
pub struct DumbFs;

impl Backend for DumbFs {
    fn name(&self) -> &'static str {
        "dumbfs"
    }

    fn mount(&self, device: &Mutex<Box<dyn BlockDevice>>) -> VfsResult<Opaque> {
        let device = device.lock();
        let mut count_raw = [0u8; 4];
        read_exact(device.as_ref(), &mut count_raw, 0)?;
        Ok(Box::new(FsData {
            file_count: u32::from_le_bytes(count_raw),
        }))
    }

    fn unmount(&self, _fs_data: Opaque) {}

    fn open(&self, device: &dyn BlockDevice, fs_data: &OpaqueCell, tail: &str) -> VfsResult<OpenedFile> {
        if tail.is_empty() {
            return Ok(OpenedFile {
                is_directory: true,
                file_data: Box::new(()),
            });
        }

        let file_count = downcast::<FsData>(&fs_data.lock()).file_count;
        let query = tail.as_bytes();
        let mut offset = 4u64;

        for _ in 0..file_count {
            let header = read_header(device, offset)?;
            offset += HEADER_LEN;

            let name_len = query.len() as u64 + 1;
            let mut name_buf = vec![0u8; name_len as usize];
            read_exact(device, &mut name_buf, offset)?;

            if name_buf[..query.len()] == *query && name_buf[query.len()] == 0 {
                let payload_offset = offset + name_len;
                return Ok(OpenedFile {
                    is_directory: false,
                    file_data: Box::new(FileData {
                        payload_offset,
                        file_size: header.file_size as u64,
                        seek_offset: 0,
                    }),
                });
            }

            offset += header.entry_size as u64;
        }

        Err(VfsError::NotFound)
    }

    fn read(
        &self,
        device: &dyn BlockDevice,
        _fs_data: &OpaqueCell,
        file_data: &OpaqueCell,
        dest: &mut [u8],
    ) -> VfsResult<usize> {
        let mut file_data = file_data.lock();
        let file: &mut FileData = downcast_mut(&mut file_data);

        let remaining = file.file_size - file.seek_offset;
        let want = (dest.len() as u64).min(remaining) as usize;
        let n = device.read(&mut dest[..want], file.payload_offset + file.seek_offset)?;
        file.seek_offset += n as u64;
        Ok(n)
    }

    fn seek(&self, _fs_data: &OpaqueCell, file_data: &OpaqueCell, offset: u64) -> u64 {
        let mut file_data = file_data.lock();
        let file: &mut FileData = downcast_mut(&mut file_data);
        file.seek_offset = offset.min(file.file_size);
        file.seek_offset
    }

    fn close(&self, _fs_data: &OpaqueCell, _file_data: Opaque) -> VfsResult<()> {
        Ok(())
    }

    fn opendir(&self, fs_data: &OpaqueCell, _file_data: &OpaqueCell) -> VfsResult<Opaque> {
        let file_count = downcast::<FsData>(&fs_data.lock()).file_count;
        Ok(Box::new(DirData {
            cursor: 4,
            remaining: file_count,
        }))
    }

    fn readdir(&self, device: &dyn BlockDevice, _fs_data: &OpaqueCell, dir_data: &OpaqueCell) -> VfsResult<DirEntry> {
        let mut dir_data = dir_data.lock();
        let dir: &mut DirData = downcast_mut(&mut dir_data);

        if dir.remaining == 0 {
            return Err(VfsError::EndOfDirectory);
        }

        let header = read_header(device, dir.cursor)?;

        // Matches the source's fixed-width read (name buffer capacity
        // minus one) rather than stopping at the logical name length;
        // the result is still truncated at the first interior NUL below.
        let mut name_buf = vec![0u8; MAX_NAME_LEN];
        read_exact(device, &mut name_buf, dir.cursor + HEADER_LEN)?;
        let end = name_buf.iter().position(|&b| b == 0).unwrap_or(name_buf.len());
        let name = String::from_utf8_lossy(&name_buf[..end]).into_owned();

        dir.cursor += HEADER_LEN + header.entry_size as u64;
        dir.remaining -= 1;

        Ok(DirEntry { name, is_dir: false })
    }

    fn closedir(&self, _fs_data: &OpaqueCell, _dir_data: Opaque) {}
}
