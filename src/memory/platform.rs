// POSIX shared memory objects (shm_open / ftruncate / mmap / shm_unlink).
//
// All OS plumbing and the associated unsafe code live here, so the ring
// algorithm itself stays platform-independent and unit-testable against the
// heap backing alone.
//
// Object names follow the POSIX convention: non-empty, starting with '/'.
// On Linux the objects appear under /dev/shm (tmpfs - RAM-backed).

use std::ffi::CString;
use std::fs::File;
use std::os::fd::FromRawFd;

use memmap2::{MmapMut, MmapOptions};

use crate::error::{RingError, RingResult};

/// A mapped POSIX shared-memory object.
///
/// Unmapping and closing the descriptor happen automatically on drop.
/// Unlinking the name is the owner's decision and never happens here.
pub(crate) struct ShmMapping {
    // Field order matters: the mapping must unmap before the fd closes.
    mmap: MmapMut,
    _file: File,
    len: usize,
}

impl ShmMapping {
    pub(crate) fn as_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    /// Mapped size in bytes, as discovered or set at open time.
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

/// POSIX shared-object names must be non-empty and begin with '/'.
pub(crate) fn validate_name(name: &str) -> RingResult<()> {
    if name.is_empty() || !name.starts_with('/') {
        return Err(RingError::invalid_argument(format!(
            "shared memory name '{}' must be non-empty and start with '/'",
            name
        )));
    }
    Ok(())
}

fn c_name(name: &str) -> RingResult<CString> {
    CString::new(name).map_err(|_| {
        RingError::invalid_argument(format!(
            "shared memory name '{}' contains a NUL byte",
            name.escape_debug()
        ))
    })
}

/// Create a brand-new shared-memory object of exactly `len` bytes and map it
/// read/write.
///
/// The object is opened exclusively; a name collision fails with
/// `AlreadyExists`. Any OS failure after the open releases everything that
/// was acquired (descriptor closed, name unlinked) before the error is
/// returned, so a failed create never leaks a named object.
pub(crate) fn create_exclusive(name: &str, len: usize) -> RingResult<ShmMapping> {
    validate_name(name)?;
    let cname = c_name(name)?;

    // SAFETY: cname is a valid null-terminated CString; flags are valid POSIX constants
    let fd = unsafe {
        libc::shm_open(
            cname.as_ptr(),
            libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
            0o666,
        )
    };
    if fd < 0 {
        let err = std::io::Error::last_os_error();
        return Err(if err.raw_os_error() == Some(libc::EEXIST) {
            RingError::already_exists(format!("shared memory object '{}' already exists", name))
        } else {
            RingError::io_error(format!("shm_open('{}') failed: {}", name, err))
        });
    }
    // SAFETY: fd is a freshly opened descriptor owned by nobody else
    let file = unsafe { File::from_raw_fd(fd) };

    if let Err(err) = file.set_len(len as u64) {
        drop(file);
        unlink(name);
        return Err(RingError::io_error(format!(
            "ftruncate('{}', {} bytes) failed: {}",
            name, len, err
        )));
    }

    // SAFETY: file is a valid shm descriptor truncated to `len` above
    let mmap = match unsafe { MmapOptions::new().len(len).map_mut(&file) } {
        Ok(m) => m,
        Err(err) => {
            drop(file);
            unlink(name);
            return Err(RingError::io_error(format!(
                "mmap('{}') failed: {}",
                name, err
            )));
        }
    };

    log::debug!("shm: created object '{}' ({} bytes)", name, len);
    Ok(ShmMapping {
        mmap,
        _file: file,
        len,
    })
}

/// Attach to an existing shared-memory object and map it read/write.
///
/// The mapped size comes from fstat, never from the caller. A missing
/// object fails with `NotFound`.
pub(crate) fn attach_existing(name: &str) -> RingResult<ShmMapping> {
    validate_name(name)?;
    let cname = c_name(name)?;

    // SAFETY: cname is a valid null-terminated CString; flags are valid POSIX constants
    let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDWR, 0o666) };
    if fd < 0 {
        let err = std::io::Error::last_os_error();
        return Err(if err.raw_os_error() == Some(libc::ENOENT) {
            RingError::not_found(format!("shared memory object '{}' does not exist", name))
        } else {
            RingError::io_error(format!("shm_open('{}') failed: {}", name, err))
        });
    }
    // SAFETY: fd is a freshly opened descriptor owned by nobody else
    let file = unsafe { File::from_raw_fd(fd) };

    let len = file
        .metadata()
        .map_err(|err| RingError::io_error(format!("fstat('{}') failed: {}", name, err)))?
        .len() as usize;
    if len == 0 {
        return Err(RingError::invalid_argument(format!(
            "shared memory object '{}' is empty",
            name
        )));
    }

    // SAFETY: file is a valid descriptor and `len` matches its fstat size
    let mmap = unsafe { MmapOptions::new().len(len).map_mut(&file) }
        .map_err(|err| RingError::io_error(format!("mmap('{}') failed: {}", name, err)))?;

    log::debug!("shm: attached object '{}' ({} bytes)", name, len);
    Ok(ShmMapping {
        mmap,
        _file: file,
        len,
    })
}

/// Remove the name from the system. Mappings held by other processes stay
/// valid until they unmap. Best-effort: the object may already be gone.
pub(crate) fn unlink(name: &str) {
    if let Ok(cname) = CString::new(name) {
        // SAFETY: cname is a valid null-terminated CString
        let rc = unsafe { libc::shm_unlink(cname.as_ptr()) };
        if rc != 0 {
            log::warn!(
                "shm: unlink('{}') failed: {}",
                name,
                std::io::Error::last_os_error()
            );
        } else {
            log::debug!("shm: unlinked object '{}'", name);
        }
    }
}
