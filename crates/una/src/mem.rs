//! C heap helpers
//!
//! Thin wrappers over the C library allocator. Memory handed to native code
//! usually has to come from `malloc` so that native code can `free` it.

use std::ffi::{c_char, c_void, CStr};

use thiserror::Error;

/// Errors from the allocation helpers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemError {
    /// Zero-sized allocation request
    #[error("allocation size must be positive")]
    ZeroSize,

    /// The allocator returned null
    #[error("out of memory allocating {size} bytes")]
    OutOfMemory {
        /// Requested size
        size: usize,
    },

    /// String contains a NUL byte and cannot become a C string
    #[error("string contains an interior NUL at byte {0}")]
    InteriorNul(usize),
}

/// `malloc` that rejects zero sizes and null results.
pub fn malloc_chk(size: usize) -> Result<*mut c_void, MemError> {
    if size == 0 {
        return Err(MemError::ZeroSize);
    }
    let ptr = unsafe { libc::malloc(size) };
    if ptr.is_null() {
        return Err(MemError::OutOfMemory { size });
    }
    Ok(ptr)
}

/// Copies `bytes` into a fresh C allocation.
pub fn memdup(bytes: &[u8]) -> Result<*mut u8, MemError> {
    let ptr = malloc_chk(bytes.len())? as *mut u8;
    unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len()) };
    Ok(ptr)
}

/// Copies `s` into a fresh NUL-terminated C allocation.
pub fn strdup(s: &str) -> Result<*mut c_char, MemError> {
    if let Some(pos) = s.bytes().position(|b| b == 0) {
        return Err(MemError::InteriorNul(pos));
    }
    let ptr = malloc_chk(s.len() + 1)? as *mut u8;
    unsafe {
        std::ptr::copy_nonoverlapping(s.as_ptr(), ptr, s.len());
        *ptr.add(s.len()) = 0;
    }
    Ok(ptr as *mut c_char)
}

/// Releases memory from [`malloc_chk`], [`memdup`], [`strdup`] or native
/// code. Null is ignored.
///
/// # Safety
///
/// `ptr` must be null or a live C heap allocation.
pub unsafe fn free(ptr: *mut c_void) {
    libc::free(ptr)
}

/// Resizes a C allocation.
///
/// # Safety
///
/// `ptr` must be null or a live C heap allocation. On success the old
/// pointer is invalid.
pub unsafe fn realloc(ptr: *mut c_void, size: usize) -> Result<*mut c_void, MemError> {
    if size == 0 {
        return Err(MemError::ZeroSize);
    }
    let out = libc::realloc(ptr, size);
    if out.is_null() {
        return Err(MemError::OutOfMemory { size });
    }
    Ok(out)
}

/// Length of a NUL-terminated string.
///
/// # Safety
///
/// `s` must point to a NUL-terminated string.
pub unsafe fn strlen(s: *const c_char) -> usize {
    libc::strlen(s)
}

/// Copies `n` bytes between non-overlapping regions.
///
/// # Safety
///
/// Both regions must be valid for `n` bytes.
pub unsafe fn memcpy(dst: *mut c_void, src: *const c_void, n: usize) {
    libc::memcpy(dst, src, n);
}

/// Compares `n` bytes.
///
/// # Safety
///
/// Both regions must be valid for `n` bytes.
pub unsafe fn memcmp(a: *const c_void, b: *const c_void, n: usize) -> i32 {
    libc::memcmp(a, b, n)
}

/// Compares two NUL-terminated strings.
///
/// # Safety
///
/// Both must point to NUL-terminated strings.
pub unsafe fn strcmp(a: *const c_char, b: *const c_char) -> i32 {
    libc::strcmp(a, b)
}

/// Reads a NUL-terminated string, replacing invalid UTF-8.
///
/// # Safety
///
/// `s` must point to a NUL-terminated string.
pub unsafe fn read_cstr(s: *const c_char) -> String {
    CStr::from_ptr(s).to_string_lossy().into_owned()
}

/// Size of a virtual memory page.
#[cfg(unix)]
pub fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

/// Size of a virtual memory page.
#[cfg(not(unix))]
pub fn page_size() -> usize {
    4096
}
