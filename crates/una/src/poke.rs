//! Raw memory access
//!
//! Reading and writing native memory by address. All accesses are unaligned
//! so that packed C structures can be walked field by field.

use std::ffi::c_void;

use bytemuck::Pod;

use crate::mem::{self, MemError};

/// Reads a `T` at `addr`.
///
/// # Safety
///
/// `addr` must be valid for reading `size_of::<T>()` bytes.
#[inline]
pub unsafe fn peek<T: Pod>(addr: usize) -> T {
    std::ptr::read_unaligned(addr as *const T)
}

/// Writes `value` at `addr`.
///
/// # Safety
///
/// `addr` must be valid for writing `size_of::<T>()` bytes.
#[inline]
pub unsafe fn poke<T: Pod>(addr: usize, value: T) {
    std::ptr::write_unaligned(addr as *mut T, value)
}

macro_rules! typed_access {
    ($($peek:ident / $poke:ident : $ty:ty;)*) => {
        $(
            #[doc = concat!("Reads a `", stringify!($ty), "`.\n\n# Safety\n\nSee [`peek`].")]
            #[inline]
            pub unsafe fn $peek(addr: usize) -> $ty {
                peek::<$ty>(addr)
            }

            #[doc = concat!("Writes a `", stringify!($ty), "`.\n\n# Safety\n\nSee [`poke`].")]
            #[inline]
            pub unsafe fn $poke(addr: usize, value: $ty) {
                poke::<$ty>(addr, value)
            }
        )*
    };
}

typed_access! {
    peek_u8 / poke_u8: u8;
    peek_i8 / poke_i8: i8;
    peek_u16 / poke_u16: u16;
    peek_i16 / poke_i16: i16;
    peek_u32 / poke_u32: u32;
    peek_i32 / poke_i32: i32;
    peek_u64 / poke_u64: u64;
    peek_i64 / poke_i64: i64;
    peek_f32 / poke_f32: f32;
    peek_f64 / poke_f64: f64;
    peek_ptr / poke_ptr: usize;
}

/// Copies `out.len()` elements from `addr` into `out`.
///
/// # Safety
///
/// `addr` must be valid for reading `size_of_val(out)` bytes.
pub unsafe fn read_slice<T: Pod>(addr: usize, out: &mut [T]) {
    let bytes = bytemuck::cast_slice_mut::<T, u8>(out);
    std::ptr::copy_nonoverlapping(addr as *const u8, bytes.as_mut_ptr(), bytes.len());
}

/// Copies `data` to `addr`.
///
/// # Safety
///
/// `addr` must be valid for writing `size_of_val(data)` bytes.
pub unsafe fn write_slice<T: Pod>(addr: usize, data: &[T]) {
    let bytes = bytemuck::cast_slice::<T, u8>(data);
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, bytes.len());
}

/// Reads `count` elements into a new vector.
///
/// # Safety
///
/// `addr` must be valid for reading `count` elements of `T`.
pub unsafe fn read_vec<T: Pod>(addr: usize, count: usize) -> Vec<T> {
    let mut out = vec![T::zeroed(); count];
    read_slice(addr, &mut out);
    out
}

/// Copies `data` into a fresh C allocation, optionally followed by one
/// zeroed element. Free the result with [`mem::free`].
pub fn alloc_slice<T: Pod>(data: &[T], terminate: bool) -> Result<*mut T, MemError> {
    let elem = std::mem::size_of::<T>();
    let count = data.len() + usize::from(terminate);
    let ptr = mem::malloc_chk((count * elem).max(1))? as *mut T;
    unsafe {
        write_slice(ptr as usize, data);
        if terminate {
            poke(ptr as usize + data.len() * elem, T::zeroed());
        }
    }
    Ok(ptr)
}

/// Reads a NUL-terminated C string at `addr`.
///
/// # Safety
///
/// `addr` must point to a NUL-terminated string.
pub unsafe fn peek_cstr(addr: usize) -> String {
    mem::read_cstr(addr as *const std::ffi::c_char)
}

/// Frees memory returned by [`alloc_slice`].
///
/// # Safety
///
/// `ptr` must come from [`alloc_slice`] and not have been freed.
pub unsafe fn free_slice<T>(ptr: *mut T) {
    mem::free(ptr as *mut c_void)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_round_trip_unaligned() {
        let mut buf = [0u8; 32];
        let base = buf.as_mut_ptr() as usize + 1;
        unsafe {
            poke_u32(base, 0xDEAD_BEEF);
            assert_eq!(peek_u32(base), 0xDEAD_BEEF);
            let low = if cfg!(target_endian = "little") { 0xEF } else { 0xDE };
            assert_eq!(peek_u8(base), low);
            poke_f64(base + 8, -1.5);
            assert_eq!(peek_f64(base + 8), -1.5);
            poke_i16(base + 20, -2);
            assert_eq!(peek_i16(base + 20), -2);
            assert_eq!(peek_u16(base + 20), 0xFFFE);
            poke_ptr(base, usize::MAX);
            assert_eq!(peek_ptr(base), usize::MAX);
        }
    }

    #[test]
    fn test_bulk_copy() {
        let src = [1.0f32, 2.0, 3.0];
        let mut dst = [0.0f32; 3];
        unsafe {
            read_slice(src.as_ptr() as usize, &mut dst);
        }
        assert_eq!(src, dst);

        let mut target = [0u16; 4];
        unsafe {
            write_slice(target.as_mut_ptr() as usize + 2, &[7u16, 8]);
        }
        assert_eq!(target, [0, 7, 8, 0]);
    }

    #[test]
    fn test_alloc_slice_terminated() {
        let ptr = alloc_slice(&[5i32, 6, 7], true).unwrap();
        unsafe {
            assert_eq!(read_vec::<i32>(ptr as usize, 4), vec![5, 6, 7, 0]);
            free_slice(ptr);
        }
    }

    #[test]
    fn test_alloc_empty_slice() {
        let ptr = alloc_slice::<u8>(&[], false).unwrap();
        assert!(!ptr.is_null());
        unsafe { free_slice(ptr) };
    }

    #[test]
    fn test_peek_cstr() {
        let ptr = alloc_slice(&b"una"[..], true).unwrap();
        assert_eq!(unsafe { peek_cstr(ptr as usize) }, "una");
        unsafe { free_slice(ptr) };
    }
}
