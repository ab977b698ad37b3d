//! End-to-end calls through the trampolines into real native functions.
//!
//! The System V tests run on x86-64 Unix hosts. The Microsoft x64 tests run
//! on any x86-64 host, since `extern "win64"` functions can be defined
//! everywhere. The cdecl and stdcall trampolines only exist on 32-bit x86,
//! so their tests run only under an i686 target such as
//! `cargo test --target i686-unknown-linux-gnu`; an x86-64 run skips them.

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
use std::ffi::c_void;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
use std::sync::Arc;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
use una::{slot, BoundFn, CodePtr};
use una::{AbiAllocator, Library, LoadError};

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn code(ptr: *const ()) -> CodePtr {
    CodePtr::new(ptr as *const c_void)
}

// ============================================================================
// System V AMD64
// ============================================================================

#[cfg(all(target_arch = "x86_64", not(windows)))]
mod sysv {
    use super::*;

    extern "C" fn add(a: i32, b: i32) -> i32 {
        a + b
    }

    extern "C" fn identity(p: *const u8) -> *const u8 {
        p
    }

    extern "C" fn seventh(_a: i64, _b: i64, _c: i64, _d: i64, _e: i64, _f: i64, g: i64) -> i64 {
        g
    }

    extern "C" fn mixed(a: f32, b: f64, c: i32, d: u8) -> f64 {
        a as f64 + b + c as f64 + d as f64
    }

    extern "C" fn halve(x: f32) -> f32 {
        x / 2.0
    }

    extern "C" fn minus_one_byte() -> i8 {
        -1
    }

    extern "C" fn echo_i8(x: i8) -> i32 {
        x as i32
    }

    #[allow(clippy::too_many_arguments)]
    extern "C" fn ten_doubles(
        a: f64, b: f64, c: f64, d: f64, e: f64,
        f: f64, g: f64, h: f64, i: f64, j: f64,
    ) -> f64 {
        a + 2.0 * b + 3.0 * c + 4.0 * d + 5.0 * e + 6.0 * f + 7.0 * g + 8.0 * h + 9.0 * i + 10.0 * j
    }

    #[allow(clippy::too_many_arguments)]
    extern "C" fn sixteen(
        a0: i64, a1: i64, a2: i64, a3: i64, a4: i64, a5: i64, a6: i64, a7: i64,
        a8: i64, a9: i64, a10: i64, a11: i64, a12: i64, a13: i64, a14: i64, a15: i64,
    ) -> i64 {
        [a0, a1, a2, a3, a4, a5, a6, a7, a8, a9, a10, a11, a12, a13, a14, a15]
            .iter()
            .enumerate()
            .map(|(i, v)| (i as i64 + 1) * v)
            .sum()
    }

    fn bind(f: *const (), signature: &str) -> BoundFn {
        let invoker = AbiAllocator::X86_64_UNIX.of(signature).unwrap();
        BoundFn::new(code(f), Arc::new(invoker))
    }

    #[test]
    fn test_add_two_ints() {
        let f = bind(add as *const (), "i(ii)");
        assert_eq!(f.invoker().commands().len(), 2);
        assert_eq!(unsafe { f.call2(3, 4) }.unwrap(), 7);
        assert_eq!(unsafe { f.call2(slot::int(-10), 4) }.unwrap() as i64, -6);
    }

    #[test]
    fn test_pointer_identity() {
        let data = [1u8, 2, 3];
        let f = bind(identity as *const (), "p(p)");
        assert_eq!(f.invoker().commands().len(), 1);
        let p = slot::ptr(data.as_ptr());
        assert_eq!(unsafe { f.call1(p) }.unwrap(), p);
    }

    #[test]
    fn test_seventh_argument_on_stack() {
        let f = bind(seventh as *const (), "l(lllllll)");
        let got = unsafe { f.call(&[1, 2, 3, 4, 5, 6, 0x7777_0000_0000_7777]) }.unwrap();
        assert_eq!(got, 0x7777_0000_0000_7777);
    }

    #[test]
    fn test_mixed_fp_and_int() {
        let f = bind(mixed as *const (), "d(fdiB)");
        let args = [slot::f32(0.5), slot::f64(0.25), slot::int(-3), 0x1_02];
        assert_eq!(unsafe { f.call_f64(&args) }.unwrap(), 0.5 + 0.25 - 3.0 + 2.0);
    }

    #[test]
    fn test_float_return() {
        let f = bind(halve as *const (), "f(f)");
        assert_eq!(unsafe { f.call_f32(&[slot::f32(3.0)]) }.unwrap(), 1.5);
    }

    #[test]
    fn test_narrow_return_is_sign_extended() {
        let f = bind(minus_one_byte as *const (), "b()");
        assert_eq!(unsafe { f.call0() }.unwrap(), u64::MAX);
        let f = bind(minus_one_byte as *const (), "B()");
        assert_eq!(unsafe { f.call0() }.unwrap(), 0xFF);
    }

    #[test]
    fn test_narrow_argument_is_truncated() {
        let f = bind(echo_i8 as *const (), "i(b)");
        assert_eq!(unsafe { f.call1(0xABCD_01FF) }.unwrap() as i64, -1);
    }

    #[test]
    fn test_doubles_overflow_to_stack() {
        let f = bind(ten_doubles as *const (), "d(dddddddddd)");
        assert_eq!(f.invoker().stack_words(), 2);
        let args: Vec<u64> = (1..=10).map(|i| slot::f64(i as f64)).collect();
        let expected: f64 = (1..=10).map(|i| (i * i) as f64).sum();
        assert_eq!(unsafe { f.call_f64(&args) }.unwrap(), expected);
    }

    #[test]
    fn test_sixteen_arguments() {
        let f = bind(sixteen as *const (), &format!("l({})", "l".repeat(16)));
        let args: Vec<u64> = (1..=16).collect();
        let expected: i64 = (1..=16).map(|i| i * i).sum();
        assert_eq!(unsafe { f.call(&args) }.unwrap() as i64, expected);
        let got = unsafe { f.call16(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16) };
        assert_eq!(got.unwrap() as i64, expected);
    }

    #[test]
    fn test_missing_slots_are_zero() {
        let f = bind(add as *const (), "i(ii)");
        assert_eq!(unsafe { f.call1(9) }.unwrap(), 9);
    }

    #[test]
    fn test_variadic_snprintf() {
        let f = bind(libc::snprintf as *const (), "i(pLp|id)");
        let mut buf = [0u8; 64];
        let fmt = b"%d:%.2f\0";
        let n = unsafe {
            f.call(&[
                slot::ptr_mut(buf.as_mut_ptr()),
                buf.len() as u64,
                slot::ptr(fmt.as_ptr()),
                slot::int(-42),
                slot::f64(1.23456),
            ])
        }
        .unwrap();
        assert_eq!(n, 8);
        assert_eq!(&buf[..9], b"-42:1.23\0");
    }

    #[test]
    fn test_shared_invoker_across_threads() {
        let f = bind(add as *const (), "i(ii)");
        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let f = f.clone();
                std::thread::spawn(move || unsafe { f.call2(i, 100) }.unwrap())
            })
            .collect();
        for (i, h) in handles.into_iter().enumerate() {
            assert_eq!(h.join().unwrap(), 100 + i as u64);
        }
    }

    #[test]
    fn test_bind_from_process() {
        let lib = Library::this_process().unwrap();
        let abs = lib.bind("abs", &AbiAllocator::X86_64_UNIX, "i(i)").unwrap();
        assert_eq!(unsafe { abs.call1(slot::int(-12)) }.unwrap(), 12);
    }
}

// ============================================================================
// Microsoft x64
// ============================================================================

#[cfg(target_arch = "x86_64")]
mod win64 {
    use super::*;

    extern "win64" fn mixed(a: i32, b: f64, c: i32, d: f32) -> f64 {
        a as f64 + b + c as f64 + d as f64
    }

    extern "win64" fn sixth(_a: i64, _b: f64, _c: i64, _d: f64, e: i64, f: f64) -> f64 {
        e as f64 * f
    }

    extern "win64" fn last_int(_a: f64, _b: f64, _c: f64, _d: f64, e: i32) -> i32 {
        e
    }

    extern "win64" fn third_float(_a: u64, _b: u64, c: f32) -> f32 {
        c * 2.0
    }

    fn bind(f: *const (), signature: &str) -> BoundFn {
        let invoker = AbiAllocator::X86_64_WINDOWS.of(signature).unwrap();
        BoundFn::new(code(f), Arc::new(invoker))
    }

    #[test]
    fn test_positional_mixed() {
        let f = bind(mixed as *const (), "d(idif)");
        assert_eq!(f.invoker().fixed_fp_mask(), 0b1010);
        let args = [slot::int(-1), slot::f64(0.5), 10, slot::f32(0.25)];
        assert_eq!(unsafe { f.call_f64(&args) }.unwrap(), -1.0 + 0.5 + 10.0 + 0.25);
    }

    #[test]
    fn test_stack_arguments() {
        let f = bind(sixth as *const (), "d(ldldld)");
        assert_eq!(f.invoker().stack_words(), 2);
        let args = [1, slot::f64(2.0), 3, slot::f64(4.0), 6, slot::f64(1.5)];
        assert_eq!(unsafe { f.call_f64(&args) }.unwrap(), 9.0);
    }

    #[test]
    fn test_all_fp_positions() {
        let f = bind(last_int as *const (), "i(ddddi)");
        assert_eq!(f.invoker().fixed_fp_mask(), 0b1111);
        let d = slot::f64(1.0);
        assert_eq!(unsafe { f.call5(d, d, d, d, 77) }.unwrap(), 77);
    }

    #[test]
    fn test_float_in_third_position() {
        let f = bind(third_float as *const (), "f(LLf)");
        assert_eq!(f.invoker().fixed_fp_mask(), 0b0100);
        assert_eq!(unsafe { f.call_f32(&[0, 0, slot::f32(1.25)]) }.unwrap(), 2.5);
    }
}

// ============================================================================
// x86 cdecl / stdcall
// ============================================================================

#[cfg(target_arch = "x86")]
mod x86 {
    use super::*;

    extern "cdecl" fn add(a: i32, b: i32) -> i32 {
        a + b
    }

    extern "cdecl" fn wide(a: i64, b: i32) -> i64 {
        a - b as i64
    }

    extern "cdecl" fn scale(x: f64, k: f32) -> f64 {
        x * k as f64
    }

    extern "stdcall" fn sub(a: i32, b: i32) -> i32 {
        a - b
    }

    extern "stdcall" fn wide_std(a: i64, b: i64) -> i64 {
        a + b
    }

    fn bind(abi: AbiAllocator, f: *const (), signature: &str) -> BoundFn {
        BoundFn::new(code(f), Arc::new(abi.of(signature).unwrap()))
    }

    #[test]
    fn test_cdecl_add() {
        let f = bind(AbiAllocator::X86_CDECL, add as *const (), "i(ii)");
        assert_eq!(unsafe { f.call2(slot::int(-3), 10) }.unwrap(), 7);
    }

    #[test]
    fn test_cdecl_split_argument_and_return() {
        let f = bind(AbiAllocator::X86_CDECL, wide as *const (), "l(li)");
        assert_eq!(f.invoker().stack_words(), 3);
        let got = unsafe { f.call2(0x1_0000_0005, 6) }.unwrap();
        assert_eq!(got, 0xFFFF_FFFF);
    }

    #[test]
    fn test_cdecl_double_return() {
        let f = bind(AbiAllocator::X86_CDECL, scale as *const (), "d(df)");
        let args = [slot::f64(1.5), slot::f32(4.0)];
        assert_eq!(unsafe { f.call_f64(&args) }.unwrap(), 6.0);
    }

    #[test]
    fn test_stdcall_exact_arity() {
        let f = bind(AbiAllocator::X86_STDCALL, sub as *const (), "i(ii)");
        assert_eq!(unsafe { f.call2(10, 4) }.unwrap(), 6);
        let f = bind(AbiAllocator::X86_STDCALL, wide_std as *const (), "l(ll)");
        assert_eq!(f.invoker().stack_words(), 4);
        let got = unsafe { f.call2(0x1_0000_0000, 0xFFFF_FFFF) }.unwrap();
        assert_eq!(got, 0x1_FFFF_FFFF);
    }
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_open_missing_library() {
    assert!(matches!(
        Library::open("/nonexistent/libuna_missing.so"),
        Err(LoadError::NotFound { .. })
    ));
}

#[test]
fn test_too_many_arguments_has_no_partial_result() {
    let sig = format!("i({})", "i".repeat(20));
    assert!(matches!(
        AbiAllocator::X86_64_UNIX.of(&sig),
        Err(una::UnaError::Abi(una::AbiError::TooManyArguments { .. }))
    ));
}
