//! Native trampolines
//!
//! One entry point per calling convention. Each takes a fully assembled
//! [`CallImage`], reinterprets the code address as a function pointer whose
//! parameter list covers every slot the convention can load, and lets the
//! compiler emit the register and stack moves. Callees that declare fewer
//! parameters simply ignore the surplus; the callee-pops stdcall convention
//! is the one exception and gets an exact-arity pointer.
//!
//! A trampoline returns `None` when the running host cannot execute its
//! convention.

#![allow(clippy::too_many_arguments)]

use crate::func::CodePtr;
use crate::invoke::CallImage;
use crate::types::UnaType;

/// Register class of the return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnClass {
    /// Integer register (or register pair on x86)
    Integer,
    /// Single-precision FP register
    F32,
    /// Double-precision FP register
    F64,
}

impl ReturnClass {
    /// Class a value of type `ty` is returned in.
    pub const fn of(ty: UnaType) -> ReturnClass {
        match ty {
            UnaType::F32 => ReturnClass::F32,
            UnaType::F64 => ReturnClass::F64,
            _ => ReturnClass::Integer,
        }
    }
}

/// A return type read back as its raw bit pattern.
#[allow(dead_code)]
trait RawReturn: Copy {
    fn into_raw(self) -> u64;
}

impl RawReturn for u64 {
    #[inline]
    fn into_raw(self) -> u64 {
        self
    }
}

impl RawReturn for f32 {
    #[inline]
    fn into_raw(self) -> u64 {
        self.to_bits() as u64
    }
}

impl RawReturn for f64 {
    #[inline]
    fn into_raw(self) -> u64 {
        self.to_bits()
    }
}

// ============================================================================
// x86-64 System V
// ============================================================================

/// System V AMD64: 6 GP registers, 10 stack words, 8 SSE registers.
///
/// The FP words travel as variadic doubles so that `%al` carries the SSE
/// register count that variadic callees expect.
#[cfg(all(target_arch = "x86_64", not(windows)))]
pub(crate) unsafe fn x86_64_unix(code: CodePtr, image: &CallImage, class: ReturnClass) -> Option<u64> {
    unsafe fn go<R: RawReturn>(code: CodePtr, image: &CallImage) -> u64 {
        type Entry<R> = unsafe extern "C" fn(
            u64, u64, u64, u64, u64, u64, u64, u64,
            u64, u64, u64, u64, u64, u64, u64, u64, ...
        ) -> R;
        let f: Entry<R> = std::mem::transmute_copy(&code.as_ptr());
        let a = &image.gp;
        let x = image.fp.map(f64::from_bits);
        f(
            a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7],
            a[8], a[9], a[10], a[11], a[12], a[13], a[14], a[15],
            x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7],
        )
        .into_raw()
    }

    Some(match class {
        ReturnClass::Integer => go::<u64>(code, image),
        ReturnClass::F32 => go::<f32>(code, image),
        ReturnClass::F64 => go::<f64>(code, image),
    })
}

#[cfg(not(all(target_arch = "x86_64", not(windows))))]
pub(crate) unsafe fn x86_64_unix(_code: CodePtr, _image: &CallImage, _class: ReturnClass) -> Option<u64> {
    None
}

// ============================================================================
// x86-64 Microsoft
// ============================================================================

/// Value for one of the four positional register arguments: typed as a
/// double when the position holds a fixed FP argument, as an integer word
/// otherwise.
#[allow(dead_code)]
trait PositionalArg: Copy {
    fn pick(gp: u64, fp: u64) -> Self;
}

impl PositionalArg for u64 {
    #[inline]
    fn pick(gp: u64, _fp: u64) -> u64 {
        gp
    }
}

impl PositionalArg for f64 {
    #[inline]
    fn pick(_gp: u64, fp: u64) -> f64 {
        f64::from_bits(fp)
    }
}

#[cfg(target_arch = "x86_64")]
unsafe fn win64_go<A0, A1, A2, A3, R>(code: CodePtr, image: &CallImage) -> u64
where
    A0: PositionalArg,
    A1: PositionalArg,
    A2: PositionalArg,
    A3: PositionalArg,
    R: RawReturn,
{
    type Entry<A0, A1, A2, A3, R> = unsafe extern "win64" fn(
        A0, A1, A2, A3, u64, u64, u64, u64,
        u64, u64, u64, u64, u64, u64, u64, u64,
    ) -> R;
    let f: Entry<A0, A1, A2, A3, R> = std::mem::transmute_copy(&code.as_ptr());
    let (a, x) = (&image.gp, &image.fp);
    f(
        A0::pick(a[0], x[0]),
        A1::pick(a[1], x[1]),
        A2::pick(a[2], x[2]),
        A3::pick(a[3], x[3]),
        a[4], a[5], a[6], a[7],
        a[8], a[9], a[10], a[11], a[12], a[13], a[14], a[15],
    )
    .into_raw()
}

#[cfg(target_arch = "x86_64")]
unsafe fn win64_positional<A0, A1, A2, A3>(code: CodePtr, image: &CallImage, class: ReturnClass) -> u64
where
    A0: PositionalArg,
    A1: PositionalArg,
    A2: PositionalArg,
    A3: PositionalArg,
{
    match class {
        ReturnClass::Integer => win64_go::<A0, A1, A2, A3, u64>(code, image),
        ReturnClass::F32 => win64_go::<A0, A1, A2, A3, f32>(code, image),
        ReturnClass::F64 => win64_go::<A0, A1, A2, A3, f64>(code, image),
    }
}

/// Microsoft x64: 4 positional registers, 12 stack words.
///
/// Each of the four positions is either an integer or an XMM register
/// depending on the callee's declared type, so the pointer type is picked
/// from `fixed_fp_mask`. Variadic FP arguments are read by the callee from
/// the GP copy the allocator placed alongside them.
#[cfg(target_arch = "x86_64")]
pub(crate) unsafe fn x86_64_windows(
    code: CodePtr,
    image: &CallImage,
    class: ReturnClass,
    fixed_fp_mask: u8,
) -> Option<u64> {
    type I = u64;
    type D = f64;
    Some(match fixed_fp_mask & 0xF {
        0b0000 => win64_positional::<I, I, I, I>(code, image, class),
        0b0001 => win64_positional::<D, I, I, I>(code, image, class),
        0b0010 => win64_positional::<I, D, I, I>(code, image, class),
        0b0011 => win64_positional::<D, D, I, I>(code, image, class),
        0b0100 => win64_positional::<I, I, D, I>(code, image, class),
        0b0101 => win64_positional::<D, I, D, I>(code, image, class),
        0b0110 => win64_positional::<I, D, D, I>(code, image, class),
        0b0111 => win64_positional::<D, D, D, I>(code, image, class),
        0b1000 => win64_positional::<I, I, I, D>(code, image, class),
        0b1001 => win64_positional::<D, I, I, D>(code, image, class),
        0b1010 => win64_positional::<I, D, I, D>(code, image, class),
        0b1011 => win64_positional::<D, D, I, D>(code, image, class),
        0b1100 => win64_positional::<I, I, D, D>(code, image, class),
        0b1101 => win64_positional::<D, I, D, D>(code, image, class),
        0b1110 => win64_positional::<I, D, D, D>(code, image, class),
        _ => win64_positional::<D, D, D, D>(code, image, class),
    })
}

#[cfg(not(target_arch = "x86_64"))]
pub(crate) unsafe fn x86_64_windows(
    _code: CodePtr,
    _image: &CallImage,
    _class: ReturnClass,
    _fixed_fp_mask: u8,
) -> Option<u64> {
    None
}

// ============================================================================
// x86 (32-bit)
// ============================================================================

#[cfg(target_arch = "x86")]
fn words(image: &CallImage) -> [u32; 16] {
    image.gp.map(|w| w as u32)
}

/// x86 cdecl: 16 stack words, caller cleans up.
#[cfg(target_arch = "x86")]
pub(crate) unsafe fn x86_cdecl(code: CodePtr, image: &CallImage, class: ReturnClass) -> Option<u64> {
    unsafe fn go<R: RawReturn>(code: CodePtr, w: &[u32; 16]) -> u64 {
        type Entry<R> = unsafe extern "cdecl" fn(
            u32, u32, u32, u32, u32, u32, u32, u32,
            u32, u32, u32, u32, u32, u32, u32, u32,
        ) -> R;
        let f: Entry<R> = std::mem::transmute_copy(&code.as_ptr());
        f(
            w[0], w[1], w[2], w[3], w[4], w[5], w[6], w[7],
            w[8], w[9], w[10], w[11], w[12], w[13], w[14], w[15],
        )
        .into_raw()
    }

    let w = words(image);
    Some(match class {
        ReturnClass::Integer => go::<u64>(code, &w),
        ReturnClass::F32 => go::<f32>(code, &w),
        ReturnClass::F64 => go::<f64>(code, &w),
    })
}

#[cfg(not(target_arch = "x86"))]
pub(crate) unsafe fn x86_cdecl(_code: CodePtr, _image: &CallImage, _class: ReturnClass) -> Option<u64> {
    None
}

#[cfg(target_arch = "x86")]
macro_rules! word {
    ($i:tt) => {
        u32
    };
}

/// Expands to a match over the stack word count, calling through an
/// `extern "stdcall"` pointer of exactly that arity.
#[cfg(target_arch = "x86")]
macro_rules! stdcall_arities {
    ($code:expr, $w:expr, $n:expr, $R:ty; $($arity:literal => [$($i:tt)*]),* $(,)?) => {
        match $n {
            $($arity => {
                let f: unsafe extern "stdcall" fn($(word!($i)),*) -> $R =
                    std::mem::transmute_copy(&$code.as_ptr());
                Some(f($($w[$i]),*).into_raw())
            })*
            _ => None,
        }
    };
}

/// x86 stdcall: the callee pops its own arguments, so the pointer arity must
/// equal the number of stack words the invoker filled.
#[cfg(target_arch = "x86")]
pub(crate) unsafe fn x86_stdcall(
    code: CodePtr,
    image: &CallImage,
    class: ReturnClass,
    stack_words: usize,
) -> Option<u64> {
    unsafe fn go<R: RawReturn>(code: CodePtr, w: &[u32; 16], n: usize) -> Option<u64> {
        stdcall_arities!(code, w, n, R;
            0 => [],
            1 => [0],
            2 => [0 1],
            3 => [0 1 2],
            4 => [0 1 2 3],
            5 => [0 1 2 3 4],
            6 => [0 1 2 3 4 5],
            7 => [0 1 2 3 4 5 6],
            8 => [0 1 2 3 4 5 6 7],
            9 => [0 1 2 3 4 5 6 7 8],
            10 => [0 1 2 3 4 5 6 7 8 9],
            11 => [0 1 2 3 4 5 6 7 8 9 10],
            12 => [0 1 2 3 4 5 6 7 8 9 10 11],
            13 => [0 1 2 3 4 5 6 7 8 9 10 11 12],
            14 => [0 1 2 3 4 5 6 7 8 9 10 11 12 13],
            15 => [0 1 2 3 4 5 6 7 8 9 10 11 12 13 14],
            16 => [0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15],
        )
    }

    let w = words(image);
    match class {
        ReturnClass::Integer => go::<u64>(code, &w, stack_words),
        ReturnClass::F32 => go::<f32>(code, &w, stack_words),
        ReturnClass::F64 => go::<f64>(code, &w, stack_words),
    }
}

#[cfg(not(target_arch = "x86"))]
pub(crate) unsafe fn x86_stdcall(
    _code: CodePtr,
    _image: &CallImage,
    _class: ReturnClass,
    _stack_words: usize,
) -> Option<u64> {
    None
}
