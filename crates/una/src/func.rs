//! Bound function handles
//!
//! A [`BoundFn`] pairs a native code address with the invoker describing its
//! signature. Calls pass raw 64-bit slots; use [`slot`] helpers to build
//! them from typed values and [`BoundFn::call_f32`]/[`BoundFn::call_f64`] to
//! read floating-point results.

use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;

use crate::invoke::{InvokeError, Invoker};

/// Address of native code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct CodePtr(*const c_void);

unsafe impl Send for CodePtr {}
unsafe impl Sync for CodePtr {}

impl CodePtr {
    /// Wraps a raw address.
    pub const fn new(ptr: *const c_void) -> Self {
        CodePtr(ptr)
    }

    /// Null address.
    pub const fn null() -> Self {
        CodePtr(std::ptr::null())
    }

    /// Address of an integer.
    pub fn from_addr(addr: usize) -> Self {
        CodePtr(addr as *const c_void)
    }

    /// Raw pointer
    pub fn as_ptr(self) -> *const c_void {
        self.0
    }

    /// Numeric address
    pub fn addr(self) -> usize {
        self.0 as usize
    }

    /// Whether the address is null
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl fmt::Debug for CodePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodePtr({:#x})", self.addr())
    }
}

/// Converting typed values into argument slots.
pub mod slot {
    /// Pointer argument.
    #[inline]
    pub fn ptr<T>(p: *const T) -> u64 {
        p as usize as u64
    }

    /// Mutable pointer argument.
    #[inline]
    pub fn ptr_mut<T>(p: *mut T) -> u64 {
        p as usize as u64
    }

    /// Signed integer argument, sign-extended.
    #[inline]
    pub fn int(v: i64) -> u64 {
        v as u64
    }

    /// `float` argument.
    #[inline]
    pub fn f32(v: f32) -> u64 {
        v.to_bits() as u64
    }

    /// `double` argument.
    #[inline]
    pub fn f64(v: f64) -> u64 {
        v.to_bits()
    }
}

/// A native function ready to call.
#[derive(Debug, Clone)]
pub struct BoundFn {
    code: CodePtr,
    invoker: Arc<Invoker>,
}

macro_rules! fixed_arity_calls {
    ($($name:ident($($arg:ident),*);)*) => {
        $(
            /// Fixed-arity form of [`BoundFn::call`].
            ///
            /// # Safety
            ///
            /// Same contract as [`BoundFn::call`].
            #[allow(clippy::too_many_arguments)]
            pub unsafe fn $name(&self $(, $arg: u64)*) -> Result<u64, InvokeError> {
                self.call(&[$($arg),*])
            }
        )*
    };
}

impl BoundFn {
    /// Binds `code` to `invoker`.
    pub fn new(code: CodePtr, invoker: Arc<Invoker>) -> Self {
        BoundFn { code, invoker }
    }

    /// Code address
    pub fn code(&self) -> CodePtr {
        self.code
    }

    /// Compiled signature
    pub fn invoker(&self) -> &Arc<Invoker> {
        &self.invoker
    }

    /// Calls the function with up to sixteen argument slots.
    ///
    /// # Safety
    ///
    /// The code address must still be mapped (its library loaded) and the
    /// function's real signature must match the invoker's.
    pub unsafe fn call(&self, args: &[u64]) -> Result<u64, InvokeError> {
        self.invoker.call(self.code, args)
    }

    /// Calls a function returning `float`.
    ///
    /// # Safety
    ///
    /// Same contract as [`BoundFn::call`].
    pub unsafe fn call_f32(&self, args: &[u64]) -> Result<f32, InvokeError> {
        self.call(args).map(|raw| f32::from_bits(raw as u32))
    }

    /// Calls a function returning `double`.
    ///
    /// # Safety
    ///
    /// Same contract as [`BoundFn::call`].
    pub unsafe fn call_f64(&self, args: &[u64]) -> Result<f64, InvokeError> {
        self.call(args).map(f64::from_bits)
    }

    fixed_arity_calls! {
        call0();
        call1(a0);
        call2(a0, a1);
        call3(a0, a1, a2);
        call4(a0, a1, a2, a3);
        call5(a0, a1, a2, a3, a4);
        call6(a0, a1, a2, a3, a4, a5);
        call7(a0, a1, a2, a3, a4, a5, a6);
        call8(a0, a1, a2, a3, a4, a5, a6, a7);
        call9(a0, a1, a2, a3, a4, a5, a6, a7, a8);
        call10(a0, a1, a2, a3, a4, a5, a6, a7, a8, a9);
        call11(a0, a1, a2, a3, a4, a5, a6, a7, a8, a9, a10);
        call12(a0, a1, a2, a3, a4, a5, a6, a7, a8, a9, a10, a11);
        call13(a0, a1, a2, a3, a4, a5, a6, a7, a8, a9, a10, a11, a12);
        call14(a0, a1, a2, a3, a4, a5, a6, a7, a8, a9, a10, a11, a12, a13);
        call15(a0, a1, a2, a3, a4, a5, a6, a7, a8, a9, a10, a11, a12, a13, a14);
        call16(a0, a1, a2, a3, a4, a5, a6, a7, a8, a9, a10, a11, a12, a13, a14, a15);
    }
}
