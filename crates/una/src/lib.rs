//! UNA: native calls without libffi
//!
//! This crate calls arbitrary C functions by reproducing the target ABI's
//! argument classification in data:
//! - **Signatures**: one letter per type, parsed into a [`Prototype`] (`sig`, `proto`)
//! - **Allocators**: per-convention register/stack allocation compiled into
//!   word moves (`abi`)
//! - **Invokers**: the compiled moves plus dispatch to one of four native
//!   trampolines (`invoke`, `trampoline`)
//! - **Support**: library loading, C heap helpers, raw memory access
//!
//! # Example
//!
//! ```rust,ignore
//! use una::{ConventionAttr, Library};
//!
//! let ctx = una::setup()?;
//! let abi = ctx.abi(ConventionAttr::Default)?;
//! let libc = Library::open("libc.so.6")?;
//! let abs = libc.bind("abs", &abi, "i(i)")?;
//! assert_eq!(unsafe { abs.call1(una::slot::int(-3))? }, 3);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Scalar type descriptors
pub mod types;

/// Signature parsing
pub mod sig;

/// Function prototypes
pub mod proto;

/// ABI allocators
pub mod abi;

/// Compiled invokers
pub mod invoke;

/// Native trampolines
pub mod trampoline;

/// Bound function handles
pub mod func;

/// Process context and self-test
pub mod context;

// ============================================================================
// Support Modules
// ============================================================================

/// C heap helpers
pub mod mem;

/// Raw memory access
pub mod poke;

/// Dynamic library loading
pub mod loader;

/// Invoker cache
pub mod cache;

/// Error types
pub mod error;

// ============================================================================
// Re-exports
// ============================================================================

pub use abi::{AbiAllocator, AbiError, CallingConvention, ConventionAttr, Endian, FpPolicy, WordSize};
pub use cache::InvokerCache;
pub use context::{context, find_abi, install, setup, ConfigError, ProcessAbiContext, SelfTestError};
pub use error::{UnaError, UnaResult};
pub use func::{slot, BoundFn, CodePtr};
pub use invoke::{CallImage, Command, InvokeError, Invoker};
pub use loader::{LoadError, Library};
pub use mem::MemError;
pub use proto::Prototype;
pub use sig::{SignatureError, SysTypeInfo};
pub use types::UnaType;
