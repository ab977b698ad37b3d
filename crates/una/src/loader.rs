//! Dynamic library loading
//!
//! Cross-platform support for opening shared libraries (.so, .dylib, .dll)
//! and resolving symbols to [`CodePtr`]s.

use std::ffi::CString;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::abi::AbiAllocator;
use crate::cache::InvokerCache;
use crate::func::{BoundFn, CodePtr};
use crate::UnaResult;

/// Errors that can occur during library loading
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// Library file not found or could not be loaded
    #[error("Library not found: {path}")]
    NotFound {
        /// Path that was attempted, with the loader's reason
        path: String,
    },

    /// None of the search candidates could be opened
    #[error("No library could be opened from: {}", .tried.join(", "))]
    NoCandidate {
        /// Every name that was attempted
        tried: Vec<String>,
    },

    /// Symbol not found in library
    #[error("Symbol not found: {symbol} in {library}")]
    SymbolNotFound {
        /// Symbol name that was not found
        symbol: String,
        /// Library path
        library: String,
    },

    /// Name cannot be passed to the OS loader
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Invalid path encoding
    #[error("Invalid UTF-8 in path: {0}")]
    InvalidPath(String),
}

/// Cross-platform dynamic library handle.
///
/// Closing happens on drop. Code pointers and [`BoundFn`]s obtained from a
/// library must not be called after it is dropped.
pub struct Library {
    handle: LibraryHandle,
    path: String,
}

impl Library {
    /// Open a dynamic library.
    ///
    /// # Platform-specific behavior
    ///
    /// - **Linux / macOS**: `dlopen(RTLD_NOW | RTLD_LOCAL)`; bare names go
    ///   through the system search path
    /// - **Windows**: `LoadLibraryW`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path_ref = path.as_ref();
        let path_str = path_ref
            .to_str()
            .ok_or_else(|| LoadError::InvalidPath(format!("{:?}", path_ref)))?;

        let handle = LibraryHandle::load(Some(path_str))?;
        log::debug!("opened {}", path_str);

        Ok(Library {
            handle,
            path: path_str.to_string(),
        })
    }

    /// Open the first candidate that loads, in order.
    ///
    /// ```ignore
    /// let gl = Library::open_first(&["libGL.so.1", "libGL.so"])?;
    /// ```
    pub fn open_first<S: AsRef<str>>(candidates: &[S]) -> Result<Self, LoadError> {
        let mut tried = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let name = candidate.as_ref();
            match Library::open(name) {
                Ok(lib) => return Ok(lib),
                Err(e) => {
                    log::warn!("{}", e);
                    tried.push(name.to_string());
                }
            }
        }
        Err(LoadError::NoCandidate { tried })
    }

    /// Handle to the running executable and everything it already loaded.
    #[cfg(unix)]
    pub fn this_process() -> Result<Self, LoadError> {
        Ok(Library {
            handle: LibraryHandle::load(None)?,
            path: "<process>".to_string(),
        })
    }

    /// Resolve a symbol to its address.
    pub fn symbol(&self, name: &str) -> Result<CodePtr, LoadError> {
        unsafe { self.handle.symbol(name, &self.path) }
    }

    /// Resolve `name` and compile `signature` for `abi` into a callable.
    pub fn bind(&self, name: &str, abi: &AbiAllocator, signature: &str) -> UnaResult<BoundFn> {
        let code = self.symbol(name)?;
        let invoker = abi.of(signature)?;
        Ok(BoundFn::new(code, Arc::new(invoker)))
    }

    /// Like [`Library::bind`], sharing invokers through `cache`.
    pub fn bind_cached(
        &self,
        cache: &InvokerCache,
        name: &str,
        abi: &AbiAllocator,
        signature: &str,
    ) -> UnaResult<BoundFn> {
        let code = self.symbol(name)?;
        Ok(BoundFn::new(code, cache.get(abi, signature)?))
    }

    /// Get the path this library was loaded from
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library").field("path", &self.path).finish()
    }
}

fn c_name(name: &str) -> Result<CString, LoadError> {
    CString::new(name).map_err(|e| LoadError::InvalidName(format!("{:?}: {}", name, e)))
}

// Platform-specific implementations

#[cfg(unix)]
type LibraryHandle = UnixLibrary;

#[cfg(windows)]
type LibraryHandle = WindowsLibrary;

// ============================================================================
// Unix Implementation (Linux, macOS, BSD)
// ============================================================================

#[cfg(unix)]
struct UnixLibrary {
    handle: *mut std::ffi::c_void,
}

#[cfg(unix)]
impl UnixLibrary {
    fn load(path: Option<&str>) -> Result<Self, LoadError> {
        let c_path = path.map(c_name).transpose()?;
        let ptr = c_path.as_ref().map_or(std::ptr::null(), |p| p.as_ptr());

        let handle = unsafe { libc::dlopen(ptr, libc::RTLD_NOW | libc::RTLD_LOCAL) };

        if handle.is_null() {
            return Err(LoadError::NotFound {
                path: format!("{}: {}", path.unwrap_or("<process>"), dl_error()),
            });
        }

        Ok(UnixLibrary { handle })
    }

    unsafe fn symbol(&self, name: &str, lib_path: &str) -> Result<CodePtr, LoadError> {
        let c_name = c_name(name)?;

        // Clear any previous errors
        libc::dlerror();

        let symbol = libc::dlsym(self.handle, c_name.as_ptr());

        if symbol.is_null() {
            return Err(LoadError::SymbolNotFound {
                symbol: name.to_string(),
                library: format!("{}: {}", lib_path, dl_error()),
            });
        }

        Ok(CodePtr::new(symbol))
    }
}

#[cfg(unix)]
fn dl_error() -> String {
    let err_ptr = unsafe { libc::dlerror() };
    if err_ptr.is_null() {
        "Unknown error".to_string()
    } else {
        unsafe { crate::mem::read_cstr(err_ptr) }
    }
}

#[cfg(unix)]
impl Drop for UnixLibrary {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle);
        }
    }
}

#[cfg(unix)]
unsafe impl Send for UnixLibrary {}
#[cfg(unix)]
unsafe impl Sync for UnixLibrary {}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
struct WindowsLibrary {
    handle: *mut std::ffi::c_void,
}

#[cfg(windows)]
impl WindowsLibrary {
    fn load(path: Option<&str>) -> Result<Self, LoadError> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;

        let path = path.ok_or_else(|| LoadError::InvalidName("<process>".to_string()))?;
        let wide: Vec<u16> = OsStr::new(path)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let handle = unsafe { LoadLibraryW(wide.as_ptr()) };

        if handle.is_null() {
            let error = unsafe { GetLastError() };
            return Err(LoadError::NotFound {
                path: format!("{} (error code: {})", path, error),
            });
        }

        Ok(WindowsLibrary { handle })
    }

    unsafe fn symbol(&self, name: &str, lib_path: &str) -> Result<CodePtr, LoadError> {
        let c_name = c_name(name)?;

        let symbol = GetProcAddress(self.handle, c_name.as_ptr());

        if symbol.is_null() {
            let error = GetLastError();
            return Err(LoadError::SymbolNotFound {
                symbol: name.to_string(),
                library: format!("{} (error code: {})", lib_path, error),
            });
        }

        Ok(CodePtr::new(symbol))
    }
}

#[cfg(windows)]
impl Drop for WindowsLibrary {
    fn drop(&mut self) {
        unsafe {
            FreeLibrary(self.handle);
        }
    }
}

#[cfg(windows)]
unsafe impl Send for WindowsLibrary {}
#[cfg(windows)]
unsafe impl Sync for WindowsLibrary {}

// Windows FFI declarations
#[cfg(windows)]
extern "system" {
    fn LoadLibraryW(filename: *const u16) -> *mut std::ffi::c_void;
    fn GetProcAddress(
        module: *mut std::ffi::c_void,
        procname: *const std::ffi::c_char,
    ) -> *mut std::ffi::c_void;
    fn FreeLibrary(module: *mut std::ffi::c_void) -> i32;
    fn GetLastError() -> u32;
}
