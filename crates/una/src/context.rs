//! Process ABI context
//!
//! Everything that depends on the running process (pointer width, byte
//! order, which allocator a convention attribute maps to) lives in a
//! [`ProcessAbiContext`] value. Most code builds one with
//! [`ProcessAbiContext::detect`]; tests and the CLI can build one for any
//! arch/OS string to inspect foreign conventions.
//!
//! A process-wide instance is installed once with [`setup`], which also runs
//! the calling-convention self-test. Reads after that are lock-free.

use once_cell::sync::OnceCell;
use thiserror::Error;

use crate::abi::{AbiAllocator, ConventionAttr, Endian, WordSize};
use crate::func::CodePtr;
use crate::sig::SysTypeInfo;
use crate::UnaResult;

/// Signature of the self-test target.
pub const SELF_TEST_SIGNATURE: &str = "i(ifififififififif)";

/// Errors about process configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The process-wide context was read before [`setup`]
    #[error("UNA is not set up; call una::setup() first")]
    NotSetUp,

    /// [`install`] was called twice
    #[error("UNA is already set up")]
    AlreadySetUp,

    /// No allocator is known for this target
    #[error("unknown arch/OS string '{0}'")]
    UnknownArchOs(String),
}

/// Errors from the calling-convention self-test.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelfTestError {
    /// The sanity function saw the wrong arguments
    #[error("sanity test failed (returned {result}), the calling convention implementation is broken: {invoker}")]
    Failed {
        /// Raw return value
        result: u64,
        /// Invoker used for the call
        invoker: String,
    },
}

// ============================================================================
// Allocator selection
// ============================================================================

/// Picks the allocator for an arch/OS string and convention attribute.
pub fn find_abi(arch_os: &str, attr: ConventionAttr) -> Result<AbiAllocator, ConfigError> {
    let abi = if arch_os.starts_with("x86-windows-") {
        match attr {
            ConventionAttr::Stdcall | ConventionAttr::StdcallOnWindows => AbiAllocator::X86_STDCALL,
            ConventionAttr::Default => AbiAllocator::X86_CDECL,
        }
    } else if arch_os.starts_with("x86-") {
        match attr {
            ConventionAttr::Stdcall => AbiAllocator::X86_STDCALL,
            _ => AbiAllocator::X86_CDECL,
        }
    } else if arch_os.starts_with("x86_64-windows-") {
        AbiAllocator::X86_64_WINDOWS
    } else if arch_os.starts_with("x86_64-") {
        AbiAllocator::X86_64_UNIX
    } else {
        return Err(ConfigError::UnknownArchOs(arch_os.to_string()));
    };
    log::debug!("{} {:?} -> {}", arch_os, attr, abi.convention());
    Ok(abi)
}

// ============================================================================
// Context
// ============================================================================

/// Immutable description of the process UNA runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessAbiContext {
    arch_os: String,
    word: WordSize,
    endian: Endian,
}

impl ProcessAbiContext {
    /// Describes the running process.
    pub fn detect() -> Self {
        let env = if cfg!(target_env = "gnu") {
            "gnu"
        } else if cfg!(target_env = "msvc") {
            "msvc"
        } else if cfg!(target_env = "musl") {
            "musl"
        } else {
            "unknown"
        };
        let word = if cfg!(target_pointer_width = "64") {
            WordSize::W64
        } else {
            WordSize::W32
        };
        ProcessAbiContext {
            arch_os: format!("{}-{}-{}", std::env::consts::ARCH, std::env::consts::OS, env),
            word,
            endian: Endian::native(),
        }
    }

    /// Describes a process for an explicit `arch-os-env` string.
    pub fn from_arch_os(arch_os: &str) -> Result<Self, ConfigError> {
        let mut parts = arch_os.split('-');
        let arch = match (parts.next(), parts.next()) {
            (Some(arch), Some(os)) if !arch.is_empty() && !os.is_empty() => arch,
            _ => return Err(ConfigError::UnknownArchOs(arch_os.to_string())),
        };
        let word = if arch.ends_with("64") {
            WordSize::W64
        } else {
            WordSize::W32
        };
        Ok(ProcessAbiContext {
            arch_os: arch_os.to_ascii_lowercase(),
            word,
            endian: Endian::Little,
        })
    }

    /// The `arch-os-env` string
    pub fn arch_os(&self) -> &str {
        &self.arch_os
    }

    /// Pointer width
    pub fn word_size(&self) -> WordSize {
        self.word
    }

    /// Byte order
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Whether the OS token is `windows`
    pub fn is_windows(&self) -> bool {
        self.arch_os.split('-').nth(1) == Some("windows")
    }

    /// Pointer letter resolution for this process.
    pub fn type_info(&self) -> SysTypeInfo {
        SysTypeInfo::for_word_size(self.word)
    }

    /// Allocator for a convention attribute.
    pub fn abi(&self, attr: ConventionAttr) -> Result<AbiAllocator, ConfigError> {
        find_abi(&self.arch_os, attr)
    }

    /// Calls a known native function through the default allocator and
    /// checks that every argument arrived intact.
    pub fn self_test(&self) -> UnaResult<()> {
        let invoker = self.abi(ConventionAttr::Default)?.of(SELF_TEST_SIGNATURE)?;
        let mut slots = [0u64; 16];
        for (i, slot) in slots.iter_mut().enumerate() {
            let n = i as u32 + 1;
            *slot = if i % 2 == 0 {
                n as u64
            } else {
                (n as f32).to_bits() as u64
            };
        }
        let code = CodePtr::new(sanity_tester as *const std::ffi::c_void);
        let result = unsafe { invoker.call(code, &slots)? };
        if result != 1 {
            return Err(SelfTestError::Failed {
                result,
                invoker: invoker.to_string(),
            }
            .into());
        }
        log::debug!("self-test passed: {}", invoker);
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
extern "C" fn sanity_tester(
    a0: i32, a1: f32, a2: i32, a3: f32, a4: i32, a5: f32, a6: i32, a7: f32,
    a8: i32, a9: f32, a10: i32, a11: f32, a12: i32, a13: f32, a14: i32, a15: f32,
) -> i32 {
    let ints = [a0, a2, a4, a6, a8, a10, a12, a14];
    let floats = [a1, a3, a5, a7, a9, a11, a13, a15];
    let ok = ints.iter().enumerate().all(|(i, &v)| v == 2 * i as i32 + 1)
        && floats.iter().enumerate().all(|(i, &v)| v == (2 * i + 2) as f32);
    if !ok {
        log::error!("sanity test received ints {:?} floats {:?}", ints, floats);
    }
    ok as i32
}

// ============================================================================
// Process-wide instance
// ============================================================================

static CONTEXT: OnceCell<ProcessAbiContext> = OnceCell::new();

/// Detects the process, runs the self-test and installs the result.
/// Later calls return the installed context.
pub fn setup() -> UnaResult<&'static ProcessAbiContext> {
    CONTEXT.get_or_try_init(|| {
        let ctx = ProcessAbiContext::detect();
        ctx.self_test()?;
        log::debug!("UNA set up for {}", ctx.arch_os());
        Ok(ctx)
    })
}

/// Installs an explicit context without running the self-test.
pub fn install(ctx: ProcessAbiContext) -> Result<&'static ProcessAbiContext, ConfigError> {
    CONTEXT.set(ctx).map_err(|_| ConfigError::AlreadySetUp)?;
    CONTEXT.get().ok_or(ConfigError::NotSetUp)
}

/// The process-wide context.
pub fn context() -> Result<&'static ProcessAbiContext, ConfigError> {
    CONTEXT.get().ok_or(ConfigError::NotSetUp)
}

/// Pointer letter resolution for the process-wide context.
pub fn type_info() -> Result<SysTypeInfo, ConfigError> {
    Ok(context()?.type_info())
}
