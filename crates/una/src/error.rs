//! Error types for the UNA call layer

use crate::abi::AbiError;
use crate::context::{ConfigError, SelfTestError};
use crate::invoke::InvokeError;
use crate::loader::LoadError;
use crate::mem::MemError;
use crate::sig::SignatureError;

/// Result type for UNA operations
pub type UnaResult<T> = Result<T, UnaError>;

/// Any error the call layer can raise
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnaError {
    /// Process configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Signature text
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// Argument allocation
    #[error(transparent)]
    Abi(#[from] AbiError),

    /// Call dispatch
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    /// Library loading and symbol lookup
    #[error(transparent)]
    Load(#[from] LoadError),

    /// C heap helpers
    #[error(transparent)]
    Mem(#[from] MemError),

    /// Calling-convention self-test
    #[error(transparent)]
    SelfTest(#[from] SelfTestError),
}
