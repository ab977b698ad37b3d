//! Subcommand implementations

pub mod call;
pub mod compile;
pub mod info;
pub mod selftest;

use crate::config::UnaConfig;
use una::{ConventionAttr, ProcessAbiContext};

/// Process description: `--arch-os`, then `[abi] arch_os`, then detection.
pub fn resolve_context(config: &UnaConfig, arch_os: Option<&str>) -> anyhow::Result<ProcessAbiContext> {
    match arch_os.or(config.abi.arch_os.as_deref()) {
        Some(text) => Ok(ProcessAbiContext::from_arch_os(text)?),
        None => Ok(ProcessAbiContext::detect()),
    }
}

/// Convention attribute: `--convention`, then `[abi] convention`.
pub fn resolve_convention(config: &UnaConfig, flag: Option<&str>) -> anyhow::Result<ConventionAttr> {
    match flag {
        Some(name) => name.parse().map_err(anyhow::Error::msg),
        None => Ok(config.convention()?),
    }
}
