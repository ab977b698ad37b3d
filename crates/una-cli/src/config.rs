//! CLI configuration (una.toml)
//!
//! Every section is optional; a missing file is the same as an empty one.
//! Command-line flags override whatever the file says.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use una::ConventionAttr;

/// Default file name looked up in the working directory
pub const CONFIG_FILE: &str = "una.toml";

/// Errors that can occur while reading the configuration
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read the file
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that was read
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Parsed una.toml
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnaConfig {
    /// ABI selection
    #[serde(default)]
    pub abi: AbiSection,

    /// Library search
    #[serde(default)]
    pub loader: LoaderSection,

    /// Logging
    #[serde(default)]
    pub log: LogSection,
}

/// `[abi]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AbiSection {
    /// Convention attribute: default, stdcall or stdcall-on-windows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convention: Option<String>,

    /// Arch/OS string overriding detection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch_os: Option<String>,
}

/// `[loader]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderSection {
    /// Libraries tried in order when no `--lib` is given
    #[serde(default)]
    pub search: Vec<String>,
}

/// `[log]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    /// error, warn, info, debug or trace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl UnaConfig {
    /// Load from `path`, or from `una.toml` in the working directory when
    /// no path is given. Only an explicit path has to exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigFileError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(CONFIG_FILE), false),
        };
        if !required && !path.exists() {
            return Ok(UnaConfig::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigFileError::Io {
            path: path.clone(),
            source,
        })?;
        let config = Self::parse(&content)?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigFileError> {
        let config: UnaConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the config
    pub fn validate(&self) -> Result<(), ConfigFileError> {
        self.convention()?;
        self.log_level()?;
        if self.loader.search.iter().any(|s| s.is_empty()) {
            return Err(ConfigFileError::Invalid(
                "loader.search entries cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Convention attribute from `[abi]`
    pub fn convention(&self) -> Result<ConventionAttr, ConfigFileError> {
        match &self.abi.convention {
            Some(name) => name.parse().map_err(ConfigFileError::Invalid),
            None => Ok(ConventionAttr::Default),
        }
    }

    /// Log level from `[log]`
    pub fn log_level(&self) -> Result<Option<log::LevelFilter>, ConfigFileError> {
        match &self.log.level {
            Some(level) => level
                .parse()
                .map(Some)
                .map_err(|_| ConfigFileError::Invalid(format!("unknown log level '{}'", level))),
            None => Ok(None),
        }
    }
}
