//! polylower configuration
//!
//! The driver hands one [`EmitConfig`] to every module translation. It is
//! usually read from a `polylower.toml` next to the project being compiled.
//!
//! # Usage
//!
//! ```rust
//! use polylower::util::config::EmitConfig;
//!
//! let config = EmitConfig::from_toml_str("entry_file = true").unwrap();
//! assert!(config.entry_file);
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::util::logger::LogLevel;

/// Top-level configuration for one translation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitConfig {
    /// Library name used for the namespace root; defaults to the first module path segment
    #[serde(default)]
    pub library: Option<String>,
    /// Append the synthetic `polylower-entry.json` metadata file
    #[serde(default)]
    pub entry_file: bool,
    /// Log level used by [`crate::util::logger`] when the driver initializes logging
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    /// Capture lowering settings
    #[serde(default)]
    pub capture: CaptureConfig,
    /// C# target settings
    #[serde(default)]
    pub csharp: CSharpConfig,
    /// C++ target settings
    #[serde(default)]
    pub cpp: CppConfig,
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            library: None,
            entry_file: false,
            log_level: LogLevel::Info,
            capture: CaptureConfig::default(),
            csharp: CSharpConfig::default(),
            cpp: CppConfig::default(),
        }
    }
}

/// How a mutably captured parameter reaches its container field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParamCapture {
    /// Store the incoming argument straight into the field at function entry
    #[default]
    CopyIn,
    /// Copy the argument into a `<name>_capture` local first, then store that local
    SnapshotLocal,
}

/// Capture lowering configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CaptureConfig {
    #[serde(default)]
    pub param_capture: ParamCapture,
}

/// C# target configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CSharpConfig {
    /// Root namespace every module namespace is nested in
    #[serde(default = "default_csharp_root")]
    pub root_namespace: String,
    /// Namespace of the runtime support library
    #[serde(default = "default_csharp_core")]
    pub core_namespace: String,
}

fn default_csharp_root() -> String {
    "Temper".to_string()
}

fn default_csharp_core() -> String {
    "Temper.Core".to_string()
}

impl Default for CSharpConfig {
    fn default() -> Self {
        Self {
            root_namespace: default_csharp_root(),
            core_namespace: default_csharp_core(),
        }
    }
}

/// C++ target configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CppConfig {
    /// Root namespace every module namespace is nested in
    #[serde(default = "default_cpp_root")]
    pub root_namespace: String,
    /// Header of the runtime support library
    #[serde(default = "default_cpp_core_header")]
    pub core_header: String,
}

fn default_cpp_root() -> String {
    "temper".to_string()
}

fn default_cpp_core_header() -> String {
    "temper-core/core.hpp".to_string()
}

impl Default for CppConfig {
    fn default() -> Self {
        Self {
            root_namespace: default_cpp_root(),
            core_header: default_cpp_core_header(),
        }
    }
}

impl EmitConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
