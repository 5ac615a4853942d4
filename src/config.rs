//! Runtime configuration types.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::vm::{AddressMap, ConfigError};

/// Format of the stack dumps written to the trace sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceFormat {
    /// Framed, one line per cell
    #[default]
    Human,
    /// One JSON object per dump
    Json,
}

/// Runtime configuration for the VM.
///
/// Every field has a default, so a config file only needs to name what it
/// changes:
///
/// ```toml
/// stack_capacity = 64
/// trace = true
///
/// [layout]
/// stack_base = 0x20000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Words in the code block
    pub code_capacity: usize,
    /// Words that can be pushed on the frame/eval stack
    pub stack_capacity: usize,
    /// Entries in the constant pool
    pub const_pool_capacity: usize,
    /// Write fetch/step lines and stack dumps to the trace sink
    pub trace: bool,
    pub trace_format: TraceFormat,
    /// Cells shown in the dump after each step
    pub dump_depth: usize,
    /// Verify object tags in `eval_push`/`eval_pop`
    pub check_tags: bool,
    /// Filter directive used by `logging::init_from_config`
    pub log_filter: String,
    pub layout: AddressMap,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            code_capacity: 1024,
            stack_capacity: 1024,
            const_pool_capacity: 256,
            trace: false,
            trace_format: TraceFormat::Human,
            dump_depth: 3,
            check_tags: true,
            log_filter: "warn".to_string(),
            layout: AddressMap::default(),
        }
    }
}

impl VmConfig {
    /// Load a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: VmConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacities = [
            ("code_capacity", self.code_capacity),
            ("stack_capacity", self.stack_capacity),
            ("const_pool_capacity", self.const_pool_capacity),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }
}
