//! Machine configuration.
//!
//! Every field has a default matching the reference machine, so an empty
//! JSON object (or no file at all) yields a 2048-word memory with a
//! 1024-word kernel region and a timer that fires on the 129th user step.

use crate::cpu::memory::{KERNEL_REGION_SIZE, MEMORY_SIZE};
use serde::{Serialize, Deserialize};
use std::path::Path;
use thiserror::Error;

/// Default number of user-mode steps before the timer fires.
pub const TIMER_THRESHOLD: u32 = 129;

/// Tunable machine parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Total memory in words.
    pub memory_size: usize,
    /// Words reserved for the boot image; user memory is the rest.
    pub kernel_region: usize,
    /// Pre-execute counter value at which the timer trap fires.
    pub timer_threshold: u32,
    /// Deliver traps through address 0 when `lgdt` was never run.
    pub allow_unconfigured_traps: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_size: MEMORY_SIZE,
            kernel_region: KERNEL_REGION_SIZE,
            timer_threshold: TIMER_THRESHOLD,
            allow_unconfigured_traps: false,
        }
    }
}

impl MachineConfig {
    /// Parse a configuration from JSON text and validate it.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Check that the layout is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_size as u64 > u32::MAX as u64 {
            return Err(ConfigError::MemoryTooLarge(self.memory_size));
        }
        if self.kernel_region > self.memory_size {
            return Err(ConfigError::KernelRegionTooLarge {
                kernel_region: self.kernel_region,
                memory_size: self.memory_size,
            });
        }
        if self.timer_threshold == 0 {
            return Err(ConfigError::ZeroTimerThreshold);
        }
        Ok(())
    }

    /// Words available to the user program.
    pub fn user_region(&self) -> usize {
        self.memory_size - self.kernel_region
    }
}

/// Errors that can occur while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("memory size {0} exceeds the 32-bit address space")]
    MemoryTooLarge(usize),

    #[error("kernel region of {kernel_region} words does not fit in {memory_size} words of memory")]
    KernelRegionTooLarge { kernel_region: usize, memory_size: usize },

    #[error("timer threshold must be at least 1")]
    ZeroTimerThreshold,
}
