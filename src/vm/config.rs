use serde::{Deserialize, Serialize};

pub const DEFAULT_VAR_CAPACITY: usize = 96;
pub const DEFAULT_THREAD_CAPACITY: usize = 32;
/// Pool handles index slots with 32 bits.
pub const MAX_CAPACITY: usize = u32::MAX as usize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be at least 1")]
    ZeroCapacity { field: &'static str },
    #[error("{field} must be at most {max}")]
    CapacityTooLarge { field: &'static str, max: usize },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Pool sizes for one machine. Fixed once the machine is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmConfig {
    pub var_capacity: usize,
    pub thread_capacity: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig { var_capacity: DEFAULT_VAR_CAPACITY, thread_capacity: DEFAULT_THREAD_CAPACITY }
    }
}

impl VmConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: VmConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("var_capacity", self.var_capacity), ("thread_capacity", self.thread_capacity)] {
            if value == 0 {
                return Err(ConfigError::ZeroCapacity { field });
            }
            if value > MAX_CAPACITY {
                return Err(ConfigError::CapacityTooLarge { field, max: MAX_CAPACITY });
            }
        }
        Ok(())
    }
}
