//! Configuration for Selkie
//!
//! TigerStyle: Explicit defaults, validation, reasonable limits.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Property name the scheduler watches for the maximum variable update rate
pub const PROPERTY_UPDATE_RATE_HZ_MAX: &str = "selkie.update.rate_hz_max";

/// Property name the scheduler watches for the fixed simulation step rate
pub const PROPERTY_FIXED_RATE_HZ: &str = "selkie.update.fixed_rate_hz";

/// Main configuration for the Selkie runtime
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Update scheduler configuration
    #[serde(default)]
    pub update: UpdateConfig,

    /// Log relay configuration
    #[serde(default)]
    pub log: LogConfig,
}

impl RuntimeConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.update.validate()?;
        self.log.validate()?;
        Ok(())
    }

    /// Parse a configuration from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::ConfigurationParseFailed {
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }
}

/// Update scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Maximum variable update rate in Hz (0 = uncapped)
    #[serde(default = "default_update_rate_hz_max")]
    pub update_rate_hz_max: u32,

    /// Fixed simulation step rate in Hz
    #[serde(default = "default_fixed_rate_hz")]
    pub fixed_rate_hz: u32,

    /// Cap on the accumulated fixed-step budget
    #[serde(default = "default_fixed_steps_budget_max")]
    pub fixed_steps_budget_max: u32,

    /// Budget replenished at the start of every tick
    #[serde(default = "default_fixed_steps_replenish")]
    pub fixed_steps_replenish_per_tick: u32,
}

fn default_update_rate_hz_max() -> u32 {
    UPDATE_RATE_HZ_DEFAULT
}

fn default_fixed_rate_hz() -> u32 {
    FIXED_RATE_HZ_DEFAULT
}

fn default_fixed_steps_budget_max() -> u32 {
    FIXED_STEPS_BUDGET_MAX
}

fn default_fixed_steps_replenish() -> u32 {
    FIXED_STEPS_REPLENISH_PER_TICK
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            update_rate_hz_max: default_update_rate_hz_max(),
            fixed_rate_hz: default_fixed_rate_hz(),
            fixed_steps_budget_max: default_fixed_steps_budget_max(),
            fixed_steps_replenish_per_tick: default_fixed_steps_replenish(),
        }
    }
}

impl UpdateConfig {
    fn validate(&self) -> Result<()> {
        if self.fixed_rate_hz == 0 {
            return Err(Error::InvalidConfiguration {
                field: "update.fixed_rate_hz".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.fixed_steps_budget_max == 0 {
            return Err(Error::InvalidConfiguration {
                field: "update.fixed_steps_budget_max".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.fixed_steps_replenish_per_tick > self.fixed_steps_budget_max {
            return Err(Error::InvalidConfiguration {
                field: "update.fixed_steps_replenish_per_tick".into(),
                reason: "must not exceed fixed_steps_budget_max".into(),
            });
        }
        Ok(())
    }
}

/// Log relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Maximum buffered records per library before a logging manager binds
    #[serde(default = "default_relay_buffer_count_max")]
    pub relay_buffer_count_max: usize,
}

fn default_relay_buffer_count_max() -> usize {
    LOG_RELAY_BUFFER_COUNT_MAX
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            relay_buffer_count_max: default_relay_buffer_count_max(),
        }
    }
}

impl LogConfig {
    fn validate(&self) -> Result<()> {
        if self.relay_buffer_count_max == 0 {
            return Err(Error::InvalidConfiguration {
                field: "log.relay_buffer_count_max".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}
