//! Planner configuration, read from a TOML file.
//!
//! ```toml
//! default_alignment = 256
//!
//! [arena.device]
//! base_addr = 0x10000000
//! size = 0x40000000
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

use std::{path::Path, sync::RwLock};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

lazy_static::lazy_static! {
    static ref CONFIG: RwLock<PlannerConfig> = RwLock::new(PlannerConfig::default());
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlannerConfig {
    /// Row alignment in bytes used when a caller does not pass one.
    pub default_alignment: usize,
    pub arena: ArenaConfig,
}

/// Address windows handed to [`crate::alloc::ArenaAllocator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArenaConfig {
    pub device: ArenaWindow,
    pub host: ArenaWindow,
    pub host_pinned: ArenaWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArenaWindow {
    pub base_addr: u64,
    pub size: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            default_alignment: 256,
            arena: ArenaConfig::default(),
        }
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        ArenaConfig {
            device: ArenaWindow {
                base_addr: 0x1_0000_0000,
                size: 16 << 30,
            },
            host: ArenaWindow {
                base_addr: 0x10_0000_0000,
                size: 16 << 30,
            },
            host_pinned: ArenaWindow {
                base_addr: 0x20_0000_0000,
                size: 4 << 30,
            },
        }
    }
}

impl PlannerConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: PlannerConfig = toml::from_str(text)
            .map_err(|e| Error::invalid_argument(format!("Invalid planner configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.default_alignment.is_power_of_two() {
            return Err(Error::invalid_argument(format!(
                "default_alignment must be a power of two, got {}",
                self.default_alignment
            )));
        }
        Ok(())
    }
}

/// Current global configuration.
pub fn get_config() -> PlannerConfig {
    match CONFIG.read() {
        Ok(config) => config.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Replaces the global configuration after validating it.
pub fn set_config(config: PlannerConfig) -> Result<()> {
    config.validate()?;
    info!("set_config: {:?}", config);
    let mut current = CONFIG.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    *current = config;
    Ok(())
}

pub fn init_config_from_str(text: &str) -> Result<()> {
    set_config(PlannerConfig::from_toml(text)?)
}

pub fn init_config_with_file(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::invalid_argument(format!("Unable to read config file {}: {e}", path.display()))
    })?;
    init_config_from_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(PlannerConfig::from_toml("").unwrap(), PlannerConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = PlannerConfig::from_toml(
            r#"
            default_alignment = 512

            [arena.device]
            base_addr = 0x1000
            size = 0x100000
            "#,
        )
        .unwrap();
        assert_eq!(config.default_alignment, 512);
        assert_eq!(config.arena.device.base_addr, 0x1000);
        assert_eq!(config.arena.host, ArenaConfig::default().host);
    }

    #[test]
    fn test_rejects_bad_alignment_and_unknown_keys() {
        assert!(PlannerConfig::from_toml("default_alignment = 300").is_err());
        assert!(PlannerConfig::from_toml("default_alignment = 0").is_err());
        assert!(PlannerConfig::from_toml("alignment = 256").is_err());
    }

    #[test]
    fn test_init_with_missing_file_fails() {
        let err = init_config_with_file("/nonexistent/strideplan.toml").unwrap_err();
        assert!(err.message().contains("/nonexistent/strideplan.toml"));
    }

    #[test]
    fn test_init_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("planner.toml");
        std::fs::write(&path, "default_alignment = 256\n").unwrap();
        init_config_with_file(&path).unwrap();
        assert_eq!(get_config().default_alignment, 256);
    }
}
