//! Renderer configuration
//!
//! Construction-time settings for a [`crate::render::Renderer`], loadable
//! from a TOML file so deployments can tune output and debugging behavior
//! without a rebuild.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File contents failed to parse
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Serialization back to TOML failed
    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Construction-time renderer settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RendererConfig {
    /// Request multisampled targets
    pub antialias: bool,
    /// Apply tone mapping on output
    pub tone_mapping: bool,
    /// Convert output to sRGB
    pub srgb_output: bool,
    /// Edge cap for the offscreen transmission target, in pixels
    pub max_transmission_size: u32,
    /// Report still-live GPU records at dispose
    pub debug_leak_check: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            antialias: true,
            tone_mapping: true,
            srgb_output: true,
            max_transmission_size: 1024,
            debug_leak_check: cfg!(debug_assertions),
        }
    }
}

impl RendererConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Write configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_round_trip() {
        let config = RendererConfig {
            antialias: false,
            max_transmission_size: 512,
            ..RendererConfig::default()
        };
        let text = toml::to_string(&config).unwrap();
        let back: RendererConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: RendererConfig = toml::from_str("antialias = false\n").unwrap();
        assert!(!config.antialias);
        assert_eq!(
            config.max_transmission_size,
            RendererConfig::default().max_transmission_size
        );
    }
}
