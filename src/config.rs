// ⚙️ Aggregator configuration - JSON file, every field optional

use crate::grouper::KeyPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Keying of rows whose document identifier is blank
    pub key_policy: KeyPolicy,

    /// Keep a repeated built/land line of the same parcel only once
    pub collapse_repeated_components: bool,

    /// Plausible price band per built m², used by the quality profiler
    pub min_price_per_m2: f64,
    pub max_price_per_m2: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            key_policy: KeyPolicy::Fallback,
            collapse_repeated_components: false,
            min_price_per_m2: 100.0,
            max_price_per_m2: 30_000.0,
        }
    }
}

/// Values set on the command line or through `DVF_*` variables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub strict_keys: Option<bool>,
    pub collapse_repeated_components: Option<bool>,
    pub min_price_per_m2: Option<f64>,
    pub max_price_per_m2: Option<f64>,
}

impl AggregatorConfig {
    /// Load configuration from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: AggregatorConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides on top of file values, then re-validate
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Result<Self> {
        if let Some(strict) = overrides.strict_keys {
            self.key_policy = if strict {
                KeyPolicy::Strict
            } else {
                KeyPolicy::Fallback
            };
        }
        if let Some(collapse) = overrides.collapse_repeated_components {
            self.collapse_repeated_components = collapse;
        }
        if let Some(min) = overrides.min_price_per_m2 {
            self.min_price_per_m2 = min;
        }
        if let Some(max) = overrides.max_price_per_m2 {
            self.max_price_per_m2 = max;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min_price_per_m2 >= 0.0 && self.min_price_per_m2 < self.max_price_per_m2) {
            anyhow::bail!(
                "Invalid price per m² band: {} .. {}",
                self.min_price_per_m2,
                self.max_price_per_m2
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AggregatorConfig::default();

        assert_eq!(config.key_policy, KeyPolicy::Fallback);
        assert!(!config.collapse_repeated_components);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"key_policy": "strict", "max_price_per_m2": 50000}}"#).unwrap();

        let config = AggregatorConfig::from_file(file.path()).unwrap();

        assert_eq!(config.key_policy, KeyPolicy::Strict);
        assert_eq!(config.max_price_per_m2, 50_000.0);
        assert_eq!(config.min_price_per_m2, 100.0);
    }

    #[test]
    fn test_invalid_band_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"min_price_per_m2": 500, "max_price_per_m2": 10}}"#).unwrap();

        assert!(AggregatorConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"key_policy": "strict", "collapse_repeated_components": true}}"#
        )
        .unwrap();

        let config = AggregatorConfig::from_file(file.path())
            .unwrap()
            .with_overrides(&ConfigOverrides {
                strict_keys: Some(false),
                collapse_repeated_components: Some(false),
                min_price_per_m2: Some(50.0),
                max_price_per_m2: None,
            })
            .unwrap();

        assert_eq!(config.key_policy, KeyPolicy::Fallback);
        assert!(!config.collapse_repeated_components);
        assert_eq!(config.min_price_per_m2, 50.0);
        assert_eq!(config.max_price_per_m2, 30_000.0);
    }

    #[test]
    fn test_empty_overrides_keep_values() {
        let config = AggregatorConfig::default()
            .with_overrides(&ConfigOverrides::default())
            .unwrap();

        assert_eq!(config, AggregatorConfig::default());
    }

    #[test]
    fn test_overridden_band_is_validated() {
        let result = AggregatorConfig::default().with_overrides(&ConfigOverrides {
            max_price_per_m2: Some(10.0),
            ..ConfigOverrides::default()
        });

        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = AggregatorConfig::from_file("/nonexistent/dvf-config.json");
        assert!(result.is_err());
    }
}
