//! CLI configuration file
//!
//! ```toml
//! [driver]
//! lockup_simulated = false
//! pool_size = 8
//! rx_mode = { kind = "poll", weight = 2 }
//!
//! [traffic]
//! frames = 1000
//! min_size = 60
//! max_size = 1514
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use simnet_core::DriverConfig;
use simnet_core::ether::ETH_HLEN;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device pair settings
    pub driver: DriverConfig,
    /// Traffic generator settings
    pub traffic: TrafficConfig,
}

/// Traffic generator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    /// Frames to send in `run`
    pub frames: u64,
    /// Smallest frame, header included
    pub min_size: usize,
    /// Largest frame, header included. Sizes above the MTU exercise the
    /// oversize drop path.
    pub max_size: usize,
    /// Pause between frames in milliseconds
    pub interval_ms: u64,
    /// Seed for frame sizes and payloads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            frames: 100,
            min_size: 60,
            max_size: 1514,
            interval_ms: 0,
            seed: None,
        }
    }
}

impl TrafficConfig {
    /// Pause between frames
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load from `path` if given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Render as TOML
    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Check both sections
    pub fn validate(&self) -> anyhow::Result<()> {
        self.driver.validate()?;

        let t = &self.traffic;
        if t.min_size < ETH_HLEN {
            anyhow::bail!("traffic.min_size must be at least {ETH_HLEN}");
        }
        if t.min_size > t.max_size {
            anyhow::bail!(
                "traffic.min_size ({}) exceeds traffic.max_size ({})",
                t.min_size,
                t.max_size
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simnet_core::RxMode;

    #[test]
    fn test_parse_sections() {
        let config: Config = toml::from_str(
            r#"
            [driver]
            lockup_simulated = true
            rx_mode = { kind = "poll", weight = 4 }

            [traffic]
            frames = 10
            seed = 7
            "#,
        )
        .unwrap();

        assert!(config.driver.lockup_simulated);
        assert_eq!(config.driver.rx_mode, RxMode::Poll { weight: 4 });
        assert_eq!(config.traffic.frames, 10);
        assert_eq!(config.traffic.seed, Some(7));
        assert_eq!(config.traffic.max_size, 1514);
        config.validate().unwrap();
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = Config::default();
        config.traffic.seed = Some(42);
        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validate_sizes() {
        let mut config = Config::default();
        config.traffic.min_size = 10;
        assert!(config.validate().is_err());

        config.traffic.min_size = 200;
        config.traffic.max_size = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/nonexistent/simnet.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
