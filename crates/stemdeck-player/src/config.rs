//! Player configuration
//!
//! Configuration is stored as YAML in the user's config directory.
//! Default location: ~/.config/stemdeck/config.yaml

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use stemdeck_core::config::FadePolicy;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Paths to the session's stem assets, in display order
    pub stems: Vec<PathBuf>,
    /// How mute toggles reach their target gain
    pub fade: FadePolicy,
    /// Output device name substring (None = system default)
    pub device: Option<String>,
    /// Master output gain (0.0 - 1.0)
    pub master_gain: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            stems: Vec::new(),
            fade: FadePolicy::default(),
            device: None,
            master_gain: stemdeck_core::engine::MASTER_GAIN_DEFAULT,
        }
    }
}

/// Default config file location (~/.config/stemdeck/config.yaml)
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stemdeck")
        .join("config.yaml")
}

/// Load configuration from a YAML file
///
/// Missing file returns defaults; an invalid file logs a warning and
/// returns defaults rather than failing startup.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("config file {:?} doesn't exist, using defaults", path);
        return T::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<T>(&contents) {
            Ok(config) => {
                log::info!("loaded config from {:?}", path);
                config
            }
            Err(e) => {
                log::warn!("failed to parse config: {}, using defaults", e);
                T::default()
            }
        },
        Err(e) => {
            log::warn!("failed to read config file: {}, using defaults", e);
            T::default()
        }
    }
}

/// Save configuration to a YAML file, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("failed to serialize config to YAML")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("failed to write config file: {:?}", path))?;
    Ok(())
}
