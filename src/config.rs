use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::force_feedback::EnvelopeBaseline;

const CONFIG_FILENAME: &str = "rumblepad_config.json";

/// Timing and simulation settings of the feedback listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Period of the listener loop in milliseconds
    pub tick_interval_ms: u64,
    /// Wait before the first read from a freshly created device
    pub startup_grace_ms: u64,
    pub envelope_baseline: EnvelopeBaseline,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 20,
            startup_grace_ms: 100,
            envelope_baseline: EnvelopeBaseline::Zero,
        }
    }
}

impl FeedbackConfig {
    /// Never shorter than 1ms so the loop always yields
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }
}

/// Identity of the virtual joypad
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub name: String,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
    /// How many effects clients may upload at the same time
    pub ff_effects_max: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "Rumblepad Virtual Joypad".to_string(),
            vendor: 0x045e,  // Microsoft
            product: 0x028e, // Xbox 360 Controller
            version: 0x0110,
            ff_effects_max: 16,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feedback: FeedbackConfig,
    pub device: DeviceConfig,
}

impl Config {
    /// Loads the config next to the executable, `None` if there is none or it is broken
    pub fn load() -> Option<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return None;
        }

        match Self::load_from(&path) {
            Ok(config) => {
                log::info!("Loaded config from {:?}", path);
                Some(config)
            }
            Err(e) => {
                log::error!("{}", e);
                None
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).map_err(|source| Error::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, contents)?;
        log::info!("Saved config to {:?}", path);
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_FILENAME)
    }
}
