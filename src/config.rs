// Settings storage
// Settings live as pretty JSON in <config_dir>/murmur/settings.json. The path can
// be pinned once per process (tests and --config do this), and a few fields can
// be overridden from the environment.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::models::ContactId;
use crate::sync::{EngineConfig, SimulatorConfig};

pub const ENV_API_URL: &str = "MURMUR_API_URL";
pub const ENV_USER_ID: &str = "MURMUR_USER_ID";

const SETTINGS_FILE: &str = "settings.json";

static CONFIG_PATH_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Backend endpoint. Without one the offline variant runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    pub user_id: ContactId,
    /// 0 turns polling off
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub simulator: SimulatorSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            api_url: None,
            user_id: 1,
            poll_interval_secs: 5,
            request_timeout_secs: 10,
            simulator: SimulatorSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    /// 0 turns the simulator off
    pub interval_secs: u64,
    pub probability: f64,
    pub typing_delay_ms: u64,
    pub phrases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        let defaults = SimulatorConfig::default();
        SimulatorSettings {
            interval_secs: defaults.interval.as_secs(),
            probability: defaults.probability,
            typing_delay_ms: defaults.typing_delay.as_millis() as u64,
            phrases: defaults.phrases,
            seed: None,
        }
    }
}

impl Settings {
    pub fn is_offline(&self) -> bool {
        self.api_url.is_none()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Apply `MURMUR_API_URL` and `MURMUR_USER_ID` from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key/value source shaped like the environment.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            info!("Using API URL from {}", ENV_API_URL);
            self.api_url = Some(url.trim().to_string());
        }
        if let Some(raw) = lookup(ENV_USER_ID) {
            match raw.trim().parse() {
                Ok(user_id) => self.user_id = user_id,
                Err(e) => warn!("Ignoring {}={:?}: {}", ENV_USER_ID, raw, e),
            }
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        let poll_interval = match self.poll_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let simulator = if self.is_offline() && self.simulator.interval_secs > 0 {
            Some(self.simulator.to_config())
        } else {
            None
        };
        EngineConfig {
            user_id: self.user_id,
            // The offline backend only changes through the simulator
            poll_interval: if self.is_offline() { None } else { poll_interval },
            simulator,
        }
    }
}

impl SimulatorSettings {
    pub fn to_config(&self) -> SimulatorConfig {
        SimulatorConfig {
            interval: Duration::from_secs(self.interval_secs),
            probability: self.probability,
            typing_delay: Duration::from_millis(self.typing_delay_ms),
            phrases: self.phrases.clone(),
            seed: self.seed,
        }
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join("murmur");
    Ok(config_dir)
}

/// Pin the settings path for the rest of the process. Only the first call wins.
pub fn set_config_path_override(path: PathBuf) -> Result<()> {
    CONFIG_PATH_OVERRIDE
        .set(path)
        .map_err(|path| anyhow!("Config path already set, ignoring {}", path.display()))
}

pub fn get_config_path() -> Result<PathBuf> {
    if let Some(path) = CONFIG_PATH_OVERRIDE.get() {
        return Ok(path.clone());
    }
    Ok(get_config_dir()?.join(SETTINGS_FILE))
}

/// Load settings from the configured path, falling back to defaults when no
/// file exists yet.
pub fn load_settings() -> Result<Settings> {
    load_settings_from(&get_config_path()?)
}

pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        info!("No settings at {}, using defaults", path.display());
        return Ok(Settings::default());
    }
    let file = File::open(path).with_context(|| format!("Could not open {}", path.display()))?;
    let settings: Settings = serde_json::from_reader(file)
        .with_context(|| format!("Could not parse {}", path.display()))?;
    info!("Loaded settings from {}", path.display());
    Ok(settings)
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, settings)?;
    info!("Settings saved to {}", path.display());
    Ok(())
}
