//! Configuration loading for mazeswarm.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Get the mazeswarm home directory (~/.mazeswarm).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".mazeswarm"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from ~/.mazeswarm/settings.json, falling back to defaults
/// when the file does not exist.
pub fn load_settings() -> Result<Settings> {
    match get_settings_path() {
        Ok(path) => load_settings_from(&path),
        Err(e) => {
            tracing::warn!("{}, using default settings", e);
            Ok(Settings::default())
        }
    }
}

/// Load settings from an explicit path. A missing file yields defaults; a
/// file that exists but cannot be parsed is an error.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        tracing::debug!("No settings at {}, using defaults", path.display());
        return Ok(Settings::default());
    }

    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;
    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.perception.port == 0 || settings.coordination.port == 0 {
        return Err(Error::Config("service ports must be non-zero".to_string()));
    }
    if settings.perception.port == settings.coordination.port {
        return Err(Error::Config(format!(
            "perception and coordination share port {}",
            settings.perception.port
        )));
    }

    let timings = [
        ("perception.tick_ms", settings.perception.tick_ms),
        ("coordination.tick_ms", settings.coordination.tick_ms),
        ("agent.query_timeout_ms", settings.agent.query_timeout_ms),
        ("agent.command_timeout_ms", settings.agent.command_timeout_ms),
        ("agent.ack_wait_ms", settings.agent.ack_wait_ms),
        ("agent.connect_retry_ms", settings.agent.connect_retry_ms),
    ];
    for (name, value) in timings {
        if value == 0 {
            return Err(Error::Config(format!("{} must be non-zero", name)));
        }
    }
    if settings.agent.ack_attempts == 0 {
        return Err(Error::Config("agent.ack_attempts must be non-zero".to_string()));
    }
    Ok(())
}

/// Perception service configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PerceptionSettings {
    #[serde(default = "default_perception_port")]
    pub port: u16,
    /// Upper bound on how long the loop waits before housekeeping.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_perception_port() -> u16 {
    50032
}

fn default_tick_ms() -> u64 {
    200
}

impl Default for PerceptionSettings {
    fn default() -> Self {
        Self {
            port: default_perception_port(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl PerceptionSettings {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Coordination service configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CoordinationSettings {
    #[serde(default = "default_coordination_port")]
    pub port: u16,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_coordination_port() -> u16 {
    50005
}

impl Default for CoordinationSettings {
    fn default() -> Self {
        Self {
            port: default_coordination_port(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl CoordinationSettings {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Agent pacing and timeouts.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AgentSettings {
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    #[serde(default = "default_ack_attempts")]
    pub ack_attempts: u32,
    #[serde(default = "default_ack_wait_ms")]
    pub ack_wait_ms: u64,
    #[serde(default = "default_connect_retry_ms")]
    pub connect_retry_ms: u64,
}

fn default_step_delay_ms() -> u64 {
    200
}

fn default_query_timeout_ms() -> u64 {
    250
}

fn default_command_timeout_ms() -> u64 {
    500
}

fn default_ack_attempts() -> u32 {
    10
}

fn default_ack_wait_ms() -> u64 {
    200
}

fn default_connect_retry_ms() -> u64 {
    200
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
            query_timeout_ms: default_query_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            ack_attempts: default_ack_attempts(),
            ack_wait_ms: default_ack_wait_ms(),
            connect_retry_ms: default_connect_retry_ms(),
        }
    }
}

/// Console rendering configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RenderSettings {
    #[serde(default = "default_render_enabled")]
    pub enabled: bool,
}

fn default_render_enabled() -> bool {
    true
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            enabled: default_render_enabled(),
        }
    }
}

/// mazeswarm settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub perception: PerceptionSettings,

    #[serde(default)]
    pub coordination: CoordinationSettings,

    #[serde(default)]
    pub agent: AgentSettings,

    #[serde(default)]
    pub render: RenderSettings,
}
