//! Configuration management for the controller deck
//!
//! Handles loading, validation and hot-reloading of the YAML configuration
//! file, and turns the user-facing mapping syntax into a [`MappingConfig`].

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::deck::{SmoothingParams, BUTTON_COUNT, DEFAULT_SLIDER_THRESHOLD, SLIDER_COUNT};
use crate::mapping::{Action, MappingConfig, SliderTarget, DEFAULT_SLIDER_DELTA_THRESHOLD};
use crate::pipeline::Tuning;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub smoothing: SmoothingConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub api: ApiConfig,
    pub mapping: MappingSection,
}

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SerialConfig {
    /// Port name, or `auto` for the last enumerated port
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Raw counts a slider must move before the store accepts it
    #[serde(default = "default_slider_threshold")]
    pub slider_threshold: u16,
}

/// Smoother defaults plus optional per-channel overrides (by position)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SmoothingConfig {
    #[serde(default = "default_deadband")]
    pub deadband_counts: i32,
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<Option<ChannelSmoothing>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ChannelSmoothing {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadband_counts: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExecutorConfig {
    /// Normalized (0..1) slider change needed before volume is touched
    #[serde(default = "default_delta_threshold")]
    pub slider_delta_threshold: f32,
}

/// Local HTTP control surface
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Idle time before the event stream sends a keep-alive
    #[serde(default = "default_heartbeat")]
    pub heartbeat_ms: u64,
}

/// Slider targets and button actions as written in the file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MappingSection {
    #[serde(default)]
    pub sliders: Vec<Option<OneOrMany>>,
    #[serde(default)]
    pub buttons: Vec<Option<OneOrMany>>,
}

/// Serial settings pinned from the command line; they win over the file
/// on every load and reload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerialOverrides {
    pub port: Option<String>,
    pub baud: Option<u32>,
}

impl SerialOverrides {
    pub fn is_empty(&self) -> bool {
        self.port.is_none() && self.baud.is_none()
    }

    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(port) = &self.port {
            config.serial.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.serial.baud = baud;
        }
    }
}

/// A single string or a list of strings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_yaml(&contents).with_context(|| format!("Invalid config file: {}", path))
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.trim().is_empty() {
            anyhow::bail!("serial.port cannot be empty (use 'auto' to pick one)");
        }
        if self.serial.baud == 0 {
            anyhow::bail!("serial.baud must be greater than 0");
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than 0");
        }

        let threshold = self.executor.slider_delta_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            anyhow::bail!(
                "executor.slider_delta_threshold {} is out of range (must be 0-1)",
                threshold
            );
        }

        if self.smoothing.channels.len() > SLIDER_COUNT {
            anyhow::bail!(
                "smoothing.channels has {} entries (max {})",
                self.smoothing.channels.len(),
                SLIDER_COUNT
            );
        }

        let mapping = self.to_mapping()?;
        if mapping.is_empty() {
            anyhow::bail!("mapping must configure at least one slider or button");
        }

        Ok(())
    }

    /// Build the executor's view of the mapping section
    pub fn to_mapping(&self) -> Result<MappingConfig> {
        let section = &self.mapping;
        if section.sliders.len() > SLIDER_COUNT {
            anyhow::bail!(
                "mapping.sliders has {} entries (max {})",
                section.sliders.len(),
                SLIDER_COUNT
            );
        }
        if section.buttons.len() > BUTTON_COUNT {
            anyhow::bail!(
                "mapping.buttons has {} entries (max {})",
                section.buttons.len(),
                BUTTON_COUNT
            );
        }

        let mut mapping = MappingConfig::default();

        for (index, entry) in section.sliders.iter().enumerate() {
            mapping.sliders[index] = entry
                .as_ref()
                .map(parse_slider_target)
                .transpose()
                .with_context(|| format!("Invalid mapping for slider {}", index))?;
        }

        for (index, entry) in section.buttons.iter().enumerate() {
            if let Some(entry) = entry {
                mapping.buttons[index] = parse_actions(entry)
                    .with_context(|| format!("Invalid mapping for button {}", index))?;
            }
        }

        Ok(mapping)
    }

    /// Effective smoother parameters for slider `index`
    pub fn smoothing_params(&self, index: usize) -> SmoothingParams {
        let base = SmoothingParams {
            deadband_counts: self.smoothing.deadband_counts,
            alpha: self.smoothing.alpha,
        };
        let params = match self.smoothing.channels.get(index).copied().flatten() {
            Some(over) => SmoothingParams {
                deadband_counts: over.deadband_counts.unwrap_or(base.deadband_counts),
                alpha: over.alpha.unwrap_or(base.alpha),
            },
            None => base,
        };
        params.sanitized()
    }

    /// Smoother and executor settings for the poll loop
    pub fn tuning(&self) -> Tuning {
        Tuning {
            smoothing: std::array::from_fn(|i| self.smoothing_params(i)),
            slider_delta_threshold: self.executor.slider_delta_threshold,
        }
    }

    /// True when switching from `self` to `other` needs a new serial connection
    pub fn needs_reconnect(&self, other: &AppConfig) -> bool {
        self.serial.port != other.serial.port
            || self.serial.baud != other.serial.baud
            || self.serial.slider_threshold != other.serial.slider_threshold
    }
}

fn parse_slider_target(entry: &OneOrMany) -> Result<SliderTarget> {
    match entry {
        OneOrMany::One(name) => {
            let name = name.trim().to_lowercase();
            match name.as_str() {
                "" => anyhow::bail!("slider target cannot be empty"),
                "master" | "master_volume" => Ok(SliderTarget::Master),
                _ => Ok(SliderTarget::Apps(vec![name])),
            }
        }
        OneOrMany::Many(names) => {
            if names.is_empty() {
                anyhow::bail!("application list cannot be empty");
            }
            let apps = names
                .iter()
                .map(|n| n.trim().to_lowercase())
                .collect::<Vec<_>>();
            if apps.iter().any(String::is_empty) {
                anyhow::bail!("application name cannot be empty");
            }
            Ok(SliderTarget::Apps(apps))
        }
    }
}

fn parse_actions(entry: &OneOrMany) -> Result<Vec<Action>> {
    let raw: Vec<&str> = match entry {
        OneOrMany::One(action) => vec![action.as_str()],
        OneOrMany::Many(actions) => {
            if actions.is_empty() {
                anyhow::bail!("action list cannot be empty");
            }
            actions.iter().map(String::as_str).collect()
        }
    };

    raw.into_iter()
        .map(|s| {
            s.parse::<Action>()
                .with_context(|| format!("Invalid action '{}'", s))
        })
        .collect()
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud: default_baud(),
            slider_threshold: default_slider_threshold(),
        }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            deadband_counts: default_deadband(),
            alpha: default_alpha(),
            channels: Vec::new(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            slider_delta_threshold: default_delta_threshold(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            host: default_api_host(),
            port: default_api_port(),
            heartbeat_ms: default_heartbeat(),
        }
    }
}

// Default value functions
fn default_port() -> String { "auto".to_string() }
fn default_baud() -> u32 { 115_200 }
fn default_slider_threshold() -> u16 { DEFAULT_SLIDER_THRESHOLD }
fn default_deadband() -> i32 { SmoothingParams::default().deadband_counts }
fn default_alpha() -> f32 { SmoothingParams::default().alpha }
fn default_delta_threshold() -> f32 { DEFAULT_SLIDER_DELTA_THRESHOLD }
fn default_poll_interval() -> u64 { 10 }
fn default_true() -> bool { true }
fn default_api_host() -> String { "127.0.0.1".to_string() }
fn default_api_port() -> u16 { crate::api::DEFAULT_API_PORT }
fn default_heartbeat() -> u64 { 5000 }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{HotkeyChord, Key};
    use std::time::Duration;
    use tempfile::TempDir;

    const FULL: &str = r#"
serial:
  port: COM4
  baud: 9600
smoothing:
  deadband_counts: 3
  alpha: 0.5
  channels:
    - null
    - { alpha: 1.0 }
mapping:
  sliders:
    - master_volume
    - Spotify.exe
    - [Discord.exe, chrome.exe]
    - null
  buttons:
    - toggle_mute
    - [ "hotkey:ctrl+shift+m", "delay:200", "text:Hello" ]
    - media:next
"#;

    #[test]
    fn test_full_config() {
        let config = AppConfig::from_yaml(FULL).unwrap();
        assert_eq!(config.serial.port, "COM4");
        assert_eq!(config.serial.baud, 9600);
        assert_eq!(config.serial.slider_threshold, 2);
        assert_eq!(config.poll_interval_ms, 10);
        assert!(config.api.enabled);
        assert_eq!(config.api.port, 8765);

        let mapping = config.to_mapping().unwrap();
        assert_eq!(mapping.sliders[0], Some(SliderTarget::Master));
        assert_eq!(mapping.sliders[1], Some(SliderTarget::Apps(vec!["spotify.exe".into()])));
        assert_eq!(
            mapping.sliders[2],
            Some(SliderTarget::Apps(vec!["discord.exe".into(), "chrome.exe".into()]))
        );
        assert_eq!(mapping.sliders[3], None);
        assert_eq!(mapping.actions(0), &[Action::ToggleMuteMaster]);
        assert_eq!(mapping.actions(1).len(), 3);
        assert_eq!(mapping.actions(1)[1], Action::Delay(Duration::from_millis(200)));
        assert_eq!(
            mapping.actions(2),
            &[Action::Hotkey(HotkeyChord::key_only(Key::MediaNext))]
        );
    }

    #[test]
    fn test_smoothing_overrides() {
        let config = AppConfig::from_yaml(FULL).unwrap();
        assert_eq!(config.smoothing_params(0), SmoothingParams { deadband_counts: 3, alpha: 0.5 });
        assert_eq!(config.smoothing_params(1), SmoothingParams { deadband_counts: 3, alpha: 1.0 });
        assert_eq!(config.smoothing_params(4), SmoothingParams { deadband_counts: 3, alpha: 0.5 });
        assert_eq!(config.tuning().smoothing[1].alpha, 1.0);
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = AppConfig::from_yaml(include_str!("../../config.example.yaml")).unwrap();
        let mapping = config.to_mapping().unwrap();
        assert_eq!(mapping.sliders[0], Some(SliderTarget::Master));
        assert_eq!(mapping.actions(3).len(), 3);
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_yaml("mapping:\n  buttons: [toggle_mute]\n").unwrap();
        assert_eq!(config.serial, SerialConfig::default());
        assert_eq!(config.serial.port, "auto");
        assert_eq!(config.serial.baud, 115_200);
        assert_eq!(config.executor.slider_delta_threshold, 0.01);
        assert_eq!(config.smoothing_params(2), SmoothingParams::default());
    }

    #[test]
    fn test_rejects_invalid_mappings() {
        let cases = [
            "mapping:\n  sliders: [a, b, c, d, e, f]\n",
            "mapping:\n  buttons: [toggle_mute, toggle_mute, toggle_mute, toggle_mute, toggle_mute, toggle_mute]\n",
            "mapping:\n  sliders: [[]]\n",
            "mapping:\n  buttons: [[]]\n",
            "mapping:\n  buttons: [explode]\n",
            "mapping:\n  buttons: [\"hotkey:ctrl+shift\"]\n",
            "mapping:\n  buttons: [\"delay:-10\"]\n",
            "mapping: {}\n",
            "mapping:\n  sliders: [null]\n",
            "serial: { baud: 0 }\nmapping:\n  sliders: [master]\n",
            "poll_interval_ms: 0\nmapping:\n  sliders: [master]\n",
            "executor: { slider_delta_threshold: 2.0 }\nmapping:\n  sliders: [master]\n",
        ];
        for yaml in cases {
            assert!(AppConfig::from_yaml(yaml).is_err(), "accepted: {}", yaml);
        }
    }

    #[test]
    fn test_needs_reconnect() {
        let a = AppConfig::from_yaml(FULL).unwrap();
        let mut b = a.clone();
        b.mapping.buttons.clear();
        assert!(!a.needs_reconnect(&b));
        b.serial.baud = 115_200;
        assert!(a.needs_reconnect(&b));
    }

    #[test]
    fn test_serial_overrides() {
        let mut config = AppConfig::from_yaml(FULL).unwrap();
        assert!(SerialOverrides::default().is_empty());

        SerialOverrides { port: None, baud: Some(57_600) }.apply(&mut config);
        assert_eq!(config.serial.port, "COM4");
        assert_eq!(config.serial.baud, 57_600);

        let overrides = SerialOverrides { port: Some("COM9".into()), baud: None };
        assert!(!overrides.is_empty());
        overrides.apply(&mut config);
        assert_eq!(config.serial.port, "COM9");
        assert_eq!(config.serial.baud, 57_600);
    }

    #[tokio::test]
    async fn test_load_save_roundtrip() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("config.yaml");
        let path = path.to_string_lossy().to_string();

        let config = AppConfig::from_yaml(FULL)?;
        config.save(&path).await?;
        let loaded = AppConfig::load(&path).await?;
        assert_eq!(loaded, config);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        assert!(AppConfig::load("/definitely/not/here.yaml").await.is_err());
    }
}
