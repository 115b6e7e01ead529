//! Configuration management for Sustain GW
//!
//! Handles loading, parsing, and hot-reloading of the YAML configuration file.
//! Channels are written 1-16 in the file and converted to 0-based [`Channel`]s
//! when applied to the router.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::midi::{Channel, RawMessage};
use crate::router::{ChannelFilter, Router, SustainMode};

pub use watcher::ConfigWatcher;

/// Port pattern meaning "every input device"
pub const ANY_DEVICE: &str = "any";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
}

/// MIDI port selection
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MidiConfig {
    /// `any` or a case-insensitive substring of the input port name
    #[serde(default = "default_input_port")]
    pub input_port: String,
    /// Case-insensitive substring of the output port name
    #[serde(default = "default_output_port")]
    pub output_port: String,
}

/// Routing session settings, applied live on reload
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RoutingConfig {
    #[serde(default)]
    pub input_channel: InputChannelSetting,
    #[serde(default = "default_output_channel")]
    pub output_channel: u8,
    #[serde(default)]
    pub sustain: SustainMode,
}

/// Input channel: a number 1-16 or the keyword `any`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum InputChannelSetting {
    Number(u8),
    Keyword(String),
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            input_port: default_input_port(),
            output_port: default_output_port(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            input_channel: InputChannelSetting::default(),
            output_channel: default_output_channel(),
            sustain: SustainMode::default(),
        }
    }
}

impl Default for InputChannelSetting {
    fn default() -> Self {
        InputChannelSetting::Keyword(ANY_DEVICE.to_string())
    }
}

impl InputChannelSetting {
    /// Resolve to a router channel filter
    pub fn filter(&self) -> Result<ChannelFilter> {
        match self {
            InputChannelSetting::Number(number) => Channel::from_one_based(*number)
                .map(ChannelFilter::Only)
                .ok_or_else(|| anyhow::anyhow!("input_channel {} is invalid (must be 1-16 or 'any')", number)),
            InputChannelSetting::Keyword(word) if word.eq_ignore_ascii_case(ANY_DEVICE) => {
                Ok(ChannelFilter::Any)
            }
            InputChannelSetting::Keyword(word) => {
                anyhow::bail!("input_channel '{}' is invalid (must be 1-16 or 'any')", word)
            }
        }
    }
}

impl From<ChannelFilter> for InputChannelSetting {
    fn from(filter: ChannelFilter) -> Self {
        match filter {
            ChannelFilter::Any => InputChannelSetting::default(),
            ChannelFilter::Only(channel) => InputChannelSetting::Number(channel.number()),
        }
    }
}

impl RoutingConfig {
    pub fn output_channel(&self) -> Result<Channel> {
        Channel::from_one_based(self.output_channel).ok_or_else(|| {
            anyhow::anyhow!("output_channel {} is invalid (must be 1-16)", self.output_channel)
        })
    }

    /// Apply these settings to a live router
    ///
    /// Nothing is changed if any value is invalid. Returns the Note Offs
    /// released by a switch out of latched sustain.
    pub fn apply(&self, router: &mut Router) -> Result<Vec<RawMessage>> {
        let filter = self.input_channel.filter()?;
        let output = self.output_channel()?;

        router.set_input_filter(filter);
        router.set_output_channel(output);
        Ok(router.set_sustain_mode(self.sustain))
    }
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
        if self.midi.input_port.trim().is_empty() {
            anyhow::bail!("MIDI input_port cannot be empty (use '{}' for every device)", ANY_DEVICE);
        }
        if self.midi.output_port.trim().is_empty() {
            anyhow::bail!("MIDI output_port cannot be empty");
        }

        self.routing.input_channel.filter()?;
        self.routing.output_channel()?;

        Ok(())
    }

    /// Whether the input side listens to every device
    pub fn listens_to_any_device(&self) -> bool {
        self.midi.input_port.trim().eq_ignore_ascii_case(ANY_DEVICE)
    }
}

// Default value functions
fn default_input_port() -> String { ANY_DEVICE.to_string() }
fn default_output_port() -> String { "volca".to_string() }
fn default_output_channel() -> u8 { 1 }
