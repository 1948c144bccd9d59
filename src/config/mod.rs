// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Configuration system for SEQD.
//!
//! This module provides the backend configuration: audio timing, the
//! scheduler queue, the remote control listener, device naming rules and an
//! optional session to create at startup. Files are YAML or TOML, picked by
//! extension.

pub mod watcher;

pub use watcher::{validate_config, ConfigEvent, ConfigWatcher};

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::hardware::DeviceDefinition;
use crate::remote::ReconnectPolicy;
use crate::sequencer::{SequencerConfig, MAX_SCENES, MAX_TRACKS};

/// Root backend configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub sequencer: SchedulerSettings,
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Naming rules for discovered ports
    #[serde(default)]
    pub devices: Vec<DeviceDefinition>,
    /// Session created at startup
    #[serde(default)]
    pub session: Option<SessionConfig>,
}

impl BackendConfig {
    /// Load a configuration file, YAML or TOML by extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);
        let config = if is_toml {
            Self::from_toml(&contents)?
        } else {
            Self::from_yaml(&contents)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse YAML configuration")
    }

    /// Parse a configuration from a TOML string
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse TOML configuration")
    }

    /// Serialize to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize configuration to YAML")
    }

    /// Check values serde can't
    pub fn validate(&self) -> Result<()> {
        if !(self.audio.sample_rate > 0.0) {
            bail!("audio.sample_rate must be positive");
        }
        if self.audio.samples_per_slice == 0 {
            bail!("audio.samples_per_slice must be positive");
        }
        if self.sequencer.command_queue_capacity == 0 {
            bail!("sequencer.command_queue_capacity must be positive");
        }
        if self.sequencer.max_commands_per_tick == 0 {
            bail!("sequencer.max_commands_per_tick must be positive");
        }
        if self.remote.broadcast_interval_ms == 0 {
            bail!("remote.broadcast_interval_ms must be positive");
        }

        let mut short_names = HashSet::new();
        for def in &self.devices {
            if def.port.is_empty() || def.short_name.is_empty() {
                bail!("device definitions need a port and a short_name");
            }
            if !(1..=16).contains(&def.channel) {
                bail!(
                    "device '{}' channel {} is outside 1-16",
                    def.short_name,
                    def.channel
                );
            }
            if !short_names.insert(def.short_name.as_str()) {
                bail!("duplicate device short_name '{}'", def.short_name);
            }
        }

        if let Some(session) = &self.session {
            if !(1..=MAX_TRACKS).contains(&session.num_tracks)
                || !(1..=MAX_SCENES).contains(&session.num_scenes)
            {
                bail!(
                    "session size {}x{} is outside 1-{} tracks, 1-{} scenes",
                    session.num_tracks,
                    session.num_scenes,
                    MAX_TRACKS,
                    MAX_SCENES
                );
            }
        }
        Ok(())
    }

    pub fn sequencer_config(&self) -> SequencerConfig {
        SequencerConfig {
            command_queue_capacity: self.sequencer.command_queue_capacity,
            max_commands_per_tick: self.sequencer.max_commands_per_tick,
            shutdown_timeout: Duration::from_millis(self.sequencer.shutdown_timeout_ms),
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(self.remote.reconnect_initial_delay_ms),
            multiplier: self.remote.reconnect_multiplier,
            max_delay: Duration::from_millis(self.remote.reconnect_max_delay_ms),
            max_attempts: self.remote.reconnect_max_attempts,
        }
    }

    /// `host:port` of the remote listener
    pub fn remote_addr(&self) -> String {
        format!("{}:{}", self.remote.host, self.remote.port)
    }
}

/// Audio clock settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
    /// Samples per scheduler tick
    #[serde(default = "default_samples_per_slice")]
    pub samples_per_slice: u32,
}

fn default_sample_rate() -> f64 {
    44100.0
}
fn default_samples_per_slice() -> u32 {
    512
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            samples_per_slice: default_samples_per_slice(),
        }
    }
}

/// Scheduler thread settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerSettings {
    #[serde(default = "default_queue_capacity")]
    pub command_queue_capacity: usize,
    #[serde(default = "default_max_commands")]
    pub max_commands_per_tick: usize,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_ms: u64,
}

fn default_queue_capacity() -> usize {
    1024
}
fn default_max_commands() -> usize {
    256
}
fn default_shutdown_timeout() -> u64 {
    1000
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            command_queue_capacity: default_queue_capacity(),
            max_commands_per_tick: default_max_commands(),
            shutdown_timeout_ms: default_shutdown_timeout(),
        }
    }
}

/// Remote control listener and client settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_broadcast_interval")]
    pub broadcast_interval_ms: u64,
    #[serde(default = "default_reconnect_initial")]
    pub reconnect_initial_delay_ms: u64,
    #[serde(default = "default_reconnect_multiplier")]
    pub reconnect_multiplier: f64,
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_max_attempts: u32,
}

fn default_true() -> bool {
    true
}
fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    9001
}
fn default_broadcast_interval() -> u64 {
    50
}
fn default_reconnect_initial() -> u64 {
    2000
}
fn default_reconnect_multiplier() -> f64 {
    1.5
}
fn default_reconnect_max() -> u64 {
    30_000
}
fn default_reconnect_attempts() -> u32 {
    10
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            host: default_host(),
            port: default_port(),
            broadcast_interval_ms: default_broadcast_interval(),
            reconnect_initial_delay_ms: default_reconnect_initial(),
            reconnect_multiplier: default_reconnect_multiplier(),
            reconnect_max_delay_ms: default_reconnect_max(),
            reconnect_max_attempts: default_reconnect_attempts(),
        }
    }
}

/// Session to create at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    #[serde(default = "default_session_name")]
    pub name: String,
    #[serde(default = "default_session_size")]
    pub num_tracks: usize,
    #[serde(default = "default_session_size")]
    pub num_scenes: usize,
}

fn default_session_name() -> String {
    "Session 1".to_string()
}
fn default_session_size() -> usize {
    8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::DeviceDirection;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = BackendConfig::default();
        assert_eq!(config.audio.sample_rate, 44100.0);
        assert_eq!(config.audio.samples_per_slice, 512);
        assert_eq!(config.sequencer.command_queue_capacity, 1024);
        assert!(config.remote.enabled);
        assert_eq!(config.remote_addr(), "localhost:9001");
        assert_eq!(config.remote.broadcast_interval_ms, 50);
        assert!(config.session.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
audio:
  sample_rate: 48000
remote:
  port: 9100
devices:
  - port: "MicroFreak"
    name: "Arturia MicroFreak"
    short_name: "MF"
    direction: output
    channel: 3
session:
  num_tracks: 4
  num_scenes: 2
"#;
        let config = BackendConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.audio.sample_rate, 48000.0);
        assert_eq!(config.audio.samples_per_slice, 512);
        assert_eq!(config.remote.port, 9100);
        assert_eq!(config.remote.host, "localhost");
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.devices[0].direction, DeviceDirection::Output);
        assert_eq!(config.devices[0].channel, 3);

        let session = config.session.unwrap();
        assert_eq!(session.name, "Session 1");
        assert_eq!(session.num_tracks, 4);
    }

    #[test]
    fn test_parse_toml() {
        let text = r#"
[sequencer]
command_queue_capacity = 64
shutdown_timeout_ms = 250

[remote]
enabled = false

[[devices]]
port = "Keystep"
name = "Arturia Keystep"
short_name = "KS"
direction = "input"
"#;
        let config = BackendConfig::from_toml(text).unwrap();
        assert_eq!(config.sequencer.command_queue_capacity, 64);
        assert_eq!(config.sequencer.max_commands_per_tick, 256);
        assert!(!config.remote.enabled);
        assert_eq!(config.devices[0].channel, 1);

        let seq = config.sequencer_config();
        assert_eq!(seq.command_queue_capacity, 64);
        assert_eq!(seq.shutdown_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempdir().unwrap();
        let yaml_path = dir.path().join("backend.yaml");
        let toml_path = dir.path().join("backend.toml");
        fs::write(&yaml_path, "remote:\n  port: 9200\n").unwrap();
        fs::write(&toml_path, "[remote]\nport = 9300\n").unwrap();

        assert_eq!(BackendConfig::load(&yaml_path).unwrap().remote.port, 9200);
        assert_eq!(BackendConfig::load(&toml_path).unwrap().remote.port, 9300);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = BackendConfig::default();
        config.audio.samples_per_slice = 0;
        assert!(config.validate().is_err());

        let mut config = BackendConfig::default();
        config.session = Some(SessionConfig {
            name: "Big".to_string(),
            num_tracks: 65,
            num_scenes: 1,
        });
        assert!(config.validate().is_err());

        let def = DeviceDefinition {
            port: "A".to_string(),
            name: "A".to_string(),
            short_name: "A".to_string(),
            direction: DeviceDirection::Output,
            channel: 1,
        };
        let mut config = BackendConfig::default();
        config.devices = vec![def.clone(), def.clone()];
        assert!(config.validate().is_err());

        config.devices = vec![DeviceDefinition { channel: 17, ..def }];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reconnect_policy() {
        let policy = BackendConfig::default().reconnect_policy();
        assert_eq!(policy, ReconnectPolicy::default());
    }

    #[test]
    fn test_round_trip() {
        let mut config = BackendConfig::default();
        config.remote.port = 9555;
        let yaml = config.to_yaml().unwrap();
        assert_eq!(BackendConfig::from_yaml(&yaml).unwrap(), config);
    }
}
