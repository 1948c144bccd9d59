// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! File watcher for hot-reload configuration.
//!
//! Watches the directory holding the config file so editors that save by
//! replacing the file are still seen. Changes are debounced, then the file is
//! reloaded and validated before anyone hears about it.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use super::BackendConfig;

/// Events emitted by the config watcher
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    /// Configuration file changed and loaded cleanly
    Reloaded(Box<BackendConfig>),
    /// Configuration file changed but failed to load
    Error(String),
}

/// Configuration file watcher with debouncing and validation
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    event_receiver: Receiver<ConfigEvent>,
    watched_path: PathBuf,
}

impl ConfigWatcher {
    /// Watch `path` for changes.
    ///
    /// # Arguments
    /// * `path` - Config file to watch
    /// * `debounce_ms` - Debounce duration in milliseconds (default: 500)
    pub fn new<P: AsRef<Path>>(path: P, debounce_ms: Option<u64>) -> Result<Self> {
        let watched_path = path.as_ref().to_path_buf();
        let debounce_duration = Duration::from_millis(debounce_ms.unwrap_or(500));

        let file_name: OsString = watched_path
            .file_name()
            .ok_or_else(|| anyhow!("Config path {:?} has no file name", watched_path))?
            .to_os_string();
        let dir = match watched_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (event_tx, event_rx): (Sender<ConfigEvent>, Receiver<ConfigEvent>) = mpsc::channel();
        let (notify_tx, notify_rx): (Sender<Event>, Receiver<Event>) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = notify_tx.send(event);
                }
            },
            Config::default(),
        )
        .map_err(|e| anyhow!("Failed to create file watcher: {}", e))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| anyhow!("Failed to watch path {:?}: {}", dir, e))?;
        info!(path = ?watched_path, "watching config file");

        let reload_path = watched_path.clone();
        std::thread::spawn(move || {
            let mut last_event_time: Option<Instant> = None;

            loop {
                match notify_rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(event) => {
                        let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                            && event
                                .paths
                                .iter()
                                .any(|p| p.file_name() == Some(file_name.as_os_str()));
                        if relevant {
                            last_event_time = Some(Instant::now());
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        let settled = last_event_time
                            .map(|t| t.elapsed() >= debounce_duration)
                            .unwrap_or(false);
                        if settled {
                            last_event_time = None;
                            if event_tx.send(reload(&reload_path)).is_err() {
                                break;
                            }
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        // Watcher was dropped
                        break;
                    }
                }
            }
            debug!("config watcher thread exiting");
        });

        Ok(Self {
            _watcher: watcher,
            event_receiver: event_rx,
            watched_path,
        })
    }

    /// Try to receive the next config event (non-blocking)
    pub fn try_recv(&self) -> Option<ConfigEvent> {
        self.event_receiver.try_recv().ok()
    }

    /// Receive all pending config events
    pub fn recv_all(&self) -> Vec<ConfigEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }

    /// Block until the next config event is received
    pub fn recv(&self) -> Option<ConfigEvent> {
        self.event_receiver.recv().ok()
    }

    /// Wait up to `timeout` for the next config event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ConfigEvent> {
        self.event_receiver.recv_timeout(timeout).ok()
    }

    /// Get the path being watched
    pub fn watched_path(&self) -> &Path {
        &self.watched_path
    }
}

fn reload(path: &Path) -> ConfigEvent {
    match BackendConfig::load(path) {
        Ok(config) => {
            info!(path = ?path, devices = config.devices.len(), "config reloaded");
            ConfigEvent::Reloaded(Box::new(config))
        }
        Err(e) => {
            warn!(path = ?path, "config reload failed: {:#}", e);
            ConfigEvent::Error(format!("Failed to load {:?}: {:#}", path, e))
        }
    }
}

/// Validate a configuration without applying it
pub fn validate_config<P: AsRef<Path>>(path: P) -> Result<BackendConfig> {
    BackendConfig::load(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_validate_config() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("backend.yaml");

        let yaml = r#"
audio:
  samples_per_slice: 256
devices:
  - port: "Minilab"
    name: "Arturia Minilab"
    short_name: "ML"
    direction: input
"#;
        fs::write(&file_path, yaml).unwrap();

        let config = validate_config(&file_path).unwrap();
        assert_eq!(config.audio.samples_per_slice, 256);
        assert_eq!(config.devices[0].short_name, "ML");
    }

    #[test]
    fn test_validate_invalid_config() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("invalid.yaml");
        fs::write(&file_path, "this is not valid yaml: [").unwrap();
        assert!(validate_config(&file_path).is_err());

        let file_path = dir.path().join("invalid.toml");
        fs::write(&file_path, "[audio]\nsamples_per_slice = 0\n").unwrap();
        assert!(validate_config(&file_path).is_err());
    }

    #[test]
    fn test_watcher_creation() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("watch_test.yaml");
        fs::write(&file_path, "remote:\n  port: 9001\n").unwrap();

        let watcher = ConfigWatcher::new(&file_path, Some(100)).unwrap();
        assert_eq!(watcher.watched_path(), file_path.as_path());
        assert!(watcher.try_recv().is_none());
    }

    #[test]
    fn test_watcher_detects_changes() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("detect_test.yaml");
        fs::write(&file_path, "remote:\n  port: 9001\n").unwrap();

        let watcher = ConfigWatcher::new(&file_path, Some(100)).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let mut file = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&file_path)
            .unwrap();
        file.write_all(b"remote:\n  port: 9444\n").unwrap();
        file.flush().unwrap();
        drop(file);

        // File events are not guaranteed to arrive in every CI sandbox
        if let Some(ConfigEvent::Reloaded(config)) = watcher.recv_timeout(Duration::from_secs(2)) {
            assert_eq!(config.remote.port, 9444);
        }
    }
}
