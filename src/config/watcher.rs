//! Configuration file watcher for hot-reload support
//!
//! Watches the directory holding the config file rather than the file
//! itself, so editors that save by rename-and-replace keep triggering
//! reloads.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

/// Delay before re-reading, lets the writer finish
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Config watcher that monitors file changes and sends reload notifications
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
}

impl ConfigWatcher {
    /// Load the config at `config_path` and start watching it
    pub async fn new(config_path: String) -> Result<(Self, AppConfig)> {
        let (tx, rx) = mpsc::channel(10);

        let initial_config = AppConfig::load(&config_path)
            .await
            .context("Failed to load initial config")?;

        let file_path = PathBuf::from(&config_path);
        let file_name = file_path
            .file_name()
            .map(|name| name.to_os_string())
            .with_context(|| format!("Config path has no file name: {}", config_path))?;
        let watch_dir = match file_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        // notify callbacks run on their own OS thread, outside the runtime
        let runtime_handle = tokio::runtime::Handle::current();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    error!("Watch error: {}", e);
                    return;
                }
            };

            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                return;
            }
            if !event
                .paths
                .iter()
                .any(|path| path.file_name() == Some(file_name.as_os_str()))
            {
                return;
            }

            debug!("Config file changed: {:?}", event.paths);

            let config_path = config_path_for(&event.paths, &file_name);
            let tx = tx.clone();
            runtime_handle.spawn(async move {
                tokio::time::sleep(DEBOUNCE).await;

                match AppConfig::load(&config_path).await {
                    Ok(new_config) => {
                        if let Err(e) = tx.send(new_config).await {
                            error!("Failed to send config update: {}", e);
                        }
                    }
                    Err(e) => {
                        warn!("Failed to reload config (keeping old config): {:#}", e);
                    }
                }
            });
        })?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config directory: {}", watch_dir.display()))?;

        info!("Config file watcher started for: {}", config_path);

        Ok((
            Self {
                _watcher: watcher,
                rx,
            },
            initial_config,
        ))
    }

    /// Wait for the next config update
    /// Returns None if the watcher has been closed
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.rx.recv().await
    }
}

/// Pick the event path that names the watched file
fn config_path_for(paths: &[PathBuf], file_name: &std::ffi::OsStr) -> String {
    paths
        .iter()
        .find(|path| path.file_name() == Some(file_name))
        .map(|path| path.as_path())
        .unwrap_or_else(|| Path::new(file_name))
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::SustainMode;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_config_path_for_picks_matching_file() {
        let paths = vec![PathBuf::from("/tmp/other.yaml"), PathBuf::from("/tmp/config.yaml")];
        let name = std::ffi::OsStr::new("config.yaml");

        assert_eq!(config_path_for(&paths, name), "/tmp/config.yaml");
    }

    #[tokio::test]
    async fn test_config_watcher_reload() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("test-config.yaml");

        let initial_config = r#"
midi:
  input_port: "any"
  output_port: "test-out"
routing:
  output_channel: 2
"#;

        fs::write(&config_path, initial_config)?;

        let (mut watcher, config) =
            ConfigWatcher::new(config_path.to_string_lossy().to_string()).await?;

        assert_eq!(config.midi.output_port, "test-out");
        assert_eq!(config.routing.output_channel, 2);

        let modified_config = r#"
midi:
  input_port: "any"
  output_port: "test-out"
routing:
  output_channel: 2
  sustain: latched
"#;

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&config_path, modified_config)?;

        let new_config = tokio::time::timeout(Duration::from_secs(2), watcher.next_config())
            .await?
            .expect("config watcher closed before reloading");

        assert_eq!(new_config.routing.sustain, SustainMode::Latched);

        Ok(())
    }
}
