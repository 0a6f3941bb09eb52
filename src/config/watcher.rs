//! Configuration file watcher for hot-reload support

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

const RELOAD_DEBOUNCE: Duration = Duration::from_millis(100);

/// Watches the config file and yields each successfully reloaded config.
///
/// The parent directory is watched rather than the file itself so editors
/// that save by write-and-rename are still picked up. A reload that fails
/// to parse or validate is logged and dropped; the caller keeps whatever
/// config it already has.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
}

impl ConfigWatcher {
    /// Load `config_path` and start watching it
    pub async fn new(config_path: String) -> Result<(Self, Arc<AppConfig>)> {
        let (tx, rx) = mpsc::channel(10);

        let initial_config = AppConfig::load(&config_path)
            .await
            .context("Failed to load initial config")?;
        let initial_config = Arc::new(initial_config);

        let file = PathBuf::from(&config_path);
        let file_name = file
            .file_name()
            .map(|n| n.to_os_string())
            .with_context(|| format!("Config path has no file name: {}", config_path))?;
        let dir = match file.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let watch_dir = dir.clone();

        // notify callbacks run on their own OS thread, outside the runtime
        let runtime_handle = tokio::runtime::Handle::current();
        let reload_pending = Arc::new(AtomicBool::new(false));

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
                .any(|p| p.file_name() == Some(file_name.as_os_str()))
            {
                return;
            }
            // collapse the burst of events a single save produces
            if reload_pending.swap(true, Ordering::SeqCst) {
                return;
            }
            debug!("Config file changed: {:?}", event.paths);

            let config_path = config_path_for(&dir, &file_name);
            let tx = tx.clone();
            let reload_pending = reload_pending.clone();

            runtime_handle.spawn(async move {
                tokio::time::sleep(RELOAD_DEBOUNCE).await;
                reload_pending.store(false, Ordering::SeqCst);

                match AppConfig::load(&config_path).await {
                    Ok(new_config) => {
                        info!("Configuration reloaded successfully");
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

    /// Wait for the next config update.
    /// Returns None if the watcher has been closed
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.rx.recv().await
    }
}

fn config_path_for(dir: &Path, file_name: &std::ffi::OsStr) -> String {
    dir.join(file_name).to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::SliderTarget;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_watcher_reload() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("deck.yaml");

        fs::write(
            &config_path,
            "serial: { port: COM3 }\nmapping:\n  sliders: [master]\n",
        )?;

        let (mut watcher, config) =
            ConfigWatcher::new(config_path.to_string_lossy().to_string()).await?;
        assert_eq!(config.serial.port, "COM3");

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(
            &config_path,
            "serial: { port: COM7 }\nmapping:\n  sliders: [spotify.exe]\n",
        )?;

        let new_config = tokio::time::timeout(Duration::from_secs(2), watcher.next_config()).await?;

        if let Some(new_config) = new_config {
            assert_eq!(new_config.serial.port, "COM7");
            assert_eq!(
                new_config.to_mapping()?.sliders[0],
                Some(SliderTarget::Apps(vec!["spotify.exe".into()]))
            );
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_reload_is_dropped() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("deck.yaml");
        fs::write(&config_path, "mapping:\n  buttons: [toggle_mute]\n")?;

        let (mut watcher, _) =
            ConfigWatcher::new(config_path.to_string_lossy().to_string()).await?;

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&config_path, "mapping:\n  buttons: [not_an_action]\n")?;

        let reloaded = tokio::time::timeout(Duration::from_millis(500), watcher.next_config()).await;
        assert!(reloaded.is_err(), "invalid config must not be delivered");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_initial_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.yaml");
        assert!(ConfigWatcher::new(path.to_string_lossy().to_string()).await.is_err());
    }
}
