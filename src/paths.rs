//! Application path management for portable and installed modes.
//!
//! ## Mode Detection
//!
//! - **Dev mode** (debug builds): `config.yaml` in the working directory.
//! - **Portable mode**: a `.portable` marker file next to the executable
//!   keeps config and logs in that directory.
//! - **Installed mode** (default): data lives in the platform data
//!   directory, e.g. `%APPDATA%\Controller Deck` or
//!   `~/.local/share/Controller Deck`.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Application name used for directories in installed mode
const APP_NAME: &str = "Controller Deck";

const CONFIG_FILE: &str = "config.yaml";
const EXAMPLE_CONFIG_FILE: &str = "config.example.yaml";

/// Where the config file and log files live
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config: PathBuf,
    pub logs_dir: PathBuf,
    /// Config lives next to the executable (or in the dev checkout)
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// Runs before logging is initialized, so diagnostics go to stderr.
    pub fn detect() -> Self {
        let exe_dir = exe_dir();

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join(CONFIG_FILE).exists() {
                eprintln!("[paths] DEV mode ({} found in {})", CONFIG_FILE, cwd.display());
                return Self::portable_in(&cwd);
            }
        }

        if exe_dir.join(".portable").exists() {
            #[cfg(debug_assertions)]
            eprintln!("[paths] PORTABLE mode (.portable marker found)");
            return Self::portable_in(&exe_dir);
        }

        let app_data = dirs::data_dir()
            .unwrap_or_else(|| {
                eprintln!("[paths] WARNING: no platform data dir, falling back to exe dir");
                exe_dir.clone()
            })
            .join(APP_NAME);

        #[cfg(debug_assertions)]
        eprintln!("[paths] INSTALLED mode (data dir: {})", app_data.display());

        Self {
            config: app_data.join(CONFIG_FILE),
            logs_dir: app_data.join("logs"),
            is_portable: false,
        }
    }

    /// Paths for a config given explicitly on the command line
    pub fn for_config(config: impl Into<PathBuf>) -> Self {
        let config = config.into();
        let base = parent_or_cwd(&config);
        Self {
            logs_dir: base.join("logs"),
            config,
            is_portable: true,
        }
    }

    fn portable_in(dir: &Path) -> Self {
        Self {
            config: dir.join(CONFIG_FILE),
            logs_dir: dir.join("logs"),
            is_portable: true,
        }
    }

    /// Directory holding the config file
    pub fn base_dir(&self) -> PathBuf {
        parent_or_cwd(&self.config)
    }

    /// Ensure all required directories exist.
    ///
    /// In installed mode, also seeds the config from a `config.yaml` or
    /// `config.example.yaml` shipped next to the executable.
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        if !self.logs_dir.exists() {
            debug!("Creating logs directory: {}", self.logs_dir.display());
            std::fs::create_dir_all(&self.logs_dir).with_context(|| {
                format!("Failed to create logs directory {}", self.logs_dir.display())
            })?;
        }

        if !self.is_portable {
            let base = self.base_dir();
            if !base.exists() {
                debug!("Creating config directory: {}", base.display());
                std::fs::create_dir_all(&base)?;
            }
            if !self.config.exists() {
                self.seed_config(&exe_dir())?;
            }
        }

        Ok(())
    }

    /// Copy the first shipped config found in `exe_dir` or the working
    /// directory to the config location
    fn seed_config(&self, exe_dir: &Path) -> anyhow::Result<()> {
        let candidates = [
            exe_dir.join(CONFIG_FILE),
            exe_dir.join(EXAMPLE_CONFIG_FILE),
            PathBuf::from(EXAMPLE_CONFIG_FILE),
        ];

        match candidates.iter().find(|p| p.exists()) {
            Some(source) => {
                info!("Copying {} to {}", source.display(), self.config.display());
                std::fs::copy(source, &self.config).with_context(|| {
                    format!(
                        "Failed to copy config from {} to {}",
                        source.display(),
                        self.config.display()
                    )
                })?;
            }
            None => info!("No config found, please create {}", self.config.display()),
        }
        Ok(())
    }
}

fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn parent_or_cwd(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
