//! Live configuration for the running deck
//!
//! File reloads, API config edits and API port switches all go through
//! [`DeckControl`], one at a time, so the serial link and the mapping never
//! see interleaved updates.

use anyhow::Result;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{AppConfig, SerialOverrides};
use crate::link::SerialLink;
use crate::pipeline::SharedMapping;

pub struct DeckControl {
    link: Arc<SerialLink>,
    mapping: Arc<SharedMapping>,
    /// Effective config (file + overrides)
    config: RwLock<AppConfig>,
    overrides: SerialOverrides,
    path: String,
    applying: Mutex<()>,
}

impl DeckControl {
    /// `config` is the file contents; `overrides` are applied on top of it
    pub fn new(
        link: Arc<SerialLink>,
        mapping: Arc<SharedMapping>,
        mut config: AppConfig,
        overrides: SerialOverrides,
        path: impl Into<String>,
    ) -> Self {
        overrides.apply(&mut config);
        Self {
            link,
            mapping,
            config: RwLock::new(config),
            overrides,
            path: path.into(),
            applying: Mutex::new(()),
        }
    }

    pub fn link(&self) -> &Arc<SerialLink> {
        &self.link
    }

    pub fn mapping(&self) -> &Arc<SharedMapping> {
        &self.mapping
    }

    /// Effective config currently applied
    pub fn config(&self) -> AppConfig {
        self.config.read().clone()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Apply a config read from the file.
    ///
    /// An invalid mapping leaves everything as it was. A serial change
    /// reconnects; a failed reconnect is logged and the rest still applies.
    pub async fn apply(&self, new: AppConfig) -> Result<()> {
        let _guard = self.applying.lock().await;
        self.apply_locked(new).await
    }

    /// Validate `new`, write it to the config file, then apply it
    pub async fn replace(&self, new: AppConfig) -> Result<()> {
        new.validate()?;
        let _guard = self.applying.lock().await;
        new.save(&self.path).await?;
        info!("💾 Configuration saved to {}", self.path);
        self.apply_locked(new).await
    }

    /// Switch the live connection to `port` @ `baud` and persist it.
    ///
    /// On failure the previous settings are restored (if they still open)
    /// and the config is left untouched.
    pub async fn select_serial(&self, port: &str, baud: u32) -> Result<()> {
        if !self.overrides.is_empty() {
            anyhow::bail!("serial settings are pinned by --port/--baud");
        }

        let _guard = self.applying.lock().await;
        let current = self.config();
        let mut next = current.clone();
        next.serial.port = port.trim().to_string();
        next.serial.baud = baud;
        next.validate()?;

        self.link.reconnect(&current.serial, &next.serial).await?;
        *self.config.write() = next.clone();

        if let Err(e) = next.save(&self.path).await {
            warn!("Connected, but failed to persist serial settings: {:#}", e);
        }
        Ok(())
    }

    async fn apply_locked(&self, mut new: AppConfig) -> Result<()> {
        self.overrides.apply(&mut new);
        let mapping = new.to_mapping()?;
        let current = self.config();

        if current.needs_reconnect(&new) {
            if let Err(e) = self.link.reconnect(&current.serial, &new.serial).await {
                warn!("⚠️  Serial settings not applied: {:#}", e);
            }
        }
        if current.poll_interval_ms != new.poll_interval_ms || current.api != new.api {
            warn!("poll_interval_ms / api changes take effect after restart");
        }

        self.mapping.replace(mapping, new.tuning());
        *self.config.write() = new;
        Ok(())
    }
}
