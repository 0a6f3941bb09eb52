//! Serial link - the live DeviceController plus the StoreSlot the poll loop
//! reads through
//!
//! Reconnecting closes the old port first so the same device can be reopened
//! with new settings. Callers serialize reconnects (see
//! [`crate::control::DeckControl`]).

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::SerialConfig;
use crate::deck::{DeviceController, SerialTransport};
use crate::pipeline::StoreSlot;
use crate::ports;

/// Opens a controller for the given settings; blocking
pub type Opener = Arc<dyn Fn(&SerialConfig) -> Result<DeviceController> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SerialStatus {
    pub port: String,
    pub running: bool,
    pub rejected_lines: u64,
    pub generation: u64,
}

pub struct SerialLink {
    controller: Mutex<DeviceController>,
    slot: Arc<StoreSlot>,
    opener: Opener,
}

/// Resolve the port and open it
pub fn connect(serial: &SerialConfig) -> Result<DeviceController> {
    let port = ports::resolve_port(&serial.port)?;
    let transport = Arc::new(SerialTransport::new(port.clone(), serial.baud));
    let mut controller = DeviceController::with_threshold(transport, serial.slider_threshold);
    controller
        .start()
        .with_context(|| format!("Failed to open serial port {} @ {} baud", port, serial.baud))?;
    info!("🔌 Connected to {} @ {} baud", port, serial.baud);
    Ok(controller)
}

impl SerialLink {
    /// Open the serial port described by `serial`; blocking
    pub fn open(serial: &SerialConfig) -> Result<Self> {
        Ok(Self::with_opener(connect(serial)?, Arc::new(connect)))
    }

    /// Wrap an already started controller; reconnects go through `opener`
    pub fn with_opener(controller: DeviceController, opener: Opener) -> Self {
        Self {
            slot: Arc::new(StoreSlot::new(controller.store())),
            controller: Mutex::new(controller),
            opener,
        }
    }

    pub fn slot(&self) -> Arc<StoreSlot> {
        self.slot.clone()
    }

    pub fn status(&self) -> SerialStatus {
        let (_, generation) = self.slot.current();
        let controller = self.controller.lock();
        SerialStatus {
            port: controller.port_name().to_string(),
            running: controller.is_running(),
            rejected_lines: controller.rejected_lines(),
            generation,
        }
    }

    /// Close the current connection and open `next`.
    ///
    /// If `next` cannot be opened, `previous` is retried and the error for
    /// `next` is returned either way. If both fail the deck stays
    /// disconnected.
    pub async fn reconnect(
        self: &Arc<Self>,
        previous: &SerialConfig,
        next: &SerialConfig,
    ) -> Result<()> {
        info!("🔄 Serial settings changed, reconnecting...");

        let link = self.clone();
        tokio::task::spawn_blocking(move || link.controller.lock().stop())
            .await
            .context("Failed to stop serial reader")?;

        let failure = match self.try_open(next.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        error!("{:#}", failure);

        match self.try_open(previous.clone()).await {
            Ok(()) => info!("Restored previous serial settings"),
            Err(e) => {
                error!("{:#}", e);
                error!("❌ No serial connection; fix the config to retry");
            }
        }
        Err(failure)
    }

    async fn try_open(self: &Arc<Self>, serial: SerialConfig) -> Result<()> {
        let opener = self.opener.clone();
        let controller = tokio::task::spawn_blocking(move || opener(&serial))
            .await
            .context("Serial connect task failed")??;

        self.slot.swap(controller.store());
        *self.controller.lock() = controller;
        Ok(())
    }

    /// Stop the reader; blocking
    pub fn stop(&self) {
        self.controller.lock().stop();
    }
}
