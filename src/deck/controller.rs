//! Device controller - serial reader + line parser + state store as one
//! start/stop-able unit

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use super::parser::parse_line;
use super::reader::{LineCallback, LineTransport, ReaderError, SerialReader};
use super::store::{DeviceStateStore, DEFAULT_SLIDER_THRESHOLD};

/// Owns one reader and the store it feeds.
///
/// A controller is bound to one connection: on reconnect, stop it and build
/// a fresh one (with a fresh store) rather than restarting it on a new port.
pub struct DeviceController {
    reader: SerialReader,
    store: Arc<DeviceStateStore>,
    rejected_lines: Arc<AtomicU64>,
}

impl DeviceController {
    pub fn new(transport: Arc<dyn LineTransport>) -> Self {
        Self::with_threshold(transport, DEFAULT_SLIDER_THRESHOLD)
    }

    /// Controller whose store ignores slider moves below `slider_threshold`
    pub fn with_threshold(transport: Arc<dyn LineTransport>, slider_threshold: u16) -> Self {
        let store = Arc::new(DeviceStateStore::new());
        let rejected_lines = Arc::new(AtomicU64::new(0));

        let on_line: LineCallback = {
            let store = store.clone();
            let rejected_lines = rejected_lines.clone();
            Arc::new(move |line: &str| match parse_line(line) {
                Ok(frame) => {
                    if store.update_if_changed(&frame, slider_threshold) {
                        let stored = store.get();
                        debug!(
                            "BTN mask={:#07b} SLD={:?}",
                            stored.button_mask(),
                            stored.sliders()
                        );
                    }
                }
                Err(e) => {
                    rejected_lines.fetch_add(1, Ordering::Relaxed);
                    trace!("Dropping line {:?}: {}", line, e);
                }
            })
        };

        Self {
            reader: SerialReader::new(transport, on_line),
            store,
            rejected_lines,
        }
    }

    /// Open the port and start feeding the store; no-op if already running
    pub fn start(&mut self) -> Result<(), ReaderError> {
        self.reader.start()
    }

    /// Stop reading; safe to call repeatedly
    pub fn stop(&mut self) {
        self.reader.stop();
    }

    pub fn is_running(&self) -> bool {
        self.reader.is_running()
    }

    pub fn port_name(&self) -> &str {
        self.reader.transport_name()
    }

    /// Shared handle to this connection's store
    pub fn store(&self) -> Arc<DeviceStateStore> {
        self.store.clone()
    }

    /// Lines dropped by the parser since construction
    pub fn rejected_lines(&self) -> u64 {
        self.rejected_lines.load(Ordering::Relaxed)
    }
}
