//! Async serial reader
//!
//! Owns the line transport on a dedicated I/O thread running a
//! current-thread Tokio runtime. Every newline-terminated line is handed to
//! the registered callback on that thread.
//!
//! ## Lifecycle
//! - `start()` opens the transport and reports open failures synchronously.
//!   Starting a running reader is a no-op.
//! - `stop()` cancels the pending read through a [`CancellationToken`] the
//!   read future is selected against, drops (closes) the port and joins the
//!   I/O thread. Stopping a stopped or never-started reader is a no-op.
//! - An I/O error or EOF ends the read chain; the reader reports
//!   `is_running() == false` until the owner restarts it.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Callback invoked with each received line (without CR/LF)
pub type LineCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Byte stream a transport hands to the reader
pub type LineStream = Box<dyn AsyncRead + Send + Unpin>;

/// Errors surfaced by the reader lifecycle
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn serial I/O thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("serial I/O thread exited before reporting open status")]
    ThreadExited,
}

/// Anything that can deliver a byte stream of newline-terminated lines.
///
/// `open` is called on the reader's I/O thread, inside its Tokio runtime,
/// so implementations may register with the reactor.
pub trait LineTransport: Send + Sync + 'static {
    /// Human-readable name for logs (port name, test label, ...)
    fn name(&self) -> &str;

    fn open(&self) -> Result<LineStream, ReaderError>;
}

/// Serial port transport: 8 data bits, no parity, 1 stop bit, no flow control
#[derive(Debug, Clone)]
pub struct SerialTransport {
    port: String,
    baud: u32,
}

impl SerialTransport {
    pub fn new(port: impl Into<String>, baud: u32) -> Self {
        Self {
            port: port.into(),
            baud,
        }
    }
}

impl LineTransport for SerialTransport {
    fn name(&self) -> &str {
        &self.port
    }

    fn open(&self) -> Result<LineStream, ReaderError> {
        let stream = tokio_serial::new(&self.port, self.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| ReaderError::Open {
                port: self.port.clone(),
                source: e.into(),
            })?;
        Ok(Box::new(stream))
    }
}

/// Reader handle; see the module docs for the lifecycle contract
pub struct SerialReader {
    transport: Arc<dyn LineTransport>,
    on_line: LineCallback,
    cancel: CancellationToken,
    /// Cleared by the I/O thread when the read chain ends on its own
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SerialReader {
    pub fn new(transport: Arc<dyn LineTransport>, on_line: LineCallback) -> Self {
        Self {
            transport,
            on_line,
            cancel: CancellationToken::new(),
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Open the transport and start the read chain
    pub fn start(&mut self) -> Result<(), ReaderError> {
        if self.is_running() {
            return Ok(());
        }
        // The previous chain may have ended on an I/O error; reap it first
        self.join_thread();

        self.cancel = CancellationToken::new();
        let (open_tx, open_rx) = std_mpsc::sync_channel::<Result<(), ReaderError>>(1);

        let transport = self.transport.clone();
        let on_line = self.on_line.clone();
        let cancel = self.cancel.clone();
        let running = self.running.clone();

        let handle = thread::Builder::new()
            .name("deck-serial-io".to_string())
            .spawn(move || io_thread_main(transport, on_line, cancel, running, open_tx))
            .map_err(ReaderError::Spawn)?;

        match open_rx.recv() {
            Ok(Ok(())) => {
                self.thread = Some(handle);
                info!("Serial {} started", self.transport.name());
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                error!("{}", e);
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                error!("Serial I/O thread for {} died during open", self.transport.name());
                Err(ReaderError::ThreadExited)
            }
        }
    }

    /// Cancel the pending read, close the port and join the I/O thread
    pub fn stop(&mut self) {
        if self.thread.is_none() {
            return;
        }
        self.cancel.cancel();
        self.join_thread();
        info!("Serial {} stopped", self.transport.name());
    }

    fn join_thread(&mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("Serial I/O thread panicked");
            }
        }
        self.running.store(false, Ordering::Release);
    }
}

impl Drop for SerialReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn io_thread_main(
    transport: Arc<dyn LineTransport>,
    on_line: LineCallback,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
    open_tx: std_mpsc::SyncSender<Result<(), ReaderError>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let _ = open_tx.send(Err(ReaderError::Spawn(e)));
            return;
        }
    };

    runtime.block_on(async move {
        let stream = match transport.open() {
            Ok(stream) => stream,
            Err(e) => {
                let _ = open_tx.send(Err(e));
                return;
            }
        };

        running.store(true, Ordering::Release);
        let _ = open_tx.send(Ok(()));

        read_lines(transport.name(), stream, &on_line, &cancel).await;
        running.store(false, Ordering::Release);
    });
}

/// Read chain: one read-until-newline at a time, re-issued after each line
async fn read_lines(
    name: &str,
    stream: LineStream,
    on_line: &LineCallback,
    cancel: &CancellationToken,
) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(64);

    loop {
        buf.clear();
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Serial {} read cancelled", name);
                break;
            }
            res = reader.read_until(b'\n', &mut buf) => match res {
                Ok(0) => {
                    warn!("Serial {} closed by peer", name);
                    break;
                }
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    on_line(text.trim_end_matches(['\r', '\n']));
                }
                Err(e) => {
                    error!("Serial {} I/O error: {}", name, e);
                    break;
                }
            }
        }
    }
    // Dropping the reader closes the port
}
