//! Host capability interfaces
//!
//! The mapping executor drives the host only through these traits. OS
//! backends (audio endpoint / session control, keyboard injection) live
//! outside this crate and implement them; [`ConsoleBackend`] is the
//! in-process implementation used for dry runs and development.
//!
//! All methods take `&self`: implementations use interior mutability, the
//! same way drivers are shared behind `Arc<dyn ...>`.

pub mod console;

pub use console::ConsoleBackend;

use std::sync::Arc;

use thiserror::Error;

use crate::mapping::HotkeyChord;

/// Failure reported by a capability backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("no audio session for '{0}'")]
    SessionNotFound(String),

    #[error("backend rejected the request: {0}")]
    Rejected(String),

    #[error("operation not supported by this backend")]
    Unsupported,
}

pub type CapabilityResult<T> = Result<T, CapabilityError>;

/// Master output endpoint volume and mute
pub trait MasterAudio: Send + Sync {
    /// Set volume, `0.0..=1.0`
    fn set_volume(&self, volume: f32) -> CapabilityResult<()>;

    fn volume(&self) -> CapabilityResult<f32>;

    fn set_mute(&self, muted: bool) -> CapabilityResult<()>;

    fn toggle_mute(&self) -> CapabilityResult<()>;
}

/// Per-application session volume and mute.
///
/// `app` is a lower-cased executable basename (e.g. `spotify.exe`); every
/// live session of that application is affected.
pub trait SessionAudio: Send + Sync {
    fn set_volume(&self, app: &str, volume: f32) -> CapabilityResult<()>;

    /// `None` when the application has no live session
    fn volume(&self, app: &str) -> CapabilityResult<Option<f32>>;

    fn set_mute(&self, app: &str, muted: bool) -> CapabilityResult<()>;

    fn toggle_mute(&self, app: &str) -> CapabilityResult<()>;
}

/// Synthetic keyboard input
pub trait InputInjector: Send + Sync {
    /// Press modifiers, press key, release key, release modifiers in reverse
    fn tap_chord(&self, chord: &HotkeyChord) -> CapabilityResult<()>;

    /// Type a Unicode literal
    fn type_text(&self, text: &str) -> CapabilityResult<()>;
}

/// The set of backends the executor calls into
#[derive(Clone)]
pub struct Capabilities {
    pub master: Arc<dyn MasterAudio>,
    pub sessions: Arc<dyn SessionAudio>,
    pub input: Arc<dyn InputInjector>,
}

impl Capabilities {
    pub fn new(
        master: Arc<dyn MasterAudio>,
        sessions: Arc<dyn SessionAudio>,
        input: Arc<dyn InputInjector>,
    ) -> Self {
        Self {
            master,
            sessions,
            input,
        }
    }

    /// All three capabilities served by one backend object
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: MasterAudio + SessionAudio + InputInjector + 'static,
    {
        Self {
            master: backend.clone(),
            sessions: backend.clone(),
            input: backend,
        }
    }
}
