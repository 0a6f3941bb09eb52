//! Console backend - logs every capability call and keeps an in-memory mixer
//!
//! This is useful for:
//! - Running the deck without an OS audio/input backend
//! - Checking mappings by watching the log while moving faders
//! - Tests that need real (stateful) capability behaviour

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::info;

use super::{CapabilityError, CapabilityResult, InputInjector, MasterAudio, SessionAudio};
use crate::mapping::HotkeyChord;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Channel {
    volume: f32,
    muted: bool,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            volume: 1.0,
            muted: false,
        }
    }
}

#[derive(Debug, Default)]
struct Mixer {
    master: Channel,
    apps: HashMap<String, Channel>,
}

/// Logging capability backend with an in-memory mixer.
///
/// Applications are known once they are registered with
/// [`ConsoleBackend::with_apps`] or first have their volume set; toggling
/// mute on an unknown application reports `SessionNotFound` like a real
/// backend with no live session would.
#[derive(Debug, Default)]
pub struct ConsoleBackend {
    mixer: Mutex<Mixer>,
    typed: Mutex<Vec<String>>,
}

impl ConsoleBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with live sessions for the given applications
    pub fn with_apps<I, S>(apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let backend = Self::new();
        {
            let mut mixer = backend.mixer.lock();
            for app in apps {
                mixer
                    .apps
                    .insert(app.as_ref().to_lowercase(), Channel::default());
            }
        }
        backend
    }

    pub fn master_muted(&self) -> bool {
        self.mixer.lock().master.muted
    }

    pub fn app_muted(&self, app: &str) -> Option<bool> {
        self.mixer.lock().apps.get(app).map(|c| c.muted)
    }

    /// Everything typed or tapped so far, in order
    pub fn typed(&self) -> Vec<String> {
        self.typed.lock().clone()
    }
}

impl MasterAudio for ConsoleBackend {
    fn set_volume(&self, volume: f32) -> CapabilityResult<()> {
        let volume = volume.clamp(0.0, 1.0);
        self.mixer.lock().master.volume = volume;
        info!("🔊 master volume → {:.0}%", volume * 100.0);
        Ok(())
    }

    fn volume(&self) -> CapabilityResult<f32> {
        Ok(self.mixer.lock().master.volume)
    }

    fn set_mute(&self, muted: bool) -> CapabilityResult<()> {
        self.mixer.lock().master.muted = muted;
        info!("🔇 master mute → {}", muted);
        Ok(())
    }

    fn toggle_mute(&self) -> CapabilityResult<()> {
        let muted = {
            let mut mixer = self.mixer.lock();
            mixer.master.muted = !mixer.master.muted;
            mixer.master.muted
        };
        info!("🔇 master mute toggled → {}", muted);
        Ok(())
    }
}

impl SessionAudio for ConsoleBackend {
    fn set_volume(&self, app: &str, volume: f32) -> CapabilityResult<()> {
        let volume = volume.clamp(0.0, 1.0);
        self.mixer
            .lock()
            .apps
            .entry(app.to_string())
            .or_default()
            .volume = volume;
        info!("🔊 {} volume → {:.0}%", app, volume * 100.0);
        Ok(())
    }

    fn volume(&self, app: &str) -> CapabilityResult<Option<f32>> {
        Ok(self.mixer.lock().apps.get(app).map(|c| c.volume))
    }

    fn set_mute(&self, app: &str, muted: bool) -> CapabilityResult<()> {
        let mut mixer = self.mixer.lock();
        let channel = mixer
            .apps
            .get_mut(app)
            .ok_or_else(|| CapabilityError::SessionNotFound(app.to_string()))?;
        channel.muted = muted;
        info!("🔇 {} mute → {}", app, muted);
        Ok(())
    }

    fn toggle_mute(&self, app: &str) -> CapabilityResult<()> {
        let mut mixer = self.mixer.lock();
        let channel = mixer
            .apps
            .get_mut(app)
            .ok_or_else(|| CapabilityError::SessionNotFound(app.to_string()))?;
        channel.muted = !channel.muted;
        info!("🔇 {} mute toggled → {}", app, channel.muted);
        Ok(())
    }
}

impl InputInjector for ConsoleBackend {
    fn tap_chord(&self, chord: &HotkeyChord) -> CapabilityResult<()> {
        info!("⌨️  tap {}", chord);
        self.typed.lock().push(chord.to_string());
        Ok(())
    }

    fn type_text(&self, text: &str) -> CapabilityResult<()> {
        info!("⌨️  type {:?}", text);
        self.typed.lock().push(text.to_string());
        Ok(())
    }
}
