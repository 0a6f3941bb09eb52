//! Mapping executor - turns frame changes into host side effects
//!
//! Sliders are delta-triggered in normalized volume space; buttons fire
//! their action list once per rising edge. Capability failures are logged
//! and skipped, never propagated.

use std::thread;

use tracing::{debug, warn};

use super::{Action, MappingConfig, SliderTarget};
use crate::capabilities::{Capabilities, CapabilityResult};
use crate::deck::{ChannelFrame, BUTTON_COUNT, SLIDER_COUNT, SLIDER_MAX};

/// Minimum normalized slider change (about 1% of travel) that reaches the
/// audio backend
pub const DEFAULT_SLIDER_DELTA_THRESHOLD: f32 = 0.01;

#[derive(Debug, Clone, Copy)]
pub struct MappingExecutor {
    slider_delta_threshold: f32,
}

impl Default for MappingExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingExecutor {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_SLIDER_DELTA_THRESHOLD)
    }

    /// Executor ignoring slider moves smaller than `threshold` (0..1)
    pub fn with_threshold(threshold: f32) -> Self {
        let slider_delta_threshold = if threshold.is_finite() {
            threshold.clamp(0.0, 1.0)
        } else {
            DEFAULT_SLIDER_DELTA_THRESHOLD
        };
        Self {
            slider_delta_threshold,
        }
    }

    pub fn slider_delta_threshold(&self) -> f32 {
        self.slider_delta_threshold
    }

    /// Push every mapped slider's current position to its target,
    /// regardless of what changed
    pub fn preapply(&self, config: &MappingConfig, caps: &Capabilities, frame: &ChannelFrame) {
        for index in 0..SLIDER_COUNT {
            if let Some(target) = config.slider(index) {
                set_target_volume(caps, target, frame.slider_normalized(index));
            }
        }
    }

    /// Apply one poll cycle: sliders first, then rising-edge buttons.
    ///
    /// `previous` becomes `current` once every action has been dispatched.
    /// Blocks for the duration of any `delay:` action.
    pub fn apply_changes(
        &self,
        config: &MappingConfig,
        caps: &Capabilities,
        current: &ChannelFrame,
        previous: &mut ChannelFrame,
    ) {
        for index in 0..SLIDER_COUNT {
            let Some(target) = config.slider(index) else {
                continue;
            };

            let value = current.slider_normalized(index);
            if (value - previous.slider_normalized(index)).abs() < self.slider_delta_threshold {
                continue;
            }
            set_target_volume(caps, target, value);
        }

        for index in 0..BUTTON_COUNT {
            if !previous.button(index) && current.button(index) {
                let actions = config.actions(index);
                if !actions.is_empty() {
                    debug!("Button {} pressed, running {} action(s)", index, actions.len());
                }
                self.run_actions(caps, actions);
            }
        }

        *previous = *current;
    }

    /// Run `actions` in order; a failing action does not stop the rest
    pub fn run_actions(&self, caps: &Capabilities, actions: &[Action]) {
        for action in actions {
            if let Err(e) = run_action(caps, action) {
                warn!("Action '{}' failed: {}", action, e);
            }
        }
    }

    /// Fire button `index` as if it had just been pressed
    pub fn simulate_press(&self, config: &MappingConfig, caps: &Capabilities, index: usize) -> bool {
        if index >= BUTTON_COUNT {
            return false;
        }
        debug!("Simulated press on button {}", index);
        self.run_actions(caps, config.actions(index));
        true
    }

    /// Move slider `index` of `stored` to `raw` and apply the difference.
    ///
    /// Goes through [`Self::apply_changes`], so the delta threshold holds.
    /// `stored` itself is not modified.
    pub fn simulate_slider(
        &self,
        config: &MappingConfig,
        caps: &Capabilities,
        stored: &ChannelFrame,
        index: usize,
        raw: u16,
    ) -> bool {
        if index >= SLIDER_COUNT || raw > SLIDER_MAX {
            return false;
        }
        let mut previous = *stored;
        self.apply_changes(config, caps, &stored.with_slider(index, raw), &mut previous);
        true
    }
}

fn set_target_volume(caps: &Capabilities, target: &SliderTarget, volume: f32) {
    match target {
        SliderTarget::Master => {
            if let Err(e) = caps.master.set_volume(volume) {
                warn!("Master volume → {:.2} failed: {}", volume, e);
            }
        }
        SliderTarget::Apps(apps) => {
            for app in apps {
                if let Err(e) = caps.sessions.set_volume(app, volume) {
                    warn!("{} volume → {:.2} failed: {}", app, volume, e);
                }
            }
        }
    }
}

fn run_action(caps: &Capabilities, action: &Action) -> CapabilityResult<()> {
    match action {
        Action::ToggleMuteMaster => caps.master.toggle_mute(),
        Action::ToggleMuteApp(app) => caps.sessions.toggle_mute(app),
        Action::Hotkey(chord) => caps.input.tap_chord(chord),
        Action::Text(text) => caps.input.type_text(text),
        Action::Delay(duration) => {
            thread::sleep(*duration);
            Ok(())
        }
    }
}
