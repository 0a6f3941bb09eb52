//! Channel frame - one complete sample of the deck's sliders and buttons

use serde::Serialize;

/// Number of slider channels on the deck
pub const SLIDER_COUNT: usize = 5;

/// Number of button channels on the deck
pub const BUTTON_COUNT: usize = 5;

/// Highest raw slider reading (10-bit ADC)
pub const SLIDER_MAX: u16 = 1023;

/// Highest accepted button mask (one bit per button)
pub const BUTTON_MASK_MAX: u8 = (1 << BUTTON_COUNT) - 1;

/// Latest state of every channel on the deck.
///
/// Frames are values: they are replaced wholesale, never edited in place.
/// The `with_*` helpers return a modified copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ChannelFrame {
    sliders: [u16; SLIDER_COUNT],
    buttons: [bool; BUTTON_COUNT],
}

impl ChannelFrame {
    /// Build a frame, clamping every slider into `0..=SLIDER_MAX`
    pub fn new(sliders: [u16; SLIDER_COUNT], buttons: [bool; BUTTON_COUNT]) -> Self {
        Self {
            sliders: sliders.map(|v| v.min(SLIDER_MAX)),
            buttons,
        }
    }

    /// Build a frame from sliders and a button bitmask (bit i = button i)
    pub fn from_mask(sliders: [u16; SLIDER_COUNT], mask: u8) -> Self {
        let mut buttons = [false; BUTTON_COUNT];
        for (i, pressed) in buttons.iter_mut().enumerate() {
            *pressed = (mask >> i) & 1 != 0;
        }
        Self::new(sliders, buttons)
    }

    pub fn sliders(&self) -> &[u16; SLIDER_COUNT] {
        &self.sliders
    }

    pub fn buttons(&self) -> &[bool; BUTTON_COUNT] {
        &self.buttons
    }

    /// Raw reading for slider `index` (0 if out of range)
    pub fn slider(&self, index: usize) -> u16 {
        self.sliders.get(index).copied().unwrap_or(0)
    }

    /// Pressed state for button `index` (false if out of range)
    pub fn button(&self, index: usize) -> bool {
        self.buttons.get(index).copied().unwrap_or(false)
    }

    /// Slider reading normalized to `0.0..=1.0`
    pub fn slider_normalized(&self, index: usize) -> f32 {
        self.slider(index) as f32 / SLIDER_MAX as f32
    }

    /// Button state as a bitmask, bit i set iff button i is pressed
    pub fn button_mask(&self) -> u8 {
        self.buttons
            .iter()
            .enumerate()
            .filter(|(_, pressed)| **pressed)
            .fold(0u8, |mask, (i, _)| mask | (1 << i))
    }

    /// Copy of this frame with one slider replaced (clamped)
    pub fn with_slider(mut self, index: usize, value: u16) -> Self {
        if let Some(slot) = self.sliders.get_mut(index) {
            *slot = value.min(SLIDER_MAX);
        }
        self
    }

    /// Copy of this frame with one button replaced
    pub fn with_button(mut self, index: usize, pressed: bool) -> Self {
        if let Some(slot) = self.buttons.get_mut(index) {
            *slot = pressed;
        }
        self
    }
}
