//! Mapping layer - what each slider and button does on the host
//!
//! A [`MappingConfig`] is built once per config generation (see
//! `config::AppConfig::to_mapping`) and never mutated afterwards; reloads
//! replace it wholesale.

pub mod action;
pub mod executor;
pub mod hotkey;

pub use action::{Action, ActionParseError};
pub use executor::{MappingExecutor, DEFAULT_SLIDER_DELTA_THRESHOLD};
pub use hotkey::{HotkeyChord, HotkeyError, Key, Modifier};

use std::fmt;

use crate::deck::{BUTTON_COUNT, SLIDER_COUNT};

/// Where a slider's volume goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliderTarget {
    Master,
    /// Lower-cased executable names; every one of them gets the same volume
    Apps(Vec<String>),
}

impl fmt::Display for SliderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Master => write!(f, "master"),
            Self::Apps(apps) => write!(f, "{}", apps.join(",")),
        }
    }
}

/// Per-channel slider targets and button action lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingConfig {
    pub sliders: [Option<SliderTarget>; SLIDER_COUNT],
    pub buttons: [Vec<Action>; BUTTON_COUNT],
}

impl MappingConfig {
    pub fn slider(&self, index: usize) -> Option<&SliderTarget> {
        self.sliders.get(index).and_then(Option::as_ref)
    }

    /// Empty for unmapped or out-of-range buttons
    pub fn actions(&self, index: usize) -> &[Action] {
        self.buttons.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when no slider has a target and no button has an action
    pub fn is_empty(&self) -> bool {
        self.sliders.iter().all(Option::is_none) && self.buttons.iter().all(Vec::is_empty)
    }
}
