//! Button actions and their config-string syntax
//!
//! | syntax              | action                                  |
//! |---------------------|-----------------------------------------|
//! | `toggle_mute`       | toggle master mute                      |
//! | `toggle_mute:<app>` | toggle mute of one application          |
//! | `hotkey:<chord>`    | tap a chord (`key:` is a synonym)       |
//! | `media:<name>`      | tap a media key (alias of `hotkey:`)    |
//! | `text:<literal>`    | type text, case preserved               |
//! | `delay:<ms>`        | pause the rest of the action list       |

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use super::hotkey::{HotkeyChord, HotkeyError, Key};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionParseError {
    #[error("unknown action '{0}'")]
    Unknown(String),

    #[error("toggle_mute:<app> requires an application name")]
    MissingApp,

    #[error("invalid hotkey '{spec}': {source}")]
    InvalidHotkey {
        spec: String,
        #[source]
        source: HotkeyError,
    },

    #[error("unknown media key '{0}'")]
    UnknownMedia(String),

    #[error("invalid delay '{0}' (expected milliseconds >= 0)")]
    InvalidDelay(String),
}

/// One step of a button's action list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ToggleMuteMaster,
    /// Lower-cased executable name
    ToggleMuteApp(String),
    Hotkey(HotkeyChord),
    Text(String),
    Delay(Duration),
}

impl FromStr for Action {
    type Err = ActionParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let lower = raw.to_lowercase();

        if lower == "toggle_mute" {
            return Ok(Self::ToggleMuteMaster);
        }

        if let Some(app) = lower.strip_prefix("toggle_mute:") {
            if app.is_empty() {
                return Err(ActionParseError::MissingApp);
            }
            return Ok(Self::ToggleMuteApp(app.to_string()));
        }

        if let Some(spec) = lower
            .strip_prefix("hotkey:")
            .or_else(|| lower.strip_prefix("key:"))
        {
            return spec
                .parse::<HotkeyChord>()
                .map(Self::Hotkey)
                .map_err(|source| ActionParseError::InvalidHotkey {
                    spec: spec.to_string(),
                    source,
                });
        }

        if let Some(name) = lower.strip_prefix("media:") {
            return Key::from_media_name(name)
                .map(|key| Self::Hotkey(HotkeyChord::key_only(key)))
                .ok_or_else(|| ActionParseError::UnknownMedia(name.to_string()));
        }

        if lower.starts_with("text:") {
            // slice the original string so case and symbols survive
            return Ok(Self::Text(raw["text:".len()..].to_string()));
        }

        if let Some(ms) = lower.strip_prefix("delay:") {
            return ms
                .trim()
                .parse::<u64>()
                .map(|ms| Self::Delay(Duration::from_millis(ms)))
                .map_err(|_| ActionParseError::InvalidDelay(ms.to_string()));
        }

        Err(ActionParseError::Unknown(raw.to_string()))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToggleMuteMaster => write!(f, "toggle_mute"),
            Self::ToggleMuteApp(app) => write!(f, "toggle_mute:{}", app),
            Self::Hotkey(chord) => write!(f, "hotkey:{}", chord),
            Self::Text(text) => write!(f, "text:{}", text),
            Self::Delay(d) => write!(f, "delay:{}", d.as_millis()),
        }
    }
}
