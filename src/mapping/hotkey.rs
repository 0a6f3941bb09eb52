//! Hotkey chords - `CTRL+ALT+K`, `F5`, `MEDIA_PLAY_PAUSE`, ...
//!
//! Chords are symbolic; turning them into OS key codes is the input
//! backend's job.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HotkeyError {
    #[error("no key in hotkey '{0}'")]
    NoKey(String),
}

/// Modifier keys, in the order they are pressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
    Win,
    RightWin,
}

impl Modifier {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "ctrl" | "control" => Self::Ctrl,
            "alt" | "menu" => Self::Alt,
            "shift" => Self::Shift,
            "win" | "lwin" => Self::Win,
            "rwin" => Self::RightWin,
            _ => return None,
        })
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Ctrl => "CTRL",
            Self::Alt => "ALT",
            Self::Shift => "SHIFT",
            Self::Win => "WIN",
            Self::RightWin => "RWIN",
        }
    }
}

/// The non-modifier key of a chord
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// `A`-`Z` (upper-cased) or `0`-`9`
    Char(char),
    /// `F1`-`F24`
    Function(u8),
    Enter,
    Space,
    Tab,
    Escape,
    Backspace,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Left,
    Right,
    Up,
    Down,
    MediaPlayPause,
    MediaNext,
    MediaPrev,
    MediaStop,
    VolumeUp,
    VolumeDown,
    VolumeMute,
    BrowserBack,
    BrowserForward,
    BrowserRefresh,
}

impl Key {
    /// Look up a lower-case key name
    pub fn from_name(name: &str) -> Option<Self> {
        let mut chars = name.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                return Some(Self::Char(c.to_ascii_uppercase()));
            }
        }

        if let Some(n) = name.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
            if (1..=24).contains(&n) {
                return Some(Self::Function(n));
            }
        }

        Some(match name {
            "enter" | "return" => Self::Enter,
            "space" | "spacebar" => Self::Space,
            "tab" => Self::Tab,
            "esc" | "escape" => Self::Escape,
            "backspace" => Self::Backspace,
            "delete" | "del" => Self::Delete,
            "insert" | "ins" => Self::Insert,
            "home" => Self::Home,
            "end" => Self::End,
            "pgup" | "pageup" => Self::PageUp,
            "pgdn" | "pagedown" => Self::PageDown,
            "left" => Self::Left,
            "right" => Self::Right,
            "up" => Self::Up,
            "down" => Self::Down,
            "media_play_pause" | "playpause" => Self::MediaPlayPause,
            "media_next" | "next" => Self::MediaNext,
            "media_prev" | "previous" | "prev" => Self::MediaPrev,
            "media_stop" | "stop" => Self::MediaStop,
            "volume_up" => Self::VolumeUp,
            "volume_down" => Self::VolumeDown,
            "volume_mute" => Self::VolumeMute,
            "browser_back" => Self::BrowserBack,
            "browser_forward" => Self::BrowserForward,
            "browser_refresh" => Self::BrowserRefresh,
            _ => return None,
        })
    }

    /// Key for a `media:<name>` action
    pub fn from_media_name(name: &str) -> Option<Self> {
        Some(match name {
            "play_pause" | "playpause" => Self::MediaPlayPause,
            "next" => Self::MediaNext,
            "prev" | "previous" => Self::MediaPrev,
            "stop" => Self::MediaStop,
            "volume_up" => Self::VolumeUp,
            "volume_down" => Self::VolumeDown,
            "volume_mute" => Self::VolumeMute,
            _ => return None,
        })
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Char(c) => return write!(f, "{}", c),
            Self::Function(n) => return write!(f, "F{}", n),
            Self::Enter => "ENTER",
            Self::Space => "SPACE",
            Self::Tab => "TAB",
            Self::Escape => "ESC",
            Self::Backspace => "BACKSPACE",
            Self::Delete => "DELETE",
            Self::Insert => "INSERT",
            Self::Home => "HOME",
            Self::End => "END",
            Self::PageUp => "PGUP",
            Self::PageDown => "PGDN",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::MediaPlayPause => "MEDIA_PLAY_PAUSE",
            Self::MediaNext => "MEDIA_NEXT",
            Self::MediaPrev => "MEDIA_PREV",
            Self::MediaStop => "MEDIA_STOP",
            Self::VolumeUp => "VOLUME_UP",
            Self::VolumeDown => "VOLUME_DOWN",
            Self::VolumeMute => "VOLUME_MUTE",
            Self::BrowserBack => "BROWSER_BACK",
            Self::BrowserForward => "BROWSER_FORWARD",
            Self::BrowserRefresh => "BROWSER_REFRESH",
        };
        f.write_str(name)
    }
}

/// Modifiers (sorted, unique) plus one key, sent as a single tap
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HotkeyChord {
    pub modifiers: Vec<Modifier>,
    pub key: Key,
}

impl HotkeyChord {
    pub fn new(modifiers: impl IntoIterator<Item = Modifier>, key: Key) -> Self {
        let mut modifiers: Vec<Modifier> = modifiers.into_iter().collect();
        modifiers.sort();
        modifiers.dedup();
        Self { modifiers, key }
    }

    pub fn key_only(key: Key) -> Self {
        Self {
            modifiers: Vec::new(),
            key,
        }
    }
}

impl FromStr for HotkeyChord {
    type Err = HotkeyError;

    /// `+`-separated, case-insensitive, whitespace ignored. Unrecognised
    /// tokens are skipped and the last recognised key wins.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let compact: String = spec
            .chars()
            .filter(|c| *c != ' ' && *c != '\t')
            .collect::<String>()
            .to_lowercase();

        let mut modifiers = Vec::new();
        let mut key = None;

        for token in compact.split('+').filter(|t| !t.is_empty()) {
            if let Some(modifier) = Modifier::from_name(token) {
                modifiers.push(modifier);
            } else if let Some(k) = Key::from_name(token) {
                key = Some(k);
            }
        }

        let key = key.ok_or_else(|| HotkeyError::NoKey(spec.to_string()))?;
        Ok(Self::new(modifiers, key))
    }
}

impl fmt::Display for HotkeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in &self.modifiers {
            write!(f, "{}+", modifier.as_str())?;
        }
        write!(f, "{}", self.key)
    }
}
