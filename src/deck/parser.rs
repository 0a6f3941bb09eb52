//! Wire-line protocol parser
//!
//! The deck prints one line per sample:
//!
//! ```text
//! s0|s1|s2|s3|s4          sliders only, all buttons released
//! s0|s1|s2|s3|s4|mask     sliders + button bitmask
//! ```
//!
//! Slider values are clamped into `0..=1023` and the mask into `0..=31`.
//! Anything else (wrong field count, non-numeric or partially numeric field)
//! rejects the whole line.

use std::borrow::Cow;

use thiserror::Error;

use super::frame::{ChannelFrame, BUTTON_MASK_MAX, SLIDER_COUNT, SLIDER_MAX};

/// Reasons a line is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("expected 5 or 6 fields, got {0}")]
    FieldCount(usize),

    #[error("field {index} is not an integer: {token:?}")]
    InvalidNumber { index: usize, token: String },
}

/// Parse one line. CR and LF are ignored wherever they appear.
pub fn parse_line(line: &str) -> Result<ChannelFrame, LineError> {
    let line: Cow<'_, str> = if line.contains(['\r', '\n']) {
        Cow::Owned(line.replace(['\r', '\n'], ""))
    } else {
        Cow::Borrowed(line)
    };
    let line = line.as_ref();

    // A trailing separator does not open an extra empty field
    let body = line.strip_suffix('|').unwrap_or(line);
    let fields: Vec<&str> = if body.is_empty() {
        Vec::new()
    } else {
        body.split('|').collect()
    };

    if fields.len() != SLIDER_COUNT && fields.len() != SLIDER_COUNT + 1 {
        return Err(LineError::FieldCount(fields.len()));
    }

    let mut sliders = [0u16; SLIDER_COUNT];
    for (index, slot) in sliders.iter_mut().enumerate() {
        let value = parse_field(index, fields[index])?;
        *slot = value.clamp(0, SLIDER_MAX as i32) as u16;
    }

    let mask = match fields.get(SLIDER_COUNT) {
        Some(token) => parse_field(SLIDER_COUNT, token)?.clamp(0, BUTTON_MASK_MAX as i32) as u8,
        None => 0,
    };

    Ok(ChannelFrame::from_mask(sliders, mask))
}

fn parse_field(index: usize, token: &str) -> Result<i32, LineError> {
    let trimmed = token.trim_matches([' ', '\t']);
    let invalid = || LineError::InvalidNumber {
        index,
        token: token.to_string(),
    };

    // str::parse accepts a leading '+', the wire format does not
    if trimmed.starts_with('+') {
        return Err(invalid());
    }
    trimmed.parse::<i32>().map_err(|_| invalid())
}
