//! State-change notifications
//!
//! The poll loop diffs consecutive frames into [`StateChangeEvent`]s and
//! publishes them. [`EventBus`] is the bounded single-consumer queue;
//! [`EventHub`] fans out to one bus per subscriber.

pub mod bus;
pub mod hub;

pub use bus::{EventBus, EVENT_QUEUE_CAPACITY};
pub use hub::{EventHub, Subscription};

use serde::Serialize;

use crate::deck::{ChannelFrame, BUTTON_COUNT, SLIDER_COUNT};

/// One channel transition between two observed frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateChangeEvent {
    SliderChanged {
        id: usize,
        value: u16,
        previous: u16,
        /// Unix time in milliseconds
        timestamp: i64,
    },
    ButtonChanged {
        id: usize,
        pressed: bool,
        previous: bool,
        timestamp: i64,
    },
}

impl StateChangeEvent {
    /// Events for every channel that differs, sliders first then buttons
    pub fn diff(previous: &ChannelFrame, current: &ChannelFrame, timestamp: i64) -> Vec<Self> {
        let sliders = (0..SLIDER_COUNT)
            .filter(|&id| previous.slider(id) != current.slider(id))
            .map(|id| Self::SliderChanged {
                id,
                value: current.slider(id),
                previous: previous.slider(id),
                timestamp,
            });

        let buttons = (0..BUTTON_COUNT)
            .filter(|&id| previous.button(id) != current.button(id))
            .map(|id| Self::ButtonChanged {
                id,
                pressed: current.button(id),
                previous: previous.button(id),
                timestamp,
            });

        sliders.chain(buttons).collect()
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Self::SliderChanged { timestamp, .. } | Self::ButtonChanged { timestamp, .. } => *timestamp,
        }
    }
}

/// Current wall-clock time for event stamps
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
