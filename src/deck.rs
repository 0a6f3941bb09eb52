//! Deck device layer
//!
//! Everything between the serial wire and a [`ChannelFrame`] snapshot:
//! the line parser, the shared state store, the serial reader and the
//! controller tying them together, plus the slider smoother applied on the
//! poll side.

pub mod controller;
pub mod frame;
pub mod parser;
pub mod reader;
pub mod smoother;
pub mod store;

pub use controller::DeviceController;
pub use frame::{ChannelFrame, BUTTON_COUNT, SLIDER_COUNT, SLIDER_MAX};
pub use parser::{parse_line, LineError};
pub use reader::{LineCallback, LineStream, LineTransport, ReaderError, SerialReader, SerialTransport};
pub use smoother::{InputSmoother, SmoothingParams};
pub use store::{DeviceStateStore, DEFAULT_SLIDER_THRESHOLD};
