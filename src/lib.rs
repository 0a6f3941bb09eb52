//! Controller deck - serial slider/button deck to host audio and input
//!
//! The deck streams `s0|s1|s2|s3|s4|mask` lines over serial. They are
//! parsed into [`deck::ChannelFrame`]s, stored, smoothed, diffed into
//! [`events::StateChangeEvent`]s and turned into volume changes, hotkeys and
//! typed text by the [`mapping::MappingExecutor`].

pub mod api;
pub mod capabilities;
pub mod config;
pub mod control;
pub mod deck;
pub mod events;
pub mod link;
pub mod mapping;
pub mod paths;
pub mod pipeline;
pub mod ports;
