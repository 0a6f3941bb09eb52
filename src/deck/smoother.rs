//! Input smoother - per-slider deadband + exponential moving average
//!
//! Runs on the poll thread on frames already copied out of the store. The
//! first sample after construction or [`InputSmoother::reset`] snaps the
//! filter to the raw value so there is no start-up ramp.

use serde::{Deserialize, Serialize};

use super::frame::{ChannelFrame, SLIDER_COUNT};

/// Filter parameters for one slider channel
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct SmoothingParams {
    /// Raw-count changes at or below this are treated as jitter
    #[serde(default = "default_deadband")]
    pub deadband_counts: i32,
    /// EMA factor, 0 = frozen, 1 = no smoothing
    #[serde(default = "default_alpha")]
    pub alpha: f32,
}

impl SmoothingParams {
    /// Clamp into the valid domain (deadband >= 0, alpha in 0..=1)
    pub fn sanitized(self) -> Self {
        let alpha = if self.alpha.is_nan() {
            default_alpha()
        } else {
            self.alpha.clamp(0.0, 1.0)
        };
        Self {
            deadband_counts: self.deadband_counts.max(0),
            alpha,
        }
    }
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            deadband_counts: default_deadband(),
            alpha: default_alpha(),
        }
    }
}

fn default_deadband() -> i32 {
    2
}

fn default_alpha() -> f32 {
    0.20
}

/// Filter memory for one slider
#[derive(Debug, Clone, Copy, Default)]
struct ChannelState {
    last_filtered: i32,
    has_sample: bool,
    params: SmoothingParams,
}

#[derive(Debug, Clone)]
pub struct InputSmoother {
    channels: [ChannelState; SLIDER_COUNT],
}

impl InputSmoother {
    /// Smoother with default parameters on every channel
    pub fn new() -> Self {
        Self::with_params(SmoothingParams::default())
    }

    /// Smoother with the same parameters on every channel
    pub fn with_params(params: SmoothingParams) -> Self {
        let mut smoother = Self {
            channels: [ChannelState::default(); SLIDER_COUNT],
        };
        smoother.set_params_all(params);
        smoother
    }

    /// Set parameters for one channel; out-of-range indexes are ignored
    pub fn set_params(&mut self, index: usize, params: SmoothingParams) {
        if let Some(channel) = self.channels.get_mut(index) {
            channel.params = params.sanitized();
        }
    }

    pub fn set_params_all(&mut self, params: SmoothingParams) {
        for index in 0..SLIDER_COUNT {
            self.set_params(index, params);
        }
    }

    pub fn params(&self, index: usize) -> Option<SmoothingParams> {
        self.channels.get(index).map(|c| c.params)
    }

    /// Forget all filter memory; the next sample on every channel snaps
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.last_filtered = 0;
            channel.has_sample = false;
        }
    }

    /// Return `frame` with every slider filtered. Buttons pass through.
    pub fn apply(&mut self, frame: ChannelFrame) -> ChannelFrame {
        let mut out = frame;
        for (index, channel) in self.channels.iter_mut().enumerate() {
            let raw = frame.slider(index) as i32;
            let filtered = channel.filter(raw);
            out = out.with_slider(index, filtered.max(0) as u16);
        }
        out
    }
}

impl ChannelState {
    fn filter(&mut self, raw: i32) -> i32 {
        if !self.has_sample {
            self.last_filtered = raw;
            self.has_sample = true;
            return raw;
        }

        let delta = raw - self.last_filtered;
        let step = if delta.abs() <= self.params.deadband_counts {
            0
        } else {
            delta
        };
        let target = self.last_filtered + step;

        let last = self.last_filtered as f32;
        let next = last + self.params.alpha * (target as f32 - last);

        // f32::round rounds half away from zero
        self.last_filtered = next.round() as i32;
        self.last_filtered
    }
}

impl Default for InputSmoother {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::frame::BUTTON_COUNT;

    fn frame(v: u16) -> ChannelFrame {
        ChannelFrame::new([v; SLIDER_COUNT], [false; BUTTON_COUNT])
    }

    #[test]
    fn test_first_sample_snaps() {
        let mut smoother = InputSmoother::new();
        let out = smoother.apply(frame(700));
        assert_eq!(out, frame(700));
    }

    #[test]
    fn test_ema_step() {
        let mut smoother = InputSmoother::with_params(SmoothingParams {
            deadband_counts: 2,
            alpha: 0.5,
        });
        smoother.apply(frame(100));

        // 100 + 0.5 * (200 - 100) = 150
        assert_eq!(smoother.apply(frame(200)).slider(0), 150);
        // 150 + 0.5 * (200 - 150) = 175
        assert_eq!(smoother.apply(frame(200)).slider(0), 175);
    }

    #[test]
    fn test_rounding_ties_away_from_zero() {
        let mut smoother = InputSmoother::with_params(SmoothingParams {
            deadband_counts: 0,
            alpha: 0.5,
        });
        smoother.apply(frame(0));
        // 0 + 0.5 * 5 = 2.5 -> 3
        assert_eq!(smoother.apply(frame(5)).slider(0), 3);
    }

    #[test]
    fn test_jitter_inside_deadband_does_not_drift() {
        let mut smoother = InputSmoother::with_params(SmoothingParams {
            deadband_counts: 3,
            alpha: 0.2,
        });
        smoother.apply(frame(512));

        for raw in [513, 511, 515, 509, 514, 510, 512, 515] {
            assert_eq!(smoother.apply(frame(raw)).slider(0), 512);
        }
    }

    #[test]
    fn test_alpha_one_is_deadband_only() {
        let mut smoother = InputSmoother::with_params(SmoothingParams {
            deadband_counts: 2,
            alpha: 1.0,
        });
        smoother.apply(frame(100));

        assert_eq!(smoother.apply(frame(102)).slider(0), 100);
        assert_eq!(smoother.apply(frame(103)).slider(0), 103);
        assert_eq!(smoother.apply(frame(900)).slider(0), 900);
    }

    #[test]
    fn test_converges_to_held_value() {
        let mut smoother = InputSmoother::new();
        smoother.apply(frame(0));

        let mut last = 0;
        for _ in 0..100 {
            last = smoother.apply(frame(1000)).slider(0);
        }
        // the deadband stops the approach within deadband_counts of the target
        assert!(1000 - last <= 2, "stalled at {}", last);
    }

    #[test]
    fn test_reset_resnaps() {
        let mut smoother = InputSmoother::new();
        smoother.apply(frame(100));
        smoother.apply(frame(600));

        smoother.reset();
        assert_eq!(smoother.apply(frame(900)), frame(900));
    }

    #[test]
    fn test_buttons_pass_through() {
        let mut smoother = InputSmoother::new();
        let input = frame(10).with_button(2, true);
        assert!(smoother.apply(input).button(2));
    }

    #[test]
    fn test_params_are_sanitized() {
        let mut smoother = InputSmoother::new();
        smoother.set_params(
            1,
            SmoothingParams {
                deadband_counts: -4,
                alpha: 3.0,
            },
        );
        let params = smoother.params(1).unwrap();
        assert_eq!(params.deadband_counts, 0);
        assert_eq!(params.alpha, 1.0);

        smoother.set_params(42, SmoothingParams::default());
        assert!(smoother.params(42).is_none());
    }

    #[test]
    fn test_channels_are_independent() {
        let mut smoother = InputSmoother::with_params(SmoothingParams {
            deadband_counts: 0,
            alpha: 0.5,
        });
        smoother.set_params(
            4,
            SmoothingParams {
                deadband_counts: 0,
                alpha: 1.0,
            },
        );
        smoother.apply(frame(0));

        let out = smoother.apply(frame(100));
        assert_eq!(out.slider(0), 50);
        assert_eq!(out.slider(4), 100);
    }
}
