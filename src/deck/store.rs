//! DeviceStateStore - the single latest frame shared between the serial I/O
//! thread (writer) and the poll thread (reader)

use parking_lot::Mutex;

use super::frame::{ChannelFrame, BUTTON_COUNT, SLIDER_COUNT};

/// Default minimum raw-count change for a slider to be stored
pub const DEFAULT_SLIDER_THRESHOLD: u16 = 2;

#[derive(Debug, Default)]
struct Inner {
    frame: ChannelFrame,
    /// Set once any valid frame reached the store
    has_sample: bool,
}

/// Thread-safe holder of the current [`ChannelFrame`].
///
/// Readers always get a copy, never a reference into the store.
#[derive(Debug, Default)]
pub struct DeviceStateStore {
    inner: Mutex<Inner>,
}

impl DeviceStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored frame unconditionally
    pub fn set(&self, frame: ChannelFrame) {
        let mut inner = self.inner.lock();
        inner.frame = frame;
        inner.has_sample = true;
    }

    /// Copy of the stored frame
    pub fn get(&self) -> ChannelFrame {
        self.inner.lock().frame
    }

    /// Whether a frame has been received since construction
    pub fn has_sample(&self) -> bool {
        self.inner.lock().has_sample
    }

    /// Merge `frame` into the stored frame field by field.
    ///
    /// Every button transition is applied. A slider is applied only when it
    /// moved by at least `slider_threshold` raw counts. Returns true if any
    /// field was applied.
    pub fn update_if_changed(&self, frame: &ChannelFrame, slider_threshold: u16) -> bool {
        let mut inner = self.inner.lock();
        inner.has_sample = true;

        let current = inner.frame;
        let mut merged = current;
        let mut changed = false;

        for i in 0..BUTTON_COUNT {
            if current.button(i) != frame.button(i) {
                merged = merged.with_button(i, frame.button(i));
                changed = true;
            }
        }

        for i in 0..SLIDER_COUNT {
            if current.slider(i).abs_diff(frame.slider(i)) >= slider_threshold {
                merged = merged.with_slider(i, frame.slider(i));
                changed = true;
            }
        }

        if changed {
            inner.frame = merged;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn sliders(v: u16) -> ChannelFrame {
        ChannelFrame::new([v; SLIDER_COUNT], [false; BUTTON_COUNT])
    }

    #[test]
    fn test_set_and_get_copy() {
        let store = DeviceStateStore::new();
        assert!(!store.has_sample());
        assert_eq!(store.get(), ChannelFrame::default());

        store.set(sliders(300));
        assert!(store.has_sample());
        assert_eq!(store.get(), sliders(300));
    }

    #[test]
    fn test_slider_below_threshold_is_ignored() {
        let store = DeviceStateStore::new();
        store.set(sliders(500));

        let nudged = sliders(500).with_slider(0, 501);
        assert!(!store.update_if_changed(&nudged, DEFAULT_SLIDER_THRESHOLD));
        assert_eq!(store.get().slider(0), 500);

        let moved = sliders(500).with_slider(0, 502);
        assert!(store.update_if_changed(&moved, DEFAULT_SLIDER_THRESHOLD));
        assert_eq!(store.get().slider(0), 502);

        let moved_down = sliders(500).with_slider(0, 480);
        assert!(store.update_if_changed(&moved_down, DEFAULT_SLIDER_THRESHOLD));
        assert_eq!(store.get().slider(0), 480);
    }

    #[test]
    fn test_merge_is_per_field() {
        let store = DeviceStateStore::new();
        store.set(sliders(100));

        // slider 0 jitters, slider 1 really moves
        let incoming = sliders(100).with_slider(0, 101).with_slider(1, 150);
        assert!(store.update_if_changed(&incoming, 2));

        let stored = store.get();
        assert_eq!(stored.slider(0), 100);
        assert_eq!(stored.slider(1), 150);
    }

    #[test]
    fn test_button_flip_always_applies() {
        let store = DeviceStateStore::new();
        store.set(sliders(100));

        let pressed = sliders(100).with_button(3, true);
        assert!(store.update_if_changed(&pressed, u16::MAX));
        assert!(store.get().button(3));

        assert!(!store.update_if_changed(&pressed, u16::MAX));

        let released = sliders(100);
        assert!(store.update_if_changed(&released, u16::MAX));
        assert!(!store.get().button(3));
    }

    #[test]
    fn test_update_marks_sample_even_when_unchanged() {
        let store = DeviceStateStore::new();
        assert!(!store.update_if_changed(&ChannelFrame::default(), 2));
        assert!(store.has_sample());
    }

    #[test]
    fn test_concurrent_writer_and_reader() {
        let store = Arc::new(DeviceStateStore::new());
        let writer_store = store.clone();

        let writer = thread::spawn(move || {
            for v in 0..=1000u16 {
                writer_store.set(sliders(v));
            }
        });

        for _ in 0..1000 {
            let frame = store.get();
            // never torn: all sliders come from the same write
            assert!(frame.sliders().iter().all(|s| *s == frame.slider(0)));
        }

        writer.join().unwrap();
        assert_eq!(store.get(), sliders(1000));
    }
}
