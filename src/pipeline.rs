//! Poll loop - store → smoother → diff → events → executor
//!
//! The loop runs on a dedicated std thread because executor actions may
//! block (`delay:`). Everything it shares with the rest of the process goes
//! through [`StoreSlot`] (which store is live) and [`SharedMapping`] (which
//! mapping is live).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::capabilities::Capabilities;
use crate::deck::{ChannelFrame, DeviceStateStore, InputSmoother, SmoothingParams, SLIDER_COUNT};
use crate::events::{now_ms, EventHub, StateChangeEvent};
use crate::mapping::{MappingConfig, MappingExecutor, DEFAULT_SLIDER_DELTA_THRESHOLD};

/// The store of the current connection plus a generation counter that
/// changes on every reconnect
pub struct StoreSlot {
    inner: RwLock<(Arc<DeviceStateStore>, u64)>,
}

impl StoreSlot {
    pub fn new(store: Arc<DeviceStateStore>) -> Self {
        Self {
            inner: RwLock::new((store, 0)),
        }
    }

    /// Install the store of a new connection, returning its generation
    pub fn swap(&self, store: Arc<DeviceStateStore>) -> u64 {
        let mut inner = self.inner.write();
        inner.0 = store;
        inner.1 += 1;
        inner.1
    }

    pub fn current(&self) -> (Arc<DeviceStateStore>, u64) {
        let inner = self.inner.read();
        (inner.0.clone(), inner.1)
    }

    pub fn store(&self) -> Arc<DeviceStateStore> {
        self.inner.read().0.clone()
    }
}

/// Filter settings that can change on config reload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    pub smoothing: [SmoothingParams; SLIDER_COUNT],
    pub slider_delta_threshold: f32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            smoothing: [SmoothingParams::default(); SLIDER_COUNT],
            slider_delta_threshold: DEFAULT_SLIDER_DELTA_THRESHOLD,
        }
    }
}

/// Hot-swappable mapping generation, read by the poll loop every tick
pub struct SharedMapping {
    current: RwLock<(Arc<MappingConfig>, Tuning)>,
    revision: AtomicU64,
    preapply_requested: AtomicBool,
}

impl SharedMapping {
    pub fn new(mapping: MappingConfig, tuning: Tuning) -> Self {
        Self {
            current: RwLock::new((Arc::new(mapping), tuning)),
            revision: AtomicU64::new(0),
            preapply_requested: AtomicBool::new(false),
        }
    }

    pub fn mapping(&self) -> Arc<MappingConfig> {
        self.current.read().0.clone()
    }

    pub fn tuning(&self) -> Tuning {
        self.current.read().1
    }

    pub fn executor(&self) -> MappingExecutor {
        MappingExecutor::with_threshold(self.tuning().slider_delta_threshold)
    }

    /// Replace the whole generation and ask the loop to re-sync volumes
    pub fn replace(&self, mapping: MappingConfig, tuning: Tuning) {
        *self.current.write() = (Arc::new(mapping), tuning);
        self.revision.fetch_add(1, Ordering::SeqCst);
        self.request_preapply();
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn request_preapply(&self) {
        self.preapply_requested.store(true, Ordering::SeqCst);
    }

    /// Check if a preapply was requested and reset the flag
    pub fn take_preapply_request(&self) -> bool {
        self.preapply_requested.swap(false, Ordering::SeqCst)
    }
}

/// Poll-loop state. Owned by the poll thread; nothing in here is shared.
pub struct Pipeline {
    slot: Arc<StoreSlot>,
    mapping: Arc<SharedMapping>,
    hub: Arc<EventHub>,
    caps: Capabilities,
    smoother: InputSmoother,
    executor: MappingExecutor,
    previous: ChannelFrame,
    generation: Option<u64>,
    tuning_revision: Option<u64>,
    synced: bool,
}

impl Pipeline {
    pub fn new(
        slot: Arc<StoreSlot>,
        mapping: Arc<SharedMapping>,
        hub: Arc<EventHub>,
        caps: Capabilities,
    ) -> Self {
        Self {
            slot,
            mapping,
            hub,
            caps,
            smoother: InputSmoother::new(),
            executor: MappingExecutor::new(),
            previous: ChannelFrame::default(),
            generation: None,
            tuning_revision: None,
            synced: false,
        }
    }

    /// Last frame handed to the executor
    pub fn previous(&self) -> ChannelFrame {
        self.previous
    }

    /// One poll cycle. Returns the events published.
    pub fn tick(&mut self) -> Vec<StateChangeEvent> {
        self.refresh_tuning();

        let (store, generation) = self.slot.current();
        if self.generation != Some(generation) {
            if self.generation.is_some() {
                info!("🔌 Device reconnected, resetting smoother");
            }
            self.smoother.reset();
            self.previous = ChannelFrame::default();
            self.generation = Some(generation);
            self.synced = false;
        }

        if !store.has_sample() {
            return Vec::new();
        }

        let frame = self.smoother.apply(store.get());
        let config = self.mapping.mapping();

        if !self.synced {
            // first sample of this connection: bring volumes in line with
            // the faders, and take held buttons as the baseline
            self.mapping.take_preapply_request();
            self.executor.preapply(&config, &self.caps, &frame);
            self.previous = frame;
            self.synced = true;
            debug!("Pre-applied slider positions {:?}", frame.sliders());
            return Vec::new();
        }

        if self.mapping.take_preapply_request() {
            debug!("Re-applying slider positions after config change");
            self.executor.preapply(&config, &self.caps, &frame);
        }

        let events = StateChangeEvent::diff(&self.previous, &frame, now_ms());
        for event in &events {
            self.hub.publish(event);
        }

        self.executor
            .apply_changes(&config, &self.caps, &frame, &mut self.previous);
        events
    }

    /// Tick every `interval` until `cancel` fires. Meant for a std thread.
    pub fn run(mut self, cancel: CancellationToken, interval: Duration) {
        info!("Poll loop started ({} ms)", interval.as_millis());
        while !cancel.is_cancelled() {
            self.tick();
            thread::sleep(interval);
        }
        info!("Poll loop stopped");
    }

    fn refresh_tuning(&mut self) {
        let revision = self.mapping.revision();
        if self.tuning_revision == Some(revision) {
            return;
        }
        let tuning = self.mapping.tuning();
        for (index, params) in tuning.smoothing.iter().enumerate() {
            self.smoother.set_params(index, *params);
        }
        self.executor = MappingExecutor::with_threshold(tuning.slider_delta_threshold);
        self.tuning_revision = Some(revision);
    }
}
