use std::io;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use super::active::ActiveEffectSet;
use super::effect::{EffectDefinition, EffectId, EffectStore};
use super::event::{FeedbackEvent, RawEvent};
use super::simulate::MAX_GAIN;
use super::RumbleCallback;
use crate::config::FeedbackConfig;

/// Kernel side of a virtual device's force-feedback protocol.
///
/// Uploads and erases are two-phase: the device queues a request event, the owner retrieves the
/// request with `begin_*` and completes it with `end_*`, which unblocks the client that issued it.
pub trait EventSource {
    /// Appends every event that is currently queued, without blocking
    fn read_events(&mut self, events: &mut Vec<RawEvent>) -> io::Result<()>;

    /// Retrieves the effect of upload request `request_id`.
    ///
    /// `None` means the effect cannot be rendered as rumble; the upload is still acknowledged.
    fn begin_upload(&mut self, request_id: u32) -> io::Result<Option<EffectDefinition>>;

    fn end_upload(&mut self, request_id: u32, retval: i32) -> io::Result<()>;

    /// Retrieves the id of the effect erase request `request_id` refers to
    fn begin_erase(&mut self, request_id: u32) -> io::Result<EffectId>;

    fn end_erase(&mut self, request_id: u32, retval: i32) -> io::Result<()>;
}

/// Serves the force-feedback protocol of one virtual device and simulates its rumble.
///
/// All state is owned by the listener, so it runs on a single thread without locking.
pub struct FeedbackListener<S> {
    source: S,
    config: FeedbackConfig,
    store: EffectStore,
    active: ActiveEffectSet,
    /// Only changed by FF_GAIN, applies to effects activated afterwards
    gain: u16,
    on_rumble: Option<RumbleCallback>,
    events: Vec<RawEvent>,
}

impl<S: EventSource> FeedbackListener<S> {
    pub fn new(source: S, config: FeedbackConfig, on_rumble: Option<RumbleCallback>) -> Self {
        Self {
            source,
            config,
            store: EffectStore::new(),
            active: ActiveEffectSet::new(),
            gain: MAX_GAIN,
            on_rumble,
            events: Vec::new(),
        }
    }

    pub fn gain(&self) -> u16 {
        self.gain
    }

    pub fn store(&self) -> &EffectStore {
        &self.store
    }

    pub fn active(&self) -> &ActiveEffectSet {
        &self.active
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Runs until `stop` is set, one tick per configured interval.
    ///
    /// Outstanding effects are left as they are when the listener exits.
    pub fn run(mut self, stop: &AtomicBool) {
        log::info!(
            "FF listener started (tick={}ms)",
            self.config.tick_interval().as_millis()
        );

        while !stop.load(Ordering::SeqCst) {
            thread::sleep(self.config.tick_interval());
            self.poll(Instant::now());
            self.advance(Instant::now());
        }

        log::info!("FF listener stopped");
    }

    /// One full tick at a fixed instant: protocol events first, then expiry and simulation
    pub fn tick_at(&mut self, now: Instant) {
        self.poll(now);
        self.advance(now);
    }

    /// Drains and handles every pending event
    pub fn poll(&mut self, now: Instant) {
        let mut events = mem::take(&mut self.events);
        if let Err(e) = self.source.read_events(&mut events) {
            log::warn!("Error reading FF events: {}", e);
        }

        for event in events.drain(..) {
            self.handle_event(event, now);
        }
        self.events = events;
    }

    /// Drops expired effects and reports changed magnitudes
    pub fn advance(&mut self, now: Instant) {
        let on_rumble = &mut self.on_rumble;
        self.active.expire(now, |strong, weak| notify(on_rumble, strong, weak));
        self.active
            .emit_changes(now, self.config.envelope_baseline, |strong, weak| {
                notify(on_rumble, strong, weak)
            });
    }

    pub fn handle_event(&mut self, event: RawEvent, now: Instant) {
        match FeedbackEvent::from(event) {
            FeedbackEvent::Upload { request_id } => self.upload(request_id),
            FeedbackEvent::Erase { request_id } => self.erase(request_id),
            FeedbackEvent::Gain(gain) => {
                log::debug!("FF gain set to {}", gain);
                self.gain = gain;
            }
            FeedbackEvent::Autocenter(value) => {
                log::debug!("Ignoring FF autocenter ({})", value);
            }
            FeedbackEvent::Play { effect_id } => {
                if self.active.activate(&self.store, effect_id, self.gain, now) {
                    log::debug!("FF effect {} playing (gain={})", effect_id, self.gain);
                }
            }
            FeedbackEvent::Stop { effect_id } => self.deactivate(effect_id),
            FeedbackEvent::Led { code, value } => {
                log::trace!("LED {} = {} (not supported)", code, value);
            }
            FeedbackEvent::Other(_) => {}
        }
    }

    fn upload(&mut self, request_id: u32) {
        let effect = match self.source.begin_upload(request_id) {
            Ok(effect) => effect,
            Err(e) => {
                log::error!("UI_BEGIN_FF_UPLOAD failed: {}", e);
                return;
            }
        };

        if let Some(effect) = effect {
            log::debug!(
                "Stored FF effect ID {} ({:?}, length={}ms, delay={}ms)",
                effect.id,
                effect.kind,
                effect.length_ms(),
                effect.delay_ms()
            );
            self.store.upload(effect);
        }

        if let Err(e) = self.source.end_upload(request_id, 0) {
            log::error!("UI_END_FF_UPLOAD failed: {}", e);
        }
    }

    fn erase(&mut self, request_id: u32) {
        let effect_id = match self.source.begin_erase(request_id) {
            Ok(effect_id) => effect_id,
            Err(e) => {
                log::error!("UI_BEGIN_FF_ERASE failed: {}", e);
                return;
            }
        };

        self.deactivate(effect_id);
        self.store.erase(effect_id);

        if let Err(e) = self.source.end_erase(request_id, 0) {
            log::error!("UI_END_FF_ERASE failed: {}", e);
        }
    }

    fn deactivate(&mut self, effect_id: EffectId) {
        let on_rumble = &mut self.on_rumble;
        self.active
            .deactivate(effect_id, |strong, weak| notify(on_rumble, strong, weak));
    }
}

fn notify(on_rumble: &mut Option<RumbleCallback>, strong: u16, weak: u16) {
    if let Some(callback) = on_rumble {
        callback(strong, weak);
    }
}
