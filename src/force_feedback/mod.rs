//! Force-feedback emulation for virtual devices.
//!
//! Applications upload effects to the virtual device and play them like on any haptic
//! controller. The [`FeedbackListener`] answers the kernel's upload/erase requests, keeps track
//! of playing effects and turns them into a stream of `(strong, weak)` rumble magnitudes.
//!
//! In uinput this works as a two step process:
//!  - the effect is first uploaded with a given request id
//!  - once the effect is played an `EV_FF` event arrives whose code is the effect id
//!
//! See <https://www.kernel.org/doc/html/latest/input/ff.html>. Devices can be tested with the
//! `fftest` utility.

mod active;
mod effect;
mod event;
mod listener;
mod simulate;
#[cfg(target_os = "linux")]
mod uinput;

pub use active::ActiveEffectSet;
pub use effect::{
    EffectDefinition, EffectId, EffectKind, EffectStore, Envelope, Magnitudes, MAX_DURATION_MS,
};
pub use event::{FeedbackEvent, RawEvent};
pub use listener::{EventSource, FeedbackListener};
pub use simulate::{simulate, ActiveEffect, EnvelopeBaseline, MAX_GAIN};
#[cfg(target_os = "linux")]
pub use uinput::{spawn_listener, UinputEventSource};

/// Receives `(strong, weak)` rumble magnitudes from the listener thread.
///
/// `(0, 0)` is reported whenever an effect stops.
pub type RumbleCallback = Box<dyn FnMut(u16, u16) + Send>;
