//! Events the kernel queues on a virtual device, as far as force feedback is concerned.

use super::effect::EffectId;
use super::simulate::MAX_GAIN;

pub const EV_LED: u16 = 0x11;
pub const EV_FF: u16 = 0x15;
pub const EV_UINPUT: u16 = 0x0101;

// UI event codes
pub const UI_FF_UPLOAD: u16 = 1;
pub const UI_FF_ERASE: u16 = 2;

// EV_FF codes that are not effect ids
pub const FF_GAIN: u16 = 0x60;
pub const FF_AUTOCENTER: u16 = 0x61;

/// A raw `input_event` without its timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub type_: u16,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    pub const fn new(type_: u16, code: u16, value: i32) -> Self {
        Self { type_, code, value }
    }

    pub const fn ff_upload(request_id: u32) -> Self {
        Self::new(EV_UINPUT, UI_FF_UPLOAD, request_id as i32)
    }

    pub const fn ff_erase(request_id: u32) -> Self {
        Self::new(EV_UINPUT, UI_FF_ERASE, request_id as i32)
    }

    pub const fn ff_gain(gain: i32) -> Self {
        Self::new(EV_FF, FF_GAIN, gain)
    }

    /// Play (`value != 0`) or stop (`value == 0`) an uploaded effect
    pub const fn ff_control(effect_id: EffectId, value: i32) -> Self {
        Self::new(EV_FF, effect_id as u16, value)
    }
}

/// What the feedback listener makes of a [`RawEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackEvent {
    /// An effect upload is waiting to be retrieved
    Upload { request_id: u32 },
    /// An effect erase is waiting to be retrieved
    Erase { request_id: u32 },
    /// Global gain, already clamped to `0..=MAX_GAIN`
    Gain(u16),
    Autocenter(i32),
    Play { effect_id: EffectId },
    Stop { effect_id: EffectId },
    Led { code: u16, value: i32 },
    Other(RawEvent),
}

impl From<RawEvent> for FeedbackEvent {
    fn from(event: RawEvent) -> Self {
        match (event.type_, event.code) {
            (EV_UINPUT, UI_FF_UPLOAD) => FeedbackEvent::Upload {
                request_id: event.value as u32,
            },
            (EV_UINPUT, UI_FF_ERASE) => FeedbackEvent::Erase {
                request_id: event.value as u32,
            },
            (EV_FF, FF_GAIN) => {
                FeedbackEvent::Gain(event.value.clamp(0, i32::from(MAX_GAIN)) as u16)
            }
            (EV_FF, FF_AUTOCENTER) => FeedbackEvent::Autocenter(event.value),
            (EV_FF, code) => {
                let effect_id = code as EffectId;
                if event.value != 0 {
                    FeedbackEvent::Play { effect_id }
                } else {
                    FeedbackEvent::Stop { effect_id }
                }
            }
            (EV_LED, code) => FeedbackEvent::Led {
                code,
                value: event.value,
            },
            _ => FeedbackEvent::Other(event),
        }
    }
}
