//! Effect definitions as uploaded by the kernel, and the store keeping them per device.

use std::collections::HashMap;
use std::time::Duration;

/// Longest delay or length the kernel interface allows, in milliseconds.
pub const MAX_DURATION_MS: u16 = 0x7fff;

/// Kernel-assigned effect identifier
pub type EffectId = i16;

/// Attack/fade shaping near the start and end of an effect's playback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Duration of the attack phase in ms
    pub attack_length: u16,
    pub attack_level: u16,
    /// Duration of the fade phase in ms
    pub fade_length: u16,
    pub fade_level: u16,
}

/// Weak and strong motor intensities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Magnitudes {
    pub weak: u16,
    pub strong: u16,
}

impl Magnitudes {
    pub const ZERO: Self = Self { weak: 0, strong: 0 };

    pub fn new(weak: u16, strong: u16) -> Self {
        Self { weak, strong }
    }

    /// Same intensity on both motors
    pub fn uniform(level: u16) -> Self {
        Self { weak: level, strong: level }
    }
}

/// The effect kinds that can be rendered as rumble.
///
/// Signed kernel levels are stored as their absolute value, a rumble motor has no direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    Constant { level: u16, envelope: Envelope },
    Periodic { magnitude: u16, envelope: Envelope },
    Ramp { start_level: u16, end_level: u16, envelope: Envelope },
    Rumble { strong_magnitude: u16, weak_magnitude: u16 },
}

impl EffectKind {
    /// Start magnitudes, end magnitudes and envelope used to simulate this kind
    pub fn profile(&self) -> (Magnitudes, Magnitudes, Envelope) {
        match *self {
            EffectKind::Constant { level, envelope } => {
                (Magnitudes::uniform(level), Magnitudes::uniform(level), envelope)
            }
            EffectKind::Periodic { magnitude, envelope } => {
                (Magnitudes::uniform(magnitude), Magnitudes::uniform(magnitude), envelope)
            }
            EffectKind::Ramp { start_level, end_level, envelope } => {
                (Magnitudes::uniform(start_level), Magnitudes::uniform(end_level), envelope)
            }
            EffectKind::Rumble { strong_magnitude, weak_magnitude } => {
                let magnitudes = Magnitudes::new(weak_magnitude, strong_magnitude);
                (magnitudes, magnitudes, Envelope::default())
            }
        }
    }
}

/// An uploaded effect, keyed by its kernel id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectDefinition {
    pub id: EffectId,
    pub kind: EffectKind,
    delay_ms: u16,
    length_ms: u16,
}

impl EffectDefinition {
    /// Zero delay and zero length; use [`EffectDefinition::with_replay`] to schedule it
    pub fn new(id: EffectId, kind: EffectKind) -> Self {
        Self {
            id,
            kind,
            delay_ms: 0,
            length_ms: 0,
        }
    }

    /// Values above [`MAX_DURATION_MS`] are clamped.
    pub fn with_replay(mut self, length_ms: u16, delay_ms: u16) -> Self {
        self.length_ms = clamp_duration(length_ms);
        self.delay_ms = clamp_duration(delay_ms);
        self
    }

    pub fn delay_ms(&self) -> u16 {
        self.delay_ms
    }

    pub fn length_ms(&self) -> u16 {
        self.length_ms
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.into())
    }

    pub fn length(&self) -> Duration {
        Duration::from_millis(self.length_ms.into())
    }
}

fn clamp_duration(ms: u16) -> u16 {
    ms.min(MAX_DURATION_MS)
}

/// Local copy of every effect uploaded to one device
#[derive(Debug, Default)]
pub struct EffectStore {
    effects: HashMap<EffectId, EffectDefinition>,
}

impl EffectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `effect`, replacing any earlier upload under the same id
    pub fn upload(&mut self, effect: EffectDefinition) {
        if self.effects.insert(effect.id, effect).is_some() {
            log::debug!("Replaced FF effect ID {}", effect.id);
        }
    }

    pub fn erase(&mut self, id: EffectId) -> Option<EffectDefinition> {
        let removed = self.effects.remove(&id);
        if removed.is_some() {
            log::debug!("Removed FF effect ID {} from cache", id);
        }
        removed
    }

    pub fn lookup(&self, id: EffectId) -> Option<&EffectDefinition> {
        self.effects.get(&id)
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rumble(id: EffectId, strong: u16, weak: u16) -> EffectDefinition {
        EffectDefinition::new(
            id,
            EffectKind::Rumble {
                strong_magnitude: strong,
                weak_magnitude: weak,
            },
        )
    }

    #[test]
    fn replay_durations_are_clamped() {
        let effect = rumble(0, 1, 1).with_replay(u16::MAX, 40_000);
        assert_eq!(effect.length_ms(), MAX_DURATION_MS);
        assert_eq!(effect.delay_ms(), MAX_DURATION_MS);
        assert_eq!(effect.length(), Duration::from_millis(32767));

        let effect = rumble(0, 1, 1).with_replay(1000, 250);
        assert_eq!(effect.length_ms(), 1000);
        assert_eq!(effect.delay(), Duration::from_millis(250));
    }

    #[test]
    fn profiles_per_kind() {
        let envelope = Envelope {
            attack_length: 10,
            attack_level: 20,
            fade_length: 30,
            fade_level: 40,
        };

        let constant = EffectKind::Constant { level: 500, envelope };
        assert_eq!(
            constant.profile(),
            (Magnitudes::uniform(500), Magnitudes::uniform(500), envelope)
        );

        let periodic = EffectKind::Periodic { magnitude: 700, envelope };
        assert_eq!(
            periodic.profile(),
            (Magnitudes::uniform(700), Magnitudes::uniform(700), envelope)
        );

        let ramp = EffectKind::Ramp {
            start_level: 100,
            end_level: 900,
            envelope,
        };
        assert_eq!(
            ramp.profile(),
            (Magnitudes::uniform(100), Magnitudes::uniform(900), envelope)
        );

        let rumble = EffectKind::Rumble {
            strong_magnitude: 50_000,
            weak_magnitude: 30_000,
        };
        let (start, end, env) = rumble.profile();
        assert_eq!(start, Magnitudes::new(30_000, 50_000));
        assert_eq!(end, start);
        assert_eq!(env, Envelope::default());
    }

    #[test]
    fn store_upload_replaces_and_erase_removes() {
        let mut store = EffectStore::new();
        assert!(store.is_empty());

        store.upload(rumble(1, 100, 200));
        store.upload(rumble(1, 300, 400));
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup(1), Some(&rumble(1, 300, 400)));

        assert_eq!(store.erase(1), Some(rumble(1, 300, 400)));
        assert!(store.lookup(1).is_none());
        assert!(store.erase(1).is_none());
    }

    #[test]
    fn erase_unknown_id_leaves_store_untouched() {
        let mut store = EffectStore::new();
        store.upload(rumble(2, 1, 1));
        assert!(store.erase(7).is_none());
        assert_eq!(store.len(), 1);
    }
}
