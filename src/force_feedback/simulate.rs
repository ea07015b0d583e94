//! Rumble simulation of active effects.
//!
//! An [`ActiveEffect`] is a time-bounded playback of an uploaded effect. Its intensity at any
//! instant is derived from the effect's delay, length, envelope and the gain that was in effect
//! when it was activated.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::effect::{EffectDefinition, EffectId, Envelope, Magnitudes};

/// Full-scale gain; effects activated at this gain play unattenuated.
pub const MAX_GAIN: u16 = 0xffff;

/// Level the attack and fade phases interpolate against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeBaseline {
    /// Attack and fade interpolate against zero.
    ///
    /// The attack level is weighted by the time spent in the attack phase, so the effect's own
    /// magnitude only shows once the attack is over.
    #[default]
    Zero,
    /// Attack rises from the attack level to the sustain magnitude, fade falls from the
    /// sustain magnitude to the fade level.
    Sustain,
}

/// A scheduled playback of an uploaded effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveEffect {
    pub effect_id: EffectId,
    pub start_at: Instant,
    pub end_at: Instant,
    pub length: Duration,
    pub envelope: Envelope,
    pub gain: u16,
    pub start: Magnitudes,
    pub end: Magnitudes,
    /// Last value pushed to the rumble callback
    pub last_emitted: Magnitudes,
}

impl ActiveEffect {
    /// Schedules `effect` to start `delay` after `now`
    pub fn new(effect: &EffectDefinition, gain: u16, now: Instant) -> Self {
        let (start, end, envelope) = effect.kind.profile();
        let start_at = now + effect.delay();
        let length = effect.length();

        Self {
            effect_id: effect.id,
            start_at,
            end_at: start_at + length,
            length,
            envelope,
            gain,
            start,
            end,
            last_emitted: Magnitudes::ZERO,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.end_at <= now
    }

    pub fn simulate(&self, now: Instant, baseline: EnvelopeBaseline) -> Magnitudes {
        simulate(self, now, baseline)
    }
}

/// Computes the weak and strong intensity of `effect` at `now`.
///
/// Outside of `[start_at, end_at]` the effect is silent. Zero-length effects are always silent.
pub fn simulate(effect: &ActiveEffect, now: Instant, baseline: EnvelopeBaseline) -> Magnitudes {
    if effect.end_at < now || now < effect.start_at || effect.length.is_zero() {
        return Magnitudes::ZERO;
    }

    let time_left = whole_millis(effect.end_at - now);
    let length = whole_millis(effect.length);
    let elapsed = length - time_left;

    let timing = Timing {
        elapsed,
        time_left,
        length,
    };
    let weak = channel_magnitude(effect, &timing, effect.start.weak, effect.end.weak, baseline);
    let strong = channel_magnitude(effect, &timing, effect.start.strong, effect.end.strong, baseline);

    Magnitudes {
        weak: apply_gain(weak, effect.gain),
        strong: apply_gain(strong, effect.gain),
    }
}

struct Timing {
    elapsed: i64,
    time_left: i64,
    length: i64,
}

fn channel_magnitude(
    effect: &ActiveEffect,
    timing: &Timing,
    start: u16,
    end: u16,
    baseline: EnvelopeBaseline,
) -> i64 {
    let Timing {
        elapsed,
        time_left,
        length,
    } = *timing;
    let attack_length = i64::from(effect.envelope.attack_length);
    let fade_length = i64::from(effect.envelope.fade_length);
    let sustain = sustain_magnitude(time_left, start, end, length);

    // elapsed and time_left are never negative, so a zero-length phase is never selected
    if elapsed < attack_length {
        let attack_level = i64::from(effect.envelope.attack_level);
        match baseline {
            EnvelopeBaseline::Zero => (attack_level * elapsed) / attack_length,
            EnvelopeBaseline::Sustain => {
                (sustain * elapsed + attack_level * (attack_length - elapsed)) / attack_length
            }
        }
    } else if time_left < fade_length {
        let fade_level = i64::from(effect.envelope.fade_level);
        let dt = (elapsed - length) + fade_length;
        let base = match baseline {
            EnvelopeBaseline::Zero => 0,
            EnvelopeBaseline::Sustain => sustain,
        };
        (fade_level * dt + base * (fade_length - dt)) / fade_length
    } else {
        sustain
    }
}

/// Linear ramp between `start` and `end`, parameterized by the time left in the effect.
fn sustain_magnitude(time_left: i64, start: u16, end: u16, length: i64) -> i64 {
    let start = i64::from(start);
    if length == 0 {
        return start;
    }
    let rel = i64::from(end) - start;
    start + rel * time_left / length
}

fn apply_gain(magnitude: i64, gain: u16) -> u16 {
    let scaled = magnitude * i64::from(gain) / i64::from(MAX_GAIN);
    scaled.clamp(0, i64::from(u16::MAX)) as u16
}

fn whole_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::force_feedback::effect::EffectKind;

    fn ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    fn rumble(strong: u16, weak: u16, length: u16, delay: u16) -> EffectDefinition {
        EffectDefinition::new(
            3,
            EffectKind::Rumble {
                strong_magnitude: strong,
                weak_magnitude: weak,
            },
        )
        .with_replay(length, delay)
    }

    fn constant(level: u16, envelope: Envelope, length: u16) -> EffectDefinition {
        EffectDefinition::new(1, EffectKind::Constant { level, envelope }).with_replay(length, 0)
    }

    #[test]
    fn schedule_follows_delay_and_length() {
        let t0 = Instant::now();
        let effect = ActiveEffect::new(&rumble(1, 1, 1000, 200), MAX_GAIN, t0);
        assert_eq!(effect.start_at, t0 + ms(200));
        assert_eq!(effect.end_at, t0 + ms(1200));
        assert_eq!(effect.length, ms(1000));
        assert!(!effect.is_expired(t0 + ms(1199)));
        assert!(effect.is_expired(t0 + ms(1200)));
    }

    #[test]
    fn flat_rumble_profile() {
        let t0 = Instant::now();
        let effect = ActiveEffect::new(&rumble(50_000, 30_000, 1000, 0), MAX_GAIN, t0);

        let baseline = EnvelopeBaseline::Zero;
        assert_eq!(effect.simulate(t0, baseline), Magnitudes::new(30_000, 50_000));
        assert_eq!(
            effect.simulate(t0 + ms(500), baseline),
            Magnitudes::new(30_000, 50_000)
        );
        assert_eq!(effect.simulate(t0 + ms(1001), baseline), Magnitudes::ZERO);
    }

    #[test]
    fn silent_outside_of_playback_window() {
        let t0 = Instant::now();
        let effect = ActiveEffect::new(&rumble(40_000, 40_000, 500, 100), MAX_GAIN, t0);

        for baseline in [EnvelopeBaseline::Zero, EnvelopeBaseline::Sustain] {
            assert_eq!(effect.simulate(t0, baseline), Magnitudes::ZERO);
            assert_eq!(effect.simulate(t0 + ms(99), baseline), Magnitudes::ZERO);
            assert_ne!(effect.simulate(t0 + ms(100), baseline), Magnitudes::ZERO);
            assert_eq!(effect.simulate(t0 + ms(601), baseline), Magnitudes::ZERO);
        }
    }

    #[test]
    fn zero_length_effect_is_silent() {
        let t0 = Instant::now();
        let effect = ActiveEffect::new(&rumble(40_000, 40_000, 0, 0), MAX_GAIN, t0);
        assert!(effect.is_expired(t0));
        assert_eq!(effect.simulate(t0, EnvelopeBaseline::Zero), Magnitudes::ZERO);
    }

    #[test]
    fn gain_scales_linearly() {
        let t0 = Instant::now();
        let full = ActiveEffect::new(&rumble(50_000, 30_000, 1000, 0), MAX_GAIN, t0);
        let half = ActiveEffect::new(&rumble(50_000, 30_000, 1000, 0), 32767, t0);
        let off = ActiveEffect::new(&rumble(50_000, 30_000, 1000, 0), 0, t0);

        let now = t0 + ms(10);
        let full = full.simulate(now, EnvelopeBaseline::Zero);
        let half = half.simulate(now, EnvelopeBaseline::Zero);
        assert_eq!(half, Magnitudes::new(14_999, 24_999));
        assert!(full.strong / 2 - half.strong <= 1);
        assert!(full.weak / 2 - half.weak <= 1);
        assert_eq!(off.simulate(now, EnvelopeBaseline::Zero), Magnitudes::ZERO);
    }

    #[test]
    fn attack_interpolates_against_zero_by_default() {
        let t0 = Instant::now();
        let envelope = Envelope {
            attack_length: 200,
            attack_level: 20_000,
            ..Envelope::default()
        };
        let effect = ActiveEffect::new(&constant(40_000, envelope, 1000), MAX_GAIN, t0);
        let baseline = EnvelopeBaseline::Zero;

        assert_eq!(effect.simulate(t0, baseline), Magnitudes::ZERO);
        assert_eq!(effect.simulate(t0 + ms(50), baseline), Magnitudes::uniform(5_000));
        assert_eq!(effect.simulate(t0 + ms(100), baseline), Magnitudes::uniform(10_000));
        // sustain starts once the attack is over
        assert_eq!(effect.simulate(t0 + ms(200), baseline), Magnitudes::uniform(40_000));

        let silent_attack = Envelope {
            attack_length: 200,
            attack_level: 0,
            ..Envelope::default()
        };
        let effect = ActiveEffect::new(&constant(40_000, silent_attack, 1000), MAX_GAIN, t0);
        assert_eq!(effect.simulate(t0 + ms(50), baseline), Magnitudes::ZERO);
    }

    #[test]
    fn attack_rises_to_sustain_with_sustain_baseline() {
        let t0 = Instant::now();
        let envelope = Envelope {
            attack_length: 200,
            attack_level: 0,
            ..Envelope::default()
        };
        let effect = ActiveEffect::new(&constant(40_000, envelope, 1000), MAX_GAIN, t0);
        let baseline = EnvelopeBaseline::Sustain;

        let quarter = effect.simulate(t0 + ms(50), baseline);
        assert!(quarter.strong > 0 && quarter.strong < 40_000);
        assert_eq!(quarter, Magnitudes::uniform(10_000));
        assert_eq!(effect.simulate(t0 + ms(199), baseline), Magnitudes::uniform(39_800));
        assert_eq!(effect.simulate(t0 + ms(200), baseline), Magnitudes::uniform(40_000));
    }

    #[test]
    fn fade_phase() {
        let t0 = Instant::now();
        let envelope = Envelope {
            fade_length: 100,
            fade_level: 10_000,
            ..Envelope::default()
        };
        let effect = ActiveEffect::new(&constant(30_000, envelope, 1000), MAX_GAIN, t0);

        // 75ms left: 25ms into the fade
        let now = t0 + ms(925);
        assert_eq!(effect.simulate(now, EnvelopeBaseline::Zero), Magnitudes::uniform(2_500));
        assert_eq!(
            effect.simulate(now, EnvelopeBaseline::Sustain),
            Magnitudes::uniform(25_000)
        );

        // the fade begins exactly when fade_length is left
        assert_eq!(
            effect.simulate(t0 + ms(900), EnvelopeBaseline::Zero),
            Magnitudes::uniform(30_000)
        );
        assert_eq!(
            effect.simulate(t0 + ms(1000), EnvelopeBaseline::Zero),
            Magnitudes::uniform(10_000)
        );
    }

    #[test]
    fn ramp_sustain_follows_time_left() {
        let t0 = Instant::now();
        let ramp = EffectDefinition::new(
            4,
            EffectKind::Ramp {
                start_level: 10_000,
                end_level: 30_000,
                envelope: Envelope::default(),
            },
        )
        .with_replay(1000, 0);
        let effect = ActiveEffect::new(&ramp, MAX_GAIN, t0);
        let baseline = EnvelopeBaseline::Zero;

        assert_eq!(effect.simulate(t0, baseline), Magnitudes::uniform(30_000));
        assert_eq!(effect.simulate(t0 + ms(250), baseline), Magnitudes::uniform(25_000));
        assert_eq!(effect.simulate(t0 + ms(1000), baseline), Magnitudes::uniform(10_000));
    }

    #[test]
    fn decreasing_ramp_does_not_underflow() {
        let t0 = Instant::now();
        let ramp = EffectDefinition::new(
            4,
            EffectKind::Ramp {
                start_level: 60_000,
                end_level: 0,
                envelope: Envelope::default(),
            },
        )
        .with_replay(1000, 0);
        let effect = ActiveEffect::new(&ramp, MAX_GAIN, t0);

        assert_eq!(
            effect.simulate(t0 + ms(500), EnvelopeBaseline::Zero),
            Magnitudes::uniform(30_000)
        );
        assert_eq!(
            effect.simulate(t0, EnvelopeBaseline::Zero),
            Magnitudes::ZERO
        );
    }

    #[test]
    fn envelope_longer_than_effect_does_not_panic() {
        let t0 = Instant::now();
        let envelope = Envelope {
            attack_length: MAX_DURATION,
            attack_level: u16::MAX,
            fade_length: MAX_DURATION,
            fade_level: u16::MAX,
        };
        let effect = ActiveEffect::new(&constant(u16::MAX, envelope, 10), MAX_GAIN, t0);
        for step in 0..=10 {
            for baseline in [EnvelopeBaseline::Zero, EnvelopeBaseline::Sustain] {
                let _ = effect.simulate(t0 + ms(step), baseline);
            }
        }
    }

    const MAX_DURATION: u16 = crate::force_feedback::effect::MAX_DURATION_MS;
}
