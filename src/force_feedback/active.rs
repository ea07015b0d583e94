use std::time::Instant;

use super::effect::{EffectId, EffectStore};
use super::simulate::{ActiveEffect, EnvelopeBaseline};

/// Effects currently scheduled to play on one device.
///
/// Every method that removes an effect reports the removal through `notify(0, 0)`, once per
/// removed effect. Magnitude changes are reported as `notify(strong, weak)`.
#[derive(Debug, Default)]
pub struct ActiveEffectSet {
    effects: Vec<ActiveEffect>,
}

impl ActiveEffectSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts playing the stored effect `id` at `gain`.
    ///
    /// An effect that is already playing restarts in place and keeps its last reported
    /// magnitudes, so only an actual change is reported on the next tick. Returns `false` if no
    /// effect with that id was uploaded.
    pub fn activate(
        &mut self,
        store: &EffectStore,
        id: EffectId,
        gain: u16,
        now: Instant,
    ) -> bool {
        let Some(effect) = store.lookup(id) else {
            log::debug!("EV_FF play event for unknown effect ID {}", id);
            return false;
        };

        let mut instance = ActiveEffect::new(effect, gain, now);
        match self.effects.iter_mut().find(|running| running.effect_id == id) {
            Some(running) => {
                instance.last_emitted = running.last_emitted;
                *running = instance;
            }
            None => self.effects.push(instance),
        }
        true
    }

    /// Stops every instance of effect `id`, returning how many were playing
    pub fn deactivate(&mut self, id: EffectId, notify: impl FnMut(u16, u16)) -> usize {
        self.remove_where(|effect| effect.effect_id == id, notify)
    }

    /// Drops effects that ended at or before `now`
    pub fn expire(&mut self, now: Instant, notify: impl FnMut(u16, u16)) -> usize {
        self.remove_where(|effect| effect.is_expired(now), notify)
    }

    /// Simulates every active effect and reports the ones whose magnitudes changed.
    ///
    /// Returns the number of reported changes.
    pub fn emit_changes(
        &mut self,
        now: Instant,
        baseline: EnvelopeBaseline,
        mut notify: impl FnMut(u16, u16),
    ) -> usize {
        let mut changed = 0;
        for effect in &mut self.effects {
            let magnitudes = effect.simulate(now, baseline);
            if magnitudes != effect.last_emitted {
                effect.last_emitted = magnitudes;
                notify(magnitudes.strong, magnitudes.weak);
                changed += 1;
            }
        }
        changed
    }

    pub fn contains(&self, id: EffectId) -> bool {
        self.effects.iter().any(|effect| effect.effect_id == id)
    }

    pub fn get(&self, id: EffectId) -> Option<&ActiveEffect> {
        self.effects.iter().find(|effect| effect.effect_id == id)
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    fn remove_where(
        &mut self,
        mut filter: impl FnMut(&ActiveEffect) -> bool,
        mut notify: impl FnMut(u16, u16),
    ) -> usize {
        let before = self.effects.len();
        self.effects.retain(|effect| {
            let remove = filter(effect);
            if remove {
                log::debug!("FF effect {} stopped", effect.effect_id);
                notify(0, 0);
            }
            !remove
        });
        before - self.effects.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::force_feedback::effect::{EffectDefinition, EffectKind};
    use crate::force_feedback::simulate::MAX_GAIN;

    fn ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    fn store_with_rumble(id: EffectId, length: u16) -> EffectStore {
        let mut store = EffectStore::new();
        store.upload(
            EffectDefinition::new(
                id,
                EffectKind::Rumble {
                    strong_magnitude: 50_000,
                    weak_magnitude: 30_000,
                },
            )
            .with_replay(length, 0),
        );
        store
    }

    #[test]
    fn activate_unknown_effect_is_dropped() {
        let store = EffectStore::new();
        let mut active = ActiveEffectSet::new();

        assert!(!active.activate(&store, 4, MAX_GAIN, Instant::now()));
        assert!(active.is_empty());
    }

    #[test]
    fn activation_snapshots_gain() {
        let store = store_with_rumble(1, 1000);
        let mut active = ActiveEffectSet::new();

        assert!(active.activate(&store, 1, 1234, Instant::now()));
        assert_eq!(active.get(1).map(|effect| effect.gain), Some(1234));
    }

    #[test]
    fn reactivation_replaces_running_instance_silently() {
        let store = store_with_rumble(1, 1000);
        let mut active = ActiveEffectSet::new();
        let mut calls = Vec::new();
        let baseline = EnvelopeBaseline::Zero;
        let t0 = Instant::now();

        active.activate(&store, 1, MAX_GAIN, t0);
        active.emit_changes(t0, baseline, |s, w| calls.push((s, w)));
        assert_eq!(calls, vec![(50_000, 30_000)]);

        active.activate(&store, 1, MAX_GAIN, t0 + ms(300));
        active.activate(&store, 1, MAX_GAIN, t0 + ms(300));
        assert_eq!(active.emit_changes(t0 + ms(300), baseline, |s, w| calls.push((s, w))), 0);

        assert_eq!(active.len(), 1);
        assert_eq!(active.get(1).map(|effect| effect.start_at), Some(t0 + ms(300)));
        assert_eq!(calls, vec![(50_000, 30_000)]);
    }

    #[test]
    fn reactivation_at_new_gain_reports_the_change() {
        let store = store_with_rumble(1, 1000);
        let mut active = ActiveEffectSet::new();
        let mut calls = Vec::new();
        let baseline = EnvelopeBaseline::Zero;
        let t0 = Instant::now();

        active.activate(&store, 1, MAX_GAIN, t0);
        active.emit_changes(t0, baseline, |s, w| calls.push((s, w)));
        active.activate(&store, 1, 32767, t0 + ms(20));
        active.emit_changes(t0 + ms(20), baseline, |s, w| calls.push((s, w)));

        assert_eq!(calls, vec![(50_000, 30_000), (24_999, 14_999)]);
    }

    #[test]
    fn deactivate_notifies_once_per_removed_effect() {
        let store = store_with_rumble(1, 1000);
        let mut active = ActiveEffectSet::new();
        let mut calls = Vec::new();

        active.activate(&store, 1, MAX_GAIN, Instant::now());
        assert_eq!(active.deactivate(1, |s, w| calls.push((s, w))), 1);
        assert_eq!(calls, vec![(0, 0)]);

        assert_eq!(active.deactivate(1, |s, w| calls.push((s, w))), 0);
        assert_eq!(calls.len(), 1);
    }

    #[test]
    fn changes_are_reported_once() {
        let store = store_with_rumble(1, 1000);
        let mut active = ActiveEffectSet::new();
        let mut calls = Vec::new();
        let t0 = Instant::now();

        active.activate(&store, 1, MAX_GAIN, t0);
        let baseline = EnvelopeBaseline::Zero;
        assert_eq!(active.emit_changes(t0, baseline, |s, w| calls.push((s, w))), 1);
        assert_eq!(active.emit_changes(t0 + ms(20), baseline, |s, w| calls.push((s, w))), 0);
        assert_eq!(calls, vec![(50_000, 30_000)]);
        assert_eq!(
            active.get(1).map(|effect| effect.last_emitted.strong),
            Some(50_000)
        );
    }

    #[test]
    fn expired_effects_are_removed() {
        let store = store_with_rumble(1, 100);
        let mut active = ActiveEffectSet::new();
        let mut calls = Vec::new();
        let t0 = Instant::now();

        active.activate(&store, 1, MAX_GAIN, t0);
        assert_eq!(active.expire(t0 + ms(99), |s, w| calls.push((s, w))), 0);
        assert!(active.contains(1));
        assert_eq!(active.expire(t0 + ms(100), |s, w| calls.push((s, w))), 1);
        assert!(!active.contains(1));
        assert_eq!(calls, vec![(0, 0)]);
    }
}
