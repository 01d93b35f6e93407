use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::state::{clamp_volume, MixerShared};
use crate::types::DeckId;

/// Control-side mixer handle. Deterministic and stateless: any input
/// change recomputes the two per-deck gain scalars the audio graph reads.
pub struct Mixer {
    shared: Arc<MixerShared>,
}

impl Mixer {
    pub(crate) fn new(shared: Arc<MixerShared>) -> Self {
        Mixer { shared }
    }

    /// Crossfader position, 0 = hard left (deck A only audible on the
    /// right half of the curve's cut).
    pub fn set_crossfader(&mut self, x: f32) {
        self.shared
            .crossfader
            .store(clamp_volume(x), Ordering::Release);
        self.shared.recompute();
    }

    pub fn crossfader(&self) -> f32 {
        self.shared.crossfader()
    }

    pub fn set_fader(&mut self, deck: DeckId, v: f32) {
        self.shared.store_fader(deck, clamp_volume(v));
    }

    pub fn fader(&self, deck: DeckId) -> f32 {
        self.shared.fader(deck)
    }

    pub fn set_master_volume(&mut self, v: f32) {
        self.shared.master.store(clamp_volume(v), Ordering::Release);
        self.shared.recompute();
    }

    pub fn master_volume(&self) -> f32 {
        self.shared.master()
    }

    /// Effective gain a deck currently contributes with, including the
    /// master stage applied on the summed bus.
    pub fn effective_gain(&self, deck: DeckId) -> f32 {
        self.shared.published_gain(deck) * self.shared.master()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mixer() -> Mixer {
        Mixer::new(Arc::new(MixerShared::new()))
    }

    #[test]
    fn hard_left_mutes_deck_b() {
        let mut mixer = test_mixer();
        mixer.set_crossfader(0.0);
        assert_eq!(mixer.effective_gain(DeckId::B), 0.0);
        assert_eq!(mixer.effective_gain(DeckId::A), 1.0);
    }

    #[test]
    fn hard_right_mutes_deck_a() {
        let mut mixer = test_mixer();
        mixer.set_crossfader(1.0);
        assert_eq!(mixer.effective_gain(DeckId::A), 0.0);
        assert_eq!(mixer.effective_gain(DeckId::B), 1.0);
    }

    #[test]
    fn centre_passes_both_at_unity() {
        let mut mixer = test_mixer();
        mixer.set_crossfader(0.5);
        assert_eq!(mixer.effective_gain(DeckId::A), 1.0);
        assert_eq!(mixer.effective_gain(DeckId::B), 1.0);
    }

    #[test]
    fn effective_gain_is_fader_times_curve_times_master() {
        let mut mixer = test_mixer();
        mixer.set_crossfader(0.25);
        mixer.set_fader(DeckId::B, 0.5);
        mixer.set_master_volume(0.8);
        // curve at 0.25: gA = 1.0, gB = 0.5
        assert!((mixer.effective_gain(DeckId::A) - 0.8).abs() < 1e-6);
        assert!((mixer.effective_gain(DeckId::B) - 0.5 * 0.5 * 0.8).abs() < 1e-6);
    }

    #[test]
    fn inputs_clamp() {
        let mut mixer = test_mixer();
        mixer.set_crossfader(2.0);
        assert_eq!(mixer.crossfader(), 1.0);
        mixer.set_master_volume(-1.0);
        assert_eq!(mixer.master_volume(), 0.0);
        mixer.set_fader(DeckId::A, 7.0);
        assert_eq!(mixer.fader(DeckId::A), 1.0);
    }
}
