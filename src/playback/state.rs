use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::config;
use crate::types::{EqBand, EqParams};

// Helper for atomic f32/f64 operations
pub(crate) struct AtomicF32 {
    value: AtomicU32,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self {
            value: AtomicU32::new(value.to_bits()),
        }
    }

    pub fn load(&self, ordering: Ordering) -> f32 {
        f32::from_bits(self.value.load(ordering))
    }

    pub fn store(&self, value: f32, ordering: Ordering) {
        self.value.store(value.to_bits(), ordering)
    }
}

pub(crate) struct AtomicF64 {
    value: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            value: AtomicU64::new(value.to_bits()),
        }
    }

    pub fn load(&self, ordering: Ordering) -> f64 {
        f64::from_bits(self.value.load(ordering))
    }

    pub fn store(&self, value: f64, ordering: Ordering) {
        self.value.store(value.to_bits(), ordering)
    }
}

/// Per-deck control words shared between the control thread and the audio
/// callback. Writers use `Release`, the callback reads with `Acquire`;
/// multi-field updates publish the dependent field last.
pub struct DeckShared {
    /// Tempo multiplier r.
    pub(crate) tempo: AtomicF32,
    /// Pitch shift in semitones.
    pub(crate) pitch: AtomicF32,
    /// EQ gains in dB.
    pub(crate) eq_low: AtomicF32,
    pub(crate) eq_mid: AtomicF32,
    pub(crate) eq_high: AtomicF32,
    /// Set while all three EQ bands are close enough to flat to skip.
    pub(crate) eq_bypass: AtomicBool,
    pub(crate) is_playing: AtomicBool,
    /// Frame cursor into the resident buffer; written back by the callback.
    pub(crate) cursor: AtomicF64,
    /// Seek target in frames. Published before `seek_pending` is raised.
    pub(crate) seek_target: AtomicF64,
    pub(crate) seek_pending: AtomicBool,
    /// One-shot edge raised by the callback when the cursor reaches the end.
    pub(crate) reached_end: AtomicBool,
    /// Loop region in frames, active while `loop_on` is set.
    pub(crate) loop_start: AtomicU64,
    pub(crate) loop_end: AtomicU64,
    pub(crate) loop_on: AtomicBool,
    /// Cached source sample rate; zero while no track is resident.
    pub(crate) sample_rate: AtomicU32,
    /// Resident buffer length in frames; zero while no track is resident.
    pub(crate) frames: AtomicU64,
    /// Headphone-cue routing flag.
    pub(crate) cue_enabled: AtomicBool,
}

impl DeckShared {
    pub fn new() -> Self {
        DeckShared {
            tempo: AtomicF32::new(1.0),
            pitch: AtomicF32::new(0.0),
            eq_low: AtomicF32::new(0.0),
            eq_mid: AtomicF32::new(0.0),
            eq_high: AtomicF32::new(0.0),
            eq_bypass: AtomicBool::new(true),
            is_playing: AtomicBool::new(false),
            cursor: AtomicF64::new(0.0),
            seek_target: AtomicF64::new(0.0),
            seek_pending: AtomicBool::new(false),
            reached_end: AtomicBool::new(false),
            loop_start: AtomicU64::new(0),
            loop_end: AtomicU64::new(0),
            loop_on: AtomicBool::new(false),
            sample_rate: AtomicU32::new(0),
            frames: AtomicU64::new(0),
            cue_enabled: AtomicBool::new(false),
        }
    }

    pub fn tempo(&self) -> f32 {
        self.tempo.load(Ordering::Acquire)
    }

    pub fn pitch(&self) -> f32 {
        self.pitch.load(Ordering::Acquire)
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::Acquire)
    }

    pub fn eq_params(&self) -> EqParams {
        EqParams {
            low_gain_db: self.eq_low.load(Ordering::Acquire),
            mid_gain_db: self.eq_mid.load(Ordering::Acquire),
            high_gain_db: self.eq_high.load(Ordering::Acquire),
        }
    }

    pub(crate) fn eq_cell(&self, band: EqBand) -> &AtomicF32 {
        match band {
            EqBand::Low => &self.eq_low,
            EqBand::Mid => &self.eq_mid,
            EqBand::High => &self.eq_high,
        }
    }

    /// Current frame cursor, honouring a not-yet-applied seek so callers
    /// observe the target immediately after publishing it.
    pub fn current_frame(&self) -> f64 {
        if self.seek_pending.load(Ordering::Acquire) {
            self.seek_target.load(Ordering::Acquire)
        } else {
            self.cursor.load(Ordering::Acquire)
        }
    }

    /// Precise current time: `cursor / sampleRate`. The only definition
    /// used for sync and display.
    pub fn current_seconds(&self) -> f64 {
        let rate = self.sample_rate.load(Ordering::Acquire);
        if rate == 0 {
            return 0.0;
        }
        self.current_frame() / rate as f64
    }

    pub fn duration_seconds(&self) -> f64 {
        let rate = self.sample_rate.load(Ordering::Acquire);
        if rate == 0 {
            return 0.0;
        }
        self.frames.load(Ordering::Acquire) as f64 / rate as f64
    }

    pub fn has_track(&self) -> bool {
        self.frames.load(Ordering::Acquire) > 0
    }

    /// Publish a seek: target first, pending flag last.
    pub(crate) fn publish_seek(&self, frame: f64) {
        self.seek_target.store(frame, Ordering::Release);
        self.seek_pending.store(true, Ordering::Release);
    }
}

/// Mixer control words plus the two published per-deck gain scalars the
/// audio graph consumes. Recomputed on any input change.
pub struct MixerShared {
    pub(crate) crossfader: AtomicF32,
    pub(crate) fader_a: AtomicF32,
    pub(crate) fader_b: AtomicF32,
    pub(crate) master: AtomicF32,
    /// fader x crossfader-curve gain per deck; the graph applies master
    /// to the summed bus, so each deck contributes fader x curve x master.
    pub(crate) gain_a: AtomicF32,
    pub(crate) gain_b: AtomicF32,
}

impl MixerShared {
    pub fn new() -> Self {
        let shared = MixerShared {
            crossfader: AtomicF32::new(0.5),
            fader_a: AtomicF32::new(1.0),
            fader_b: AtomicF32::new(1.0),
            master: AtomicF32::new(1.0),
            gain_a: AtomicF32::new(1.0),
            gain_b: AtomicF32::new(1.0),
        };
        shared.recompute();
        shared
    }

    /// Linear-cut crossfader curve.
    pub fn curve(x: f32) -> (f32, f32) {
        if x <= 0.5 {
            (1.0, 2.0 * x)
        } else {
            (2.0 * (1.0 - x), 1.0)
        }
    }

    pub(crate) fn recompute(&self) {
        let x = self.crossfader.load(Ordering::Acquire);
        let (curve_a, curve_b) = Self::curve(x);
        let gain_a = self.fader_a.load(Ordering::Acquire) * curve_a;
        let gain_b = self.fader_b.load(Ordering::Acquire) * curve_b;
        self.gain_a.store(gain_a, Ordering::Release);
        self.gain_b.store(gain_b, Ordering::Release);
    }

    pub fn crossfader(&self) -> f32 {
        self.crossfader.load(Ordering::Acquire)
    }

    pub fn master(&self) -> f32 {
        self.master.load(Ordering::Acquire)
    }

    pub(crate) fn store_fader(&self, deck: crate::types::DeckId, v: f32) {
        match deck {
            crate::types::DeckId::A => self.fader_a.store(v, Ordering::Release),
            crate::types::DeckId::B => self.fader_b.store(v, Ordering::Release),
        }
        self.recompute();
    }

    pub fn fader(&self, deck: crate::types::DeckId) -> f32 {
        match deck {
            crate::types::DeckId::A => self.fader_a.load(Ordering::Acquire),
            crate::types::DeckId::B => self.fader_b.load(Ordering::Acquire),
        }
    }

    pub(crate) fn published_gain(&self, deck: crate::types::DeckId) -> f32 {
        match deck {
            crate::types::DeckId::A => self.gain_a.load(Ordering::Acquire),
            crate::types::DeckId::B => self.gain_b.load(Ordering::Acquire),
        }
    }
}

pub(crate) fn clamp_tempo(r: f32) -> f32 {
    r.clamp(config::TEMPO_MIN, config::TEMPO_MAX)
}

pub(crate) fn clamp_pitch(p: f32) -> f32 {
    p.clamp(config::PITCH_MIN_SEMITONES, config::PITCH_MAX_SEMITONES)
}

pub(crate) fn clamp_volume(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

pub(crate) fn clamp_eq_gain(db: f32) -> f32 {
    db.clamp(config::EQ_GAIN_MIN_DB, config::EQ_GAIN_MAX_DB)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeckId;

    #[test]
    fn atomic_f32_round_trips() {
        let cell = AtomicF32::new(1.25);
        assert_eq!(cell.load(Ordering::Acquire), 1.25);
        cell.store(-0.5, Ordering::Release);
        assert_eq!(cell.load(Ordering::Acquire), -0.5);
    }

    #[test]
    fn crossfader_curve_endpoints() {
        assert_eq!(MixerShared::curve(0.0), (1.0, 0.0));
        assert_eq!(MixerShared::curve(1.0), (0.0, 1.0));
        assert_eq!(MixerShared::curve(0.5), (1.0, 1.0));
    }

    #[test]
    fn published_gains_track_inputs() {
        let mixer = MixerShared::new();
        mixer.crossfader.store(0.0, Ordering::Release);
        mixer.fader_a.store(0.8, Ordering::Release);
        mixer.recompute();
        assert!((mixer.published_gain(DeckId::A) - 0.8).abs() < 1e-6);
        assert_eq!(mixer.published_gain(DeckId::B), 0.0);
    }

    #[test]
    fn pending_seek_wins_over_cursor() {
        let deck = DeckShared::new();
        deck.sample_rate.store(44_100, Ordering::Release);
        deck.frames.store(44_100 * 10, Ordering::Release);
        deck.cursor.store(1_000.0, Ordering::Release);
        deck.publish_seek(22_050.0);
        assert!((deck.current_seconds() - 0.5).abs() < 1e-9);
    }
}
