use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::Notify;

use super::state::{
    clamp_eq_gain, clamp_pitch, clamp_tempo, clamp_volume, DeckShared, MixerShared,
};
use crate::config;
use crate::types::{DeckId, DeckSnapshot, EqBand, PreloadedBuffer, Track};

/// Buffer handoff into the callback-side voice. Everything else crosses
/// the thread boundary as atomic scalars.
pub(crate) enum VoiceCommand {
    Load(Arc<PreloadedBuffer>),
    Unload,
}

/// Control-side handle for one playback channel. Owns the resident track
/// and buffer, publishes control words the audio callback observes on its
/// next pull. Every operation is O(1) and non-blocking.
pub struct Deck {
    id: DeckId,
    shared: Arc<DeckShared>,
    mixer: Arc<MixerShared>,
    track: Option<Track>,
    buffer: Option<Arc<PreloadedBuffer>>,
    cue_frame: Option<u64>,
    hot_cues: [Option<u64>; 4],
    commands: rtrb::Producer<VoiceCommand>,
    retired: rtrb::Consumer<Arc<PreloadedBuffer>>,
    play_signal: Arc<Notify>,
}

impl Deck {
    pub(crate) fn new(
        id: DeckId,
        shared: Arc<DeckShared>,
        mixer: Arc<MixerShared>,
        commands: rtrb::Producer<VoiceCommand>,
        retired: rtrb::Consumer<Arc<PreloadedBuffer>>,
        play_signal: Arc<Notify>,
    ) -> Self {
        Deck {
            id,
            shared,
            mixer,
            track: None,
            buffer: None,
            cue_frame: None,
            hot_cues: [None; 4],
            commands,
            retired,
            play_signal,
        }
    }

    pub fn id(&self) -> DeckId {
        self.id
    }

    pub fn track(&self) -> Option<&Track> {
        self.track.as_ref()
    }

    /// The resident PCM, exclusively owned by this deck for the track's
    /// tenure.
    pub fn buffer(&self) -> Option<&PreloadedBuffer> {
        self.buffer.as_deref()
    }

    /// Buffers the callback handed back after a swap; dropped here so the
    /// deallocation never happens on the audio thread.
    fn drain_retired(&mut self) {
        while self.retired.pop().is_ok() {}
    }

    /// Swap in a freshly decoded track. Resets cursor, tempo, pitch, cues
    /// and loop; the previous buffer is released once the callback hands
    /// it back.
    pub fn load(&mut self, track: Track, buffer: PreloadedBuffer) {
        self.drain_retired();

        let buffer = Arc::new(buffer);
        let frames = buffer.frames() as u64;
        let sample_rate = buffer.sample_rate;

        // Quiesce the voice before re-describing the buffer: stop, then
        // geometry, then the handoff.
        self.shared.is_playing.store(false, Ordering::Release);
        self.shared.loop_on.store(false, Ordering::Release);
        self.shared.loop_start.store(0, Ordering::Release);
        self.shared.loop_end.store(0, Ordering::Release);
        self.shared.tempo.store(1.0, Ordering::Release);
        self.shared.pitch.store(0.0, Ordering::Release);
        self.shared.reached_end.store(false, Ordering::Release);
        self.shared.sample_rate.store(sample_rate, Ordering::Release);
        self.shared.frames.store(frames, Ordering::Release);
        self.shared.cursor.store(0.0, Ordering::Release);
        self.shared.publish_seek(0.0);

        self.cue_frame = None;
        self.hot_cues = [None; 4];

        if self.commands.push(VoiceCommand::Load(buffer.clone())).is_err() {
            // Ring full means several loads landed inside one callback
            // period; the voice will still converge on this buffer once it
            // drains, so only the handoff of intermediates is lost.
            log::error!("Deck {}: voice command ring full during load", self.id);
        }
        self.buffer = Some(buffer);

        log::info!(
            "Deck {}: loaded '{}' ({:.1}s at {} Hz)",
            self.id,
            track.path.display(),
            track.duration_seconds,
            sample_rate
        );
        self.track = Some(track);
    }

    /// Drop the resident track and return the deck to its empty state.
    pub fn eject(&mut self) {
        self.drain_retired();
        self.shared.is_playing.store(false, Ordering::Release);
        self.shared.frames.store(0, Ordering::Release);
        self.shared.sample_rate.store(0, Ordering::Release);
        self.shared.cursor.store(0.0, Ordering::Release);
        self.shared.loop_on.store(false, Ordering::Release);
        self.cue_frame = None;
        self.hot_cues = [None; 4];
        if self.commands.push(VoiceCommand::Unload).is_err() {
            log::error!("Deck {}: voice command ring full during eject", self.id);
        }
        self.track = None;
        self.buffer = None;
    }

    pub fn play(&mut self) {
        if self.track.is_none() {
            log::warn!("Deck {}: play ignored, no track loaded", self.id);
            return;
        }
        self.shared.reached_end.store(false, Ordering::Release);
        self.shared.is_playing.store(true, Ordering::Release);
        // notify_one stores a permit, so a play landing between the
        // monitor's idle check and its await still wakes it.
        self.play_signal.notify_one();
        log::info!("Deck {}: play", self.id);
    }

    pub fn pause(&mut self) {
        if self.track.is_none() {
            log::warn!("Deck {}: pause ignored, no track loaded", self.id);
            return;
        }
        self.shared.is_playing.store(false, Ordering::Release);
        log::info!("Deck {}: pause", self.id);
    }

    /// Pause and rewind to the start of the track.
    pub fn stop(&mut self) {
        if self.track.is_none() {
            log::warn!("Deck {}: stop ignored, no track loaded", self.id);
            return;
        }
        self.shared.is_playing.store(false, Ordering::Release);
        self.shared.publish_seek(0.0);
        log::info!("Deck {}: stop", self.id);
    }

    pub fn toggle_play_pause(&mut self) {
        if self.shared.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Seek to a position in seconds, clamped to the track bounds. While
    /// playing this is stop -> publish cursor -> restart, applied by the
    /// callback at its next block boundary, so the old and new positions
    /// never splice mid-block.
    pub fn seek(&mut self, seconds: f64) {
        if self.track.is_none() {
            log::warn!("Deck {}: seek ignored, no track loaded", self.id);
            return;
        }
        let rate = self.shared.sample_rate.load(Ordering::Acquire) as f64;
        let frames = self.shared.frames.load(Ordering::Acquire) as f64;
        let clamped = seconds.clamp(0.0, self.duration_seconds());
        if clamped != seconds {
            log::warn!(
                "Deck {}: seek {:.3}s clamped to {:.3}s",
                self.id,
                seconds,
                clamped
            );
        }
        let target = (clamped * rate).round().min(frames);
        self.shared.publish_seek(target);
        log::debug!("Deck {}: seek to {:.3}s (frame {})", self.id, clamped, target);
    }

    /// Seek relative to the current position, used by jog rotation.
    pub fn nudge(&mut self, delta_seconds: f64) {
        if self.track.is_none() {
            return;
        }
        self.seek(self.current_seconds() + delta_seconds);
    }

    pub fn set_tempo(&mut self, r: f32) {
        self.shared.tempo.store(clamp_tempo(r), Ordering::Release);
    }

    pub fn tempo(&self) -> f32 {
        self.shared.tempo()
    }

    pub fn set_pitch(&mut self, semitones: f32) {
        self.shared
            .pitch
            .store(clamp_pitch(semitones), Ordering::Release);
    }

    pub fn pitch(&self) -> f32 {
        self.shared.pitch()
    }

    pub fn set_volume(&mut self, v: f32) {
        self.mixer.store_fader(self.id, clamp_volume(v));
    }

    pub fn volume(&self) -> f32 {
        self.mixer.fader(self.id)
    }

    /// Update one EQ band. When all three bands end up within the bypass
    /// threshold of flat, the whole EQ section becomes skippable.
    pub fn set_eq(&mut self, band: EqBand, gain_db: f32) {
        self.shared
            .eq_cell(band)
            .store(clamp_eq_gain(gain_db), Ordering::Release);
        let flat = self.shared.eq_params().is_flat();
        self.shared.eq_bypass.store(flat, Ordering::Release);
    }

    pub fn eq(&self, band: EqBand) -> f32 {
        self.shared.eq_params().gain(band)
    }

    pub fn set_cue(&mut self) {
        if self.track.is_none() {
            log::warn!("Deck {}: set cue ignored, no track loaded", self.id);
            return;
        }
        let frame = self.shared.current_frame().round() as u64;
        self.cue_frame = Some(frame);
        log::debug!("Deck {}: cue set at frame {}", self.id, frame);
    }

    pub fn jump_to_cue(&mut self) {
        let Some(frame) = self.cue_frame else {
            log::debug!("Deck {}: jump to cue ignored, cue unset", self.id);
            return;
        };
        let rate = self.shared.sample_rate.load(Ordering::Acquire);
        if rate == 0 {
            return;
        }
        self.seek(frame as f64 / rate as f64);
    }

    pub fn cue_is_set(&self) -> bool {
        self.cue_frame.is_some()
    }

    pub fn set_hot_cue(&mut self, slot: usize) {
        if slot >= self.hot_cues.len() || self.track.is_none() {
            return;
        }
        self.hot_cues[slot] = Some(self.shared.current_frame().round() as u64);
    }

    /// Seek to a stored hot cue and start playback. Silent no-op when the
    /// slot is out of range or unset.
    pub fn trigger_hot_cue(&mut self, slot: usize) {
        let Some(Some(frame)) = self.hot_cues.get(slot).copied() else {
            return;
        };
        let rate = self.shared.sample_rate.load(Ordering::Acquire);
        if rate == 0 {
            return;
        }
        self.seek(frame as f64 / rate as f64);
        self.play();
    }

    pub fn hot_cues_set(&self) -> [bool; 4] {
        [
            self.hot_cues[0].is_some(),
            self.hot_cues[1].is_some(),
            self.hot_cues[2].is_some(),
            self.hot_cues[3].is_some(),
        ]
    }

    pub fn set_loop_in(&mut self) {
        if self.track.is_none() {
            return;
        }
        let frame = self.shared.current_frame().round() as u64;
        self.shared.loop_start.store(frame, Ordering::Release);
        if self.shared.loop_end.load(Ordering::Acquire) <= frame {
            self.shared.loop_on.store(false, Ordering::Release);
        }
    }

    pub fn set_loop_out(&mut self) {
        if self.track.is_none() {
            return;
        }
        let frame = self.shared.current_frame().round() as u64;
        if frame > self.shared.loop_start.load(Ordering::Acquire) {
            self.shared.loop_end.store(frame, Ordering::Release);
        }
    }

    pub fn set_loop_enabled(&mut self, on: bool) {
        let start = self.shared.loop_start.load(Ordering::Acquire);
        let end = self.shared.loop_end.load(Ordering::Acquire);
        if on && end <= start {
            log::warn!("Deck {}: loop enable ignored, empty region", self.id);
            return;
        }
        self.shared.loop_on.store(on, Ordering::Release);
    }

    pub fn set_headphone_cue(&mut self, on: bool) {
        self.shared.cue_enabled.store(on, Ordering::Release);
    }

    pub fn toggle_headphone_cue(&mut self) {
        let on = !self.shared.cue_enabled.load(Ordering::Acquire);
        self.shared.cue_enabled.store(on, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.shared.is_playing()
    }

    pub fn current_seconds(&self) -> f64 {
        self.shared.current_seconds()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.track
            .as_ref()
            .map(|t| t.duration_seconds)
            .unwrap_or(0.0)
    }

    pub fn bpm_original(&self) -> Option<f32> {
        self.track.as_ref().and_then(|t| t.bpm)
    }

    /// Original track BPM scaled by the current tempo multiplier.
    pub fn bpm_effective(&self) -> Option<f32> {
        self.bpm_original().map(|bpm| bpm * self.tempo())
    }

    /// Fractional position within the current beat, 0 at beat onset.
    pub fn beat_phase(&self) -> Option<f64> {
        let bpm = self.bpm_effective()? as f64;
        if bpm <= 0.0 {
            return None;
        }
        Some((self.current_seconds() * bpm / 60.0).fract())
    }

    /// Consume the one-shot reached-end edge.
    pub fn take_reached_end(&mut self) -> bool {
        self.shared.reached_end.swap(false, Ordering::AcqRel)
    }

    pub fn snapshot(&self) -> DeckSnapshot {
        DeckSnapshot {
            is_playing: self.is_playing(),
            current_seconds: self.current_seconds(),
            duration: self.duration_seconds(),
            tempo: self.tempo(),
            pitch: self.pitch(),
            volume: self.volume(),
            cue_set: self.cue_is_set(),
            hot_cues_set: self.hot_cues_set(),
            bpm_original: self.bpm_original(),
            bpm_effective: self.bpm_effective(),
            track_id: self.track.as_ref().map(|t| t.id),
            reached_end: self.shared.reached_end.load(Ordering::Acquire),
        }
    }

}

/// Build a deck plus the callback-side ring endpoints for its voice.
pub(crate) fn deck_channel(
    id: DeckId,
    shared: Arc<DeckShared>,
    mixer: Arc<MixerShared>,
    play_signal: Arc<Notify>,
) -> (
    Deck,
    rtrb::Consumer<VoiceCommand>,
    rtrb::Producer<Arc<PreloadedBuffer>>,
) {
    let (cmd_tx, cmd_rx) = rtrb::RingBuffer::new(config::DECK_COMMAND_CAPACITY);
    let (retire_tx, retire_rx) = rtrb::RingBuffer::new(config::DECK_COMMAND_CAPACITY);
    let deck = Deck::new(id, shared, mixer, cmd_tx, retire_rx, play_signal);
    (deck, cmd_rx, retire_tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrackId;
    use std::path::PathBuf;

    fn test_deck() -> Deck {
        let shared = Arc::new(DeckShared::new());
        let mixer = Arc::new(MixerShared::new());
        let (deck, _cmd_rx, _retire_tx) =
            deck_channel(DeckId::A, shared, mixer, Arc::new(Notify::new()));
        deck
    }

    fn test_track(seconds: f64, rate: u32) -> (Track, PreloadedBuffer) {
        let frames = (seconds * rate as f64) as usize;
        let buffer = PreloadedBuffer::new(vec![vec![0.0; frames], vec![0.0; frames]], rate);
        let track = Track {
            id: TrackId::next(),
            path: PathBuf::from("/tmp/test.wav"),
            title: None,
            artist: None,
            album: None,
            duration_seconds: seconds,
            format_tag: "wav".into(),
            bpm: Some(120.0),
            waveform: None,
        };
        (track, buffer)
    }

    #[test]
    fn controls_clamp_at_boundaries() {
        let mut deck = test_deck();
        deck.set_tempo(3.0);
        assert_eq!(deck.tempo(), 2.0);
        deck.set_tempo(0.1);
        assert_eq!(deck.tempo(), 0.5);
        deck.set_pitch(-40.0);
        assert_eq!(deck.pitch(), -12.0);
        deck.set_volume(1.5);
        assert_eq!(deck.volume(), 1.0);
        deck.set_eq(EqBand::Mid, 99.0);
        assert_eq!(deck.eq(EqBand::Mid), 12.0);
    }

    #[test]
    fn transport_is_noop_without_track() {
        let mut deck = test_deck();
        deck.play();
        assert!(!deck.is_playing());
        deck.seek(10.0);
        assert_eq!(deck.current_seconds(), 0.0);
        deck.jump_to_cue();
        deck.trigger_hot_cue(0);
        assert!(!deck.is_playing());
    }

    #[test]
    fn load_resets_controls() {
        let mut deck = test_deck();
        deck.set_tempo(1.5);
        deck.set_pitch(3.0);
        let (track, buffer) = test_track(10.0, 44_100);
        deck.load(track, buffer);
        assert_eq!(deck.tempo(), 1.0);
        assert_eq!(deck.pitch(), 0.0);
        assert_eq!(deck.current_seconds(), 0.0);
        assert!(!deck.is_playing());
        assert!(!deck.cue_is_set());
    }

    #[test]
    fn seek_clamps_to_duration_and_is_observable() {
        let mut deck = test_deck();
        let (track, buffer) = test_track(10.0, 44_100);
        deck.load(track, buffer);
        deck.seek(60.0);
        assert!((deck.current_seconds() - 10.0).abs() < 1e-6);
        deck.seek(2.5);
        assert!((deck.current_seconds() - 2.5).abs() < 1.0 / 44_100.0);
    }

    #[test]
    fn stop_resets_cursor() {
        let mut deck = test_deck();
        let (track, buffer) = test_track(10.0, 48_000);
        deck.load(track, buffer);
        deck.seek(5.0);
        deck.play();
        deck.stop();
        assert!(!deck.is_playing());
        assert_eq!(deck.current_seconds(), 0.0);
    }

    #[test]
    fn cue_round_trip() {
        let mut deck = test_deck();
        let (track, buffer) = test_track(10.0, 44_100);
        deck.load(track, buffer);
        deck.seek(4.0);
        deck.set_cue();
        deck.seek(8.0);
        deck.jump_to_cue();
        assert!((deck.current_seconds() - 4.0).abs() < 1e-3);
    }

    #[test]
    fn hot_cue_trigger_starts_playback() {
        let mut deck = test_deck();
        let (track, buffer) = test_track(10.0, 44_100);
        deck.load(track, buffer);
        deck.seek(3.0);
        deck.set_hot_cue(2);
        deck.seek(0.0);
        deck.trigger_hot_cue(2);
        assert!(deck.is_playing());
        assert!((deck.current_seconds() - 3.0).abs() < 1e-3);
        // Out-of-range and unset slots stay silent no-ops.
        deck.trigger_hot_cue(9);
        deck.set_hot_cue(9);
    }

    #[test]
    fn effective_bpm_follows_tempo() {
        let mut deck = test_deck();
        let (track, buffer) = test_track(10.0, 44_100);
        deck.load(track, buffer);
        deck.set_tempo(1.25);
        assert_eq!(deck.bpm_effective(), Some(150.0));
    }

    #[test]
    fn loop_region_requires_forward_extent() {
        let mut deck = test_deck();
        let (track, buffer) = test_track(10.0, 44_100);
        deck.load(track, buffer);
        deck.set_loop_enabled(true);
        assert!(!deck.shared.loop_on.load(Ordering::Acquire));
        deck.seek(1.0);
        deck.set_loop_in();
        deck.seek(2.0);
        deck.set_loop_out();
        deck.set_loop_enabled(true);
        assert!(deck.shared.loop_on.load(Ordering::Acquire));
    }
}
