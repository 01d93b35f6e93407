use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::deck::VoiceCommand;
use super::eq::EqChain;
use super::state::{DeckShared, MixerShared};
use super::stretch::TimePitch;
use crate::config;
use crate::types::{DeckId, PreloadedBuffer};

/// Headroom over the theoretical maximum input sizing (tempo 2.0 at the
/// largest source/device rate mismatch the decode layer admits).
const GATHER_CAPACITY_FRAMES: usize = config::MAX_CALLBACK_FRAMES * 10;

/// Callback-side half of a deck: owns the resident buffer reference, the
/// time/pitch unit and the EQ section, and renders fixed-size stereo
/// blocks. Runs only inside the device callback; never blocks, never
/// allocates, never locks.
pub(crate) struct DeckVoice {
    id: DeckId,
    shared: Arc<DeckShared>,
    mixer: Arc<MixerShared>,
    buffer: Option<Arc<PreloadedBuffer>>,
    commands: rtrb::Consumer<VoiceCommand>,
    retired: rtrb::Producer<Arc<PreloadedBuffer>>,
    stretch: TimePitch,
    eq: EqChain,
    device_rate: u32,
    /// Interleaved source scratch fed to the time/pitch unit.
    gather: Vec<f32>,
    /// Interleaved rendered output for this deck, pre-gain.
    rendered: Vec<f32>,
    /// Smoothed applied gain (fader x crossfader curve).
    gain: f32,
    /// Seek fade-in progress, 1.0 when no fade is active.
    fade: f32,
}

impl DeckVoice {
    pub(crate) fn new(
        id: DeckId,
        shared: Arc<DeckShared>,
        mixer: Arc<MixerShared>,
        commands: rtrb::Consumer<VoiceCommand>,
        retired: rtrb::Producer<Arc<PreloadedBuffer>>,
        device_rate: u32,
    ) -> Self {
        DeckVoice {
            id,
            shared,
            mixer,
            buffer: None,
            commands,
            retired,
            stretch: TimePitch::new(device_rate),
            eq: EqChain::new(device_rate as f32),
            device_rate,
            gather: vec![0.0; GATHER_CAPACITY_FRAMES * 2],
            rendered: vec![0.0; config::MAX_CALLBACK_FRAMES * 2],
            gain: 0.0,
            fade: 1.0,
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(cmd) = self.commands.pop() {
            match cmd {
                VoiceCommand::Load(buffer) => {
                    if let Some(old) = self.buffer.replace(buffer) {
                        // Hand the old buffer back so the big deallocation
                        // happens on the control thread.
                        let _ = self.retired.push(old);
                    }
                    self.stretch.reset();
                    self.eq.reset();
                    self.fade = 1.0;
                }
                VoiceCommand::Unload => {
                    if let Some(old) = self.buffer.take() {
                        let _ = self.retired.push(old);
                    }
                    self.stretch.reset();
                }
            }
        }
    }

    /// Source frame at `pos` folded into the active loop region.
    #[inline]
    fn wrap_position(pos: f64, loop_on: bool, loop_start: f64, loop_end: f64) -> f64 {
        if !loop_on || loop_end <= loop_start {
            return pos;
        }
        if pos < loop_end {
            return pos;
        }
        let span = loop_end - loop_start;
        loop_start + (pos - loop_start) % span
    }

    /// Render `frames` stereo frames into the internal block. Returns true
    /// when the deck produced audio, false when it contributed silence.
    pub(crate) fn render_block(&mut self, frames: usize) -> bool {
        self.drain_commands();

        if self.shared.seek_pending.swap(false, Ordering::AcqRel) {
            let target = self.shared.seek_target.load(Ordering::Acquire);
            self.shared.cursor.store(target, Ordering::Release);
            self.stretch.reset();
            self.fade = 0.0;
        }

        let playing = self.shared.is_playing.load(Ordering::Acquire);
        let Some(buffer) = self.buffer.as_ref() else {
            if playing {
                // Playing with no resident buffer is an impossible state;
                // degrade to silence and clear the flag.
                self.shared.is_playing.store(false, Ordering::Release);
            }
            self.rendered[..frames * 2].fill(0.0);
            return false;
        };
        if !playing {
            self.rendered[..frames * 2].fill(0.0);
            return false;
        }

        let tempo = self.shared.tempo.load(Ordering::Acquire);
        let pitch = self.shared.pitch.load(Ordering::Acquire);
        let total_frames = buffer.frames() as f64;
        let rate_ratio = buffer.sample_rate as f64 / self.device_rate as f64;

        let cursor = self.shared.cursor.load(Ordering::Acquire);
        let advance = frames as f64 * tempo as f64 * rate_ratio;
        let start = cursor.round();
        let mut in_frames = ((cursor + advance).round() - start).max(0.0) as usize;
        if in_frames > GATHER_CAPACITY_FRAMES {
            in_frames = GATHER_CAPACITY_FRAMES;
        }

        let loop_on = self.shared.loop_on.load(Ordering::Acquire);
        let loop_start = self.shared.loop_start.load(Ordering::Acquire) as f64;
        let loop_end = (self.shared.loop_end.load(Ordering::Acquire) as f64).min(total_frames);

        let channels = buffer.channel_count();
        let mut reached_end = false;
        for i in 0..in_frames {
            let pos = Self::wrap_position(start + i as f64, loop_on, loop_start, loop_end);
            let idx = pos as usize;
            let (l, r) = if pos >= total_frames || idx >= buffer.frames() {
                reached_end = !loop_on;
                (0.0, 0.0)
            } else {
                match channels {
                    1 => {
                        let s = buffer.channels[0][idx];
                        (s, s)
                    }
                    _ => (buffer.channels[0][idx], buffer.channels[1][idx]),
                }
            };
            self.gather[i * 2] = l;
            self.gather[i * 2 + 1] = r;
        }

        let new_cursor = if loop_on && loop_end > loop_start {
            Self::wrap_position(cursor + advance, loop_on, loop_start, loop_end)
        } else if cursor + advance >= total_frames {
            total_frames
        } else {
            cursor + advance
        };

        self.stretch.set_pitch_semitones(pitch);
        let (gather, rendered) = (
            &self.gather[..in_frames * 2],
            &mut self.rendered[..frames * 2],
        );
        self.stretch.process(gather, rendered);

        if !self.shared.eq_bypass.load(Ordering::Acquire) {
            self.eq.retune(&self.shared.eq_params());
            for frame in self.rendered[..frames * 2].chunks_exact_mut(2) {
                let (l, r) = self.eq.run(frame[0], frame[1]);
                frame[0] = l;
                frame[1] = r;
            }
        }

        let target_gain = self.mixer.published_gain(self.id);
        self.gain += (target_gain - self.gain) * config::GAIN_SMOOTHING_FACTOR;
        let fade_gain = self.fade;
        if self.fade < 1.0 {
            self.fade = (self.fade + config::SEEK_FADE_INCREMENT).min(1.0);
        }
        let block_gain = self.gain * fade_gain;
        for s in self.rendered[..frames * 2].iter_mut() {
            *s *= block_gain;
        }

        self.shared.cursor.store(new_cursor, Ordering::Release);
        if reached_end || new_cursor >= total_frames {
            self.shared.is_playing.store(false, Ordering::Release);
            self.shared.reached_end.store(true, Ordering::Release);
        }
        true
    }

    pub(crate) fn rendered(&self, frames: usize) -> &[f32] {
        &self.rendered[..frames * 2]
    }
}

/// The realtime graph executed inside the output device's pull callback:
/// per deck, PCM pull -> time/pitch -> EQ -> gain, summed and scaled by
/// the master gain.
pub struct AudioGraph {
    voices: [DeckVoice; 2],
    mixer: Arc<MixerShared>,
    master: f32,
    sample_rate: u32,
}

impl AudioGraph {
    pub(crate) fn new(voice_a: DeckVoice, voice_b: DeckVoice, mixer: Arc<MixerShared>, sample_rate: u32) -> Self {
        AudioGraph {
            voices: [voice_a, voice_b],
            mixer,
            master: 1.0,
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Fill an interleaved stereo output block. Blocks larger than the
    /// preallocated scratch are processed in chunks.
    pub fn render(&mut self, output: &mut [f32]) {
        for chunk in output.chunks_mut(config::MAX_CALLBACK_FRAMES * 2) {
            self.render_chunk(chunk);
        }
    }

    fn render_chunk(&mut self, output: &mut [f32]) {
        let frames = output.len() / 2;
        let audible = [
            self.voices[0].render_block(frames),
            self.voices[1].render_block(frames),
        ];

        let target_master = self.mixer.master.load(Ordering::Acquire);
        self.master += (target_master - self.master) * config::GAIN_SMOOTHING_FACTOR;

        if !audible[0] && !audible[1] {
            output.fill(0.0);
            return;
        }

        let a = self.voices[0].rendered(frames);
        let b = self.voices[1].rendered(frames);
        for i in 0..frames * 2 {
            output[i] = (a[i] + b[i]) * self.master;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::deck::{deck_channel, Deck};
    use crate::playback::mixer::Mixer;
    use crate::types::{Track, TrackId};
    use std::path::PathBuf;
    use tokio::sync::Notify;

    const DEVICE_RATE: u32 = 48_000;

    fn rig() -> (Deck, Deck, Mixer, AudioGraph) {
        let mixer_shared = Arc::new(MixerShared::new());
        let shared_a = Arc::new(DeckShared::new());
        let shared_b = Arc::new(DeckShared::new());
        let signal = Arc::new(Notify::new());
        let (deck_a, cmd_a, retire_a) = deck_channel(
            DeckId::A,
            shared_a.clone(),
            mixer_shared.clone(),
            signal.clone(),
        );
        let (deck_b, cmd_b, retire_b) =
            deck_channel(DeckId::B, shared_b.clone(), mixer_shared.clone(), signal);
        let voice_a = DeckVoice::new(
            DeckId::A,
            shared_a,
            mixer_shared.clone(),
            cmd_a,
            retire_a,
            DEVICE_RATE,
        );
        let voice_b = DeckVoice::new(
            DeckId::B,
            shared_b,
            mixer_shared.clone(),
            cmd_b,
            retire_b,
            DEVICE_RATE,
        );
        let graph = AudioGraph::new(voice_a, voice_b, mixer_shared.clone(), DEVICE_RATE);
        (deck_a, deck_b, Mixer::new(mixer_shared), graph)
    }

    fn tone_track(seconds: f64, rate: u32, freq: f32) -> (Track, PreloadedBuffer) {
        let frames = (seconds * rate as f64) as usize;
        let omega = 2.0 * std::f32::consts::PI * freq / rate as f32;
        let samples: Vec<f32> = (0..frames).map(|i| (omega * i as f32).sin() * 0.5).collect();
        let buffer = PreloadedBuffer::new(vec![samples.clone(), samples], rate);
        let track = Track {
            id: TrackId::next(),
            path: PathBuf::from("/tmp/tone.wav"),
            title: None,
            artist: None,
            album: None,
            duration_seconds: seconds,
            format_tag: "wav".into(),
            bpm: None,
            waveform: None,
        };
        (track, buffer)
    }

    fn pump(graph: &mut AudioGraph, blocks: usize, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; frames * 2];
        let mut all = Vec::new();
        for _ in 0..blocks {
            graph.render(&mut out);
            all.extend_from_slice(&out);
        }
        all
    }

    #[test]
    fn paused_decks_render_silence() {
        let (mut deck_a, _deck_b, _mixer, mut graph) = rig();
        let (track, buffer) = tone_track(2.0, DEVICE_RATE, 1_000.0);
        deck_a.load(track, buffer);
        let out = pump(&mut graph, 4, 512);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(deck_a.current_seconds(), 0.0);
    }

    #[test]
    fn playing_deck_advances_cursor_by_tempo() {
        let (mut deck_a, _deck_b, _mixer, mut graph) = rig();
        let (track, buffer) = tone_track(10.0, DEVICE_RATE, 1_000.0);
        deck_a.load(track, buffer);
        deck_a.play();
        // 100 blocks x 480 frames = 1.0 s of device time
        pump(&mut graph, 100, 480);
        assert!((deck_a.current_seconds() - 1.0).abs() < 0.001);

        deck_a.set_tempo(1.5);
        pump(&mut graph, 100, 480);
        assert!((deck_a.current_seconds() - 2.5).abs() < 0.002);
    }

    #[test]
    fn rate_mismatch_preserves_wall_clock_speed() {
        let (mut deck_a, _deck_b, _mixer, mut graph) = rig();
        // 44.1 kHz source on the 48 kHz device
        let (track, buffer) = tone_track(10.0, 44_100, 1_000.0);
        deck_a.load(track, buffer);
        deck_a.play();
        pump(&mut graph, 100, 480);
        assert!((deck_a.current_seconds() - 1.0).abs() < 0.001);
    }

    #[test]
    fn track_end_clears_playing_and_raises_edge() {
        let (mut deck_a, _deck_b, _mixer, mut graph) = rig();
        let (track, buffer) = tone_track(0.1, DEVICE_RATE, 1_000.0);
        deck_a.load(track, buffer);
        deck_a.play();
        pump(&mut graph, 20, 480);
        assert!(!deck_a.is_playing());
        assert!(deck_a.take_reached_end());
        assert!(!deck_a.take_reached_end());
        assert!((deck_a.current_seconds() - 0.1).abs() < 0.01);
    }

    #[test]
    fn seek_applies_within_one_block() {
        let (mut deck_a, _deck_b, _mixer, mut graph) = rig();
        let (track, buffer) = tone_track(120.0, DEVICE_RATE, 1_000.0);
        deck_a.load(track, buffer);
        deck_a.play();
        pump(&mut graph, 10, 480);
        deck_a.seek(60.0);
        assert!(deck_a.current_seconds() >= 60.0 - 1e-6);
        pump(&mut graph, 1, 480);
        let t = deck_a.current_seconds();
        assert!((60.0..60.1).contains(&t), "t = {}", t);
    }

    #[test]
    fn crossfader_hard_left_keeps_b_out_of_master() {
        let (mut deck_a, mut deck_b, mut mixer, mut graph) = rig();
        let (track_a, buffer_a) = tone_track(5.0, DEVICE_RATE, 1_000.0);
        let (track_b, buffer_b) = tone_track(5.0, DEVICE_RATE, 1_000.0);
        deck_a.load(track_a, buffer_a);
        deck_b.load(track_b, buffer_b);
        mixer.set_crossfader(0.0);
        deck_a.play();
        deck_b.play();
        // Let gain smoothing and the stretch warm-up settle, then measure.
        pump(&mut graph, 100, 480);
        let with_b = pump(&mut graph, 100, 480);
        let rms_ab: f64 = (with_b.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>()
            / with_b.len() as f64)
            .sqrt();

        // Re-rig with only deck A playing for the reference trace.
        let (mut deck_a2, _deck_b2, mut mixer2, mut graph2) = rig();
        let (track_a2, buffer_a2) = tone_track(5.0, DEVICE_RATE, 1_000.0);
        deck_a2.load(track_a2, buffer_a2);
        mixer2.set_crossfader(0.0);
        deck_a2.play();
        pump(&mut graph2, 100, 480);
        let solo = pump(&mut graph2, 100, 480);
        let rms_a: f64 =
            (solo.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>() / solo.len() as f64).sqrt();

        assert!(rms_a > 0.01, "deck A should be audible");
        assert!(
            (rms_ab - rms_a).abs() / rms_a < 0.01,
            "deck B leaked into master: {} vs {}",
            rms_ab,
            rms_a
        );
    }

    #[test]
    fn loop_region_wraps_cursor() {
        let (mut deck_a, _deck_b, _mixer, mut graph) = rig();
        let (track, buffer) = tone_track(10.0, DEVICE_RATE, 1_000.0);
        deck_a.load(track, buffer);
        deck_a.seek(1.0);
        deck_a.set_loop_in();
        deck_a.seek(2.0);
        deck_a.set_loop_out();
        deck_a.set_loop_enabled(true);
        deck_a.seek(1.0);
        deck_a.play();
        // 3 s of device time across a 1 s loop
        pump(&mut graph, 300, 480);
        let t = deck_a.current_seconds();
        assert!((1.0..2.0 + 1e-6).contains(&t), "cursor escaped loop: {}", t);
        assert!(deck_a.is_playing());
    }

    #[test]
    fn eq_bypass_output_matches_flat_reference() {
        // Flat EQ marks the deck bypass-eligible, so the EQ section must be
        // skipped and the rendered output must bit-equal a graph that never
        // touched EQ state.
        let (mut deck_a, _b, _mixer, mut graph) = rig();
        let (track, buffer) = tone_track(2.0, DEVICE_RATE, 440.0);
        deck_a.load(track, buffer);
        deck_a.set_eq(crate::types::EqBand::Low, 0.0);
        deck_a.play();
        let out_bypass = pump(&mut graph, 50, 512);

        let (mut deck_a2, _b2, _mixer2, mut graph2) = rig();
        let (track2, buffer2) = tone_track(2.0, DEVICE_RATE, 440.0);
        deck_a2.load(track2, buffer2);
        deck_a2.play();
        let out_reference = pump(&mut graph2, 50, 512);

        assert_eq!(out_bypass, out_reference);
    }
}
