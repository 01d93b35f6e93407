use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::analysis;
use crate::config;
use crate::control::Action;
use crate::device::OutputBackend;
use crate::errors::{DeviceError, PlaybackError};
use crate::playback::deck::deck_channel;
use crate::playback::graph::DeckVoice;
use crate::playback::monitor::PositionMonitor;
use crate::playback::state::{DeckShared, MixerShared};
use crate::playback::{AudioGraph, Deck, Mixer, SyncController};
use crate::types::{DeckId, DeckSnapshot, EqBand, MixerSnapshot};

/// The audio engine: two decks, the mixer, the sync controller and the
/// observed-state channels, with the realtime graph handed off to an
/// output backend. An explicit handle with the program's lifetime; deck
/// and mixer components receive it rather than reaching for a global.
pub struct Engine {
    deck_a: Deck,
    deck_b: Deck,
    mixer: Mixer,
    sync: SyncController,
    shared: [Arc<DeckShared>; 2],
    snapshots: [Arc<watch::Sender<DeckSnapshot>>; 2],
    mixer_snapshot: watch::Sender<MixerSnapshot>,
    play_signal: Arc<Notify>,
    sample_rate: u32,
    backend: Option<Box<dyn OutputBackend>>,
    monitor: Option<JoinHandle<()>>,
    device_errors: Arc<watch::Sender<Option<String>>>,
    jog_touched: [bool; 2],
}

impl Engine {
    /// Build the engine and its realtime graph without starting any
    /// device. The caller owns the graph and pulls it by hand; used by
    /// tests and by custom backends.
    pub fn headless(sample_rate: u32) -> (Engine, AudioGraph) {
        let mixer_shared = Arc::new(MixerShared::new());
        let shared_a = Arc::new(DeckShared::new());
        let shared_b = Arc::new(DeckShared::new());
        let play_signal = Arc::new(Notify::new());

        let (deck_a, cmd_a, retire_a) = deck_channel(
            DeckId::A,
            shared_a.clone(),
            mixer_shared.clone(),
            play_signal.clone(),
        );
        let (deck_b, cmd_b, retire_b) = deck_channel(
            DeckId::B,
            shared_b.clone(),
            mixer_shared.clone(),
            play_signal.clone(),
        );

        let voice_a = DeckVoice::new(
            DeckId::A,
            shared_a.clone(),
            mixer_shared.clone(),
            cmd_a,
            retire_a,
            sample_rate,
        );
        let voice_b = DeckVoice::new(
            DeckId::B,
            shared_b.clone(),
            mixer_shared.clone(),
            cmd_b,
            retire_b,
            sample_rate,
        );
        let graph = AudioGraph::new(voice_a, voice_b, mixer_shared.clone(), sample_rate);

        let (snapshot_a, _) = watch::channel(DeckSnapshot::default());
        let (snapshot_b, _) = watch::channel(DeckSnapshot::default());
        let (mixer_snapshot, _) = watch::channel(MixerSnapshot::default());
        let (device_errors, _) = watch::channel::<Option<String>>(None);

        let engine = Engine {
            deck_a,
            deck_b,
            mixer: Mixer::new(mixer_shared),
            sync: SyncController::new(),
            shared: [shared_a, shared_b],
            snapshots: [Arc::new(snapshot_a), Arc::new(snapshot_b)],
            mixer_snapshot,
            play_signal,
            sample_rate,
            backend: None,
            monitor: None,
            device_errors: Arc::new(device_errors),
            jog_touched: [false; 2],
        };
        (engine, graph)
    }

    /// Build the engine on an output backend and start pulling. The graph
    /// lives inside the device callback from here on.
    pub fn new(mut backend: Box<dyn OutputBackend>) -> Result<Engine, DeviceError> {
        let (mut engine, mut graph) = Engine::headless(backend.sample_rate());
        let error_tx = engine.device_errors.clone();
        backend.start(
            Box::new(move |output| graph.render(output)),
            Box::new(move |err| {
                let _ = error_tx.send(Some(err.to_string()));
            }),
        )?;
        engine.backend = Some(backend);
        log::info!("Engine: output running at {} Hz", engine.sample_rate);
        Ok(engine)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn deck(&self, id: DeckId) -> &Deck {
        match id {
            DeckId::A => &self.deck_a,
            DeckId::B => &self.deck_b,
        }
    }

    pub fn deck_mut(&mut self, id: DeckId) -> &mut Deck {
        match id {
            DeckId::A => &mut self.deck_a,
            DeckId::B => &mut self.deck_b,
        }
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn mixer_mut(&mut self) -> &mut Mixer {
        &mut self.mixer
    }

    /// Decode and analyse a file off the control thread, then hand the
    /// result to the deck. Sequenced per engine; dropping the returned
    /// future abandons the load and its result is discarded on delivery.
    /// On failure the deck's prior state is preserved.
    pub async fn load_track(&mut self, id: DeckId, path: PathBuf) -> Result<(), PlaybackError> {
        let display = path.display().to_string();
        let result = tokio::task::spawn_blocking(move || analysis::analyze_file(&path)).await;
        match result {
            Ok(Ok(analyzed)) => {
                self.deck_mut(id).load(analyzed.track, analyzed.buffer);
                self.publish_deck(id);
                Ok(())
            }
            Ok(Err(e)) => {
                log::error!("Engine: load of '{}' failed: {}", display, e);
                Err(PlaybackError::LoadDecode {
                    deck: id,
                    source: e,
                })
            }
            Err(join_error) => {
                log::error!("Engine: load task for '{}' panicked: {}", display, join_error);
                Err(PlaybackError::LoadTask {
                    deck: id,
                    reason: join_error.to_string(),
                })
            }
        }
    }

    /// Match `follower` to the opposite deck and align phase.
    pub fn sync_deck(&mut self, follower: DeckId) {
        match follower {
            DeckId::A => self.sync.sync(&mut self.deck_a, &self.deck_b),
            DeckId::B => self.sync.sync(&mut self.deck_b, &self.deck_a),
        }
        self.publish_deck(follower);
    }

    fn deck_index(id: DeckId) -> usize {
        match id {
            DeckId::A => 0,
            DeckId::B => 1,
        }
    }

    /// Apply one action from the control surface vocabulary.
    pub fn apply(&mut self, action: Action) {
        log::debug!("Engine: action {:?}", action);
        match action {
            Action::TogglePlayPause { deck } => {
                self.deck_mut(deck).toggle_play_pause();
                self.publish_deck(deck);
            }
            Action::JumpToCue { deck } => {
                self.deck_mut(deck).jump_to_cue();
                self.publish_deck(deck);
            }
            Action::SetCuePoint { deck } => {
                self.deck_mut(deck).set_cue();
                self.publish_deck(deck);
            }
            Action::Sync { deck } => self.sync_deck(deck),
            Action::TriggerHotCue { deck, slot } => {
                self.deck_mut(deck).trigger_hot_cue(slot as usize);
                self.publish_deck(deck);
            }
            Action::JogTouch { deck, touching } => {
                self.jog_touched[Self::deck_index(deck)] = touching;
            }
            Action::JogRotate { deck, delta } => {
                self.deck_mut(deck)
                    .nudge(delta as f64 * config::JOG_SECONDS_PER_UNIT);
                self.publish_deck(deck);
            }
            Action::SetTempo { deck, rate } => {
                self.deck_mut(deck).set_tempo(rate);
                self.publish_deck(deck);
            }
            Action::SetPitch { deck, semitones } => {
                self.deck_mut(deck).set_pitch(semitones);
                self.publish_deck(deck);
            }
            Action::SetVolume { deck, volume } => {
                self.deck_mut(deck).set_volume(volume);
                self.publish_deck(deck);
                self.publish_mixer();
            }
            Action::SetEqLow { deck, gain_db } => {
                self.deck_mut(deck).set_eq(EqBand::Low, gain_db);
                self.publish_mixer();
            }
            Action::SetEqMid { deck, gain_db } => {
                self.deck_mut(deck).set_eq(EqBand::Mid, gain_db);
                self.publish_mixer();
            }
            Action::SetEqHigh { deck, gain_db } => {
                self.deck_mut(deck).set_eq(EqBand::High, gain_db);
                self.publish_mixer();
            }
            Action::SetCrossfader { position } => {
                self.mixer.set_crossfader(position);
                self.publish_mixer();
            }
            Action::SetMasterVolume { volume } => {
                self.mixer.set_master_volume(volume);
                self.publish_mixer();
            }
            Action::ToggleHeadphoneCue { deck } => {
                self.deck_mut(deck).toggle_headphone_cue();
            }
        }
    }

    pub fn jog_touched(&self, deck: DeckId) -> bool {
        self.jog_touched[Self::deck_index(deck)]
    }

    /// Observed per-deck state, refreshed on control operations and by
    /// the position monitor while playing.
    pub fn subscribe_deck(&self, id: DeckId) -> watch::Receiver<DeckSnapshot> {
        self.snapshots[Self::deck_index(id)].subscribe()
    }

    pub fn subscribe_mixer(&self) -> watch::Receiver<MixerSnapshot> {
        self.mixer_snapshot.subscribe()
    }

    /// Fatal output-device failures, as messages for the UI. The audio
    /// subsystem does not recover on its own; the owner may rebuild the
    /// engine on a fresh backend.
    pub fn subscribe_device_errors(&self) -> watch::Receiver<Option<String>> {
        self.device_errors.subscribe()
    }

    /// Spawn the position monitor onto the current tokio runtime.
    pub fn start_monitor(&mut self) {
        if self.monitor.is_some() {
            return;
        }
        let monitor = PositionMonitor::new(
            [self.shared[0].clone(), self.shared[1].clone()],
            [self.snapshots[0].clone(), self.snapshots[1].clone()],
            self.play_signal.clone(),
        );
        self.monitor = Some(tokio::spawn(monitor.run()));
    }

    pub fn publish_deck(&self, id: DeckId) {
        let snapshot = self.deck(id).snapshot();
        self.snapshots[Self::deck_index(id)].send_replace(snapshot);
    }

    pub fn publish_mixer(&self) {
        let snapshot = MixerSnapshot {
            crossfader: self.mixer.crossfader(),
            fader_a: self.mixer.fader(DeckId::A),
            fader_b: self.mixer.fader(DeckId::B),
            master: self.mixer.master_volume(),
            eq_a: self.shared[0].eq_params(),
            eq_b: self.shared[1].eq_params(),
        };
        self.mixer_snapshot.send_replace(snapshot);
    }

    /// Stop the output and the monitor. Deck state survives; a new
    /// backend can be attached by rebuilding the engine.
    pub fn stop(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.stop();
        }
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PreloadedBuffer, Track, TrackId};

    fn loaded_engine() -> (Engine, AudioGraph) {
        let (mut engine, graph) = Engine::headless(48_000);
        for id in [DeckId::A, DeckId::B] {
            let frames = 48_000 * 30;
            let buffer = PreloadedBuffer::new(vec![vec![0.1; frames], vec![0.1; frames]], 48_000);
            let track = Track {
                id: TrackId::next(),
                path: PathBuf::from(format!("/tmp/{}.wav", id)),
                title: Some(format!("Track {}", id)),
                artist: None,
                album: None,
                duration_seconds: 30.0,
                format_tag: "wav".into(),
                bpm: Some(if id == DeckId::A { 128.0 } else { 100.0 }),
                waveform: None,
            };
            engine.deck_mut(id).load(track, buffer);
        }
        (engine, graph)
    }

    #[test]
    fn actions_drive_decks_and_mixer() {
        let (mut engine, _graph) = loaded_engine();
        engine.apply(Action::TogglePlayPause { deck: DeckId::A });
        assert!(engine.deck(DeckId::A).is_playing());
        engine.apply(Action::SetTempo {
            deck: DeckId::A,
            rate: 1.2,
        });
        assert!((engine.deck(DeckId::A).tempo() - 1.2).abs() < 1e-6);
        engine.apply(Action::SetCrossfader { position: 0.0 });
        assert_eq!(engine.mixer().crossfader(), 0.0);
        engine.apply(Action::SetEqHigh {
            deck: DeckId::B,
            gain_db: -6.0,
        });
        assert_eq!(engine.deck(DeckId::B).eq(EqBand::High), -6.0);
        engine.apply(Action::JogTouch {
            deck: DeckId::B,
            touching: true,
        });
        assert!(engine.jog_touched(DeckId::B));
    }

    #[test]
    fn sync_action_matches_opposite_deck() {
        let (mut engine, _graph) = loaded_engine();
        engine.apply(Action::Sync { deck: DeckId::B });
        // Deck B (100 BPM original) follows deck A at 128.
        assert!((engine.deck(DeckId::B).bpm_effective().unwrap() - 128.0).abs() < 0.1);
    }

    #[test]
    fn snapshots_follow_operations() {
        let (mut engine, _graph) = loaded_engine();
        let rx = engine.subscribe_deck(DeckId::A);
        engine.apply(Action::SetVolume {
            deck: DeckId::A,
            volume: 0.4,
        });
        assert!((rx.borrow().volume - 0.4).abs() < 1e-6);
        assert_eq!(rx.borrow().bpm_original, Some(128.0));

        let mixer_rx = engine.subscribe_mixer();
        engine.apply(Action::SetMasterVolume { volume: 0.7 });
        assert!((mixer_rx.borrow().master - 0.7).abs() < 1e-6);
    }

    #[tokio::test]
    async fn load_failure_preserves_prior_deck_state() {
        let (mut engine, _graph) = loaded_engine();
        let before = engine.deck(DeckId::A).track().unwrap().id;
        let result = engine
            .load_track(DeckId::A, PathBuf::from("/nonexistent/next.mp3"))
            .await;
        assert!(result.is_err());
        assert_eq!(engine.deck(DeckId::A).track().unwrap().id, before);
    }

    #[test]
    fn jog_rotate_nudges_position() {
        let (mut engine, mut graph) = loaded_engine();
        engine.deck_mut(DeckId::A).seek(10.0);
        engine.apply(Action::JogRotate {
            deck: DeckId::A,
            delta: 5.0,
        });
        let mut out = vec![0.0f32; 512 * 2];
        graph.render(&mut out);
        let t = engine.deck(DeckId::A).current_seconds();
        assert!((t - (10.0 + 5.0 * config::JOG_SECONDS_PER_UNIT)).abs() < 1e-3);
    }
}
