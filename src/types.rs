use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// One of the two playback channels.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeckId {
    A,
    B,
}

impl DeckId {
    pub fn other(self) -> DeckId {
        match self {
            DeckId::A => DeckId::B,
            DeckId::B => DeckId::A,
        }
    }
}

impl std::fmt::Display for DeckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeckId::A => write!(f, "A"),
            DeckId::B => write!(f, "B"),
        }
    }
}

/// Process-unique track identity.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(pub u64);

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

impl TrackId {
    pub fn next() -> TrackId {
        TrackId(NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// An EQ band of the three-band section.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqBand {
    Low,
    Mid,
    High,
}

/// Per-deck EQ gains in dB.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EqParams {
    pub low_gain_db: f32,
    pub mid_gain_db: f32,
    pub high_gain_db: f32,
}

impl Default for EqParams {
    fn default() -> Self {
        EqParams {
            low_gain_db: 0.0,
            mid_gain_db: 0.0,
            high_gain_db: 0.0,
        }
    }
}

impl EqParams {
    pub fn gain(&self, band: EqBand) -> f32 {
        match band {
            EqBand::Low => self.low_gain_db,
            EqBand::Mid => self.mid_gain_db,
            EqBand::High => self.high_gain_db,
        }
    }

    /// All three bands close enough to flat that the EQ section can be skipped.
    pub fn is_flat(&self) -> bool {
        self.low_gain_db.abs() < crate::config::EQ_BYPASS_THRESHOLD_DB
            && self.mid_gain_db.abs() < crate::config::EQ_BYPASS_THRESHOLD_DB
            && self.high_gain_db.abs() < crate::config::EQ_BYPASS_THRESHOLD_DB
    }
}

/// The entire decoded PCM of a track, channel-planar, resident for the
/// track's tenure on a deck.
#[derive(Debug)]
pub struct PreloadedBuffer {
    /// One `Vec<f32>` per channel, all of equal length.
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl PreloadedBuffer {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        debug_assert!(channels.iter().all(|c| c.len() == channels[0].len()));
        PreloadedBuffer {
            channels,
            sample_rate,
        }
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Mean across channels at one frame index.
    pub fn mono_frame(&self, frame: usize) -> f32 {
        let n = self.channels.len();
        if n == 0 {
            return 0.0;
        }
        self.channels.iter().map(|c| c[frame]).sum::<f32>() / n as f32
    }
}

/// Reduced 50 Hz RMS representation of a track used for drawing.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WaveformEnvelope {
    pub track_id: TrackId,
    pub samples_per_second: u32,
    /// Normalised magnitudes in [0, 1].
    pub samples: Vec<f32>,
    pub duration_seconds: f64,
}

/// Best-effort container metadata read from a file.
#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_seconds: f64,
    pub format_tag: String,
}

/// Immutable description of a loaded track.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: TrackId,
    pub path: PathBuf,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_seconds: f64,
    pub format_tag: String,
    pub bpm: Option<f32>,
    pub waveform: Option<WaveformEnvelope>,
}

/// Observed per-deck state published to views.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeckSnapshot {
    pub is_playing: bool,
    pub current_seconds: f64,
    pub duration: f64,
    pub tempo: f32,
    pub pitch: f32,
    pub volume: f32,
    pub cue_set: bool,
    pub hot_cues_set: [bool; 4],
    pub bpm_original: Option<f32>,
    pub bpm_effective: Option<f32>,
    pub track_id: Option<TrackId>,
    pub reached_end: bool,
}

/// Observed mixer state published to views.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MixerSnapshot {
    pub crossfader: f32,
    pub fader_a: f32,
    pub fader_b: f32,
    pub master: f32,
    pub eq_a: EqParams,
    pub eq_b: EqParams,
}

impl Default for MixerSnapshot {
    fn default() -> Self {
        MixerSnapshot {
            crossfader: 0.5,
            fader_a: 1.0,
            fader_b: 1.0,
            master: 1.0,
            eq_a: EqParams::default(),
            eq_b: EqParams::default(),
        }
    }
}
