use std::time::Duration;

// --- Control Ranges ---
pub const TEMPO_MIN: f32 = 0.5;
pub const TEMPO_MAX: f32 = 2.0;
pub const PITCH_MIN_SEMITONES: f32 = -12.0;
pub const PITCH_MAX_SEMITONES: f32 = 12.0;
pub const EQ_GAIN_MIN_DB: f32 = -12.0;
pub const EQ_GAIN_MAX_DB: f32 = 12.0;

// --- EQ Filter Constants ---
pub const EQ_LOW_HZ: f32 = 100.0;
pub const EQ_MID_HZ: f32 = 1_000.0;
pub const EQ_HIGH_HZ: f32 = 12_000.0;
/// Q for a one-octave bandwidth peaking filter.
pub const EQ_BANDWIDTH_Q: f32 = std::f32::consts::SQRT_2;
/// All three bands below this magnitude mark the deck's EQ section as skippable.
pub const EQ_BYPASS_THRESHOLD_DB: f32 = 0.1;
/// Minimum change in dB before recalculating EQ filter coefficients.
pub const EQ_RECALC_THRESHOLD_DB: f32 = 0.1;

// --- BPM Estimator Constants ---
pub const BPM_MIN: f32 = 60.0;
pub const BPM_MAX: f32 = 180.0;
pub const BPM_DECIMATION_FACTOR: usize = 4;
pub const BPM_ENVELOPE_WINDOW: usize = 1_024;
pub const BPM_ENVELOPE_HOP: usize = 512;
/// Octave candidates tried against the raw autocorrelation tempo.
pub const BPM_OCTAVE_CANDIDATES: [f32; 4] = [0.5, 1.0, 2.0, 3.0];
/// Candidates inside this range get their score boosted.
pub const BPM_FAVOURED_RANGE: (f32, f32) = (90.0, 140.0);
pub const BPM_FAVOURED_WEIGHT: f32 = 1.5;
/// Candidates outside this range get their score halved.
pub const BPM_PLAUSIBLE_RANGE: (f32, f32) = (70.0, 180.0);
pub const BPM_IMPLAUSIBLE_WEIGHT: f32 = 0.5;

// --- Waveform Sampler Constants ---
pub const WAVEFORM_SAMPLES_PER_SECOND: u32 = 50;
pub const WAVEFORM_RMS_WINDOW: usize = 2_048;

// --- Decode Constants ---
pub const SAMPLE_RATE_MIN: u32 = 22_050;
pub const SAMPLE_RATE_MAX: u32 = 192_000;
pub const DECODE_INITIAL_CAPACITY: usize = 1024 * 256;

// --- Playback / Sync Constants ---
/// Bounded wall time between issuing a seek and the new position being
/// audible: one callback period plus one buffer schedule. Hosts that
/// measure the real value feed it to `SyncController::with_seek_latency`.
pub const SEEK_LATENCY: Duration = Duration::from_millis(100);
/// Largest callback block the device layer may request. Scratch buffers
/// are sized to this at stream open so the callback never allocates.
pub const MAX_CALLBACK_FRAMES: usize = 8_192;
/// Per-callback smoothing factor for gain scalars (higher = faster response).
pub const GAIN_SMOOTHING_FACTOR: f32 = 0.08;
/// Seek fade-in progress added per callback to mask the cursor jump.
pub const SEEK_FADE_INCREMENT: f32 = 0.08;
/// Capacity of the per-deck load command ring into the callback.
pub const DECK_COMMAND_CAPACITY: usize = 8;

// --- Position Monitor Constants ---
/// Cursor sampling interval (~60 Hz).
pub const MONITOR_SAMPLE_INTERVAL: Duration = Duration::from_millis(16);
/// Minimum interval between UI snapshot pushes (~30 Hz).
pub const MONITOR_PUSH_INTERVAL: Duration = Duration::from_millis(33);

// --- Control Surface Constants ---
/// 14-bit pitch-bend centre of the reference controller.
pub const PITCH_BEND_CENTRE: f32 = 8_184.0;
/// Tempo span mapped onto the full pitch-bend range.
pub const PITCH_BEND_TEMPO_SPAN: f32 = 0.41;
/// Seconds of travel per jog-wheel rotation unit.
pub const JOG_SECONDS_PER_UNIT: f64 = 0.02;
