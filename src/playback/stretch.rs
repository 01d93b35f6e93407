use signalsmith_stretch::Stretch;

use crate::config;

const CHANNELS: u32 = 2;

/// Time/pitch unit for one deck: stretches duration by `1/r` and applies
/// an independent pitch shift in semitones, glitch-free across per-callback
/// changes. Input sizing carries the rate; the stretcher itself maps the
/// sized input onto the fixed output block.
pub struct TimePitch {
    stretcher: Stretch,
    pitch_semitones: f32,
}

impl TimePitch {
    pub fn new(sample_rate: u32) -> Self {
        TimePitch {
            stretcher: Stretch::preset_default(CHANNELS, sample_rate),
            pitch_semitones: 0.0,
        }
    }

    /// Source frames to feed for `out_frames` of output at tempo `r`,
    /// corrected for any source/device rate mismatch.
    pub fn input_frames(out_frames: usize, tempo: f32, rate_ratio: f64) -> usize {
        (out_frames as f64 * tempo as f64 * rate_ratio).round() as usize
    }

    /// Update the transpose amount; cheap when unchanged.
    pub fn set_pitch_semitones(&mut self, semitones: f32) {
        let clamped = semitones.clamp(config::PITCH_MIN_SEMITONES, config::PITCH_MAX_SEMITONES);
        if (clamped - self.pitch_semitones).abs() < 1e-3 {
            return;
        }
        self.pitch_semitones = clamped;
        self.stretcher
            .set_transpose_factor_semitones(clamped, None);
    }

    /// Map `input` (interleaved stereo, length = 2 x input frames) onto
    /// `output` (interleaved stereo, length = 2 x output frames).
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        if input.is_empty() {
            output.fill(0.0);
            return;
        }
        output.fill(0.0);
        self.stretcher.process(input, output);
    }

    pub fn reset(&mut self) {
        self.stretcher.reset();
    }
}
