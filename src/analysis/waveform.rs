use rayon::prelude::*;

use crate::config;
use crate::errors::WaveformError;
use crate::types::{PreloadedBuffer, TrackId, WaveformEnvelope};

/// Reduce decoded PCM to a fixed-rate RMS envelope for visualisation.
/// The envelope is normalised into [0, 1] by its maximum; an all-silent
/// input stays at zero.
pub fn sample(buffer: &PreloadedBuffer, track_id: TrackId) -> Result<WaveformEnvelope, WaveformError> {
    let total_frames = buffer.frames();
    if total_frames == 0 {
        return Err(WaveformError::EmptySamples);
    }
    let rate = buffer.sample_rate;
    if rate == 0 {
        return Err(WaveformError::InvalidSampleRate(rate));
    }

    let sps = config::WAVEFORM_SAMPLES_PER_SECOND;
    let duration = buffer.duration_seconds();
    let sample_count = (duration * sps as f64).round() as usize;
    let frames_per_sample = (total_frames as f64 / (duration * sps as f64)).floor() as usize;
    if sample_count == 0 || frames_per_sample == 0 {
        // Shorter than one envelope sample; represent it as a single bin.
        let rms = window_rms(buffer, 0, total_frames);
        let samples = if rms > 0.0 { vec![1.0] } else { vec![0.0] };
        return Ok(WaveformEnvelope {
            track_id,
            samples_per_second: sps,
            samples,
            duration_seconds: duration,
        });
    }

    let mut samples: Vec<f32> = (0..sample_count)
        .into_par_iter()
        .map(|i| {
            let offset = i * frames_per_sample;
            if offset >= total_frames {
                return 0.0;
            }
            let window = config::WAVEFORM_RMS_WINDOW.min(total_frames - offset);
            window_rms(buffer, offset, window)
        })
        .collect();

    let max = samples.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 {
        samples.par_iter_mut().for_each(|s| *s /= max);
    }

    log::debug!(
        "Waveform: {} envelope samples for {:.1}s of audio",
        samples.len(),
        duration
    );

    Ok(WaveformEnvelope {
        track_id,
        samples_per_second: sps,
        samples,
        duration_seconds: duration,
    })
}

/// RMS of the mono mixdown over `len` frames starting at `offset`.
fn window_rms(buffer: &PreloadedBuffer, offset: usize, len: usize) -> f32 {
    if len == 0 {
        return 0.0;
    }
    let channels = buffer.channel_count() as f32;
    let mut energy = 0.0f64;
    for i in offset..offset + len {
        let mono: f32 = buffer.channels.iter().map(|c| c[i]).sum::<f32>() / channels;
        energy += (mono as f64) * (mono as f64);
    }
    (energy / len as f64).sqrt() as f32
}
