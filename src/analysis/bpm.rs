use rayon::prelude::*;
use rustfft::{num_complex::Complex, num_traits::Zero, FftPlanner};

use crate::config;
use crate::errors::BpmError;
use crate::types::PreloadedBuffer;

// --- Private Helper Functions ---

fn mono_mixdown(buffer: &PreloadedBuffer) -> Vec<f32> {
    let frames = buffer.frames();
    let channels = buffer.channel_count();
    match channels {
        0 => Vec::new(),
        1 => buffer.channels[0].clone(),
        _ => (0..frames)
            .into_par_iter()
            .map(|i| {
                buffer.channels.iter().map(|c| c[i]).sum::<f32>() / channels as f32
            })
            .collect(),
    }
}

/// Plain decimation: keep every `factor`-th sample. The following stage is
/// an energy envelope, which tolerates the aliasing this admits.
fn decimate(samples: &[f32], factor: usize) -> Vec<f32> {
    if factor <= 1 {
        return samples.to_vec();
    }
    samples.iter().step_by(factor).copied().collect()
}

/// Per-window RMS over `window`-sized frames advancing by `hop`,
/// normalised by the maximum.
fn energy_envelope(samples: &[f32], window: usize, hop: usize) -> Vec<f32> {
    if samples.len() < window {
        return Vec::new();
    }
    let num_windows = (samples.len() - window) / hop + 1;
    let mut envelope: Vec<f32> = (0..num_windows)
        .into_par_iter()
        .map(|i| {
            let frame = &samples[i * hop..i * hop + window];
            let energy: f32 = frame.iter().map(|s| s * s).sum();
            (energy / window as f32).sqrt()
        })
        .collect();

    let max = envelope.iter().copied().fold(0.0f32, f32::max);
    if max > 1e-9 {
        envelope.par_iter_mut().for_each(|e| *e /= max);
    }
    envelope
}

/// Positive first difference of the envelope followed by a symmetric
/// 3-wide mean filter.
fn onset_function(envelope: &[f32]) -> Vec<f32> {
    if envelope.len() < 2 {
        return Vec::new();
    }
    let mut onsets = vec![0.0f32; envelope.len()];
    for i in 1..envelope.len() {
        onsets[i] = (envelope[i] - envelope[i - 1]).max(0.0);
    }

    let mut smoothed = vec![0.0f32; onsets.len()];
    smoothed[0] = onsets[0];
    smoothed[onsets.len() - 1] = onsets[onsets.len() - 1];
    for i in 1..onsets.len() - 1 {
        smoothed[i] = (onsets[i - 1] + onsets[i] + onsets[i + 1]) / 3.0;
    }
    smoothed
}

/// Raw correlation sums r[k] = sum(s[i] * s[i+k]) for all lags up to
/// `max_lag`, via FFT.
fn fft_correlation(signal: &[f32], max_lag: usize) -> Vec<f32> {
    if signal.is_empty() || max_lag == 0 {
        return Vec::new();
    }
    let n = (signal.len() + max_lag).next_power_of_two();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    let ifft = planner.plan_fft_inverse(n);

    let mut buffer: Vec<Complex<f32>> = signal
        .iter()
        .map(|&x| Complex { re: x, im: 0.0 })
        .chain(std::iter::repeat(Complex::zero()).take(n - signal.len()))
        .collect();

    fft.process(&mut buffer);
    buffer.par_iter_mut().for_each(|c| *c = c.norm_sqr().into());
    ifft.process(&mut buffer);

    buffer[..=max_lag.min(buffer.len() - 1)]
        .par_iter()
        .map(|c| c.re / n as f32)
        .collect()
}

/// Normalised autocorrelation over the lag range: for lag k,
/// rho(k) = r[k] / sqrt(sum(s[i]^2, i < n-k) * sum(s[i]^2, i >= k)).
fn normalised_autocorrelation(signal: &[f32], max_lag: usize) -> Vec<f32> {
    let raw = fft_correlation(signal, max_lag);
    if raw.is_empty() {
        return raw;
    }
    let n = signal.len();
    // Prefix sums of s^2 give both overlap energies per lag.
    let mut prefix = vec![0.0f64; n + 1];
    for (i, &s) in signal.iter().enumerate() {
        prefix[i + 1] = prefix[i] + (s as f64) * (s as f64);
    }
    raw.iter()
        .enumerate()
        .map(|(k, &r)| {
            if k >= n {
                return 0.0;
            }
            let head = prefix[n - k];
            let tail = prefix[n] - prefix[k];
            let denom = (head * tail).sqrt();
            if denom > 1e-12 {
                (r as f64 / denom) as f32
            } else {
                0.0
            }
        })
        .collect()
}

/// Sub-sample peak refinement from the three points around the maximum.
fn parabolic_refine(rho: &[f32], peak: usize) -> f32 {
    if peak == 0 || peak + 1 >= rho.len() {
        return peak as f32;
    }
    let y_minus = rho[peak - 1];
    let y_0 = rho[peak];
    let y_plus = rho[peak + 1];
    let denominator = y_minus - 2.0 * y_0 + y_plus;
    if denominator.abs() <= 1e-9 {
        return peak as f32;
    }
    let p = (0.5 * (y_minus - y_plus) / denominator).clamp(-0.7, 0.7);
    peak as f32 + p
}

/// Octave correction: weight candidate multiples of the raw tempo and
/// keep the best-scoring one.
fn octave_correct(raw_bpm: f32, peak_rho: f32) -> f32 {
    let score_for = |candidate: f32| -> f32 {
        let mut score = peak_rho;
        if (config::BPM_FAVOURED_RANGE.0..=config::BPM_FAVOURED_RANGE.1).contains(&candidate) {
            score *= config::BPM_FAVOURED_WEIGHT;
        }
        if !(config::BPM_PLAUSIBLE_RANGE.0..=config::BPM_PLAUSIBLE_RANGE.1).contains(&candidate) {
            score *= config::BPM_IMPLAUSIBLE_WEIGHT;
        }
        score
    };

    // Seed with the x1 candidate so ties keep the raw tempo.
    let mut best = raw_bpm;
    let mut best_score = score_for(raw_bpm);
    for &multiple in &config::BPM_OCTAVE_CANDIDATES {
        let candidate = raw_bpm * multiple;
        let score = score_for(candidate);
        if score > best_score {
            best = candidate;
            best_score = score;
        }
    }
    best
}

fn estimate_from_onsets(onsets: &[f32], envelope_rate: f32) -> Result<f32, BpmError> {
    if onsets.len() < 2 {
        return Err(BpmError::TooFewOnsets {
            frames: onsets.len(),
        });
    }

    // Lag bounds for the [BPM_MIN, BPM_MAX] tempo range.
    let max_lag = (60.0 * envelope_rate / config::BPM_MIN).ceil() as usize;
    let min_lag = (60.0 * envelope_rate / config::BPM_MAX).floor() as usize;
    if min_lag == 0 || max_lag <= min_lag {
        return Err(BpmError::InvalidLagRange {
            min_lag,
            max_lag,
            envelope_rate,
        });
    }
    let effective_max_lag = max_lag.min(onsets.len().saturating_sub(1));
    if effective_max_lag <= min_lag {
        return Err(BpmError::InvalidLagRange {
            min_lag,
            max_lag: effective_max_lag,
            envelope_rate,
        });
    }

    let rho = normalised_autocorrelation(onsets, effective_max_lag + 1);
    let peak = rho
        .iter()
        .enumerate()
        .take(effective_max_lag + 1)
        .skip(min_lag)
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let Some((peak_lag, &peak_rho)) = peak else {
        return Err(BpmError::NoPeak);
    };
    if peak_rho <= 0.0 {
        return Err(BpmError::NoPeak);
    }

    let refined_lag = parabolic_refine(&rho, peak_lag);
    if refined_lag <= 0.0 {
        return Err(BpmError::NoPeak);
    }
    let raw_bpm = 60.0 * envelope_rate / refined_lag;
    let corrected = octave_correct(raw_bpm, peak_rho);
    let clamped = corrected.clamp(config::BPM_MIN, config::BPM_MAX);
    // Rounded to 0.1 BPM.
    Ok((clamped * 10.0).round() / 10.0)
}

// --- Public Estimation Functions ---

/// Estimate tempo from mono samples at `sample_rate`.
pub fn estimate_mono(samples: &[f32], sample_rate: u32) -> Result<f32, BpmError> {
    if samples.is_empty() {
        return Err(BpmError::EmptySamples);
    }
    let decimated = decimate(samples, config::BPM_DECIMATION_FACTOR);
    let decimated_rate = sample_rate as f32 / config::BPM_DECIMATION_FACTOR as f32;
    let envelope = energy_envelope(
        &decimated,
        config::BPM_ENVELOPE_WINDOW,
        config::BPM_ENVELOPE_HOP,
    );
    let onsets = onset_function(&envelope);
    let envelope_rate = decimated_rate / config::BPM_ENVELOPE_HOP as f32;
    let bpm = estimate_from_onsets(&onsets, envelope_rate)?;
    log::debug!(
        "BPM: {} samples at {} Hz -> {:.1} BPM",
        samples.len(),
        sample_rate,
        bpm
    );
    Ok(bpm)
}

/// Estimate tempo from a decoded buffer of any channel count.
pub fn estimate(buffer: &PreloadedBuffer) -> Result<f32, BpmError> {
    let mono = mono_mixdown(buffer);
    estimate_mono(&mono, buffer.sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Click train: short decaying bursts at the given tempo.
    fn click_train(bpm: f32, seconds: f32, sample_rate: u32, channels: usize) -> PreloadedBuffer {
        let frames = (seconds * sample_rate as f32) as usize;
        let beat_period = 60.0 / bpm * sample_rate as f32;
        let mut mono = vec![0.0f32; frames];
        let mut beat = 0.0f32;
        while (beat as usize) < frames {
            let start = beat as usize;
            for i in 0..512.min(frames - start) {
                let t = i as f32 / sample_rate as f32;
                mono[start + i] +=
                    (-t * 80.0).exp() * (2.0 * std::f32::consts::PI * 220.0 * t).sin();
            }
            beat += beat_period;
        }
        PreloadedBuffer::new(vec![mono; channels], sample_rate)
    }

    #[test]
    fn pulse_train_124_bpm_stereo() {
        let buffer = click_train(124.0, 30.0, 44_100, 2);
        let bpm = estimate(&buffer).unwrap();
        assert!(
            (123.0..=125.0).contains(&bpm),
            "expected ~124 BPM, got {}",
            bpm
        );
    }

    #[test]
    fn click_track_120_bpm() {
        let buffer = click_train(120.0, 30.0, 44_100, 1);
        let bpm = estimate(&buffer).unwrap();
        assert!((bpm - 120.0).abs() <= 1.0, "expected ~120 BPM, got {}", bpm);
    }

    #[test]
    fn apparent_60_bpm_octave_corrects_to_120() {
        // The 120 BPM track at half rate looks like clicks every second;
        // the raw estimate of 60 folds up into the favoured range.
        let buffer = click_train(60.0, 30.0, 44_100, 1);
        let bpm = estimate(&buffer).unwrap();
        assert!((bpm - 120.0).abs() <= 1.0, "expected ~120 BPM, got {}", bpm);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(
            estimate_mono(&[], 44_100),
            Err(BpmError::EmptySamples)
        ));
    }

    #[test]
    fn too_short_input_is_an_error() {
        // Under one envelope window after decimation.
        let samples = vec![0.5f32; 1_000];
        assert!(estimate_mono(&samples, 44_100).is_err());
    }

    #[test]
    fn silence_has_no_peak() {
        let samples = vec![0.0f32; 44_100 * 10];
        assert!(estimate_mono(&samples, 44_100).is_err());
    }

    #[test]
    fn octave_weights_prefer_favoured_range() {
        // Raw 60: x2 lands in [90, 140] and wins.
        assert_eq!(octave_correct(60.0, 1.0), 120.0);
        // Raw 124 already favoured; stays.
        assert_eq!(octave_correct(124.0, 1.0), 124.0);
        // Raw 170: no candidate is favoured, ties keep the raw tempo.
        assert_eq!(octave_correct(170.0, 1.0), 170.0);
    }

    #[test]
    fn normalised_autocorrelation_is_bounded() {
        let signal: Vec<f32> = (0..256).map(|i| ((i % 16) == 0) as u8 as f32).collect();
        let rho = normalised_autocorrelation(&signal, 64);
        for (k, &r) in rho.iter().enumerate() {
            assert!(r <= 1.0 + 1e-4, "rho[{}] = {} exceeds 1", k, r);
        }
        // Perfect periodicity: the lag-16 peak is near 1.
        assert!(rho[16] > 0.9);
    }
}
