use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::decode;
use crate::errors::DecodeError;
use crate::types::{PreloadedBuffer, Track, TrackId, TrackMetadata};

/// A fully analysed track ready to hand to a deck: the immutable track
/// description plus the resident PCM it was derived from.
pub struct AnalyzedTrack {
    pub track: Track,
    pub buffer: PreloadedBuffer,
}

fn build_track(path: &Path, meta: TrackMetadata, buffer: &PreloadedBuffer) -> Track {
    let id = TrackId::next();

    // BPM and waveform consume the buffer only here, during load; the deck
    // takes exclusive ownership afterwards.
    let (bpm, waveform) = rayon::join(
        || match crate::analysis::bpm::estimate(buffer) {
            Ok(bpm) => Some(bpm),
            Err(e) => {
                log::warn!("Analysis: BPM unavailable for '{}': {}", path.display(), e);
                None
            }
        },
        || match crate::analysis::waveform::sample(buffer, id) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                log::warn!(
                    "Analysis: waveform unavailable for '{}': {}",
                    path.display(),
                    e
                );
                None
            }
        },
    );

    Track {
        id,
        path: path.to_path_buf(),
        title: meta.title,
        artist: meta.artist,
        album: meta.album,
        duration_seconds: buffer.duration_seconds(),
        format_tag: meta.format_tag,
        bpm,
        waveform,
    }
}

/// Decode a file once and derive everything a deck load needs: metadata,
/// BPM estimate and waveform envelope. Synchronous and blocking; callers
/// that need concurrency push it to a worker.
pub fn analyze_file(path: &Path) -> Result<AnalyzedTrack, DecodeError> {
    log::info!("Analysis: loading '{}'", path.display());
    let meta = decode::read_metadata(path).unwrap_or_else(|e| {
        log::warn!(
            "Analysis: metadata unavailable for '{}': {}",
            path.display(),
            e
        );
        TrackMetadata::default()
    });
    let buffer = decode::decode(path)?;
    let track = build_track(path, meta, &buffer);
    log::info!(
        "Analysis: '{}' ready ({:.1}s, BPM {:?})",
        path.display(),
        track.duration_seconds,
        track.bpm
    );
    Ok(AnalyzedTrack { track, buffer })
}

/// Analyse a batch of files in parallel, keeping only the track
/// descriptions. Failures are per-file.
pub fn analyze_paths(paths: &[PathBuf]) -> HashMap<PathBuf, Result<Track, DecodeError>> {
    log::info!("Analysis: batch of {} files", paths.len());
    paths
        .par_iter()
        .map(|path| {
            let result = analyze_file(path).map(|analyzed| analyzed.track);
            if let Err(e) = &result {
                log::error!("Analysis: batch entry '{}' failed: {}", path.display(), e);
            }
            (path.clone(), result)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::write_wav;

    #[test]
    fn missing_file_fails_with_io_error() {
        let err = analyze_file(Path::new("/nonexistent/file.mp3")).unwrap_err();
        assert!(matches!(err, DecodeError::Io { .. }));
    }

    #[test]
    fn analyze_click_track_end_to_end() {
        let rate = 44_100u32;
        let seconds = 20.0f32;
        let frames = (seconds * rate as f32) as usize;
        let beat_period = 60.0 / 124.0 * rate as f32;
        let mut mono = vec![0.0f32; frames];
        let mut beat = 0.0f32;
        while (beat as usize) < frames {
            let start = beat as usize;
            for i in 0..512.min(frames - start) {
                let t = i as f32 / rate as f32;
                mono[start + i] +=
                    (-t * 80.0).exp() * (2.0 * std::f32::consts::PI * 220.0 * t).sin() * 0.8;
            }
            beat += beat_period;
        }
        let path = write_wav("clicks", &[mono.clone(), mono], rate);

        let analyzed = analyze_file(&path).unwrap();
        assert!((analyzed.track.duration_seconds - seconds as f64).abs() < 0.05);
        let bpm = analyzed.track.bpm.expect("click track should have a BPM");
        assert!((123.0..=125.0).contains(&bpm), "got {} BPM", bpm);
        let waveform = analyzed.track.waveform.expect("waveform should be present");
        let expected_len = (analyzed.track.duration_seconds * 50.0).round();
        assert!((waveform.samples.len() as f64 - expected_len).abs() <= 1.0);
        assert_eq!(analyzed.buffer.frames(), frames);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn batch_reports_per_file_failures() {
        let paths = vec![
            PathBuf::from("/nonexistent/a.mp3"),
            PathBuf::from("/nonexistent/b.flac"),
        ];
        let results = analyze_paths(&paths);
        assert_eq!(results.len(), 2);
        assert!(results.values().all(|r| r.is_err()));
    }
}
