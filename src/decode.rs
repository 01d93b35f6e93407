use std::fs::File;
use std::path::Path;

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::{MetadataOptions, StandardTagKey},
    probe::Hint,
};

use crate::config;
use crate::errors::DecodeError;
use crate::types::{PreloadedBuffer, TrackMetadata};

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

fn probe_hint(path: &Path) -> Hint {
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    hint
}

/// Decodes an audio file into channel-planar f32 PCM at the file's native
/// sample rate. This is the canonical form consumed by playback, BPM
/// estimation and waveform sampling.
pub fn decode(path: &Path) -> Result<PreloadedBuffer, DecodeError> {
    let file = File::open(path).map_err(|e| DecodeError::Io {
        path: path_str(path),
        source: e,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &probe_hint(path),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::UnsupportedFormat {
            path: path_str(path),
            detail: e.to_string(),
        })?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
        .ok_or_else(|| DecodeError::UnsupportedFormat {
            path: path_str(path),
            detail: "no suitable audio track".into(),
        })?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.ok_or_else(|| {
        DecodeError::UnsupportedFormat {
            path: path_str(path),
            detail: "sample rate missing".into(),
        }
    })?;
    if !(config::SAMPLE_RATE_MIN..=config::SAMPLE_RATE_MAX).contains(&sample_rate) {
        return Err(DecodeError::UnsupportedFormat {
            path: path_str(path),
            detail: format!("sample rate {} Hz out of range", sample_rate),
        });
    }
    let channel_count = track
        .codec_params
        .channels
        .ok_or_else(|| DecodeError::UnsupportedFormat {
            path: path_str(path),
            detail: "channel info missing".into(),
        })?
        .count();
    if channel_count == 0 {
        return Err(DecodeError::UnsupportedFormat {
            path: path_str(path),
            detail: "zero channels".into(),
        });
    }
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::UnsupportedFormat {
            path: path_str(path),
            detail: e.to_string(),
        })?;

    let mut channels: Vec<Vec<f32>> =
        vec![Vec::with_capacity(config::DECODE_INITIAL_CAPACITY); channel_count];
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        match format.next_packet() {
            Ok(packet) => {
                if packet.track_id() != track_id {
                    continue;
                }
                match decoder.decode(&packet) {
                    Ok(audio_buf) => {
                        if sample_buf.is_none() {
                            sample_buf = Some(SampleBuffer::<f32>::new(
                                audio_buf.capacity() as u64,
                                *audio_buf.spec(),
                            ));
                        }
                        if let Some(buf) = sample_buf.as_mut() {
                            buf.copy_interleaved_ref(audio_buf);
                            for frame in buf.samples().chunks_exact(channel_count) {
                                for (ch, &s) in channels.iter_mut().zip(frame.iter()) {
                                    ch.push(s);
                                }
                            }
                        }
                    }
                    Err(SymphoniaError::DecodeError(err_desc)) => {
                        log::warn!(
                            "Decode: ignoring decode error in '{}': {}",
                            path.display(),
                            err_desc
                        );
                    }
                    Err(e) => {
                        return Err(DecodeError::Corrupt {
                            path: path_str(path),
                            source: e,
                        });
                    }
                }
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                log::debug!("Decode: reached EOF for '{}'", path.display());
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                log::warn!(
                    "Decode: decoder reset required unexpectedly for '{}'",
                    path.display()
                );
                break;
            }
            Err(e) => {
                return Err(DecodeError::Corrupt {
                    path: path_str(path),
                    source: e,
                });
            }
        }
    }

    decoder.finalize();

    if channels.iter().all(|c| c.is_empty()) {
        return Err(DecodeError::Empty {
            path: path_str(path),
        });
    }

    log::debug!(
        "Decode: {} frames x {} channels at {} Hz from '{}'",
        channels[0].len(),
        channel_count,
        sample_rate,
        path.display()
    );

    Ok(PreloadedBuffer::new(channels, sample_rate))
}

/// Reads display metadata without decoding the stream. Best-effort:
/// missing fields yield `None`, never failure.
pub fn read_metadata(path: &Path) -> Result<TrackMetadata, DecodeError> {
    let file = File::open(path).map_err(|e| DecodeError::Io {
        path: path_str(path),
        source: e,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut probed = symphonia::default::get_probe()
        .format(
            &probe_hint(path),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::UnsupportedFormat {
            path: path_str(path),
            detail: e.to_string(),
        })?;

    let mut meta = TrackMetadata {
        format_tag: path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("unknown")
            .to_ascii_lowercase(),
        ..Default::default()
    };

    if let Some(track) = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
    {
        if let (Some(n_frames), Some(rate)) =
            (track.codec_params.n_frames, track.codec_params.sample_rate)
        {
            if rate > 0 {
                meta.duration_seconds = n_frames as f64 / rate as f64;
            }
        }
    }

    let mut apply_tags = |revision: &symphonia::core::meta::MetadataRevision| {
        for tag in revision.tags() {
            match tag.std_key {
                Some(StandardTagKey::TrackTitle) => {
                    meta.title.get_or_insert_with(|| tag.value.to_string());
                }
                Some(StandardTagKey::Artist) => {
                    meta.artist.get_or_insert_with(|| tag.value.to_string());
                }
                Some(StandardTagKey::Album) => {
                    meta.album.get_or_insert_with(|| tag.value.to_string());
                }
                _ => {}
            }
        }
    };

    if let Some(metadata) = probed.metadata.get() {
        if let Some(revision) = metadata.current() {
            apply_tags(revision);
        }
    }
    if let Some(revision) = probed.format.metadata().current() {
        apply_tags(revision);
    }

    Ok(meta)
}
