//! Test fixtures: minimal PCM WAV files written straight to a temp path.

use std::io::Write;
use std::path::PathBuf;

/// Write a 16-bit PCM WAV from per-channel sample data and return its
/// path. Channels must be equal length.
pub(crate) fn write_wav(name: &str, channels: &[Vec<f32>], sample_rate: u32) -> PathBuf {
    let channel_count = channels.len() as u16;
    let frames = channels.first().map_or(0, |c| c.len());
    let block_align = channel_count * 2;
    let data_len = (frames as u32) * block_align as u32;

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&channel_count.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for i in 0..frames {
        for channel in channels {
            let clamped = channel[i].clamp(-1.0, 1.0);
            let sample = (clamped * i16::MAX as f32) as i16;
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
    }

    let mut path = std::env::temp_dir();
    path.push(format!(
        "crossdeck-fixture-{}-{}.wav",
        name,
        std::process::id()
    ));
    let mut file = std::fs::File::create(&path).expect("create fixture wav");
    file.write_all(&bytes).expect("write fixture wav");
    path
}
