use symphonia::core::errors::Error as SymphoniaError;
use thiserror::Error;

/// Errors that can occur while decoding an audio file to PCM.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Container or codec not supported, or no usable audio track.
    #[error("Unsupported format in '{path}': {detail}")]
    UnsupportedFormat { path: String, detail: String },
    /// File could not be opened or read.
    #[error("I/O error for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The stream is damaged beyond what the decoder can skip.
    #[error("Corrupt stream in '{path}': {source}")]
    Corrupt {
        path: String,
        #[source]
        source: SymphoniaError,
    },
    /// Decoding finished without producing a single frame.
    #[error("No samples decoded from '{path}'")]
    Empty { path: String },
}

/// Errors that can occur during BPM estimation.
#[derive(Error, Debug)]
pub enum BpmError {
    /// Cannot estimate BPM from empty input.
    #[error("Cannot estimate BPM from empty samples")]
    EmptySamples,
    /// Fewer than two onset frames after envelope differencing.
    #[error("Onset function too short ({frames} frames) for autocorrelation")]
    TooFewOnsets { frames: usize },
    /// Invalid lag range for the configured BPM bounds.
    #[error("Invalid lag range (min: {min_lag}, max: {max_lag}) at envelope rate {envelope_rate} Hz")]
    InvalidLagRange {
        min_lag: usize,
        max_lag: usize,
        envelope_rate: f32,
    },
    /// Could not find a significant autocorrelation peak.
    #[error("No autocorrelation peak found for BPM estimation")]
    NoPeak,
}

/// Errors that can occur while reducing PCM to a waveform envelope.
#[derive(Error, Debug)]
pub enum WaveformError {
    /// Cannot sample an envelope from empty input.
    #[error("Cannot build a waveform envelope from empty samples")]
    EmptySamples,
    /// Sample rate is zero or negative.
    #[error("Invalid sample rate for waveform sampling: {0}")]
    InvalidSampleRate(u32),
}

/// Errors that can occur while operating the playback engine.
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// Decode failed while loading a track onto a deck.
    #[error("Decode failed while loading deck {deck:?}: {source}")]
    LoadDecode {
        deck: crate::types::DeckId,
        #[source]
        source: DecodeError,
    },
    /// A blocking load task panicked or was cancelled by the runtime.
    #[error("Load task failed for deck {deck:?}: {reason}")]
    LoadTask {
        deck: crate::types::DeckId,
        reason: String,
    },
}

/// Errors raised by the audio output backend. Fatal for the audio
/// subsystem; the owner may attempt re-initialisation.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No default audio output device available")]
    NoDevice,
    #[error("Failed to query output configurations: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),
    #[error("No stereo f32 output configuration available")]
    NoUsableConfig,
    #[error("Failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("Failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("Failed to pause output stream: {0}")]
    PauseStream(#[from] cpal::PauseStreamError),
    #[error("Output stream failed: {0}")]
    Stream(String),
}

/// Errors raised by the control surface binder and its mapping store.
#[derive(Error, Debug)]
pub enum ControlError {
    /// A MIDI byte sequence that is not a recognised channel message.
    #[error("Unrecognised MIDI message: {0:02x?}")]
    UnrecognisedMessage(Vec<u8>),
    /// The mapping store could not be read or written.
    #[error("Mapping store I/O failed at '{path}': {source}")]
    StoreIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The mapping store contents could not be parsed.
    #[error("Mapping store at '{path}' is not valid JSON: {source}")]
    StoreFormat {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
