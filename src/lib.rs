//! Two-deck DJ mixing engine.
//!
//! Two independent audio players are summed through per-channel EQ,
//! volume and a crossfader into a stereo master, with beat
//! synchronisation between decks, offline BPM estimation and waveform
//! envelope generation sharing the decode path, and a table-driven
//! control surface binder for MIDI controllers and UI gestures.
//!
//! The realtime work happens in an [`playback::AudioGraph`] pulled by an
//! output device ([`device::OutputBackend`]); control operations publish
//! atomic state the graph observes on its next callback. The
//! [`engine::Engine`] ties the pieces together behind one handle.

pub mod analysis;
pub mod config;
pub mod control;
pub mod decode;
pub mod device;
pub mod engine;
pub mod errors;
pub mod playback;
#[cfg(test)]
pub(crate) mod test_util;
pub mod types;

pub use control::{Action, MappingStore, MidiBinder, MidiMessage};
pub use engine::Engine;
pub use errors::{BpmError, ControlError, DecodeError, DeviceError, PlaybackError, WaveformError};
pub use playback::{AudioGraph, Deck, Mixer, SyncController};
pub use types::{
    DeckId, DeckSnapshot, EqBand, EqParams, MixerSnapshot, PreloadedBuffer, Track, TrackId,
    WaveformEnvelope,
};
