use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::actions::Action;
use crate::config;
use crate::types::DeckId;

/// A MIDI channel message, the full transport contract this crate
/// consumes. How the bytes arrive is the host's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ControlChange { channel: u8, cc: u8, value: u8 },
    /// 14-bit pitch bend as a 0..=16383 integer.
    PitchBend { channel: u8, value: u16 },
}

impl MidiMessage {
    /// Parse a raw channel message. Returns `None` for anything that is
    /// not a recognised 3-byte channel voice message.
    pub fn parse(bytes: &[u8]) -> Option<MidiMessage> {
        if bytes.len() < 3 {
            return None;
        }
        let status = bytes[0];
        let channel = status & 0x0F;
        match status & 0xF0 {
            0x90 if bytes[2] > 0 => Some(MidiMessage::NoteOn {
                channel,
                note: bytes[1],
                velocity: bytes[2],
            }),
            // Note-on with zero velocity is a release by convention.
            0x90 | 0x80 => Some(MidiMessage::NoteOff {
                channel,
                note: bytes[1],
            }),
            0xB0 => Some(MidiMessage::ControlChange {
                channel,
                cc: bytes[1],
                value: bytes[2],
            }),
            0xE0 => Some(MidiMessage::PitchBend {
                channel,
                value: ((bytes[2] as u16) << 7) | (bytes[1] as u16 & 0x7F),
            }),
            _ => None,
        }
    }
}

/// Uniquely identifies a physical control: the key of the mapping table.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MidiAddress {
    Note { channel: u8, note: u8 },
    Cc { channel: u8, cc: u8 },
    Bend { channel: u8 },
}

impl MidiAddress {
    /// Stable textual form used as the key of the persisted dictionary.
    pub fn as_key(&self) -> String {
        match self {
            MidiAddress::Note { channel, note } => format!("note/{}/{}", channel, note),
            MidiAddress::Cc { channel, cc } => format!("cc/{}/{}", channel, cc),
            MidiAddress::Bend { channel } => format!("bend/{}", channel),
        }
    }

    pub fn from_key(key: &str) -> Option<MidiAddress> {
        let mut parts = key.split('/');
        match parts.next()? {
            "note" => Some(MidiAddress::Note {
                channel: parts.next()?.parse().ok()?,
                note: parts.next()?.parse().ok()?,
            }),
            "cc" => Some(MidiAddress::Cc {
                channel: parts.next()?.parse().ok()?,
                cc: parts.next()?.parse().ok()?,
            }),
            "bend" => Some(MidiAddress::Bend {
                channel: parts.next()?.parse().ok()?,
            }),
            _ => None,
        }
    }
}

/// What a mapped control does. Buttons fire on note-on; continuous
/// targets carry a conversion from the 7-bit (or 14-bit) raw value.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum ControlTarget {
    TogglePlayPause { deck: DeckId },
    JumpToCue { deck: DeckId },
    SetCuePoint { deck: DeckId },
    Sync { deck: DeckId },
    HotCue { deck: DeckId, slot: u8 },
    HeadphoneCue { deck: DeckId },
    JogTouch { deck: DeckId },
    JogWheel { deck: DeckId },
    Volume { deck: DeckId },
    EqLow { deck: DeckId },
    EqMid { deck: DeckId },
    EqHigh { deck: DeckId },
    Pitch { deck: DeckId },
    Tempo { deck: DeckId },
    Crossfader,
    MasterVolume,
}

impl ControlTarget {
    /// Human-readable slot label, the value side of the persisted
    /// dictionary and the name MIDI-Learn binds against.
    pub fn slot_label(&self) -> String {
        let deck_slot = |deck: &DeckId, name: &str| format!("deck{}.{}", deck, name);
        match self {
            ControlTarget::TogglePlayPause { deck } => deck_slot(deck, "playPause"),
            ControlTarget::JumpToCue { deck } => deck_slot(deck, "jumpToCue"),
            ControlTarget::SetCuePoint { deck } => deck_slot(deck, "setCue"),
            ControlTarget::Sync { deck } => deck_slot(deck, "sync"),
            ControlTarget::HotCue { deck, slot } => {
                format!("deck{}.hotCue{}", deck, slot)
            }
            ControlTarget::HeadphoneCue { deck } => deck_slot(deck, "headphoneCue"),
            ControlTarget::JogTouch { deck } => deck_slot(deck, "jogTouch"),
            ControlTarget::JogWheel { deck } => deck_slot(deck, "jogWheel"),
            ControlTarget::Volume { deck } => deck_slot(deck, "volume"),
            ControlTarget::EqLow { deck } => deck_slot(deck, "eqLow"),
            ControlTarget::EqMid { deck } => deck_slot(deck, "eqMid"),
            ControlTarget::EqHigh { deck } => deck_slot(deck, "eqHigh"),
            ControlTarget::Pitch { deck } => deck_slot(deck, "pitch"),
            ControlTarget::Tempo { deck } => deck_slot(deck, "tempo"),
            ControlTarget::Crossfader => "mixer.crossfader".into(),
            ControlTarget::MasterVolume => "mixer.master".into(),
        }
    }

    pub fn from_slot_label(label: &str) -> Option<ControlTarget> {
        let (scope, name) = label.split_once('.')?;
        let deck = match scope {
            "deckA" => Some(DeckId::A),
            "deckB" => Some(DeckId::B),
            _ => None,
        };
        if scope == "mixer" {
            return match name {
                "crossfader" => Some(ControlTarget::Crossfader),
                "master" => Some(ControlTarget::MasterVolume),
                _ => None,
            };
        }
        let deck = deck?;
        if let Some(slot) = name.strip_prefix("hotCue") {
            let slot: u8 = slot.parse().ok()?;
            if slot > 3 {
                return None;
            }
            return Some(ControlTarget::HotCue { deck, slot });
        }
        match name {
            "playPause" => Some(ControlTarget::TogglePlayPause { deck }),
            "jumpToCue" => Some(ControlTarget::JumpToCue { deck }),
            "setCue" => Some(ControlTarget::SetCuePoint { deck }),
            "sync" => Some(ControlTarget::Sync { deck }),
            "headphoneCue" => Some(ControlTarget::HeadphoneCue { deck }),
            "jogTouch" => Some(ControlTarget::JogTouch { deck }),
            "jogWheel" => Some(ControlTarget::JogWheel { deck }),
            "volume" => Some(ControlTarget::Volume { deck }),
            "eqLow" => Some(ControlTarget::EqLow { deck }),
            "eqMid" => Some(ControlTarget::EqMid { deck }),
            "eqHigh" => Some(ControlTarget::EqHigh { deck }),
            "pitch" => Some(ControlTarget::Pitch { deck }),
            "tempo" => Some(ControlTarget::Tempo { deck }),
            _ => None,
        }
    }
}

// --- Raw Value Conversions ---

/// Linear 7-bit fader conversion.
fn linear(value: u8) -> f32 {
    value as f32 / 127.0
}

/// Centred EQ conversion: 64 is flat, extremes are +/-12 dB.
fn centred_eq(value: u8) -> f32 {
    (value as f32 - 64.0) / 64.0 * 12.0
}

/// Centred pitch conversion onto the semitone range.
fn centred_pitch(value: u8) -> f32 {
    (value as f32 - 64.0) / 64.0 * config::PITCH_MAX_SEMITONES
}

/// Tempo multiplier from a 14-bit pitch bend, centred on the reference
/// controller's rest value.
fn bend_tempo(raw: u16) -> f32 {
    1.0 + ((raw as f32 - config::PITCH_BEND_CENTRE) / config::PITCH_BEND_CENTRE)
        * config::PITCH_BEND_TEMPO_SPAN
}

/// Relative jog encoding: 1..=63 clockwise, 65..=127 counter-clockwise.
fn jog_delta(value: u8) -> f32 {
    if value < 64 {
        value as f32
    } else {
        value as f32 - 128.0
    }
}

/// Table-driven translator from MIDI messages to actions, with a
/// MIDI-Learn mode that binds the next received note/CC to a named slot.
/// Unmapped messages are silently ignored.
pub struct MidiBinder {
    table: HashMap<MidiAddress, ControlTarget>,
    learning: Option<ControlTarget>,
}

impl MidiBinder {
    pub fn new(table: HashMap<MidiAddress, ControlTarget>) -> Self {
        MidiBinder {
            table,
            learning: None,
        }
    }

    /// The reference-controller layout: transport and hot cues on notes,
    /// faders and EQ on CCs, tempo on pitch bend. Channel 0 drives deck
    /// A, channel 1 deck B.
    pub fn with_defaults() -> Self {
        let mut table = HashMap::new();
        for (channel, deck) in [(0u8, DeckId::A), (1u8, DeckId::B)] {
            let note = |note| MidiAddress::Note { channel, note };
            let cc = |cc| MidiAddress::Cc { channel, cc };
            table.insert(note(0x0B), ControlTarget::TogglePlayPause { deck });
            table.insert(note(0x0C), ControlTarget::JumpToCue { deck });
            table.insert(note(0x0D), ControlTarget::SetCuePoint { deck });
            table.insert(note(0x58), ControlTarget::Sync { deck });
            for slot in 0..4u8 {
                table.insert(note(0x14 + slot), ControlTarget::HotCue { deck, slot });
            }
            table.insert(note(0x54), ControlTarget::HeadphoneCue { deck });
            table.insert(note(0x36), ControlTarget::JogTouch { deck });
            table.insert(cc(0x22), ControlTarget::JogWheel { deck });
            table.insert(cc(0x13), ControlTarget::Volume { deck });
            table.insert(cc(0x07), ControlTarget::EqLow { deck });
            table.insert(cc(0x0B), ControlTarget::EqMid { deck });
            table.insert(cc(0x0F), ControlTarget::EqHigh { deck });
            table.insert(MidiAddress::Bend { channel }, ControlTarget::Tempo { deck });
        }
        table.insert(
            MidiAddress::Cc {
                channel: 6,
                cc: 0x3F,
            },
            ControlTarget::Crossfader,
        );
        table.insert(
            MidiAddress::Cc {
                channel: 6,
                cc: 0x03,
            },
            ControlTarget::MasterVolume,
        );
        MidiBinder::new(table)
    }

    pub fn table(&self) -> &HashMap<MidiAddress, ControlTarget> {
        &self.table
    }

    pub fn bind(&mut self, address: MidiAddress, target: ControlTarget) {
        self.table.insert(address, target);
    }

    /// Arm learn mode: the next note or CC received is bound to `slot`.
    /// Returns false when the slot label is unknown.
    pub fn begin_learn(&mut self, slot: &str) -> bool {
        match ControlTarget::from_slot_label(slot) {
            Some(target) => {
                log::info!("MIDI learn armed for slot '{}'", slot);
                self.learning = Some(target);
                true
            }
            None => {
                log::warn!("MIDI learn rejected unknown slot '{}'", slot);
                false
            }
        }
    }

    pub fn cancel_learn(&mut self) {
        self.learning = None;
    }

    pub fn is_learning(&self) -> bool {
        self.learning.is_some()
    }

    fn try_capture(&mut self, message: &MidiMessage) -> Option<MidiAddress> {
        let target = self.learning?;
        let address = match message {
            MidiMessage::NoteOn { channel, note, .. } => MidiAddress::Note {
                channel: *channel,
                note: *note,
            },
            MidiMessage::ControlChange { channel, cc, .. } => MidiAddress::Cc {
                channel: *channel,
                cc: *cc,
            },
            // Learn listens for notes and CCs only.
            _ => return None,
        };
        self.learning = None;
        log::info!(
            "MIDI learn bound {} to '{}'",
            address.as_key(),
            target.slot_label()
        );
        self.table.insert(address, target);
        Some(address)
    }

    /// Translate one message. Learn capture wins over dispatch while
    /// armed; unmapped messages yield `None`.
    pub fn handle(&mut self, message: MidiMessage) -> Option<Action> {
        if self.try_capture(&message).is_some() {
            return None;
        }
        match message {
            MidiMessage::NoteOn { channel, note, .. } => {
                let target = self.table.get(&MidiAddress::Note { channel, note })?;
                self.note_on_action(*target)
            }
            MidiMessage::NoteOff { channel, note } => {
                let target = self.table.get(&MidiAddress::Note { channel, note })?;
                match target {
                    ControlTarget::JogTouch { deck } => Some(Action::JogTouch {
                        deck: *deck,
                        touching: false,
                    }),
                    _ => None,
                }
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                let target = self.table.get(&MidiAddress::Cc { channel, cc })?;
                self.cc_action(*target, value)
            }
            MidiMessage::PitchBend { channel, value } => {
                let target = self.table.get(&MidiAddress::Bend { channel })?;
                match target {
                    ControlTarget::Tempo { deck } => Some(Action::SetTempo {
                        deck: *deck,
                        rate: bend_tempo(value),
                    }),
                    _ => None,
                }
            }
        }
    }

    fn note_on_action(&self, target: ControlTarget) -> Option<Action> {
        match target {
            ControlTarget::TogglePlayPause { deck } => Some(Action::TogglePlayPause { deck }),
            ControlTarget::JumpToCue { deck } => Some(Action::JumpToCue { deck }),
            ControlTarget::SetCuePoint { deck } => Some(Action::SetCuePoint { deck }),
            ControlTarget::Sync { deck } => Some(Action::Sync { deck }),
            ControlTarget::HotCue { deck, slot } => Some(Action::TriggerHotCue { deck, slot }),
            ControlTarget::HeadphoneCue { deck } => Some(Action::ToggleHeadphoneCue { deck }),
            ControlTarget::JogTouch { deck } => Some(Action::JogTouch {
                deck,
                touching: true,
            }),
            // Continuous targets make no sense on a button press.
            _ => None,
        }
    }

    fn cc_action(&self, target: ControlTarget, value: u8) -> Option<Action> {
        match target {
            ControlTarget::Volume { deck } => Some(Action::SetVolume {
                deck,
                volume: linear(value),
            }),
            ControlTarget::Crossfader => Some(Action::SetCrossfader {
                position: linear(value),
            }),
            ControlTarget::MasterVolume => Some(Action::SetMasterVolume {
                volume: linear(value),
            }),
            ControlTarget::EqLow { deck } => Some(Action::SetEqLow {
                deck,
                gain_db: centred_eq(value),
            }),
            ControlTarget::EqMid { deck } => Some(Action::SetEqMid {
                deck,
                gain_db: centred_eq(value),
            }),
            ControlTarget::EqHigh { deck } => Some(Action::SetEqHigh {
                deck,
                gain_db: centred_eq(value),
            }),
            ControlTarget::Pitch { deck } => Some(Action::SetPitch {
                deck,
                semitones: centred_pitch(value),
            }),
            ControlTarget::JogWheel { deck } => Some(Action::JogRotate {
                deck,
                delta: jog_delta(value),
            }),
            ControlTarget::Tempo { deck } => Some(Action::SetTempo {
                deck,
                rate: 1.0 + (linear(value) - 0.5) * 2.0 * config::PITCH_BEND_TEMPO_SPAN,
            }),
            _ => None,
        }
    }
}
