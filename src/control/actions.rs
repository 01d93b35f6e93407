use serde::{Deserialize, Serialize};

use crate::types::DeckId;

/// The explicit action vocabulary every control source funnels through:
/// physical controller messages and direct UI gestures both become one of
/// these before touching deck or mixer state.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Action {
    TogglePlayPause { deck: DeckId },
    JumpToCue { deck: DeckId },
    SetCuePoint { deck: DeckId },
    Sync { deck: DeckId },
    TriggerHotCue { deck: DeckId, slot: u8 },
    JogTouch { deck: DeckId, touching: bool },
    JogRotate { deck: DeckId, delta: f32 },
    SetTempo { deck: DeckId, rate: f32 },
    SetPitch { deck: DeckId, semitones: f32 },
    SetVolume { deck: DeckId, volume: f32 },
    SetEqLow { deck: DeckId, gain_db: f32 },
    SetEqMid { deck: DeckId, gain_db: f32 },
    SetEqHigh { deck: DeckId, gain_db: f32 },
    SetCrossfader { position: f32 },
    SetMasterVolume { volume: f32 },
    ToggleHeadphoneCue { deck: DeckId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_serialize_with_tag() {
        let action = Action::TriggerHotCue {
            deck: DeckId::B,
            slot: 2,
        };
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"action\":\"triggerHotCue\""));
        let back: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }
}
