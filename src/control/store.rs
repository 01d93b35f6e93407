use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::midi::{ControlTarget, MidiAddress};
use crate::errors::ControlError;

/// On-disk home of learned controller mappings: a flat
/// address-key -> slot-label dictionary in the platform config directory.
/// Nothing else is persisted.
pub struct MappingStore {
    path: PathBuf,
}

impl MappingStore {
    pub fn new(path: PathBuf) -> Self {
        MappingStore { path }
    }

    /// Store under the platform config directory, or beside the binary
    /// when the platform offers none.
    pub fn default_location() -> Self {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        MappingStore::new(base.join("crossdeck").join("midi_mappings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the mapping table. Best-effort: a missing file yields an
    /// empty table, a malformed one is reported.
    pub fn load(&self) -> Result<HashMap<MidiAddress, ControlTarget>, ControlError> {
        if !self.path.exists() {
            log::info!(
                "Mapping store: no file at '{}', starting empty",
                self.path.display()
            );
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|e| ControlError::StoreIo {
            path: self.path.display().to_string(),
            source: e,
        })?;
        let flat: HashMap<String, String> =
            serde_json::from_str(&contents).map_err(|e| ControlError::StoreFormat {
                path: self.path.display().to_string(),
                source: e,
            })?;

        let mut table = HashMap::with_capacity(flat.len());
        for (key, label) in flat {
            match (
                MidiAddress::from_key(&key),
                ControlTarget::from_slot_label(&label),
            ) {
                (Some(address), Some(target)) => {
                    table.insert(address, target);
                }
                _ => {
                    log::warn!(
                        "Mapping store: skipping unrecognised entry '{}' -> '{}'",
                        key,
                        label
                    );
                }
            }
        }
        log::info!(
            "Mapping store: loaded {} mappings from '{}'",
            table.len(),
            self.path.display()
        );
        Ok(table)
    }

    /// Persist the mapping table as the flat dictionary.
    pub fn save(&self, table: &HashMap<MidiAddress, ControlTarget>) -> Result<(), ControlError> {
        let flat: HashMap<String, String> = table
            .iter()
            .map(|(address, target)| (address.as_key(), target.slot_label()))
            .collect();
        let contents =
            serde_json::to_string_pretty(&flat).map_err(|e| ControlError::StoreFormat {
                path: self.path.display().to_string(),
                source: e,
            })?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ControlError::StoreIo {
                path: self.path.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(&self.path, contents).map_err(|e| ControlError::StoreIo {
            path: self.path.display().to_string(),
            source: e,
        })?;
        log::info!(
            "Mapping store: saved {} mappings to '{}'",
            table.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeckId;

    fn temp_store(name: &str) -> MappingStore {
        let mut path = std::env::temp_dir();
        path.push(format!("crossdeck-test-{}-{}.json", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        MappingStore::new(path)
    }

    #[test]
    fn missing_file_loads_empty() {
        let store = temp_store("missing");
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn mappings_round_trip_through_disk() {
        let store = temp_store("roundtrip");
        let mut table = HashMap::new();
        table.insert(
            MidiAddress::Note {
                channel: 0,
                note: 42,
            },
            ControlTarget::TogglePlayPause { deck: DeckId::A },
        );
        table.insert(
            MidiAddress::Bend { channel: 1 },
            ControlTarget::Tempo { deck: DeckId::B },
        );
        store.save(&table).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, table);
        let _ = std::fs::remove_file(store.path());
    }

    #[test]
    fn malformed_file_is_a_format_error() {
        let store = temp_store("malformed");
        std::fs::write(store.path(), "not json").unwrap();
        assert!(matches!(
            store.load(),
            Err(ControlError::StoreFormat { .. })
        ));
        let _ = std::fs::remove_file(store.path());
    }

    #[test]
    fn unknown_entries_are_skipped_not_fatal() {
        let store = temp_store("unknown");
        std::fs::write(
            store.path(),
            r#"{"note/0/1": "deckA.playPause", "gibberish": "nope"}"#,
        )
        .unwrap();
        let table = store.load().unwrap();
        assert_eq!(table.len(), 1);
        let _ = std::fs::remove_file(store.path());
    }
}
