pub mod actions;
pub mod midi;
pub mod store;

pub use actions::Action;
pub use midi::{ControlTarget, MidiAddress, MidiBinder, MidiMessage};
pub use store::MappingStore;
