//! Persistence: a flat key -> JSON document store and the player's typed view of it.

mod player;
mod schema;
mod store;

pub use player::PlayerStore;
pub use schema::{DEFAULT_VOLUME, PlaylistState, Preferences, PreferencesUpdate};
pub use store::{JsonDirStore, KeyValueStore, MemoryStore};
