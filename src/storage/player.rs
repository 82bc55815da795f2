//! Typed access to the player's persisted documents.
//!
//! Nothing here fails loudly: a read that cannot be completed logs a warning
//! and yields the documented default, and a write that cannot be completed
//! logs and returns `false`.

use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::StorageError;
use crate::library::{Track, TrackId};

use super::schema::{
    ALL_KEYS, CURRENT_TRACK, DEFAULT_VOLUME, PLAYLIST_STATE, PREFERENCES, PlaylistState,
    Preferences, PreferencesUpdate, TRACKS, VOLUME,
};
use super::store::KeyValueStore;

pub struct PlayerStore<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> PlayerStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[cfg(test)]
    pub fn inner(&self) -> &S {
        &self.store
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StorageError::Json {
                key: key.to_string(),
                source,
            })
    }

    fn write<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value).map_err(|source| StorageError::Json {
            key: key.to_string(),
            source,
        })?;
        self.store.set(key, &raw)
    }

    fn read_or<T: DeserializeOwned>(&self, key: &str, default: impl FnOnce() -> T) -> T {
        match self.read(key) {
            Ok(Some(v)) => v,
            Ok(None) => default(),
            Err(e) => {
                warn!("cannot load {key}: {e}");
                default()
            }
        }
    }

    fn write_logged<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> bool {
        match self.write(key, value) {
            Ok(()) => true,
            Err(e) => {
                warn!("cannot save {key}: {e}");
                false
            }
        }
    }

    pub fn tracks(&self) -> Vec<Track> {
        self.read_or(TRACKS, Vec::new)
    }

    pub fn save_tracks(&mut self, tracks: &[Track]) -> bool {
        self.write_logged(TRACKS, tracks)
    }

    /// Append `added` to the stored tracks in one write.
    pub fn add_tracks(&mut self, added: impl IntoIterator<Item = Track>) -> bool {
        let mut tracks = self.tracks();
        tracks.extend(added);
        self.save_tracks(&tracks)
    }

    pub fn remove_track(&mut self, id: TrackId) -> bool {
        let mut tracks = self.tracks();
        tracks.retain(|t| t.id != id);
        self.save_tracks(&tracks)
    }

    /// Apply `update` to the stored track with `id` and return the result.
    pub fn update_track(&mut self, id: TrackId, update: impl FnOnce(&mut Track)) -> Option<Track> {
        let mut tracks = self.tracks();
        let track = tracks.iter_mut().find(|t| t.id == id)?;
        update(track);
        let updated = track.clone();
        self.save_tracks(&tracks).then_some(updated)
    }

    pub fn clear_tracks(&mut self) -> bool {
        self.remove_logged(TRACKS)
    }

    pub fn current_track(&self) -> Option<Track> {
        self.read_or(CURRENT_TRACK, || None)
    }

    pub fn set_current_track(&mut self, track: Option<&Track>) -> bool {
        self.write_logged(CURRENT_TRACK, &track)
    }

    pub fn volume(&self) -> f32 {
        let v: f32 = self.read_or(VOLUME, || DEFAULT_VOLUME);
        if v.is_finite() {
            v.clamp(0.0, 1.0)
        } else {
            DEFAULT_VOLUME
        }
    }

    pub fn set_volume(&mut self, volume: f32) -> bool {
        self.write_logged(VOLUME, &volume)
    }

    pub fn playlist_state(&self) -> PlaylistState {
        self.read_or(PLAYLIST_STATE, PlaylistState::default)
    }

    pub fn set_playlist_state(&mut self, state: &PlaylistState) -> bool {
        self.write_logged(PLAYLIST_STATE, state)
    }

    pub fn preferences(&self) -> Preferences {
        self.read_or(PREFERENCES, Preferences::default)
    }

    /// Merge `update` into the stored preferences and save them.
    pub fn update_preferences(&mut self, update: PreferencesUpdate) -> Option<Preferences> {
        let prefs = self.preferences().merged(update);
        self.write_logged(PREFERENCES, &prefs).then_some(prefs)
    }

    /// Seed every absent key with its default.
    pub fn initialize(&mut self) -> bool {
        let mut ok = true;
        for key in [TRACKS, PREFERENCES, PLAYLIST_STATE, VOLUME] {
            match self.store.get(key) {
                Ok(Some(_)) => {}
                Ok(None) => {
                    ok &= match key {
                        TRACKS => self.save_tracks(&[]),
                        PREFERENCES => self.write_logged(PREFERENCES, &Preferences::default()),
                        PLAYLIST_STATE => self.set_playlist_state(&PlaylistState::default()),
                        _ => self.set_volume(DEFAULT_VOLUME),
                    };
                }
                Err(e) => {
                    warn!("cannot initialize {key}: {e}");
                    ok = false;
                }
            }
        }
        ok
    }

    /// Every stored document under its key name.
    pub fn export(&self) -> Option<Value> {
        let mut data = Map::new();
        for key in ALL_KEYS {
            match self.read::<Value>(key) {
                Ok(Some(v)) => {
                    data.insert(key.to_string(), v);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("cannot export: {e}");
                    return None;
                }
            }
        }
        Some(Value::Object(data))
    }

    /// Store every known key of an exported object. Unknown keys are skipped.
    pub fn import(&mut self, data: &Value) -> bool {
        let Some(object) = data.as_object() else {
            warn!("cannot import: expected a JSON object");
            return false;
        };
        let mut ok = true;
        for (key, value) in object {
            match ALL_KEYS.iter().find(|k| **k == key.as_str()) {
                Some(known) => ok &= self.write_logged(known, value),
                None => debug!("import: skipping unknown key {key}"),
            }
        }
        ok
    }

    pub fn clear_all(&mut self) -> bool {
        let mut ok = true;
        for key in ALL_KEYS {
            ok &= self.remove_logged(key);
        }
        ok
    }

    /// Total bytes held by the store.
    pub fn usage(&self) -> u64 {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("cannot compute storage usage: {e}");
                return 0;
            }
        };
        keys.iter()
            .filter_map(|k| self.store.get(k).ok().flatten())
            .map(|v| v.len() as u64)
            .sum()
    }

    fn remove_logged(&mut self, key: &str) -> bool {
        match self.store.remove(key) {
            Ok(()) => true,
            Err(e) => {
                warn!("cannot remove {key}: {e}");
                false
            }
        }
    }
}
