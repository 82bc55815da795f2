use serde::{Deserialize, Serialize};

use crate::library::RepeatMode;

pub const TRACKS: &str = "tracks";
pub const CURRENT_TRACK: &str = "current-track";
pub const VOLUME: &str = "volume";
pub const PLAYLIST_STATE: &str = "playlist-state";
pub const PREFERENCES: &str = "preferences";

/// Every key the player owns, in export order.
pub const ALL_KEYS: [&str; 5] = [TRACKS, CURRENT_TRACK, VOLUME, PLAYLIST_STATE, PREFERENCES];

pub const DEFAULT_VOLUME: f32 = 0.7;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlaylistState {
    pub shuffle: bool,
    pub repeat: RepeatMode,
    pub current_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    pub theme: String,
    pub visualizer_type: String,
    pub show_visualizer: bool,
    pub auto_play: bool,
    /// Stored for compatibility; playback does not crossfade.
    pub crossfade: f64,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: "nature".to_string(),
            visualizer_type: "bars".to_string(),
            show_visualizer: true,
            auto_play: false,
            crossfade: 0.0,
        }
    }
}

/// A partial preferences change; `None` fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreferencesUpdate {
    pub theme: Option<String>,
    pub visualizer_type: Option<String>,
    pub show_visualizer: Option<bool>,
    pub auto_play: Option<bool>,
    pub crossfade: Option<f64>,
}

impl Preferences {
    pub fn merged(mut self, update: PreferencesUpdate) -> Self {
        if let Some(v) = update.theme {
            self.theme = v;
        }
        if let Some(v) = update.visualizer_type {
            self.visualizer_type = v;
        }
        if let Some(v) = update.show_visualizer {
            self.show_visualizer = v;
        }
        if let Some(v) = update.auto_play {
            self.auto_play = v;
        }
        if let Some(v) = update.crossfade {
            self.crossfade = v.max(0.0);
        }
        self
    }
}
