//! Playlist navigation over the library's tracks.
//!
//! `Playlist` owns the track list and which track is current. Next/previous
//! wrap around; with shuffle on they walk a random permutation instead of
//! list order. The repeat mode decides what happens when a track ends.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::model::{Track, TrackId};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    None,
    One,
    All,
}

impl RepeatMode {
    /// Cycle `None -> All -> One -> None`.
    pub fn cycle(self) -> Self {
        match self {
            RepeatMode::None => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RepeatMode::None => "off",
            RepeatMode::One => "one",
            RepeatMode::All => "all",
        }
    }
}

/// What to do after the current track finished.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EndAction {
    /// Play the same track again.
    Replay,
    /// Move to the track at this index and play it.
    Advance(usize),
    /// End of the playlist.
    Stop,
}

#[derive(Debug, Clone)]
pub struct Removal {
    pub track: Track,
    /// The removed track was the current one, so a different track is current now.
    pub current_changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Playlist {
    tracks: Vec<Track>,
    current: Option<usize>,
    shuffle: bool,
    /// Play order while shuffled; a permutation of track indices.
    order: Vec<usize>,
    repeat: RepeatMode,
}

impl Playlist {
    pub fn new(tracks: Vec<Track>) -> Self {
        let current = (!tracks.is_empty()).then_some(0);
        Self {
            tracks,
            current,
            ..Self::default()
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.and_then(|i| self.tracks.get(i))
    }

    pub fn index_of(&self, id: TrackId) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == id)
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    pub fn set_repeat(&mut self, repeat: RepeatMode) {
        self.repeat = repeat;
    }

    pub fn cycle_repeat(&mut self) -> RepeatMode {
        self.repeat = self.repeat.cycle();
        self.repeat
    }

    /// Append tracks; the first track added to an empty playlist becomes current.
    pub fn extend(&mut self, tracks: impl IntoIterator<Item = Track>) {
        let start = self.tracks.len();
        self.tracks.extend(tracks);
        self.order.extend(start..self.tracks.len());
        if self.current.is_none() && !self.tracks.is_empty() {
            self.current = Some(0);
        }
    }

    /// Make the track with `id` current. Unknown ids leave the selection alone.
    pub fn select(&mut self, id: TrackId) -> Option<&Track> {
        let index = self.index_of(id)?;
        self.current = Some(index);
        self.tracks.get(index)
    }

    pub fn select_index(&mut self, index: usize) -> Option<&Track> {
        if index >= self.tracks.len() {
            return None;
        }
        self.current = Some(index);
        self.tracks.get(index)
    }

    /// Remove the track with `id`, keeping the current index pointing at the same
    /// track when possible. Removing the current track makes the first track current.
    pub fn remove(&mut self, id: TrackId) -> Option<Removal> {
        let index = self.index_of(id)?;
        let track = self.tracks.remove(index);

        self.order.retain(|&i| i != index);
        for i in &mut self.order {
            if *i > index {
                *i -= 1;
            }
        }

        let mut current_changed = false;
        self.current = match self.current {
            _ if self.tracks.is_empty() => {
                current_changed = true;
                None
            }
            Some(c) if c == index => {
                current_changed = true;
                Some(0)
            }
            Some(c) if index < c => Some(c - 1),
            other => other,
        };

        Some(Removal {
            track,
            current_changed,
        })
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.order.clear();
        self.current = None;
    }

    /// Apply `update` to the track with `id`. Returns false for unknown ids.
    pub fn update(&mut self, id: TrackId, update: impl FnOnce(&mut Track)) -> bool {
        match self.tracks.iter_mut().find(|t| t.id == id) {
            Some(track) => {
                update(track);
                true
            }
            None => false,
        }
    }

    /// Track indices in play order.
    pub fn play_order(&self) -> Vec<usize> {
        if self.shuffle {
            self.order.clone()
        } else {
            (0..self.tracks.len()).collect()
        }
    }

    fn position_in_order(&self, order: &[usize]) -> Option<usize> {
        let current = self.current?;
        order.iter().position(|&i| i == current)
    }

    /// Index after the current one in play order, wrapping around.
    pub fn next_index(&self) -> Option<usize> {
        let order = self.play_order();
        if order.is_empty() {
            return None;
        }
        match self.position_in_order(&order) {
            Some(p) => Some(order[(p + 1) % order.len()]),
            None => Some(order[0]),
        }
    }

    /// Index before the current one in play order, wrapping around.
    pub fn previous_index(&self) -> Option<usize> {
        let order = self.play_order();
        if order.is_empty() {
            return None;
        }
        match self.position_in_order(&order) {
            Some(0) | None => Some(order[order.len() - 1]),
            Some(p) => Some(order[p - 1]),
        }
    }

    pub fn next(&mut self) -> Option<&Track> {
        let index = self.next_index()?;
        self.select_index(index)
    }

    pub fn previous(&mut self) -> Option<&Track> {
        let index = self.previous_index()?;
        self.select_index(index)
    }

    /// Decide what follows the current track when it ends.
    pub fn on_track_ended(&self) -> EndAction {
        let order = self.play_order();
        let Some(pos) = self.position_in_order(&order) else {
            return EndAction::Stop;
        };
        match self.repeat {
            RepeatMode::One => EndAction::Replay,
            RepeatMode::All => EndAction::Advance(order[(pos + 1) % order.len()]),
            RepeatMode::None if pos + 1 < order.len() => EndAction::Advance(order[pos + 1]),
            RepeatMode::None => EndAction::Stop,
        }
    }

    /// Turn shuffle on or off. Turning it on draws a fresh permutation with the
    /// current track first.
    pub fn set_shuffle<R: Rng + ?Sized>(&mut self, shuffle: bool, rng: &mut R) {
        self.shuffle = shuffle;
        if !shuffle {
            return;
        }
        let mut order: Vec<usize> = (0..self.tracks.len()).collect();
        order.shuffle(rng);
        if let Some(p) = self
            .current
            .and_then(|current| order.iter().position(|&i| i == current))
        {
            order.swap(0, p);
        }
        self.order = order;
    }

    pub fn toggle_shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        self.set_shuffle(!self.shuffle, rng);
        self.shuffle
    }
}
