//! Application model: the playlist plus everything the terminal UI shows
//! that is not playback state.

use crate::audio::SpectralSnapshot;
use crate::library::{Playlist, Track};

/// What key presses currently edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InputMode {
    #[default]
    Normal,
    /// Typing a file or directory path to import.
    Import(String),
}

/// The main application model.
pub struct App {
    pub playlist: Playlist,
    /// Cursor position in the track list.
    pub selected: usize,
    pub input: InputMode,
    /// One-line feedback shown in the status box (intake rejections and the like).
    pub message: Option<String>,
    pub show_visualizer: bool,
    /// Bins of the latest snapshot of the current binding.
    spectrum: Vec<u8>,
    spectrum_generation: u64,
}

impl App {
    pub fn new(playlist: Playlist) -> Self {
        let selected = playlist.current_index().unwrap_or(0);
        Self {
            playlist,
            selected,
            input: InputMode::Normal,
            message: None,
            show_visualizer: true,
            spectrum: Vec::new(),
            spectrum_generation: 0,
        }
    }

    pub fn has_tracks(&self) -> bool {
        !self.playlist.is_empty()
    }

    pub fn selected_track(&self) -> Option<&Track> {
        self.playlist.tracks().get(self.selected)
    }

    /// Move the cursor down, wrapping to the top.
    pub fn next(&mut self) {
        let len = self.playlist.len();
        if len > 0 {
            self.selected = (self.selected + 1) % len;
        }
    }

    /// Move the cursor up, wrapping to the bottom.
    pub fn prev(&mut self) {
        let len = self.playlist.len();
        if len > 0 {
            self.selected = (self.selected + len - 1) % len;
        }
    }

    pub fn select_first(&mut self) {
        self.selected = 0;
    }

    pub fn select_last(&mut self) {
        self.selected = self.playlist.len().saturating_sub(1);
    }

    /// Put the cursor on the current track.
    pub fn follow_current(&mut self) {
        if let Some(i) = self.playlist.current_index() {
            self.selected = i;
        }
    }

    /// Keep the cursor inside the list after it shrank.
    pub fn clamp_selection(&mut self) {
        let len = self.playlist.len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub fn clear_message(&mut self) {
        self.message = None;
    }

    pub fn begin_import(&mut self) {
        self.input = InputMode::Import(String::new());
    }

    pub fn cancel_input(&mut self) {
        self.input = InputMode::Normal;
    }

    pub fn push_input_char(&mut self, c: char) {
        if let InputMode::Import(buf) = &mut self.input {
            buf.push(c);
        }
    }

    pub fn pop_input_char(&mut self) {
        if let InputMode::Import(buf) = &mut self.input {
            buf.pop();
        }
    }

    /// Leave input mode, returning the trimmed text if there was any.
    pub fn take_input(&mut self) -> Option<String> {
        match std::mem::take(&mut self.input) {
            InputMode::Import(buf) => {
                let trimmed = buf.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            InputMode::Normal => None,
        }
    }

    /// Keep the newest snapshot. Snapshots from an older binding are dropped.
    pub fn update_spectrum(&mut self, snapshot: SpectralSnapshot) {
        if snapshot.generation < self.spectrum_generation {
            return;
        }
        self.spectrum_generation = snapshot.generation;
        self.spectrum = snapshot.bins;
    }

    pub fn clear_spectrum(&mut self) {
        self.spectrum.clear();
    }

    pub fn spectrum(&self) -> &[u8] {
        &self.spectrum
    }
}
