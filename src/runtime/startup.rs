//! Rebuild the front-end state from what was persisted last time.

use log::{debug, info};

use crate::app::App;
use crate::audio::AudioBackend;
use crate::library::{Playlist, TrackId};
use crate::runtime::player::Player;
use crate::storage::{KeyValueStore, PlayerStore};

/// Build the playlist from stored tracks, playlist state and current track.
pub fn restore_playlist<S: KeyValueStore>(store: &PlayerStore<S>) -> Playlist {
    let mut playlist = Playlist::new(store.tracks());
    let state = store.playlist_state();
    playlist.set_repeat(state.repeat);

    // The stored current track wins over the stored index; the index is a fallback
    // for documents written without a current track.
    let current: Option<TrackId> = store.current_track().map(|t| t.id);
    let restored = match current {
        Some(id) => playlist.select(id).is_some(),
        None => false,
    };
    if !restored && !playlist.is_empty() {
        let index = state.current_index.min(playlist.len() - 1);
        playlist.select_index(index);
    }
    if state.shuffle {
        playlist.set_shuffle(true, &mut rand::rng());
    }
    debug!(
        "restored {} track(s), current {:?}",
        playlist.len(),
        playlist.current_index()
    );
    playlist
}

/// Load (but do not play) the restored current track, and queue probes for
/// tracks whose duration is still unknown.
pub fn resume_session<B: AudioBackend, S: KeyValueStore>(app: &mut App, player: &mut Player<B, S>) {
    let jobs: Vec<_> = app
        .playlist
        .tracks()
        .iter()
        .filter(|t| !t.has_duration())
        .map(|t| (t.id, t.locator.clone()))
        .collect();
    if !jobs.is_empty() {
        info!("probing {} track(s) with unknown duration", jobs.len());
        player.probe(jobs);
    }

    if app.playlist.current().is_some() {
        app.follow_current();
        player.load_current(app, false);
    }
}
