//! Glue between the playlist, the playback session and storage.
//!
//! Every user action from the event loop lands here. The player keeps the
//! persisted documents in step with what the user changed, and reacts to
//! the session finishing a track according to the repeat mode.

use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError};

use log::{debug, info, warn};

use crate::app::App;
use crate::audio::{AudioBackend, Phase, PlaybackSession, PlaybackState, SpectralSnapshot};
use crate::config::{ControlsSettings, LibrarySettings};
use crate::library::{
    EndAction, IdAllocator, ProbeReport, RepeatMode, TrackId, intake_paths, spawn_probe,
};
use crate::storage::{KeyValueStore, PlayerStore, PlaylistState, PreferencesUpdate};

pub struct Player<B: AudioBackend, S: KeyValueStore> {
    session: PlaybackSession<B>,
    store: PlayerStore<S>,
    library: LibrarySettings,
    controls: ControlsSettings,
    ids: IdAllocator,
    snapshots: Receiver<SpectralSnapshot>,
    probes: Vec<Receiver<(TrackId, ProbeReport)>>,
    last_phase: Phase,
}

impl<B: AudioBackend, S: KeyValueStore> Player<B, S> {
    pub fn new(
        session: PlaybackSession<B>,
        store: PlayerStore<S>,
        library: LibrarySettings,
        controls: ControlsSettings,
    ) -> Self {
        let snapshots = session.subscribe();
        let ids = IdAllocator::after(store.tracks().iter());
        let last_phase = session.phase();
        Self {
            session,
            store,
            library,
            controls,
            ids,
            snapshots,
            probes: Vec::new(),
            last_phase,
        }
    }

    pub fn session(&self) -> &PlaybackSession<B> {
        &self.session
    }

    pub fn store(&self) -> &PlayerStore<S> {
        &self.store
    }

    pub fn state(&self) -> &PlaybackState {
        self.session.state()
    }

    /// Import files and directories, then probe the new tracks in the background.
    pub fn import(&mut self, app: &mut App, paths: &[PathBuf]) {
        let report = intake_paths(paths, &self.library, &mut self.ids);
        let added = report.tracks.len();
        let jobs: Vec<_> = report
            .tracks
            .iter()
            .map(|t| (t.id, t.locator.clone()))
            .collect();

        let was_empty = app.playlist.is_empty();
        self.store.add_tracks(report.tracks.iter().cloned());
        app.playlist.extend(report.tracks);

        if !jobs.is_empty() {
            self.probe(jobs);
        }

        match (added, report.rejected.first()) {
            (0, Some(e)) => app.set_message(e.to_string()),
            (n, Some(_)) => app.set_message(format!(
                "added {n} track(s), rejected {}",
                report.rejected.len()
            )),
            (n, None) => app.set_message(format!("added {n} track(s)")),
        }
        info!("imported {added} track(s), {} rejected", report.rejected.len());

        if was_empty && added > 0 {
            app.follow_current();
            self.load_current(app, false);
        }
    }

    /// Back-fill durations of `jobs` on a worker thread.
    pub fn probe(&mut self, jobs: Vec<(TrackId, PathBuf)>) {
        match spawn_probe(jobs) {
            Ok(rx) => self.probes.push(rx),
            Err(e) => warn!("cannot start metadata prober: {e}"),
        }
    }

    /// Load the playlist's current track into the session, optionally playing it.
    pub fn load_current(&mut self, app: &mut App, play: bool) {
        let Some(track) = app.playlist.current().cloned() else {
            return;
        };
        app.clear_spectrum();
        self.store.set_current_track(Some(&track));
        self.persist_playlist_state(app);

        if let Err(e) = self.session.load(&track.locator) {
            app.set_message(e.to_string());
            return;
        }
        if play {
            self.play(app);
        }
    }

    fn play(&mut self, app: &mut App) {
        if let Err(e) = self.session.play() {
            app.set_message(e.to_string());
        }
    }

    /// Load and play the track under the cursor.
    pub fn play_selected(&mut self, app: &mut App) {
        if app.playlist.select_index(app.selected).is_some() {
            self.load_current(app, true);
        }
    }

    pub fn toggle_play_pause(&mut self, app: &mut App) {
        if !self.session.has_binding() {
            if app.playlist.current().is_some() {
                self.load_current(app, true);
            }
            return;
        }
        if let Err(e) = self.session.toggle_play_pause() {
            app.set_message(e.to_string());
        }
    }

    fn is_active(&self) -> bool {
        self.session.state().is_playing() || self.session.is_play_pending()
    }

    pub fn next_track(&mut self, app: &mut App) {
        let play = self.is_active();
        if app.playlist.next().is_some() {
            app.follow_current();
            self.load_current(app, play);
        }
    }

    pub fn previous_track(&mut self, app: &mut App) {
        let play = self.is_active();
        if app.playlist.previous().is_some() {
            app.follow_current();
            self.load_current(app, play);
        }
    }

    /// Seek by the configured step; `forward` picks the direction.
    pub fn skip(&mut self, forward: bool) {
        let step = self.controls.skip_seconds;
        self.session.skip(if forward { step } else { -step });
    }

    pub fn change_volume(&mut self, up: bool) {
        let step = self.controls.volume_step;
        let volume = self.session.state().volume + if up { step } else { -step };
        self.session.set_volume(volume);
        self.store.set_volume(self.session.state().volume);
    }

    pub fn toggle_mute(&mut self) {
        self.session.toggle_mute();
    }

    /// Remove the track under the cursor.
    pub fn delete_selected(&mut self, app: &mut App) {
        let Some(id) = app.selected_track().map(|t| t.id) else {
            return;
        };
        let Some(removal) = app.playlist.remove(id) else {
            return;
        };
        self.store.remove_track(id);
        app.clamp_selection();
        app.set_message(format!("removed {}", removal.track.name));
        debug!("removed track {id}");

        if removal.current_changed {
            if app.playlist.is_empty() {
                self.session.unload();
                app.clear_spectrum();
                self.store.set_current_track(None);
                self.persist_playlist_state(app);
            } else {
                self.load_current(app, false);
            }
        } else {
            self.persist_playlist_state(app);
        }
    }

    /// Drop every track from the playlist and from storage. Preferences stay.
    pub fn clear_library(&mut self, app: &mut App) {
        self.session.unload();
        app.clear_spectrum();
        app.playlist.clear();
        app.clamp_selection();
        self.store.clear_tracks();
        self.store.set_current_track(None);
        self.persist_playlist_state(app);
        app.set_message("library cleared");
        info!("library cleared");
    }

    pub fn toggle_shuffle(&mut self, app: &mut App) {
        let on = app.playlist.toggle_shuffle(&mut rand::rng());
        app.set_message(if on { "shuffle on" } else { "shuffle off" });
        self.persist_playlist_state(app);
    }

    pub fn cycle_repeat(&mut self, app: &mut App) -> RepeatMode {
        let mode = app.playlist.cycle_repeat();
        app.set_message(format!("repeat {}", mode.label()));
        self.persist_playlist_state(app);
        mode
    }

    pub fn toggle_visualizer(&mut self, app: &mut App) {
        app.show_visualizer = !app.show_visualizer;
        self.session.set_visualizer_enabled(app.show_visualizer);
        if !app.show_visualizer {
            app.clear_spectrum();
        } else if let Some(snapshot) = self.session.latest_snapshot() {
            // Paused tracks publish nothing; show the last frame of this binding.
            if snapshot.generation == self.session.generation() {
                app.update_spectrum(snapshot);
            }
        }
        self.store.update_preferences(PreferencesUpdate {
            show_visualizer: Some(app.show_visualizer),
            ..PreferencesUpdate::default()
        });
    }

    /// Flip the autoplay preference; applies from the next load on.
    pub fn toggle_autoplay(&mut self, app: &mut App) {
        let on = !self.store.preferences().auto_play;
        self.session.set_autoplay(on);
        self.store.update_preferences(PreferencesUpdate {
            auto_play: Some(on),
            ..PreferencesUpdate::default()
        });
        app.set_message(if on { "autoplay on" } else { "autoplay off" });
    }

    fn persist_playlist_state(&mut self, app: &App) {
        let state = PlaylistState {
            shuffle: app.playlist.shuffle(),
            repeat: app.playlist.repeat(),
            current_index: app.playlist.current_index().unwrap_or(0),
        };
        self.store.set_playlist_state(&state);
    }

    /// Apply everything that happened since the last call: session events,
    /// new snapshots, probe results and end of track.
    pub fn tick(&mut self, app: &mut App) {
        self.session.pump();

        while let Ok(snapshot) = self.snapshots.try_recv() {
            if app.show_visualizer {
                app.update_spectrum(snapshot);
            }
        }

        self.drain_probes(app);

        let phase = self.session.phase();
        if phase != self.last_phase {
            debug!("phase {} -> {}", self.last_phase.label(), phase.label());
            self.last_phase = phase;
            if phase == Phase::Ended {
                self.on_track_ended(app);
            }
        }
    }

    fn drain_probes(&mut self, app: &mut App) {
        let mut finished = Vec::new();
        for (i, rx) in self.probes.iter().enumerate() {
            loop {
                match rx.try_recv() {
                    Ok((id, report)) => {
                        if app.playlist.update(id, |t| report.apply_to(t)) {
                            self.store.update_track(id, |t| report.apply_to(t));
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        finished.push(i);
                        break;
                    }
                }
            }
        }
        for i in finished.into_iter().rev() {
            self.probes.remove(i);
        }
    }

    /// Release the binding and close the audio output.
    pub fn shutdown(self) {
        self.session.dispose();
    }

    /// True while background probes are still running.
    pub fn is_probing(&self) -> bool {
        !self.probes.is_empty()
    }

    fn on_track_ended(&mut self, app: &mut App) {
        match app.playlist.on_track_ended() {
            EndAction::Replay => self.play(app),
            EndAction::Advance(index) => {
                if app.playlist.select_index(index).is_some() {
                    app.follow_current();
                    self.load_current(app, true);
                }
            }
            EndAction::Stop => debug!("end of playlist"),
        }
    }
}
