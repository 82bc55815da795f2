//! Playback session: the one live audio pipeline and its transport state machine.
//!
//! A session owns at most one resource binding (media handle + analyzer) at a
//! time. `load` tears the previous binding down completely before opening
//! the next one and bumps the binding generation; every resource event and
//! every `play()` completion carries the generation it belongs to, so late
//! arrivals from a discarded binding are dropped in `pump` instead of
//! resurrecting it.
//!
//! Teardown order: stop the visualizer feed, detach the event stream, release
//! the analyzer, release the media resource.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::AnalyzerSettings;
use crate::error::PlaybackError;

use super::analyzer::{SpectralAnalyzer, SpectralSnapshot};
use super::backend::{AudioBackend, EventEmitter};
use super::feed::{FeedGuard, FeedHandle, SnapshotHub, VisualizerFeed};
use super::types::{
    BindingEvent, ErrorKind, Phase, PlayRequest, PlaybackState, ResourceEvent, Visualization,
};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub analyzer: AnalyzerSettings,
    /// Delay between visualizer frames.
    pub frame_interval: Duration,
    /// Publish snapshots while playing.
    pub visualizer_enabled: bool,
    /// Start playing as soon as a loaded track reports its metadata.
    pub autoplay: bool,
    pub initial_volume: f32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            analyzer: AnalyzerSettings::default(),
            frame_interval: Duration::from_millis(16),
            visualizer_enabled: true,
            autoplay: false,
            initial_volume: 1.0,
        }
    }
}

struct Binding<M> {
    generation: u64,
    locator: PathBuf,
    media: M,
    analyzer: Option<SpectralAnalyzer>,
}

pub struct PlaybackSession<B: AudioBackend> {
    backend: B,
    options: SessionOptions,
    state: PlaybackState,
    binding: Option<Binding<B::Media>>,
    generation: u64,
    next_request: u64,
    pending_play: Option<PlayRequest>,
    events_tx: Sender<BindingEvent>,
    events_rx: Receiver<BindingEvent>,
    feed: Option<FeedHandle>,
    guard: FeedGuard,
    hub: SnapshotHub,
}

/// Clamp a requested position to `[0, duration]`, or `[0, ∞)` while the duration is unknown.
pub fn clamp_position(t: f64, duration: f64) -> f64 {
    if t.is_nan() {
        return 0.0;
    }
    let t = t.max(0.0);
    if duration > 0.0 { t.min(duration) } else { t }
}

impl<B: AudioBackend> PlaybackSession<B> {
    pub fn new(backend: B, options: SessionOptions) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        let state = PlaybackState {
            volume: clamp_volume(options.initial_volume).unwrap_or(1.0),
            ..PlaybackState::default()
        };
        Self {
            backend,
            options,
            state,
            binding: None,
            generation: 0,
            next_request: 0,
            pending_play: None,
            events_tx,
            events_rx,
            feed: None,
            guard: FeedGuard::default(),
            hub: SnapshotHub::default(),
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Generation of the most recent `load()`; 0 before the first one.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Locator of the bound track, if any.
    #[cfg(test)]
    pub fn locator(&self) -> Option<&Path> {
        self.binding.as_ref().map(|b| b.locator.as_path())
    }

    pub fn has_binding(&self) -> bool {
        self.binding.is_some()
    }

    /// `None` while nothing is bound.
    pub fn visualization(&self) -> Option<Visualization> {
        let binding = self.binding.as_ref()?;
        Some(match (&binding.analyzer, self.options.visualizer_enabled) {
            (None, _) => Visualization::Unsupported,
            (Some(_), true) => Visualization::Active,
            (Some(_), false) => Visualization::Disabled,
        })
    }

    #[cfg(test)]
    pub fn is_feed_running(&self) -> bool {
        self.feed.as_ref().is_some_and(|f| !f.is_finished())
    }

    pub fn is_play_pending(&self) -> bool {
        self.pending_play.is_some()
    }

    /// Receive every snapshot published by the visualizer feed from now on.
    pub fn subscribe(&self) -> Receiver<SpectralSnapshot> {
        self.hub.subscribe()
    }

    pub fn latest_snapshot(&self) -> Option<SpectralSnapshot> {
        self.hub.latest()
    }

    #[cfg(test)]
    pub fn snapshot_hub(&self) -> &SnapshotHub {
        &self.hub
    }

    #[cfg(test)]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Bind `locator`, replacing whatever was loaded before.
    pub fn load(&mut self, locator: impl AsRef<Path>) -> Result<(), PlaybackError> {
        let locator = locator.as_ref().to_path_buf();
        self.teardown();

        self.generation += 1;
        let generation = self.generation;
        self.state.phase = Phase::Loading;
        self.state.current_time = 0.0;
        self.state.duration = 0.0;
        self.state.last_error = None;
        info!("loading {} (binding {generation})", locator.display());

        let emitter = EventEmitter::new(generation, self.events_tx.clone());
        let mut media = match self.backend.open(&locator, emitter) {
            Ok(media) => media,
            Err(e) => {
                warn!("load of {} failed: {e}", locator.display());
                self.fail(ErrorKind::LoadFailed);
                return Err(PlaybackError::LoadFailed {
                    locator,
                    reason: e.0,
                });
            }
        };

        let analyzer =
            match self
                .backend
                .attach_analyzer(&mut media, &self.options.analyzer, generation)
            {
                Ok(analyzer) => Some(analyzer),
                Err(e) => {
                    let err = PlaybackError::VisualizationUnsupported(e.0);
                    warn!("{err}; continuing without visualization");
                    None
                }
            };

        self.backend.set_volume(&mut media, self.effective_volume());
        self.binding = Some(Binding {
            generation,
            locator,
            media,
            analyzer,
        });
        self.guard.set_live_generation(generation);
        Ok(())
    }

    /// Ask the host to start playback.
    ///
    /// Returns once the request is issued; the phase becomes `Playing` when
    /// `pump` sees the host confirm it. Calling `play` while already playing,
    /// or while a request is in flight, does nothing.
    pub fn play(&mut self) -> Result<(), PlaybackError> {
        if self.state.phase == Phase::Playing || self.pending_play.is_some() {
            return Ok(());
        }
        let Some(binding) = self.binding.as_mut() else {
            return Err(PlaybackError::NotLoaded);
        };

        if let Err(e) = self.backend.resume() {
            warn!("audio output unavailable: {e}");
            self.state.phase = Phase::Errored;
            self.state.last_error = Some(ErrorKind::PlaybackDenied);
            return Err(PlaybackError::PlaybackDenied(e.0));
        }

        self.next_request += 1;
        let request = PlayRequest {
            generation: binding.generation,
            id: self.next_request,
        };
        self.pending_play = Some(request);
        debug!("play requested ({request:?})");
        self.backend.start(&mut binding.media, request);
        Ok(())
    }

    /// Pause playback. Cancels a `play()` that has not completed yet.
    pub fn pause(&mut self) {
        let cancelled = self.pending_play.take();
        if self.state.phase != Phase::Playing && cancelled.is_none() {
            return;
        }

        self.guard.set_playing(false);
        self.stop_feed();
        if let Some(binding) = self.binding.as_mut() {
            self.backend.pause(&mut binding.media);
        }
        self.state.phase = Phase::Paused;
        debug!("paused at {:.2}s", self.state.current_time);
    }

    pub fn toggle_play_pause(&mut self) -> Result<(), PlaybackError> {
        if self.state.phase == Phase::Playing || self.pending_play.is_some() {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Jump to `t` seconds, clamped to the track. Position updates immediately.
    pub fn seek(&mut self, t: f64) {
        if matches!(self.state.phase, Phase::Idle | Phase::Errored) {
            return;
        }
        let Some(binding) = self.binding.as_mut() else {
            return;
        };
        let target = clamp_position(t, self.state.duration);
        self.state.current_time = target;
        self.backend.seek(&mut binding.media, target);
    }

    /// Seek relative to the current position.
    pub fn skip(&mut self, seconds: f64) {
        self.seek(self.state.current_time + seconds);
    }

    /// Set the volume, clamped to `[0, 1]`. NaN is ignored.
    pub fn set_volume(&mut self, volume: f32) {
        let Some(volume) = clamp_volume(volume) else {
            return;
        };
        self.state.volume = volume;
        self.apply_volume();
    }

    pub fn toggle_mute(&mut self) {
        self.state.muted = !self.state.muted;
        self.apply_volume();
    }

    /// Turn snapshot publication on or off without touching playback.
    pub fn set_visualizer_enabled(&mut self, enabled: bool) {
        self.options.visualizer_enabled = enabled;
        if !enabled {
            self.stop_feed();
        } else if self.state.phase == Phase::Playing {
            self.start_feed();
        }
    }

    pub fn set_autoplay(&mut self, autoplay: bool) {
        self.options.autoplay = autoplay;
    }

    /// Release the binding and return to `Idle`.
    pub fn unload(&mut self) {
        self.teardown();
        self.state = PlaybackState {
            volume: self.state.volume,
            muted: self.state.muted,
            ..PlaybackState::default()
        };
        info!("session unloaded");
    }

    /// Apply queued resource events in emission order. Events from bindings
    /// other than the current one are discarded. Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(BindingEvent { generation, event }) = self.events_rx.try_recv() {
            let current = self.binding.as_ref().map(|b| b.generation);
            if current != Some(generation) {
                debug!("dropping {event:?} from stale binding {generation}");
                continue;
            }
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Tear everything down and close the output context.
    pub fn dispose(self) {
        drop(self);
    }

    fn apply(&mut self, event: ResourceEvent) {
        match event {
            ResourceEvent::MetadataLoaded { duration } => {
                self.state.duration = if duration.is_finite() && duration > 0.0 {
                    duration
                } else {
                    0.0
                };
                self.state.current_time =
                    clamp_position(self.state.current_time, self.state.duration);
                if self.options.autoplay && self.state.phase == Phase::Loading {
                    if let Err(e) = self.play() {
                        warn!("autoplay failed: {e}");
                    }
                }
            }
            ResourceEvent::TimeUpdate(t) => {
                self.state.current_time = clamp_position(t, self.state.duration);
            }
            ResourceEvent::PlayResolved { request, outcome } => {
                if self.pending_play != Some(request) {
                    debug!("ignoring late completion of {request:?}");
                    return;
                }
                self.pending_play = None;
                match outcome {
                    Ok(()) => {
                        self.state.phase = Phase::Playing;
                        self.state.last_error = None;
                        self.guard.set_playing(true);
                        self.start_feed();
                        debug!("playing");
                    }
                    Err(reason) => {
                        warn!("play rejected: {reason}");
                        self.state.phase = Phase::Errored;
                        self.state.last_error = Some(ErrorKind::PlaybackDenied);
                    }
                }
            }
            ResourceEvent::Ended => {
                self.pending_play = None;
                self.guard.set_playing(false);
                self.stop_feed();
                self.state.phase = Phase::Ended;
                self.state.current_time = 0.0;
                debug!("ended");
            }
            ResourceEvent::Error(reason) => {
                warn!("resource error: {reason}");
                self.teardown();
                self.fail(ErrorKind::LoadFailed);
            }
        }
    }

    fn fail(&mut self, kind: ErrorKind) {
        self.state.phase = Phase::Errored;
        self.state.last_error = Some(kind);
    }

    fn effective_volume(&self) -> f32 {
        if self.state.muted {
            0.0
        } else {
            self.state.volume
        }
    }

    fn apply_volume(&mut self) {
        let volume = self.effective_volume();
        if let Some(binding) = self.binding.as_mut() {
            self.backend.set_volume(&mut binding.media, volume);
        }
    }

    fn start_feed(&mut self) {
        self.stop_feed();
        if !self.options.visualizer_enabled {
            return;
        }
        let Some(analyzer) = self.binding.as_ref().and_then(|b| b.analyzer.clone()) else {
            return;
        };
        let feed = VisualizerFeed::new(analyzer, self.guard.clone(), self.hub.clone());
        match feed.start(self.options.frame_interval) {
            Ok(handle) => self.feed = Some(handle),
            Err(e) => warn!("cannot start visualizer feed: {e}"),
        }
    }

    fn stop_feed(&mut self) {
        if let Some(feed) = self.feed.take() {
            feed.stop();
        }
    }

    fn teardown(&mut self) {
        self.guard.set_playing(false);
        self.guard.set_live_generation(0);
        self.stop_feed();
        self.pending_play = None;

        if let Some(binding) = self.binding.take() {
            // Whatever the old binding queued is stale now.
            while self.events_rx.try_recv().is_ok() {}
            if let Some(analyzer) = binding.analyzer.as_ref() {
                analyzer.release();
            }
            self.backend.release(binding.media);
            debug!(
                "released binding {} ({} snapshots published so far)",
                binding.generation,
                self.hub.published()
            );
        }
        self.hub.clear();
    }
}

impl<B: AudioBackend> Drop for PlaybackSession<B> {
    fn drop(&mut self) {
        self.teardown();
        self.backend.close();
    }
}

fn clamp_volume(volume: f32) -> Option<f32> {
    if volume.is_nan() {
        None
    } else {
        Some(volume.clamp(0.0, 1.0))
    }
}
