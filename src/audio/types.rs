//! Audio-related small types.
//!
//! This module defines the observable playback state of a session and the
//! events a host resource sends back to the session that owns it.

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    /// Nothing is loaded.
    #[default]
    Idle,
    /// A track is bound but has not started playing.
    Loading,
    /// The resource is advancing time.
    Playing,
    Paused,
    /// The resource reached its end; position is back at zero.
    Ended,
    /// Loading or starting failed; see `PlaybackState::last_error`.
    Errored,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::Loading => "Loading",
            Phase::Playing => "Playing",
            Phase::Paused => "Paused",
            Phase::Ended => "Ended",
            Phase::Errored => "Error",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The resource could not be opened or decoded.
    LoadFailed,
    /// The host refused to start playback, or the resource was not ready.
    PlaybackDenied,
}

impl ErrorKind {
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::LoadFailed => "Failed to load audio file",
            ErrorKind::PlaybackDenied => "Failed to play audio",
        }
    }
}

/// Whether the current binding produces spectral snapshots.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Visualization {
    Active,
    /// An analyzer exists but the user turned the visualizer off.
    Disabled,
    /// The host could not build an analyzer; playback is unaffected.
    Unsupported,
}

#[derive(Debug, Clone, PartialEq)]
/// Runtime playback information shared with the UI.
pub struct PlaybackState {
    pub phase: Phase,
    /// Seconds from the start of the track.
    pub current_time: f64,
    /// Track length in seconds; 0 while unknown.
    pub duration: f64,
    /// Volume in `[0, 1]`, kept even while muted.
    pub volume: f32,
    pub muted: bool,
    pub last_error: Option<ErrorKind>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            current_time: 0.0,
            duration: 0.0,
            volume: 1.0,
            muted: false,
            last_error: None,
        }
    }
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        self.phase == Phase::Playing
    }
}

/// Identifies one `play()` call so its late completion can be matched or discarded.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PlayRequest {
    pub generation: u64,
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    /// Duration became known (seconds, 0 when the container does not say).
    MetadataLoaded { duration: f64 },
    /// Periodic position report while playing.
    TimeUpdate(f64),
    /// Outcome of an earlier start request.
    PlayResolved {
        request: PlayRequest,
        outcome: Result<(), String>,
    },
    Ended,
    Error(String),
}

/// A resource event tagged with the binding generation that emitted it.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingEvent {
    pub generation: u64,
    pub event: ResourceEvent,
}
