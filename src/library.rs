//! Track library: the track model, intake of files from disk, the metadata
//! prober and playlist navigation.

pub mod intake;
mod model;
pub mod playlist;
pub mod probe;

pub use intake::{IdAllocator, IntakeReport, intake_paths};
pub use model::{Track, TrackId};
pub use playlist::{EndAction, Playlist, RepeatMode};
pub use probe::{ProbeReport, spawn_probe};
