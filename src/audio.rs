//! Audio subsystem: the playback session and everything it owns.
//!
//! - `session`: transport state machine over one resource binding
//! - `analyzer` / `tap`: real-time spectral analysis of the playing stream
//! - `feed`: the loop that republishes snapshots for rendering
//! - `backend` / `rodio_backend`: the audio host seam and its native implementation

pub mod analyzer;
pub mod backend;
pub mod feed;
pub mod rodio_backend;
pub mod session;
mod tap;
pub mod types;

pub use analyzer::{SpectralAnalyzer, SpectralSnapshot};
pub use backend::{AudioBackend, EventEmitter, HostError};
pub use rodio_backend::RodioBackend;
pub use session::{PlaybackSession, SessionOptions};
pub use types::{ErrorKind, Phase, PlaybackState, ResourceEvent, Visualization};

#[cfg(test)]
pub(crate) mod fake;
#[cfg(test)]
mod tests;
