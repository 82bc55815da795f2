use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque unique key of a track in the library.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A track known to the library.
///
/// Immutable after intake except `duration_seconds`, which the prober
/// back-fills (0 means unknown).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub locator: PathBuf,
    #[serde(default)]
    pub duration_seconds: f64,
    #[serde(default)]
    pub size_bytes: u64,
    pub source_type: String,
    pub added_at: DateTime<Utc>,
}

impl Track {
    pub fn has_duration(&self) -> bool {
        self.duration_seconds > 0.0
    }
}
