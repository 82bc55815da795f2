//! Metadata prober: duration, name, size and type of an audio file.
//!
//! Probing never fails. A file that cannot be decoded reports a duration of
//! 0 (unknown length) with the other fields taken from the filesystem.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

use lofty::file::AudioFile;
use log::{debug, warn};
use rodio::{Decoder, Source};

use super::intake::{display_name, mime_type_of};
use super::model::{Track, TrackId};

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub duration_seconds: f64,
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
}

impl ProbeReport {
    /// Copy what was learned onto `track`. Unknown values leave it untouched.
    pub fn apply_to(&self, track: &mut Track) {
        if self.duration_seconds > 0.0 {
            track.duration_seconds = self.duration_seconds;
        }
        if self.size_bytes > 0 {
            track.size_bytes = self.size_bytes;
        }
        if track.name.is_empty() {
            track.name = self.name.clone();
        }
        track.source_type = self.mime_type.clone();
    }
}

/// Duration from the container headers, without decoding audio.
pub fn probe_duration(path: &Path) -> Option<Duration> {
    let tagged = lofty::read_from_path(path).ok()?;
    let duration = tagged.properties().duration();
    (!duration.is_zero()).then_some(duration)
}

/// Duration from a throwaway decoder, falling back to the container headers.
fn decode_duration(path: &Path) -> Option<Duration> {
    let file = File::open(path).ok()?;
    let decoder = Decoder::new(BufReader::new(file)).ok()?;
    // The decoder and its file handle are dropped on return.
    decoder.total_duration().or_else(|| probe_duration(path))
}

pub fn probe(path: &Path) -> ProbeReport {
    let size_bytes = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) => {
            warn!("cannot stat {}: {e}", path.display());
            0
        }
    };
    let duration_seconds = match decode_duration(path) {
        Some(d) => d.as_secs_f64(),
        None => {
            debug!("unknown duration for {}", path.display());
            0.0
        }
    };

    ProbeReport {
        duration_seconds,
        name: display_name(path),
        size_bytes,
        mime_type: mime_type_of(path),
    }
}

/// Probe `jobs` on a worker thread, yielding one report per track as it completes.
///
/// The receiver disconnects once every job has been reported.
pub fn spawn_probe(
    jobs: Vec<(TrackId, PathBuf)>,
) -> std::io::Result<Receiver<(TrackId, ProbeReport)>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("metadata-prober".to_string())
        .spawn(move || {
            for (id, path) in jobs {
                let report = probe(&path);
                if tx.send((id, report)).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}
