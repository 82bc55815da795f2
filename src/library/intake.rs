//! Track intake: validating files and turning them into library tracks.

use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, warn};
use walkdir::WalkDir;

use crate::config::LibrarySettings;
use crate::error::IntakeError;

use super::model::{Track, TrackId};

/// MIME type guessed from the file extension.
pub fn mime_type_of(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// File name without its extension.
pub fn display_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("UNKNOWN")
        .to_string()
}

/// Check type and size; returns the file size.
pub fn validate(path: &Path, settings: &LibrarySettings) -> Result<u64, IntakeError> {
    let mime = mime_type_of(path);
    if !settings
        .allowed_types
        .iter()
        .any(|t| t.eq_ignore_ascii_case(&mime))
    {
        return Err(IntakeError::UnsupportedType {
            path: path.to_path_buf(),
            mime,
        });
    }

    let meta = std::fs::metadata(path).map_err(|source| IntakeError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let size = meta.len();
    if size > settings.max_file_bytes {
        return Err(IntakeError::TooLarge {
            path: path.to_path_buf(),
            size,
            limit: settings.max_file_bytes,
        });
    }
    Ok(size)
}

/// Hands out unique track ids based on the wall clock in milliseconds.
#[derive(Debug, Default)]
pub struct IdAllocator {
    last: u64,
}

impl IdAllocator {
    /// Continue after the largest id already in use.
    pub fn after<'a>(existing: impl IntoIterator<Item = &'a Track>) -> Self {
        let last = existing.into_iter().map(|t| t.id.0).max().unwrap_or(0);
        Self { last }
    }

    pub fn next_id(&mut self) -> TrackId {
        self.next_at(Utc::now().timestamp_millis().max(0) as u64)
    }

    fn next_at(&mut self, millis: u64) -> TrackId {
        // Two files added within the same millisecond get consecutive ids.
        let id = millis.max(self.last + 1);
        self.last = id;
        TrackId(id)
    }
}

/// Validate `path` and build its track. Duration starts unknown.
pub fn intake_file(
    path: &Path,
    settings: &LibrarySettings,
    ids: &mut IdAllocator,
) -> Result<Track, IntakeError> {
    let size_bytes = validate(path, settings)?;
    let locator = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    Ok(Track {
        id: ids.next_id(),
        name: display_name(path),
        locator,
        duration_seconds: 0.0,
        size_bytes,
        source_type: mime_type_of(path),
        added_at: Utc::now(),
    })
}

#[derive(Debug, Default)]
pub struct IntakeReport {
    pub tracks: Vec<Track>,
    pub rejected: Vec<IntakeError>,
}

/// Intake every file in `paths`, expanding directories.
pub fn intake_paths(
    paths: &[PathBuf],
    settings: &LibrarySettings,
    ids: &mut IdAllocator,
) -> IntakeReport {
    let mut report = IntakeReport::default();
    for path in paths {
        let files = if path.is_dir() {
            collect_audio_files(path, settings)
        } else {
            vec![path.clone()]
        };
        for file in files {
            match intake_file(&file, settings, ids) {
                Ok(track) => {
                    debug!("accepted {} as {}", file.display(), track.id);
                    report.tracks.push(track);
                }
                Err(e) => {
                    warn!("rejected {e}");
                    report.rejected.push(e);
                }
            }
        }
    }
    report
}

fn has_audio_extension(path: &Path, settings: &LibrarySettings) -> bool {
    let exts: Vec<String> = settings
        .extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            exts.iter().any(|e| e == &ext)
        })
        .unwrap_or(false)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Audio files under `dir`, sorted case-insensitively by path.
pub fn collect_audio_files(dir: &Path, settings: &LibrarySettings) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(dir).follow_links(settings.follow_links);

    // Non-recursive = only the root directory.
    let depth_cap = if settings.recursive {
        settings.max_depth
    } else {
        Some(1)
    };
    if let Some(d) = depth_cap {
        walker = walker.max_depth(d);
    }

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_entry(|e| settings.include_hidden || e.depth() == 0 || !is_hidden(e.path()))
        .filter_map(Result::ok)
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && has_audio_extension(p, settings))
        .collect();

    files.sort_by_key(|p| p.to_string_lossy().to_lowercase());
    files
}
