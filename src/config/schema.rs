use std::path::PathBuf;

use serde::Deserialize;

/// Top-level application settings loaded from `config.toml`.
///
/// File format: TOML
/// Default path (Linux/XDG): `$XDG_CONFIG_HOME/allegro/config.toml` or `~/.config/allegro/config.toml`
///
/// Precedence (highest wins):
/// 1) Environment variables (prefix `ALLEGRO__`, `__` as nested separator)
/// 2) Config file (if present)
/// 3) Struct defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub audio: AudioSettings,
    pub analyzer: AnalyzerSettings,
    pub library: LibrarySettings,
    pub controls: ControlsSettings,
    pub storage: StorageSettings,
    pub ui: UiSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// How often the playing resource reports its position (milliseconds).
    pub time_update_ms: u64,
    /// Delay between visualizer frames (milliseconds). 16 is roughly 60 fps.
    pub frame_interval_ms: u64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            time_update_ms: 250,
            frame_interval_ms: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    /// Transform size; must be a power of two. A snapshot has `fft_size / 2` bins.
    pub fft_size: usize,
    /// Exponential smoothing between successive transforms, in `[0, 1)`.
    pub smoothing: f32,
    /// Magnitudes at or below this level map to 0.
    pub min_decibels: f32,
    /// Magnitudes at or above this level map to 255.
    pub max_decibels: f32,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            fft_size: 128,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalyzerSettings {
    pub const MIN_FFT_SIZE: usize = 32;
    pub const MAX_FFT_SIZE: usize = 32768;

    /// Number of magnitude bins in one snapshot.
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn check(&self) -> Result<(), String> {
        if !self.fft_size.is_power_of_two()
            || !(Self::MIN_FFT_SIZE..=Self::MAX_FFT_SIZE).contains(&self.fft_size)
        {
            return Err(format!(
                "analyzer.fft_size must be a power of two in {}..={}",
                Self::MIN_FFT_SIZE,
                Self::MAX_FFT_SIZE
            ));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err("analyzer.smoothing must be in [0, 1)".to_string());
        }
        if self.min_decibels >= self.max_decibels {
            return Err("analyzer.min_decibels must be below max_decibels".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// MIME types accepted at intake.
    pub allowed_types: Vec<String>,
    /// Largest file accepted at intake, in bytes.
    pub max_file_bytes: u64,
    /// File extensions picked up when importing a directory (case-insensitive, without dot).
    pub extensions: Vec<String>,
    /// Whether to follow symlinks during directory import.
    pub follow_links: bool,
    /// Whether to include hidden files/directories (dotfiles).
    pub include_hidden: bool,
    /// Whether to recurse into subdirectories.
    pub recursive: bool,
    /// Optional cap on directory recursion depth.
    pub max_depth: Option<usize>,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            allowed_types: vec![
                "audio/mpeg".into(),
                "audio/mp3".into(),
                "audio/wav".into(),
                "audio/ogg".into(),
                "audio/m4a".into(),
            ],
            max_file_bytes: 50 * 1024 * 1024,
            extensions: vec!["mp3".into(), "wav".into(), "ogg".into(), "m4a".into()],
            follow_links: true,
            include_hidden: false,
            recursive: true,
            max_depth: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlsSettings {
    /// Number of seconds to skip when pressing `H` / `L`.
    pub skip_seconds: f64,
    /// Volume change per `+` / `-` press.
    pub volume_step: f32,
}

impl Default for ControlsSettings {
    fn default() -> Self {
        Self {
            skip_seconds: 10.0,
            volume_step: 0.05,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding persisted documents and the log file.
    /// Defaults to `$XDG_DATA_HOME/allegro` or `~/.local/share/allegro`.
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    /// The text rendered inside the top header box.
    pub header_text: String,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            header_text: " ~ allegro ~ ".to_string(),
        }
    }
}
