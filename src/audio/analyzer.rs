//! Spectral analyzer.
//!
//! An analyzer has two halves sharing one smoothed magnitude buffer:
//! - `AnalyzerTap` sits in the audio path and transforms blocks of samples
//!   as they flow to the output;
//! - `SpectralAnalyzer` is the read side: `snapshot()` converts whatever the
//!   buffer holds right now into byte magnitudes, without decoding anything.
//!
//! The numerics follow the browser analyser node: Hann window, magnitudes
//! scaled by `1 / fft_size`, exponential smoothing between transforms, then
//! `[min_decibels, max_decibels]` mapped onto `[0, 255]`.

use std::f32::consts::PI;
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use rustfft::{Fft, FftPlanner, num_complex::Complex};

use crate::config::AnalyzerSettings;

use super::backend::HostError;

/// One frame of frequency magnitudes, `fft_size / 2` bins from low to high.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpectralSnapshot {
    /// Binding generation of the analyzer that produced it.
    pub generation: u64,
    pub bins: Vec<u8>,
}

impl SpectralSnapshot {
    #[cfg(test)]
    pub fn peak(&self) -> u8 {
        self.bins.iter().copied().max().unwrap_or(0)
    }
}

#[derive(Debug)]
struct SpectrumState {
    smoothed: Vec<f32>,
    transforms: u64,
    released: bool,
}

fn lock(shared: &Mutex<SpectrumState>) -> MutexGuard<'_, SpectrumState> {
    // The state is plain numbers; a panic mid-update cannot leave it unusable.
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Read side of an analyzer bound to one playback resource.
#[derive(Debug, Clone)]
pub struct SpectralAnalyzer {
    shared: Arc<Mutex<SpectrumState>>,
    settings: AnalyzerSettings,
    generation: u64,
}

impl SpectralAnalyzer {
    /// Build an analyzer and the tap feeding it.
    pub fn new(
        settings: &AnalyzerSettings,
        generation: u64,
    ) -> Result<(Self, AnalyzerTap), HostError> {
        settings.check().map_err(HostError)?;

        let bins = settings.bin_count();
        let shared = Arc::new(Mutex::new(SpectrumState {
            smoothed: vec![0.0; bins],
            transforms: 0,
            released: false,
        }));

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(settings.fft_size);
        let window = (0..settings.fft_size)
            .map(|i| hann_window(i, settings.fft_size))
            .collect();

        let tap = AnalyzerTap {
            shared: shared.clone(),
            fft,
            window,
            scratch: vec![Complex::new(0.0, 0.0); settings.fft_size],
            smoothing: settings.smoothing,
        };

        let analyzer = Self {
            shared,
            settings: settings.clone(),
            generation,
        };
        Ok((analyzer, tap))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current magnitudes as bytes, or `None` once released.
    pub fn snapshot(&self) -> Option<SpectralSnapshot> {
        let state = lock(&self.shared);
        if state.released {
            return None;
        }
        let bins = state
            .smoothed
            .iter()
            .map(|&m| {
                magnitude_to_byte(m, self.settings.min_decibels, self.settings.max_decibels)
            })
            .collect();
        Some(SpectralSnapshot {
            generation: self.generation,
            bins,
        })
    }

    /// Number of transforms the tap has run so far.
    #[cfg(test)]
    pub fn transforms(&self) -> u64 {
        lock(&self.shared).transforms
    }

    /// Drop the analysis graph. Safe to call more than once.
    pub fn release(&self) {
        let mut state = lock(&self.shared);
        if !state.released {
            state.released = true;
            state.smoothed = Vec::new();
            debug!(
                "analyzer {} released after {} transforms",
                self.generation, state.transforms
            );
        }
    }

    #[cfg(test)]
    pub fn is_released(&self) -> bool {
        lock(&self.shared).released
    }

    #[cfg(test)]
    pub(crate) fn magnitudes(&self) -> Vec<f32> {
        lock(&self.shared).smoothed.clone()
    }
}

/// Write side of an analyzer: transforms sample blocks into the shared buffer.
#[derive(Clone)]
pub struct AnalyzerTap {
    shared: Arc<Mutex<SpectrumState>>,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    smoothing: f32,
}

impl AnalyzerTap {
    /// Number of mono samples one transform consumes.
    pub fn block_len(&self) -> usize {
        self.window.len()
    }

    #[cfg(test)]
    pub fn is_released(&self) -> bool {
        lock(&self.shared).released
    }

    /// Transform one block of mono samples and fold it into the smoothed magnitudes.
    ///
    /// Blocks shorter than `block_len()` are zero-padded; extra samples are ignored.
    pub fn process_block(&mut self, samples: &[f32]) {
        let size = self.window.len();
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let s = samples.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(s * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let norm = 1.0 / size as f32;
        let tau = self.smoothing;
        let mut state = lock(&self.shared);
        if state.released {
            return;
        }
        for (k, m) in state.smoothed.iter_mut().enumerate() {
            let magnitude = self.scratch[k].norm() * norm;
            *m = tau * *m + (1.0 - tau) * magnitude;
            if !m.is_finite() {
                *m = 0.0;
            }
        }
        state.transforms += 1;
    }
}

/// Periodic Hann window.
pub fn hann_window(index: usize, size: usize) -> f32 {
    0.5 * (1.0 - (2.0 * PI * index as f32 / size as f32).cos())
}

/// Map a linear magnitude onto `[0, 255]` through the decibel range.
pub fn magnitude_to_byte(magnitude: f32, min_db: f32, max_db: f32) -> u8 {
    if magnitude <= 0.0 {
        return 0;
    }
    let db = 20.0 * magnitude.log10();
    let scaled = 255.0 * (db - min_db) / (max_db - min_db);
    scaled.clamp(0.0, 255.0) as u8
}
