//! Audio level metering.
//!
//! Levels are normalized RMS values computed over the most recent analysis
//! window, clamped to `[0, 1]`.

use crate::defaults;
use std::collections::VecDeque;

/// Calculates the Root Mean Square (RMS) of audio samples.
///
/// # Arguments
/// * `samples` - Audio samples as 16-bit PCM
///
/// # Returns
/// Normalized RMS value (0.0 to 1.0), where:
/// - 0.0 represents silence
/// - ~0.707 represents a full-scale sine wave
/// - 1.0 represents maximum amplitude
pub fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = sample as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    let mean_square = sum_squares / samples.len() as f64;
    (mean_square.sqrt() as f32).clamp(0.0, 1.0)
}

/// Rolling RMS meter over the most recent analysis window.
#[derive(Debug, Clone)]
pub struct LevelMeter {
    window: VecDeque<i16>,
    capacity: usize,
}

impl LevelMeter {
    /// Creates a meter with the default window size.
    pub fn new() -> Self {
        Self::with_capacity(defaults::LEVEL_WINDOW_SAMPLES)
    }

    /// Creates a meter with a custom window size in samples.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Pushes samples into the window, evicting the oldest beyond capacity.
    pub fn push(&mut self, samples: &[i16]) {
        for &sample in samples {
            if self.window.len() == self.capacity {
                self.window.pop_front();
            }
            self.window.push_back(sample);
        }
    }

    /// Returns the current level (0.0 to 1.0); 0.0 before any samples arrive.
    pub fn level(&self) -> f32 {
        if self.window.is_empty() {
            return 0.0;
        }
        let (a, b) = self.window.as_slices();
        let sum_squares: f64 = a
            .iter()
            .chain(b.iter())
            .map(|&sample| {
                let normalized = sample as f64 / i16::MAX as f64;
                normalized * normalized
            })
            .sum();
        let mean_square = sum_squares / self.window.len() as f64;
        (mean_square.sqrt() as f32).clamp(0.0, 1.0)
    }

    /// Clears the analysis window.
    pub fn reset(&mut self) {
        self.window.clear();
    }
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new()
    }
}
