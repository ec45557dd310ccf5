// overtone-core/src/lib.rs

//! The core logic for the streaming pitch analyzer.
//! This crate handles audio capture, spectral transforms, peak detection,
//! harmonic analysis, and temporal tracking. It is completely headless
//! and contains no UI code.

use serde::{Deserialize, Serialize};

pub mod audio;
pub mod harmonics;
pub mod interpolate;
pub mod normalize;
pub mod peaks;
pub mod pipeline;
pub mod tracking;
pub mod transform;
pub mod tuning;
pub mod window;

pub use pipeline::{AnalysisSnapshot, AnalyzerConfig, PitchAnalyzer};

/// A single pitch candidate: one refined spectral peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Frequency in Hz.
    pub frequency: f32,
    /// Magnitude; linear spectral units before normalization, `[0, 1]` after.
    pub magnitude: f32,
}
