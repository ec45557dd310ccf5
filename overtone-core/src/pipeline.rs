//! # Analysis Pipeline
//!
//! The full per-frame path from time-domain samples to tracked pitch
//! candidates: window, zero-pad, transform, magnitude extraction, frame
//! smoothing, optional whitening, peak detection, optional harmonic
//! filtering, normalization, and temporal tracking.
//!
//! Every stage is parameterized through [`AnalyzerConfig`]; the config can be
//! swapped at runtime between frames.

use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::harmonics::{self, Fundamental, FundamentalOptions, HarmonicStrategy};
use crate::interpolate::InterpolationMethod;
use crate::normalize;
use crate::peaks::{self, DetectorParams, Strictness};
use crate::tracking::{KalmanTracker, TrackSmoother};
use crate::transform;
use crate::tuning::{self, NoteReading};
use crate::window::{self, WindowKind};
use crate::Peak;

/// Hard cap on candidates entering the harmonic and normalization stages.
const MAX_DETECTED_PEAKS: usize = 100;

/// Exponent applied to normalized fundamental confidence before it is folded
/// into candidate magnitude.
const CONFIDENCE_SHAPE: f32 = 1.3;

/// Runtime-tunable parameters for the whole analysis pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AnalyzerConfig {
    /// Time-domain samples consumed per frame.
    pub frame_size: usize,
    /// Transform size as a multiple of the frame size; the tail is
    /// zero-padded, raising bin resolution without more latency.
    pub padding_factor: usize,
    pub window: WindowKind,
    pub method: InterpolationMethod,
    /// Local-maximum strictness override; derived from the method when unset.
    pub strictness: Option<Strictness>,
    /// Silence gate: a frame whose loudest bin stays below this is empty.
    pub silence_floor: f32,
    /// Per-bin magnitude gate applied during peak detection.
    pub peak_gate: f32,
    /// Normalized magnitudes below this are dropped.
    pub magnitude_threshold: f32,
    /// Floor for the normalization reference magnitude.
    pub reference_floor: f32,
    /// Exponent shaping normalized magnitudes.
    pub power_exponent: f32,
    /// Exponential blend of the magnitude spectrum across frames, 0 disables.
    pub frame_smoothing: f32,
    /// Strength of the per-partial frequency track smoother, 0 disables.
    pub track_smoothing: f32,
    pub use_spectral_whitening: bool,
    pub harmonic_strategy: Option<HarmonicStrategy>,
    pub fundamental_options: FundamentalOptions,
    pub use_kalman: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            padding_factor: 2,
            window: WindowKind::Hann,
            method: InterpolationMethod::Parabolic,
            strictness: None,
            silence_floor: 0.0001,
            peak_gate: 0.001,
            magnitude_threshold: 0.001,
            reference_floor: 0.0005,
            power_exponent: 1.7,
            frame_smoothing: 0.6,
            track_smoothing: 0.1,
            use_spectral_whitening: false,
            harmonic_strategy: None,
            fundamental_options: FundamentalOptions::default(),
            use_kalman: false,
        }
    }
}

/// The published result of one analysis frame.
#[derive(Debug, Clone, Default)]
pub struct AnalysisSnapshot {
    /// Final pitch candidates, sorted descending by magnitude.
    pub candidates: Vec<Peak>,
    /// Fundamental inference detail, present when that strategy is active.
    pub fundamentals: Option<Vec<Fundamental>>,
    /// Full-resolution magnitude spectrum before gating, for visualization.
    pub raw_magnitudes: Vec<f32>,
    /// Octave band of the dominant candidate.
    pub octave: Option<i32>,
    /// Tuner read-out for the dominant candidate.
    pub note: Option<NoteReading>,
}

/// Streaming pitch analyzer. Feed it fixed-size frames, get snapshots back.
pub struct PitchAnalyzer {
    config: AnalyzerConfig,
    sample_rate: f32,
    window: Vec<f32>,
    previous_magnitudes: Option<Vec<f32>>,
    smoother: TrackSmoother,
    kalman: KalmanTracker,
}

impl PitchAnalyzer {
    pub fn new(config: AnalyzerConfig, sample_rate: f32) -> Self {
        let window = config.window.coefficients(config.frame_size);
        Self {
            config,
            sample_rate,
            window,
            previous_magnitudes: None,
            smoother: TrackSmoother::new(),
            kalman: KalmanTracker::default(),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Replaces the configuration between frames. Temporal state is reset
    /// when the spectral geometry changes, since old magnitudes and tracks
    /// are meaningless against a different bin grid.
    pub fn set_config(&mut self, config: AnalyzerConfig) {
        let geometry_changed = config.frame_size != self.config.frame_size
            || config.padding_factor != self.config.padding_factor;
        if config.window != self.config.window || config.frame_size != self.config.frame_size {
            self.window = config.window.coefficients(config.frame_size);
        }
        if geometry_changed {
            self.previous_magnitudes = None;
            self.smoother.reset();
            self.kalman.reset();
        }
        self.config = config;
    }

    /// Total transform length, frame plus zero padding.
    pub fn transform_size(&self) -> usize {
        self.config.frame_size * self.config.padding_factor.max(1)
    }

    /// Analyzes one frame of time-domain samples.
    ///
    /// Panics if `frame` does not match the configured frame size.
    pub fn process_frame(&mut self, frame: &[f32]) -> AnalysisSnapshot {
        assert_eq!(
            frame.len(),
            self.config.frame_size,
            "Input frame length must match the configured frame size"
        );

        let transform_size = self.transform_size();
        let mut real = vec![0.0f32; transform_size];
        let mut imag = vec![0.0f32; transform_size];

        let mean = frame.iter().sum::<f32>() / frame.len() as f32;
        for (dst, (&sample, &coeff)) in real.iter_mut().zip(frame.iter().zip(&self.window)) {
            *dst = (sample - mean) * coeff;
        }

        transform::transform(&mut real, &mut imag);

        let mut magnitudes = peaks::magnitude_spectrum(&real, &imag, transform_size);

        if self.config.frame_smoothing > f32::EPSILON {
            if let Some(previous) = &self.previous_magnitudes {
                let s = self.config.frame_smoothing;
                for (m, &p) in magnitudes.iter_mut().zip(previous) {
                    *m = s * p + (1.0 - s) * *m;
                }
            }
            self.previous_magnitudes = Some(magnitudes.clone());
        } else {
            self.previous_magnitudes = None;
        }

        let raw_magnitudes = magnitudes.clone();

        if self.config.use_spectral_whitening {
            peaks::whiten(&mut magnitudes);
        }

        let spectrum: Vec<Complex<f32>> = real
            .iter()
            .zip(&imag)
            .take(transform_size / 2)
            .map(|(&r, &i)| Complex::new(r, i))
            .collect();

        let params = DetectorParams {
            method: self.config.method,
            strictness: self
                .config
                .strictness
                .unwrap_or_else(|| Strictness::for_method(self.config.method)),
            silence_floor: self.config.silence_floor,
            peak_gate: self.config.peak_gate,
            sample_rate: self.sample_rate,
            transform_size,
        };
        let mut candidates = peaks::detect_peaks(&magnitudes, Some(&spectrum), &params);

        if candidates.is_empty() {
            self.smoother.reset();
            self.kalman.reset();
            return AnalysisSnapshot {
                raw_magnitudes,
                ..Default::default()
            };
        }

        candidates.sort_by(|a, b| b.magnitude.partial_cmp(&a.magnitude).unwrap());
        candidates.truncate(MAX_DETECTED_PEAKS);

        let mut fundamentals = None;
        match self.config.harmonic_strategy {
            Some(HarmonicStrategy::InferFundamentals) => {
                let inferred =
                    harmonics::infer_fundamentals(&candidates, &self.config.fundamental_options);
                candidates = fold_confidence(&inferred);
                fundamentals = Some(inferred);
            }
            Some(HarmonicStrategy::Suppress) => {
                harmonics::suppress_harmonics(
                    &mut candidates,
                    5,
                    self.config.fundamental_options.harmonic_tolerance,
                    0.5,
                );
                candidates.sort_by(|a, b| b.magnitude.partial_cmp(&a.magnitude).unwrap());
            }
            None => {}
        }

        normalize::normalize_candidates(
            &mut candidates,
            self.config.reference_floor,
            self.config.power_exponent,
            self.config.magnitude_threshold,
        );

        if self.config.track_smoothing > f32::EPSILON {
            self.smoother
                .update(&mut candidates, self.config.track_smoothing);
        }
        if self.config.use_kalman {
            self.kalman.update(&mut candidates);
        }

        let dominant = candidates.first().map(|c| c.frequency);
        AnalysisSnapshot {
            octave: dominant.and_then(tuning::octave_of),
            note: dominant.and_then(tuning::frequency_to_note),
            candidates,
            fundamentals,
            raw_magnitudes,
        }
    }

    /// Log-scaled copy of a raw spectrum, for display.
    pub fn display_spectrum(raw_magnitudes: &[f32]) -> Vec<f32> {
        window::log_scale_spectrum(raw_magnitudes)
    }
}

/// Converts scored fundamentals back into plain candidates, folding the
/// normalized, shaped confidence into each magnitude.
fn fold_confidence(fundamentals: &[Fundamental]) -> Vec<Peak> {
    let max_confidence = fundamentals
        .iter()
        .map(|f| f.confidence)
        .fold(0.0f32, f32::max);
    if max_confidence <= 0.0 {
        return Vec::new();
    }
    fundamentals
        .iter()
        .map(|f| Peak {
            frequency: f.frequency,
            magnitude: f.magnitude * (f.confidence / max_confidence).powf(CONFIDENCE_SHAPE),
        })
        .collect()
}
