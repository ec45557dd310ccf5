//! # Peak Detection
//!
//! Scans a magnitude spectrum for local maxima, refines each one with the
//! configured interpolator, and enforces the hard output invariants: no NaN
//! fields and no frequencies outside the audible band ever leave this module.

use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::interpolate::{self, InterpolationMethod};
use crate::Peak;

/// Audible-band bounds applied to every candidate. Not tunable.
pub const MIN_FREQUENCY_HZ: f32 = 20.0;
pub const MAX_FREQUENCY_HZ: f32 = 22000.0;

/// How demanding the local-maximum predicate is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strictness {
    /// Every bin becomes a candidate verbatim; no peak picking.
    None,
    /// Local maximum against the +/-1 neighbors.
    Loose,
    /// Local maximum against the +/-1 and +/-2 neighbors. Required by the
    /// Quinn and Jacobsen estimators to reject spurious narrow peaks.
    Strict,
}

impl Strictness {
    /// The strictness each interpolation method needs.
    pub fn for_method(method: InterpolationMethod) -> Self {
        match method {
            InterpolationMethod::None => Strictness::None,
            InterpolationMethod::Parabolic => Strictness::Loose,
            InterpolationMethod::Quinn
            | InterpolationMethod::QuinnComplex
            | InterpolationMethod::Jacobsen => Strictness::Strict,
        }
    }
}

/// Parameters for one detection pass.
#[derive(Debug, Clone, Copy)]
pub struct DetectorParams {
    pub method: InterpolationMethod,
    pub strictness: Strictness,
    /// Global gate: a frame whose loudest bin stays below this floor is
    /// treated as silence and produces no candidates at all.
    pub silence_floor: f32,
    /// Per-bin gate: cheap rejection applied before interpolation.
    pub peak_gate: f32,
    pub sample_rate: f32,
    pub transform_size: usize,
}

/// Extracts the magnitude spectrum (first half of the bins, per Nyquist
/// symmetry for real input).
pub fn magnitude_spectrum(real: &[f32], imag: &[f32], transform_size: usize) -> Vec<f32> {
    let half = transform_size / 2;
    real[..half]
        .iter()
        .zip(&imag[..half])
        .map(|(&r, &i)| (r * r + i * i).sqrt())
        .collect()
}

/// Spectral whitening: divides each bin by the mean magnitude, flattening
/// broadband tilt. The epsilon keeps silent frames out of trouble.
pub fn whiten(magnitudes: &mut [f32]) {
    if magnitudes.is_empty() {
        return;
    }
    const EPSILON: f32 = 1e-10;
    let mean = magnitudes.iter().sum::<f32>() / magnitudes.len() as f32;
    for m in magnitudes.iter_mut() {
        *m /= mean + EPSILON;
    }
}

/// Detects spectral peaks and returns refined candidates.
///
/// The complex `spectrum` is only consulted by the complex estimators; passing
/// `None` with those methods degrades them to the raw-bin fallback.
/// Candidates with NaN fields or frequencies outside `[20, 22000]` Hz are
/// silently dropped; degeneracy at spectrum edges and during silence is
/// routine, not an error.
pub fn detect_peaks(
    magnitudes: &[f32],
    spectrum: Option<&[Complex<f32>]>,
    params: &DetectorParams,
) -> Vec<Peak> {
    let mut candidates = Vec::new();
    if magnitudes.is_empty() {
        return candidates;
    }

    let max_magnitude = magnitudes.iter().cloned().fold(f32::MIN, f32::max);
    if max_magnitude < params.silence_floor {
        return candidates;
    }

    if params.strictness == Strictness::None {
        for (i, &m) in magnitudes.iter().enumerate().skip(1) {
            push_if_valid(
                &mut candidates,
                Peak {
                    frequency: interpolate::bin_to_frequency(
                        i as f32,
                        params.sample_rate,
                        params.transform_size,
                    ),
                    magnitude: m,
                },
            );
        }
        return candidates;
    }

    let span = match params.strictness {
        Strictness::Loose => 1,
        _ => 2,
    };

    for i in span..magnitudes.len().saturating_sub(span) {
        if magnitudes[i] < params.peak_gate || !is_local_max(magnitudes, i, span) {
            continue;
        }
        let peak = match params.method {
            InterpolationMethod::None => Peak {
                frequency: interpolate::bin_to_frequency(
                    i as f32,
                    params.sample_rate,
                    params.transform_size,
                ),
                magnitude: magnitudes[i],
            },
            InterpolationMethod::Parabolic => {
                interpolate::parabolic(magnitudes, i, params.sample_rate, params.transform_size)
            }
            InterpolationMethod::Quinn => {
                interpolate::quinn(magnitudes, i, params.sample_rate, params.transform_size)
            }
            InterpolationMethod::QuinnComplex => match spectrum {
                Some(s) => {
                    interpolate::quinn_complex(s, i, params.sample_rate, params.transform_size)
                }
                None => raw(magnitudes, i, params),
            },
            InterpolationMethod::Jacobsen => match spectrum {
                Some(s) => interpolate::jacobsen(s, i, params.sample_rate, params.transform_size),
                None => raw(magnitudes, i, params),
            },
        };
        push_if_valid(&mut candidates, peak);
    }

    candidates
}

fn raw(magnitudes: &[f32], i: usize, params: &DetectorParams) -> Peak {
    Peak {
        frequency: interpolate::bin_to_frequency(i as f32, params.sample_rate, params.transform_size),
        magnitude: magnitudes[i],
    }
}

fn is_local_max(magnitudes: &[f32], i: usize, span: usize) -> bool {
    (1..=span).all(|d| magnitudes[i] > magnitudes[i - d] && magnitudes[i] > magnitudes[i + d])
}

fn push_if_valid(candidates: &mut Vec<Peak>, peak: Peak) {
    if peak.frequency.is_nan()
        || peak.magnitude.is_nan()
        || peak.magnitude < 0.0
        || peak.frequency < MIN_FREQUENCY_HZ
        || peak.frequency > MAX_FREQUENCY_HZ
    {
        return;
    }
    candidates.push(peak);
}
