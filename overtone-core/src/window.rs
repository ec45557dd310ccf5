//! # Window Tables
//!
//! Per-sample coefficient tables applied to an analysis frame before the
//! transform to control spectral leakage. Tables are plain `Vec<f32>` of the
//! frame length; the analyzer precomputes one per kind and reuses it.

use serde::{Deserialize, Serialize};

/// Selectable window function families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowKind {
    Hann,
    Hamming,
    BlackmanHarris,
    FlatTop,
    Gaussian,
}

impl WindowKind {
    /// Builds the coefficient table for this window at the given length.
    pub fn coefficients(self, length: usize) -> Vec<f32> {
        match self {
            WindowKind::Hann => cosine_sum(length, &[0.5, 0.5]),
            WindowKind::Hamming => cosine_sum(length, &[0.54, 0.46]),
            WindowKind::BlackmanHarris => {
                cosine_sum(length, &[0.35875, 0.48829, 0.14128, 0.01168])
            }
            WindowKind::FlatTop => cosine_sum(
                length,
                &[0.21557895, 0.41663158, 0.277263158, 0.083578947, 0.006947368],
            ),
            WindowKind::Gaussian => gaussian(length, 2.5),
        }
    }
}

/// Generalized cosine-sum window with alternating-sign terms.
fn cosine_sum(length: usize, terms: &[f32]) -> Vec<f32> {
    if length < 2 {
        return vec![1.0; length];
    }
    let denom = (length - 1) as f32;
    (0..length)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / denom;
            terms
                .iter()
                .enumerate()
                .map(|(k, &a)| {
                    let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                    sign * a * (phase * k as f32).cos()
                })
                .sum()
        })
        .collect()
}

/// Gaussian window; `alpha` controls the width (larger = narrower bell).
fn gaussian(length: usize, alpha: f32) -> Vec<f32> {
    if length < 2 {
        return vec![1.0; length];
    }
    let center = (length - 1) as f32 / 2.0;
    (0..length)
        .map(|i| {
            let x = (i as f32 - center) / center;
            (-0.5 * (alpha * x).powi(2)).exp()
        })
        .collect()
}

/// Multiplies a signal by a coefficient table, element-wise, in place.
///
/// # Panics
/// * If `signal` and `window` lengths differ
pub fn apply_window(signal: &mut [f32], window: &[f32]) {
    if signal.len() != window.len() {
        panic!("Signal and window must have equal length");
    }
    for (sample, &coeff) in signal.iter_mut().zip(window) {
        *sample *= coeff;
    }
}

/// Log-scales a magnitude spectrum without per-frame normalization, which
/// reshapes Gaussian-ish peaks toward parabolas ahead of quadratic
/// interpolation. Relative levels between frames are preserved.
pub fn log_scale_spectrum(magnitudes: &[f32]) -> Vec<f32> {
    const EPSILON: f32 = 1e-10;
    magnitudes.iter().map(|&m| (m + EPSILON).ln()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_endpoints_and_center() {
        let w = WindowKind::Hann.coefficients(1024);
        assert!(w[0].abs() < 1e-6);
        assert!(w[1023].abs() < 1e-6);
        assert!((w[511] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn hamming_endpoints_are_nonzero() {
        let w = WindowKind::Hamming.coefficients(64);
        assert!((w[0] - 0.08).abs() < 1e-4);
        assert!((w[63] - 0.08).abs() < 1e-4);
    }

    #[test]
    fn all_kinds_stay_in_unit_range() {
        for kind in [
            WindowKind::Hann,
            WindowKind::Hamming,
            WindowKind::BlackmanHarris,
            WindowKind::FlatTop,
            WindowKind::Gaussian,
        ] {
            let w = kind.coefficients(256);
            assert_eq!(w.len(), 256);
            for &c in &w {
                // Flat-top dips slightly negative by construction
                assert!(c <= 1.0 + 1e-6 && c >= -0.1);
            }
        }
    }

    #[test]
    fn apply_window_multiplies_elementwise() {
        let mut signal = vec![2.0f32; 8];
        let window = WindowKind::Gaussian.coefficients(8);
        apply_window(&mut signal, &window);
        for (s, w) in signal.iter().zip(&window) {
            assert!((s - 2.0 * w).abs() < 1e-6);
        }
    }
}
