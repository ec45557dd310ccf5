//! # Sub-Bin Peak Interpolators
//!
//! Pure, stateless refinement of an integer spectral peak index into a
//! fractional-bin frequency/magnitude estimate. Four estimators are provided:
//! quadratic (parabolic) on magnitudes, Quinn's second estimator on magnitudes
//! and on the complex spectrum, and Jacobsen's complex-ratio method.
//!
//! All estimators guard the spectrum edges: when the neighbor bins they need
//! are unavailable they fall back to the raw bin-to-Hz conversion instead of
//! reading out of bounds. None of them mutates the spectrum.

use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::Peak;

/// Interpolation method applied to detected peaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterpolationMethod {
    /// Raw bins pass through verbatim, no peak picking at all.
    None,
    /// Three-point quadratic fit on magnitudes. The workhorse.
    Parabolic,
    /// Quinn's second estimator on magnitudes (two neighbors each side).
    Quinn,
    /// Quinn's second estimator on the complex spectrum.
    QuinnComplex,
    /// Jacobsen's complex-ratio estimator.
    Jacobsen,
}

/// Converts a (possibly fractional) bin index to Hz.
pub fn bin_to_frequency(bin: f32, sample_rate: f32, transform_size: usize) -> f32 {
    bin * sample_rate / transform_size as f32
}

/// Quadratic interpolation of three adjacent samples around an extremum.
///
/// Returns the fractional offset `p` of the extremum relative to the center
/// sample and the interpolated height at that offset.
pub fn qint(ym1: f32, y0: f32, yp1: f32) -> (f32, f32) {
    let p = (yp1 - ym1) / (2.0 * (2.0 * y0 - yp1 - ym1));
    let y = y0 - 0.25 * (ym1 - yp1) * p;
    (p, y)
}

/// Parabolic peak refinement on a magnitude spectrum.
///
/// Falls back to the raw bin when `peak_index` has no neighbor on either side.
pub fn parabolic(
    magnitudes: &[f32],
    peak_index: usize,
    sample_rate: f32,
    transform_size: usize,
) -> Peak {
    if peak_index == 0 || peak_index + 1 >= magnitudes.len() {
        return raw_bin(magnitudes, peak_index, sample_rate, transform_size);
    }

    let (p, y) = qint(
        magnitudes[peak_index - 1],
        magnitudes[peak_index],
        magnitudes[peak_index + 1],
    );

    Peak {
        frequency: bin_to_frequency(peak_index as f32 + p, sample_rate, transform_size),
        magnitude: y,
    }
}

/// Quinn's second estimator, magnitude-only variant.
///
/// Requires two neighbor bins on each side; the refined offset is
/// `gamma = alpha / (alpha - beta)` with `alpha` and `beta` the half and
/// quarter log-ratios of the symmetric neighbors.
pub fn quinn(
    magnitudes: &[f32],
    peak_index: usize,
    sample_rate: f32,
    transform_size: usize,
) -> Peak {
    if peak_index < 2 || peak_index + 2 >= magnitudes.len() {
        return raw_bin(magnitudes, peak_index, sample_rate, transform_size);
    }

    let alpha = (magnitudes[peak_index + 1] / magnitudes[peak_index - 1]).ln() / 2.0;
    let beta = (magnitudes[peak_index + 2] / magnitudes[peak_index - 2]).ln() / 4.0;
    let gamma = alpha / (alpha - beta);

    Peak {
        frequency: bin_to_frequency(peak_index as f32 + gamma, sample_rate, transform_size),
        magnitude: magnitudes[peak_index] * (-alpha * gamma * gamma / 2.0).exp(),
    }
}

/// Quinn's second estimator on the complex spectrum.
///
/// Derives a `tau` from each one-sided complex ratio `X(k±1)/X(k)`; when both
/// taus share a sign the matching one wins, otherwise they are averaged.
/// The magnitude is `|X(k)|` unmodified.
pub fn quinn_complex(
    spectrum: &[Complex<f32>],
    peak_index: usize,
    sample_rate: f32,
    transform_size: usize,
) -> Peak {
    let half = transform_size / 2;
    if peak_index == 0 || peak_index + 1 >= half || peak_index + 1 >= spectrum.len() {
        return raw_complex_bin(spectrum, peak_index, sample_rate, transform_size);
    }

    let center = spectrum[peak_index];
    let ratio_plus = spectrum[peak_index + 1] / center;
    let ratio_minus = spectrum[peak_index - 1] / center;

    let tau_plus = tau(ratio_plus.re, ratio_plus.im);
    let tau_minus = tau(ratio_minus.re, ratio_minus.im);

    let delta = if tau_plus > 0.0 && tau_minus > 0.0 {
        tau_plus
    } else if tau_plus < 0.0 && tau_minus < 0.0 {
        tau_minus
    } else {
        (tau_plus - tau_minus) / 2.0
    };

    Peak {
        frequency: bin_to_frequency(peak_index as f32 + delta, sample_rate, transform_size),
        magnitude: center.norm(),
    }
}

/// Jacobsen's estimator: the phase of `X(k+1)/X(k-1)` maps directly to the
/// fractional offset. The magnitude is `|X(k)|` unmodified.
pub fn jacobsen(
    spectrum: &[Complex<f32>],
    peak_index: usize,
    sample_rate: f32,
    transform_size: usize,
) -> Peak {
    let half = transform_size / 2;
    if peak_index == 0 || peak_index + 1 >= half || peak_index + 1 >= spectrum.len() {
        return raw_complex_bin(spectrum, peak_index, sample_rate, transform_size);
    }

    let ratio = spectrum[peak_index + 1] / spectrum[peak_index - 1];
    let delta = ratio.im.atan2(ratio.re) / (2.0 * std::f32::consts::PI);

    Peak {
        frequency: bin_to_frequency(peak_index as f32 + delta, sample_rate, transform_size),
        magnitude: spectrum[peak_index].norm(),
    }
}

fn tau(r: f32, i: f32) -> f32 {
    0.5 * i / (r + (r * r + i * i).sqrt())
}

fn raw_bin(magnitudes: &[f32], peak_index: usize, sample_rate: f32, transform_size: usize) -> Peak {
    Peak {
        frequency: bin_to_frequency(peak_index as f32, sample_rate, transform_size),
        magnitude: magnitudes.get(peak_index).copied().unwrap_or(0.0),
    }
}

fn raw_complex_bin(
    spectrum: &[Complex<f32>],
    peak_index: usize,
    sample_rate: f32,
    transform_size: usize,
) -> Peak {
    Peak {
        frequency: bin_to_frequency(peak_index as f32, sample_rate, transform_size),
        magnitude: spectrum
            .get(peak_index)
            .map(|c| c.norm())
            .unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform;
    use crate::window::{apply_window, WindowKind};

    const SAMPLE_RATE: f32 = 44100.0;

    #[test]
    fn qint_recovers_exact_parabola() {
        // y(x) = 3 - (x - 0.3)^2 sampled at -1, 0, 1
        let d = 0.3f32;
        let y = |x: f32| 3.0 - (x - d) * (x - d);
        let (p, height) = qint(y(-1.0), y(0.0), y(1.0));
        assert!((p - d).abs() < 1e-6);
        assert!((height - 3.0).abs() < 1e-6);
    }

    #[test]
    fn parabolic_recovers_off_bin_tone() {
        // 1024-sample Hann frame zero-padded x4; the true peak sits between
        // bins of the padded spectrum.
        let frame = 1024;
        let size = 4096;
        let tone = 440.37f32;

        let window = WindowKind::Hann.coefficients(frame);
        let mut re = vec![0.0f32; size];
        let mut im = vec![0.0f32; size];
        for i in 0..frame {
            re[i] = (2.0 * std::f32::consts::PI * tone * i as f32 / SAMPLE_RATE).sin();
        }
        apply_window(&mut re[..frame], &window);
        transform::transform(&mut re, &mut im);

        let magnitudes: Vec<f32> = re[..size / 2]
            .iter()
            .zip(&im[..size / 2])
            .map(|(&r, &i)| (r * r + i * i).sqrt())
            .collect();
        let peak_index = magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();

        let peak = parabolic(&magnitudes, peak_index, SAMPLE_RATE, size);
        let tolerance = SAMPLE_RATE / size as f32 * 0.01;
        assert!(
            (peak.frequency - tone).abs() < tolerance,
            "estimated {} Hz, expected {} Hz +/- {}",
            peak.frequency,
            tone,
            tolerance
        );
    }

    #[test]
    fn quinn_matches_analytic_log_ratios() {
        // Neighbors chosen so alpha = 0.3 and beta = -0.3, hence gamma = 0.5.
        let i = 4;
        let mut mags = vec![1.0f32; 9];
        mags[i - 1] = (-0.3f32).exp();
        mags[i + 1] = (0.3f32).exp();
        mags[i - 2] = (1.2f32).exp();
        mags[i + 2] = 1.0;

        let peak = quinn(&mags, i, SAMPLE_RATE, 16);
        let expected = bin_to_frequency(i as f32 + 0.5, SAMPLE_RATE, 16);
        assert!((peak.frequency - expected).abs() < 1e-2);
        // magnitude = y0 * exp(-alpha * gamma^2 / 2)
        let expected_mag = (-0.3f32 * 0.25 / 2.0).exp();
        assert!((peak.magnitude - expected_mag).abs() < 1e-5);
    }

    #[test]
    fn jacobsen_reads_delta_from_ratio_phase() {
        // X(k+1)/X(k-1) = e^{i pi/2} => delta = 0.25
        let i = 5;
        let mut spectrum = vec![Complex::new(1.0f32, 0.0); 16];
        spectrum[i - 1] = Complex::new(1.0, 0.0);
        spectrum[i + 1] = Complex::new(0.0, 1.0);
        spectrum[i] = Complex::new(0.0, 2.0);

        let peak = jacobsen(&spectrum, i, SAMPLE_RATE, 32);
        let expected = bin_to_frequency(i as f32 + 0.25, SAMPLE_RATE, 32);
        assert!((peak.frequency - expected).abs() < 1e-2);
        assert!((peak.magnitude - 2.0).abs() < 1e-6);
    }

    #[test]
    fn quinn_complex_picks_positive_tau_when_both_positive() {
        let i = 5;
        let mut spectrum = vec![Complex::new(1.0f32, 0.0); 16];
        spectrum[i] = Complex::new(1.0, 0.0);
        spectrum[i + 1] = Complex::new(0.5, 0.5);
        spectrum[i - 1] = Complex::new(0.5, 0.5);

        let expected_tau = tau(0.5, 0.5);
        assert!(expected_tau > 0.0);

        let peak = quinn_complex(&spectrum, i, SAMPLE_RATE, 32);
        let expected = bin_to_frequency(i as f32 + expected_tau, SAMPLE_RATE, 32);
        assert!((peak.frequency - expected).abs() < 1e-3);
    }

    #[test]
    fn edge_indices_fall_back_to_raw_bins() {
        let mags = vec![1.0f32, 2.0, 3.0, 2.0, 1.0];
        let spectrum: Vec<Complex<f32>> =
            mags.iter().map(|&m| Complex::new(m, 0.0)).collect();
        let last = mags.len() - 1;

        for peak in [
            parabolic(&mags, 0, SAMPLE_RATE, 10),
            parabolic(&mags, last, SAMPLE_RATE, 10),
            quinn(&mags, 0, SAMPLE_RATE, 10),
            quinn(&mags, last, SAMPLE_RATE, 10),
            quinn_complex(&spectrum, 0, SAMPLE_RATE, 10),
            quinn_complex(&spectrum, last, SAMPLE_RATE, 10),
            jacobsen(&spectrum, 0, SAMPLE_RATE, 10),
            jacobsen(&spectrum, last, SAMPLE_RATE, 10),
        ] {
            assert!(peak.frequency.is_finite());
            assert!(peak.magnitude.is_finite());
        }

        // The fallback must report the uninterpolated bin values
        let p = parabolic(&mags, 0, SAMPLE_RATE, 10);
        assert_eq!(p.frequency, 0.0);
        assert_eq!(p.magnitude, 1.0);
        let p = quinn(&mags, last, SAMPLE_RATE, 10);
        assert_eq!(p.frequency, bin_to_frequency(last as f32, SAMPLE_RATE, 10));
        assert_eq!(p.magnitude, 1.0);
    }
}
