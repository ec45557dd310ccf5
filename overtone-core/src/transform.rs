//! # Transform Engine
//!
//! Discrete Fourier transform machinery for the analysis pipeline. Power-of-two
//! lengths go through an iterative radix-2 Cooley-Tukey transform; every other
//! length falls back to Bluestein's chirp-z algorithm, so the engine accepts
//! arbitrary frame sizes.
//!
//! The inverse transform is unscaled: callers divide by `N` themselves when a
//! true inverse is needed.

/// Computes the in-place complex DFT of the given vector pair.
///
/// `real` and `imag` must have equal length. A zero-length input is a no-op;
/// mismatched lengths are a programming error.
///
/// # Panics
/// * If `real.len() != imag.len()`
pub fn transform(real: &mut [f32], imag: &mut [f32]) {
    let n = real.len();
    if n != imag.len() {
        panic!("Real and imaginary parts must have equal length");
    }
    if n == 0 {
        return;
    }
    if n.is_power_of_two() {
        transform_radix2(real, imag);
    } else {
        transform_bluestein(real, imag);
    }
}

/// Computes the in-place inverse DFT of the given vector pair, unscaled.
///
/// Uses the conjugation trick: swapping the real and imaginary parts turns a
/// forward transform into an inverse one. Divide every element by `N`
/// afterwards to recover the original signal.
pub fn inverse_transform(real: &mut [f32], imag: &mut [f32]) {
    transform(imag, real);
}

/// Iterative radix-2 decimation-in-time transform.
///
/// Bit-reversal permutation followed by log2(N) butterfly stages driven by
/// precomputed cosine/sine tables of size N/2.
fn transform_radix2(real: &mut [f32], imag: &mut [f32]) {
    let n = real.len();
    if n == 1 {
        return;
    }

    let levels = n.trailing_zeros();

    let mut cos_table = Vec::with_capacity(n / 2);
    let mut sin_table = Vec::with_capacity(n / 2);
    for i in 0..n / 2 {
        let angle = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
        cos_table.push(angle.cos() as f32);
        sin_table.push(angle.sin() as f32);
    }

    // Bit-reversed addressing permutation
    for i in 0..n {
        let j = reverse_bits(i, levels);
        if j > i {
            real.swap(i, j);
            imag.swap(i, j);
        }
    }

    // Butterfly stages
    let mut size = 2;
    while size <= n {
        let half = size / 2;
        let step = n / size;
        for base in (0..n).step_by(size) {
            let mut k = 0;
            for j in base..base + half {
                let l = j + half;
                let tre = real[l] * cos_table[k] + imag[l] * sin_table[k];
                let tim = imag[l] * cos_table[k] - real[l] * sin_table[k];
                real[l] = real[j] - tre;
                imag[l] = imag[j] - tim;
                real[j] += tre;
                imag[j] += tim;
                k += step;
            }
        }
        if size == n {
            break; // Prevent overflow in size *= 2
        }
        size *= 2;
    }
}

/// Bluestein's algorithm: re-expresses the DFT as a circular convolution of
/// chirp-modulated sequences, which is evaluated at a power-of-two length.
fn transform_bluestein(real: &mut [f32], imag: &mut [f32]) {
    let n = real.len();

    // Convolution length: smallest power of two >= 2N + 1
    let m = (2 * n + 1).next_power_of_two();

    // Trigonometric tables for the chirp, indexed by i^2 mod 2N to keep the
    // angle argument small
    let mut cos_table = Vec::with_capacity(n);
    let mut sin_table = Vec::with_capacity(n);
    for i in 0..n {
        let j = (i as u64 * i as u64) % (2 * n as u64);
        let angle = std::f64::consts::PI * j as f64 / n as f64;
        cos_table.push(angle.cos() as f32);
        sin_table.push(angle.sin() as f32);
    }

    // Pre-chirped input, zero-padded to length m
    let mut a_re = vec![0.0f32; m];
    let mut a_im = vec![0.0f32; m];
    for i in 0..n {
        a_re[i] = real[i] * cos_table[i] + imag[i] * sin_table[i];
        a_im[i] = imag[i] * cos_table[i] - real[i] * sin_table[i];
    }

    // Conjugate chirp, wrapped around the convolution boundary
    let mut b_re = vec![0.0f32; m];
    let mut b_im = vec![0.0f32; m];
    b_re[0] = cos_table[0];
    b_im[0] = sin_table[0];
    for i in 1..n {
        b_re[i] = cos_table[i];
        b_im[i] = sin_table[i];
        b_re[m - i] = cos_table[i];
        b_im[m - i] = sin_table[i];
    }

    let mut c_re = vec![0.0f32; m];
    let mut c_im = vec![0.0f32; m];
    convolve_complex(&mut a_re, &mut a_im, &mut b_re, &mut b_im, &mut c_re, &mut c_im);

    // De-chirp the first N outputs
    for i in 0..n {
        real[i] = c_re[i] * cos_table[i] + c_im[i] * sin_table[i];
        imag[i] = c_im[i] * cos_table[i] - c_re[i] * sin_table[i];
    }
}

/// Circular convolution of two complex vectors of equal length, written into
/// `out_re`/`out_im`. The inputs are used as scratch space.
///
/// # Panics
/// * If the six slices do not all share one length
pub fn convolve_complex(
    x_re: &mut [f32],
    x_im: &mut [f32],
    y_re: &mut [f32],
    y_im: &mut [f32],
    out_re: &mut [f32],
    out_im: &mut [f32],
) {
    let n = x_re.len();
    if [x_im.len(), y_re.len(), y_im.len(), out_re.len(), out_im.len()]
        .iter()
        .any(|&len| len != n)
    {
        panic!("Convolution operands must have equal length");
    }

    transform(x_re, x_im);
    transform(y_re, y_im);

    for i in 0..n {
        let re = x_re[i] * y_re[i] - x_im[i] * y_im[i];
        x_im[i] = x_im[i] * y_re[i] + x_re[i] * y_im[i];
        x_re[i] = re;
    }

    inverse_transform(x_re, x_im);

    let scale = 1.0 / n as f32;
    for i in 0..n {
        out_re[i] = x_re[i] * scale;
        out_im[i] = x_im[i] * scale;
    }
}

fn reverse_bits(value: usize, width: u32) -> usize {
    value.reverse_bits() >> (usize::BITS - width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::{num_complex::Complex, FftPlanner};

    fn naive_signal(n: usize) -> (Vec<f32>, Vec<f32>) {
        // Deterministic pseudo-random values in [-1, 1]
        let mut state = 0x2545f491u32;
        let mut next = move || {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            (state >> 8) as f32 / (1 << 23) as f32 - 1.0
        };
        let real: Vec<f32> = (0..n).map(|_| next()).collect();
        let imag: Vec<f32> = (0..n).map(|_| next()).collect();
        (real, imag)
    }

    fn assert_round_trip(n: usize) {
        let (orig_re, orig_im) = naive_signal(n);
        let mut re = orig_re.clone();
        let mut im = orig_im.clone();

        transform(&mut re, &mut im);
        inverse_transform(&mut re, &mut im);

        let scale = 1.0 / n as f32;
        for i in 0..n {
            assert!(
                (re[i] * scale - orig_re[i]).abs() < 1e-3,
                "real[{}] diverged for N={}",
                i,
                n
            );
            assert!((im[i] * scale - orig_im[i]).abs() < 1e-3);
        }
    }

    #[test]
    fn round_trip_power_of_two() {
        assert_round_trip(64);
    }

    #[test]
    fn round_trip_arbitrary_length() {
        assert_round_trip(100);
    }

    #[test]
    fn matches_reference_implementation() {
        for n in [64usize, 100, 127] {
            let (orig_re, orig_im) = naive_signal(n);
            let mut re = orig_re.clone();
            let mut im = orig_im.clone();
            transform(&mut re, &mut im);

            let mut buffer: Vec<Complex<f32>> = orig_re
                .iter()
                .zip(&orig_im)
                .map(|(&r, &i)| Complex { re: r, im: i })
                .collect();
            FftPlanner::new().plan_fft_forward(n).process(&mut buffer);

            for i in 0..n {
                assert!(
                    (re[i] - buffer[i].re).abs() < 1e-2,
                    "bin {} real mismatch for N={}: {} vs {}",
                    i,
                    n,
                    re[i],
                    buffer[i].re
                );
                assert!((im[i] - buffer[i].im).abs() < 1e-2);
            }
        }
    }

    #[test]
    fn single_tone_lands_in_expected_bin() {
        let n = 256;
        let mut re: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * 8.0 * i as f32 / n as f32).cos())
            .collect();
        let mut im = vec![0.0f32; n];
        transform(&mut re, &mut im);

        let mags: Vec<f32> = re
            .iter()
            .zip(&im)
            .map(|(&r, &i)| (r * r + i * i).sqrt())
            .collect();
        let peak = mags[..n / 2]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 8);
        assert!((mags[8] - n as f32 / 2.0).abs() < 1e-2);
    }

    #[test]
    fn zero_length_is_a_noop() {
        let mut re: [f32; 0] = [];
        let mut im: [f32; 0] = [];
        transform(&mut re, &mut im);
    }

    #[test]
    #[should_panic(expected = "equal length")]
    fn mismatched_lengths_panic() {
        let mut re = [0.0f32; 4];
        let mut im = [0.0f32; 3];
        transform(&mut re, &mut im);
    }
}
