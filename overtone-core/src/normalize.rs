//! Magnitude normalization and final candidate thresholding.

use crate::Peak;

/// Candidates below this frequency are discarded after normalization.
pub const MIN_NORMALIZED_FREQUENCY_HZ: f32 = 30.0;

/// Maximum number of candidates kept per frame.
pub const MAX_CANDIDATES: usize = 30;

/// Normalizes candidate magnitudes into `[0, 1]` and applies the final
/// threshold, frequency floor, and count cap.
///
/// The reference magnitude is the second-strongest candidate (or the only
/// candidate's own magnitude), floored by `reference_floor` so that a frame of
/// uniformly quiet candidates cannot inflate itself to full scale. Normalized
/// magnitudes are clamped to `[0, 1]` and raised to `power`; values above 1
/// mean the strongest candidate saturates rather than rescaling everyone else.
pub fn normalize_candidates(
    candidates: &mut Vec<Peak>,
    reference_floor: f32,
    power: f32,
    magnitude_threshold: f32,
) {
    if candidates.is_empty() {
        return;
    }
    candidates.sort_by(|a, b| b.magnitude.partial_cmp(&a.magnitude).unwrap());

    let second_strongest = if candidates.len() >= 2 {
        candidates[1].magnitude
    } else {
        candidates[0].magnitude
    };
    let reference = second_strongest.max(reference_floor);

    for candidate in candidates.iter_mut() {
        candidate.magnitude = (candidate.magnitude / reference).clamp(0.0, 1.0).powf(power);
    }

    candidates.retain(|c| {
        c.frequency >= MIN_NORMALIZED_FREQUENCY_HZ && c.magnitude >= magnitude_threshold
    });
    candidates.sort_by(|a, b| b.magnitude.partial_cmp(&a.magnitude).unwrap());
    candidates.truncate(MAX_CANDIDATES);
}
