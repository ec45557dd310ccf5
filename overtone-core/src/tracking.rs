//! # Temporal Tracking
//!
//! Two independent stages that stabilize candidate frequencies across frames:
//!
//! * [`TrackSmoother`] — associates candidates with persistent tracks by
//!   frequency ratio and blends candidate frequencies toward their track,
//!   with blend strength scaled by relative magnitude and frequency distance.
//! * [`KalmanTracker`] — a bank of scalar Kalman filters, one per persistent
//!   track, gated by an absolute frequency delta so note changes start a
//!   fresh filter instead of dragging an old estimate.

use crate::Peak;

/// Candidates within this frequency ratio of a track are considered the same
/// partial (about +/- 85 cents).
const MATCH_RATIO: f32 = 1.05;

/// Distance scale of the exponential blend falloff, in Hz.
const DISTANCE_SCALE_HZ: f32 = 100.0;

#[derive(Debug, Clone, Copy)]
struct Track {
    frequency: f32,
    magnitude: f32,
}

/// Frequency smoothing against persistent per-partial tracks.
///
/// Tracks that match no candidate in a frame are dropped immediately, so a
/// note change never gets blended toward a stale track.
#[derive(Debug, Default)]
pub struct TrackSmoother {
    tracks: Vec<Track>,
}

impl TrackSmoother {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smooths `candidates` in place against the current tracks, then rebuilds
    /// each surviving track as the magnitude-weighted centroid of the raw
    /// candidate frequencies that matched it.
    ///
    /// `smoothing` in `[0, 1]`: zero passes candidates through untouched.
    pub fn update(&mut self, candidates: &mut [Peak], smoothing: f32) {
        if smoothing <= f32::EPSILON {
            self.tracks.clear();
            return;
        }

        // Raw (pre-smoothing) candidates matched to each track, used for the
        // centroid rebuild below
        let mut matched: Vec<Vec<Peak>> = vec![Vec::new(); self.tracks.len()];

        for candidate in candidates.iter_mut() {
            let mut any_match = false;
            for (track_index, track) in self.tracks.iter().enumerate() {
                let ratio = if candidate.frequency > track.frequency {
                    candidate.frequency / track.frequency
                } else {
                    track.frequency / candidate.frequency
                };
                if ratio > MATCH_RATIO {
                    continue;
                }
                any_match = true;
                matched[track_index].push(*candidate);

                let distance = (candidate.frequency - track.frequency).abs();
                let strength = (smoothing * (track.magnitude / candidate.magnitude) * 1.5
                    * (-distance / DISTANCE_SCALE_HZ).exp())
                .clamp(0.0, 1.0);
                candidate.frequency =
                    strength * track.frequency + (1.0 - strength) * candidate.frequency;
            }
            if !any_match {
                self.tracks.push(Track {
                    frequency: candidate.frequency,
                    magnitude: candidate.magnitude,
                });
                matched.push(vec![*candidate]);
            }
        }

        // Rebuild: magnitude-weighted centroid per track, unmatched dropped
        let mut next = Vec::with_capacity(self.tracks.len());
        for bucket in &matched {
            let total: f32 = bucket.iter().map(|p| p.magnitude).sum();
            if total > 0.0 {
                let centroid =
                    bucket.iter().map(|p| p.frequency * p.magnitude).sum::<f32>() / total;
                next.push(Track {
                    frequency: centroid,
                    magnitude: total / bucket.len() as f32,
                });
            }
        }
        self.tracks = next;
    }

    pub fn reset(&mut self) {
        self.tracks.clear();
    }
}

#[derive(Debug, Clone, Copy)]
struct ScalarKalman {
    estimate: f32,
    uncertainty: f32,
}

impl ScalarKalman {
    fn new(initial: f32) -> Self {
        Self {
            estimate: initial,
            uncertainty: 1.0,
        }
    }

    fn step(&mut self, measurement: f32, process_noise: f32, measurement_noise: f32) -> f32 {
        self.uncertainty += process_noise;
        let gain = self.uncertainty / (self.uncertainty + measurement_noise);
        self.estimate += gain * (measurement - self.estimate);
        self.uncertainty *= 1.0 - gain;
        self.estimate
    }
}

/// A bank of scalar Kalman filters over candidate frequencies.
///
/// Filters carry stable identity across frames through nearest-frequency
/// association rather than list position, so reordering of the candidate list
/// between frames cannot hand a filter a different partial's measurements.
#[derive(Debug)]
pub struct KalmanTracker {
    filters: Vec<ScalarKalman>,
    process_noise: f32,
    measurement_noise: f32,
    /// Candidates farther than this from every filter seed a new filter.
    max_delta_hz: f32,
}

impl Default for KalmanTracker {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            process_noise: 0.1,
            measurement_noise: 1.0,
            max_delta_hz: 40.0,
        }
    }
}

impl KalmanTracker {
    pub fn new(process_noise: f32, measurement_noise: f32, max_delta_hz: f32) -> Self {
        Self {
            filters: Vec::new(),
            process_noise,
            measurement_noise,
            max_delta_hz,
        }
    }

    /// Filters `candidates` in place. Each candidate is claimed by the nearest
    /// filter within the gate; unclaimed candidates pass through unmodified
    /// and seed new filters, unmatched filters are discarded.
    pub fn update(&mut self, candidates: &mut [Peak]) {
        let mut next = Vec::with_capacity(candidates.len());

        let mut claimed = vec![false; self.filters.len()];
        for candidate in candidates.iter_mut() {
            let nearest = self
                .filters
                .iter()
                .enumerate()
                .filter(|(i, f)| {
                    !claimed[*i] && (f.estimate - candidate.frequency).abs() <= self.max_delta_hz
                })
                .min_by(|(_, a), (_, b)| {
                    let da = (a.estimate - candidate.frequency).abs();
                    let db = (b.estimate - candidate.frequency).abs();
                    da.partial_cmp(&db).unwrap()
                })
                .map(|(i, _)| i);

            match nearest {
                Some(index) => {
                    claimed[index] = true;
                    let mut filter = self.filters[index];
                    candidate.frequency =
                        filter.step(candidate.frequency, self.process_noise, self.measurement_noise);
                    next.push(filter);
                }
                None => {
                    next.push(ScalarKalman::new(candidate.frequency));
                }
            }
        }

        self.filters = next;
    }

    pub fn reset(&mut self) {
        self.filters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(frequency: f32, magnitude: f32) -> Peak {
        Peak { frequency, magnitude }
    }

    fn run_sweep(smoothing: f32) -> Vec<f32> {
        let mut smoother = TrackSmoother::new();
        let mut outputs = Vec::new();
        for step in 0..=10 {
            let raw = 440.0 + step as f32 * 0.5;
            let mut candidates = vec![peak(raw, 1.0)];
            smoother.update(&mut candidates, smoothing);
            outputs.push(candidates[0].frequency);
        }
        outputs
    }

    #[test]
    fn smoothed_sweep_lags_behind_the_raw_frequency() {
        let outputs = run_sweep(0.2);
        // First frame seeds the track and passes through
        assert_eq!(outputs[0], 440.0);
        for (step, out) in outputs.iter().enumerate().skip(1) {
            let raw = 440.0 + step as f32 * 0.5;
            assert!(*out < raw, "frame {step}: {out} should lag {raw}");
            assert!(*out > raw - 0.5, "frame {step}: lag of {out} exceeds one step");
        }
        for pair in outputs.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn weaker_smoothing_tracks_the_sweep_more_closely() {
        let strong = run_sweep(0.2);
        let weak = run_sweep(0.05);
        let last_raw = 445.0;
        assert!(last_raw - weak[10] < last_raw - strong[10]);
    }

    #[test]
    fn zero_smoothing_passes_candidates_through() {
        let mut smoother = TrackSmoother::new();
        let mut candidates = vec![peak(440.0, 1.0)];
        smoother.update(&mut candidates, 0.0);
        smoother.update(&mut candidates, 0.0);
        assert_eq!(candidates[0].frequency, 440.0);
    }

    #[test]
    fn a_note_change_is_not_blended_toward_the_old_track() {
        let mut smoother = TrackSmoother::new();
        let mut first = vec![peak(440.0, 1.0)];
        smoother.update(&mut first, 0.5);

        // Far outside the match ratio: seeds a fresh track, old one drops
        let mut second = vec![peak(660.0, 1.0)];
        smoother.update(&mut second, 0.5);
        assert_eq!(second[0].frequency, 660.0);
    }

    #[test]
    fn kalman_first_frame_is_a_passthrough() {
        let mut tracker = KalmanTracker::default();
        let mut candidates = vec![peak(440.0, 1.0), peak(880.0, 0.5)];
        tracker.update(&mut candidates);
        assert_eq!(candidates[0].frequency, 440.0);
        assert_eq!(candidates[1].frequency, 880.0);
    }

    #[test]
    fn kalman_converges_on_a_steady_tone() {
        let mut tracker = KalmanTracker::default();
        let mut last = 0.0;
        for _ in 0..20 {
            let mut candidates = vec![peak(440.0, 1.0)];
            tracker.update(&mut candidates);
            last = candidates[0].frequency;
        }
        assert!((last - 440.0).abs() < 1e-3);
    }

    #[test]
    fn kalman_smooths_jitter_toward_the_mean() {
        let mut tracker = KalmanTracker::default();
        let mut candidates = vec![peak(440.0, 1.0)];
        tracker.update(&mut candidates);

        let mut jittered = vec![peak(442.0, 1.0)];
        tracker.update(&mut jittered);
        // Estimate moves toward the measurement but not all the way
        assert!(jittered[0].frequency > 440.0);
        assert!(jittered[0].frequency < 442.0);
    }

    #[test]
    fn kalman_gate_spawns_a_fresh_filter_on_note_change() {
        let mut tracker = KalmanTracker::default();
        for _ in 0..5 {
            let mut candidates = vec![peak(440.0, 1.0)];
            tracker.update(&mut candidates);
        }
        // 660 Hz is beyond the 40 Hz gate: new filter, no dragging
        let mut candidates = vec![peak(660.0, 1.0)];
        tracker.update(&mut candidates);
        assert_eq!(candidates[0].frequency, 660.0);
    }
}
