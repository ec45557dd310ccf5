//! # Harmonic Analysis
//!
//! Two deliberately separate strategies for dealing with harmonic series in a
//! candidate list:
//!
//! 1. [`infer_fundamentals`] — scores every candidate's likelihood of being a
//!    fundamental from the harmonic relationships it participates in, dedupes
//!    by frequency bucket, and can synthesize a missing fundamental from
//!    subharmonic evidence.
//! 2. [`suppress_harmonics`] — attenuates candidates sitting at integer
//!    multiples of stronger, lower candidates.
//!
//! Their rankings differ materially; they are selected by
//! [`HarmonicStrategy`] and never merged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Peak;

/// Which harmonic-filtering policy the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HarmonicStrategy {
    /// Confidence-scored fundamental inference with subharmonic synthesis.
    InferFundamentals,
    /// Simple magnitude attenuation of integer multiples.
    Suppress,
}

/// Options for [`infer_fundamentals`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FundamentalOptions {
    pub min_frequency: f32,
    pub max_frequency: f32,
    /// Relative error allowed between a frequency ratio and its nearest
    /// integer for the pair to count as a harmonic relationship.
    pub harmonic_tolerance: f32,
    /// Boost lower-frequency candidates' confidence.
    pub prefer_lower_fundamentals: bool,
    /// Restrict relationships to harmonic numbers 2..=8.
    pub strict_harmonic_ratios: bool,
    /// Minimum is-a-harmonic evidence before a candidate's confidence is
    /// reduced for probably being someone else's overtone.
    pub override_threshold: f32,
}

impl Default for FundamentalOptions {
    fn default() -> Self {
        Self {
            min_frequency: 80.0,
            max_frequency: 21000.0,
            harmonic_tolerance: 0.03,
            prefer_lower_fundamentals: true,
            strict_harmonic_ratios: true,
            override_threshold: 0.15,
        }
    }
}

/// A candidate annotated with fundamental confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fundamental {
    pub frequency: f32,
    pub magnitude: f32,
    pub confidence: f32,
    /// True when the candidate was synthesized from subharmonic evidence
    /// rather than observed in the spectrum.
    pub inferred: bool,
}

/// One harmonic relationship between two candidates.
#[derive(Debug, Clone, Copy)]
struct Relation {
    peer_magnitude: f32,
    error: f32,
    /// Magnitude of the peer relative to this candidate.
    strength: f32,
}

#[derive(Debug, Clone)]
struct Entry {
    peak: Peak,
    harmonics: Vec<Relation>,
    harmonic_of: Vec<Relation>,
    confidence: f32,
    inferred: bool,
}

const BUCKET_WIDTH_HZ: f32 = 10.0;
const CONFIDENCE_CUTOFF: f32 = 0.5;

/// Infers which candidates are fundamentals of harmonic series.
///
/// Returns surviving candidates sorted descending by confidence; entries below
/// the confidence cutoff are dropped. Fewer than two input candidates pass
/// through unscored.
pub fn infer_fundamentals(peaks: &[Peak], options: &FundamentalOptions) -> Vec<Fundamental> {
    if peaks.len() < 2 {
        return peaks
            .iter()
            .map(|p| Fundamental {
                frequency: p.frequency,
                magnitude: p.magnitude,
                confidence: 1.0,
                inferred: false,
            })
            .collect();
    }

    let mut valid: Vec<Peak> = peaks
        .iter()
        .filter(|p| p.frequency >= options.min_frequency && p.frequency <= options.max_frequency)
        .copied()
        .collect();
    valid.sort_by(|a, b| a.frequency.partial_cmp(&b.frequency).unwrap());

    // Relationship matrix: who has harmonics, who is one
    let mut entries: Vec<Entry> = Vec::with_capacity(valid.len());
    for (i, potential) in valid.iter().enumerate() {
        let mut harmonics = Vec::new();
        let mut harmonic_of = Vec::new();

        for (j, candidate) in valid.iter().enumerate() {
            if i == j {
                continue;
            }
            let (lower, higher) = if candidate.frequency > potential.frequency {
                (potential, candidate)
            } else {
                (candidate, potential)
            };
            let Some((_, error)) = harmonic_ratio(lower, higher, options) else {
                continue;
            };
            if candidate.frequency > potential.frequency {
                harmonics.push(Relation {
                    peer_magnitude: candidate.magnitude,
                    error,
                    strength: candidate.magnitude / potential.magnitude,
                });
            } else {
                harmonic_of.push(Relation {
                    peer_magnitude: candidate.magnitude,
                    error,
                    strength: candidate.magnitude / potential.magnitude,
                });
            }
        }

        entries.push(Entry {
            peak: *potential,
            harmonics,
            harmonic_of,
            confidence: 0.0,
            inferred: false,
        });
    }

    // Confidence scoring
    for entry in &mut entries {
        let harmonic_count = entry.harmonics.len() as f32;
        let harmonic_strength = if entry.harmonics.is_empty() {
            0.0
        } else {
            entry.harmonics.iter().map(|h| h.strength).sum::<f32>() / entry.harmonics.len() as f32
        };

        entry.confidence = harmonic_count * 1.5 + harmonic_strength * 0.9;

        if !entry.harmonic_of.is_empty() {
            let evidence = entry
                .harmonic_of
                .iter()
                .map(|rel| (1.0 - rel.error * 10.0) * (rel.peer_magnitude / entry.peak.magnitude))
                .fold(0.0f32, f32::max);
            if evidence > options.override_threshold {
                entry.confidence *= 1.0 - evidence;
            }
        }

        if options.prefer_lower_fundamentals {
            let frequency_factor = (1.0 - entry.peak.frequency / 1000.0).max(0.2);
            entry.confidence *= 1.0 + frequency_factor;
        }
    }

    // Deduplicate by frequency bucket, best confidence wins
    let mut buckets: BTreeMap<i64, Entry> = BTreeMap::new();
    for entry in entries {
        let bucket = (entry.peak.frequency / BUCKET_WIDTH_HZ).floor() as i64;
        let replace = buckets
            .get(&bucket)
            .is_none_or(|existing| entry.confidence > existing.confidence);
        if replace {
            buckets.insert(bucket, entry);
        }
    }

    // Probe subharmonics of confident buckets for a missing fundamental
    let snapshot: Vec<Entry> = buckets.values().cloned().collect();
    for entry in snapshot {
        if entry.harmonics.is_empty() {
            continue;
        }
        for divisor in 2..=4u32 {
            let candidate_fundamental = entry.peak.frequency / divisor as f32;
            if candidate_fundamental < options.min_frequency {
                continue;
            }
            let bucket = (candidate_fundamental / BUCKET_WIDTH_HZ).floor() as i64;
            if buckets.contains_key(&bucket) {
                continue;
            }

            let evidence_count = valid
                .iter()
                .filter(|p| {
                    let ratio = p.frequency / candidate_fundamental;
                    let nearest = ratio.round();
                    nearest >= 1.0
                        && nearest <= 16.0
                        && ((ratio - nearest) / nearest).abs() < options.harmonic_tolerance
                })
                .count();

            if evidence_count >= 3 {
                buckets.insert(
                    bucket,
                    Entry {
                        peak: Peak {
                            frequency: candidate_fundamental,
                            magnitude: entry.peak.magnitude / divisor as f32,
                        },
                        harmonics: Vec::new(),
                        harmonic_of: Vec::new(),
                        confidence: entry.confidence * 0.8,
                        inferred: true,
                    },
                );
            }
        }
    }

    let mut result: Vec<Fundamental> = buckets
        .into_values()
        .filter(|e| e.confidence > CONFIDENCE_CUTOFF)
        .map(|e| Fundamental {
            frequency: e.peak.frequency,
            magnitude: e.peak.magnitude,
            confidence: e.confidence,
            inferred: e.inferred,
        })
        .collect();
    result.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
    result
}

/// The simple suppressor: attenuates every candidate that sits at an integer
/// multiple (2x..10x) of one of the `top_k` strongest lower candidates.
///
/// Candidates must arrive sorted descending by magnitude. Magnitudes are
/// reduced, never removed; each matching fundamental applies the attenuation
/// once.
pub fn suppress_harmonics(
    candidates: &mut [Peak],
    top_k: usize,
    tolerance: f32,
    attenuation: f32,
) {
    let fundamentals: Vec<f32> = candidates
        .iter()
        .take(top_k)
        .map(|p| p.frequency)
        .collect();

    for candidate in candidates.iter_mut() {
        for &fundamental in &fundamentals {
            if fundamental >= candidate.frequency {
                continue;
            }
            let ratio = candidate.frequency / fundamental;
            let nearest = ratio.round();
            if (2.0..=10.0).contains(&nearest)
                && ((ratio - nearest) / nearest).abs() < tolerance
            {
                candidate.magnitude *= attenuation;
            }
        }
    }
}

fn harmonic_ratio(lower: &Peak, higher: &Peak, options: &FundamentalOptions) -> Option<(u32, f32)> {
    let ratio = higher.frequency / lower.frequency;
    let nearest = ratio.round();
    if options.strict_harmonic_ratios && !(2.0..=8.0).contains(&nearest) {
        return None;
    }
    if nearest < 1.0 {
        return None;
    }
    let error = ((ratio - nearest) / nearest).abs();
    if error < options.harmonic_tolerance {
        Some((nearest as u32, error))
    } else {
        None
    }
}
