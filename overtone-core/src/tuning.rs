//! # Musical Tuning Module
//!
//! Note name lookups, cent deviation, and octave numbering for the tuner
//! read-out. All calculations assume equal temperament with A4 = 440 Hz.

use once_cell::sync::Lazy;

/// C0 in Hz, the reference for octave numbering.
pub const C0_HZ: f32 = 16.351_597_8;

/// Represents a single musical note with its name and frequency.
#[derive(Debug, Clone)]
pub struct Note {
    /// Note name (e.g., "A4", "C#3")
    pub name: String,
    /// Octave number (scientific pitch notation)
    pub octave: i32,
    /// Frequency in Hz
    pub frequency: f32,
}

/// A measured frequency resolved against the nearest equal-temperament note.
#[derive(Debug, Clone)]
pub struct NoteReading {
    /// Nearest note name, e.g. "A4"
    pub name: String,
    pub octave: i32,
    /// Target frequency of the nearest note in Hz
    pub target_frequency: f32,
    /// Deviation from the target in cents (positive = sharp)
    pub cents: f32,
}

/// Statically computed notes from C0 to B9, covering the full detection band.
///
/// Computed once at startup with A4 = 440 Hz equal temperament.
static NOTES: Lazy<Vec<Note>> = Lazy::new(|| {
    const NOTE_NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    let mut notes = Vec::with_capacity(120);

    for i in 0..120i32 {
        // A4 is 57 semitones above C0.
        let frequency = 440.0 * 2.0_f32.powf((i - 57) as f32 / 12.0);
        let octave = i / 12;
        let name = format!("{}{}", NOTE_NAMES[(i % 12) as usize], octave);
        notes.push(Note {
            name,
            octave,
            frequency,
        });
    }
    notes
});

/// Finds the closest equal-temperament note to a given frequency.
pub fn find_nearest_note(freq: f32) -> &'static Note {
    NOTES
        .iter()
        .min_by(|a, b| {
            let diff_a = (a.frequency - freq).abs();
            let diff_b = (b.frequency - freq).abs();
            diff_a.partial_cmp(&diff_b).unwrap()
        })
        .unwrap() // NOTES is never empty
}

/// Resolves a measured frequency into a tuner reading against the nearest note.
///
/// Returns `None` for non-positive or non-finite frequencies.
pub fn frequency_to_note(freq: f32) -> Option<NoteReading> {
    if !freq.is_finite() || freq <= 0.0 {
        return None;
    }
    let note = find_nearest_note(freq);
    Some(NoteReading {
        name: note.name.clone(),
        octave: note.octave,
        target_frequency: note.frequency,
        cents: calculate_cents_deviation(freq, note.frequency),
    })
}

/// Calculates the deviation from a target frequency in cents.
///
/// 100 cents = 1 semitone; positive values indicate sharpness.
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

/// The octave band a frequency falls in, with C0 as octave zero.
///
/// Unlike [`frequency_to_note`] this does not round to the nearest note, so a
/// slightly flat C4 still reads as octave 3.
pub fn octave_of(freq: f32) -> Option<i32> {
    if !freq.is_finite() || freq <= 0.0 {
        return None;
    }
    Some((freq / C0_HZ).log2().floor() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_resolves_exactly() {
        let reading = frequency_to_note(440.0).unwrap();
        assert_eq!(reading.name, "A4");
        assert_eq!(reading.octave, 4);
        assert!(reading.cents.abs() < 0.01);
    }

    #[test]
    fn slightly_sharp_tone_reads_positive_cents() {
        let reading = frequency_to_note(442.0).unwrap();
        assert_eq!(reading.name, "A4");
        assert!(reading.cents > 0.0);
        assert!(reading.cents < 10.0);
    }

    #[test]
    fn quarter_tone_rounds_to_the_nearest_neighbor() {
        // Halfway between A4 and A#4 in cents, just on the sharp side
        let freq = 440.0 * 2.0_f32.powf(51.0 / 1200.0);
        let reading = frequency_to_note(freq).unwrap();
        assert_eq!(reading.name, "A#4");
        assert!(reading.cents < 0.0);
    }

    #[test]
    fn octave_numbering_is_anchored_at_c0() {
        assert_eq!(octave_of(C0_HZ * 1.001), Some(0));
        assert_eq!(octave_of(440.0), Some(4));
        assert_eq!(octave_of(261.63), Some(4)); // C4
        assert_eq!(octave_of(260.0), Some(3)); // just below C4
    }

    #[test]
    fn invalid_frequencies_resolve_to_none() {
        assert!(frequency_to_note(0.0).is_none());
        assert!(frequency_to_note(-1.0).is_none());
        assert!(frequency_to_note(f32::NAN).is_none());
        assert!(octave_of(f32::NAN).is_none());
    }

    #[test]
    fn cents_deviation_is_logarithmic() {
        assert!((calculate_cents_deviation(880.0, 440.0) - 1200.0).abs() < 0.01);
        assert!((calculate_cents_deviation(440.0, 440.0)).abs() < 1e-6);
    }
}
