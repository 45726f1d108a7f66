//! # Musical Tuning Module
//!
//! Equal temperament conversions between frequencies and MIDI note numbers.
//! A4 = 440 Hz = note 69.

/// Reference pitch of A4 in Hz.
pub const A4_FREQUENCY: f32 = 440.0;

/// MIDI note number of A4.
pub const A4_NOTE: i32 = 69;

/// Highest valid MIDI note number.
pub const MAX_NOTE: u8 = 127;

/// Returns the equal temperament frequency of a note number.
pub fn note_frequency(note: u8) -> f32 {
    A4_FREQUENCY * 2.0_f32.powf((note as i32 - A4_NOTE) as f32 / 12.0)
}

/// Converts a frequency to the nearest note number.
///
/// # Returns
/// * `Some(note)` - Nearest note in 1..=127
/// * `None` - Frequency is not finite, not positive, or rounds outside that range
pub fn frequency_to_note_number(freq: f32) -> Option<u8> {
    if !freq.is_finite() || freq <= 0.0 {
        return None;
    }
    let note = (A4_NOTE as f32 + 12.0 * (freq / A4_FREQUENCY).log2()).round();
    // Note 0 is reserved for "no pitch".
    if note >= 1.0 && note <= MAX_NOTE as f32 {
        Some(note as u8)
    } else {
        None
    }
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat; 100 cents is a semitone.
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_maps_to_69() {
        assert_eq!(frequency_to_note_number(440.0), Some(69));
        assert!((note_frequency(69) - 440.0).abs() < 1e-3);
    }

    #[test]
    fn middle_c_round_trips_within_a_cent() {
        let freq = note_frequency(60);
        assert!((freq - 261.626).abs() < 0.01);
        assert_eq!(frequency_to_note_number(freq), Some(60));
        assert!(calculate_cents_deviation(freq, 261.626).abs() < 1.0);
    }

    #[test]
    fn quarter_tone_rounds_to_nearest() {
        let slightly_sharp = note_frequency(60) * 2.0_f32.powf(0.4 / 12.0);
        assert_eq!(frequency_to_note_number(slightly_sharp), Some(60));
        let mostly_sharp = note_frequency(60) * 2.0_f32.powf(0.6 / 12.0);
        assert_eq!(frequency_to_note_number(mostly_sharp), Some(61));
    }

    #[test]
    fn invalid_frequencies_have_no_note() {
        assert_eq!(frequency_to_note_number(0.0), None);
        assert_eq!(frequency_to_note_number(-10.0), None);
        assert_eq!(frequency_to_note_number(f32::NAN), None);
        assert_eq!(frequency_to_note_number(f32::INFINITY), None);
        assert_eq!(frequency_to_note_number(20_000.0), None);
    }

    #[test]
    fn cents_sign_follows_direction() {
        assert!(calculate_cents_deviation(445.0, 440.0) > 0.0);
        assert!(calculate_cents_deviation(435.0, 440.0) < 0.0);
        assert!((calculate_cents_deviation(880.0, 440.0) - 1200.0).abs() < 1e-3);
    }
}
