//! # Pitch Detection Module
//!
//! Single-pitch estimation for one analysis window. The estimator runs the
//! YIN algorithm with its difference function computed through an FFT
//! cross-correlation, then refines the result against the magnitude
//! spectrum and converts it to a MIDI note number.
//!
//! ## Features
//! - Silence gate on the window level
//! - YIN absolute-threshold voicing decision (rejects noise)
//! - Parabolic interpolation for sub-sample accuracy
//! - Spectrum refinement for improved precision
//! - Peak level of the newest hop for loudness display

use crate::buffer::AnalysisWindow;
use crate::config::PipelineConfig;
use crate::fft::{self, SpectrumAnalyzer};
use crate::tuning;

/// The result of estimating one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    /// Detected note number, `None` when unvoiced.
    pub note: Option<u8>,
    /// Fundamental frequency in Hz.
    pub frequency: Option<f32>,
    /// Voicing clarity in 0.0..=1.0 (1 - YIN dip depth).
    pub clarity: Option<f32>,
    /// Offset from the equal-tempered note in cents.
    pub cents: Option<f32>,
    /// Relative loudness of the newest hop.
    pub peak: f32,
}

impl PitchEstimate {
    pub fn unvoiced(peak: f32) -> Self {
        Self {
            note: None,
            frequency: None,
            clarity: None,
            cents: None,
            peak,
        }
    }

    /// The note number with 0 standing for "no pitch".
    pub fn note_number(&self) -> u8 {
        self.note.unwrap_or(0)
    }

    pub fn is_voiced(&self) -> bool {
        self.note.is_some()
    }
}

pub struct PitchEstimator {
    sample_rate: u32,
    window_size: usize,
    peak_scale: f32,
    silence_threshold_db: f32,
    yin_threshold: f32,
    min_frequency: f32,
    max_frequency: f32,
    analyzer: SpectrumAnalyzer,
    work: Vec<f32>,
}

impl PitchEstimator {
    /// Builds an estimator for the configured window at the device's sample rate.
    pub fn new(config: &PipelineConfig, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            window_size: config.window_size,
            peak_scale: config.peak_scale,
            silence_threshold_db: config.silence_threshold_db,
            yin_threshold: config.yin_threshold,
            min_frequency: config.min_frequency,
            max_frequency: config.max_frequency,
            analyzer: SpectrumAnalyzer::new(config.window_size),
            work: Vec::with_capacity(config.window_size),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Estimates the pitch of a window.
    ///
    /// Unprimed windows, silence, noise and anything outside the frequency
    /// range come back unvoiced. The peak level is reported either way.
    pub fn estimate(&mut self, window: &AnalysisWindow<'_>) -> PitchEstimate {
        let peak = self.peak_level(window.latest_hop());

        if !window.is_primed() {
            return PitchEstimate::unvoiced(peak);
        }
        if window.len() != self.window_size {
            log::debug!(
                "[PITCH] Window of {} samples does not match configured {}",
                window.len(),
                self.window_size
            );
            return PitchEstimate::unvoiced(peak);
        }
        if window.samples().iter().any(|s| !s.is_finite()) {
            return PitchEstimate::unvoiced(peak);
        }

        self.work.clear();
        self.work.extend_from_slice(window.samples());
        fft::remove_dc_offset(&mut self.work);

        // --- Noise Gate: level of the whole window ---
        let mean_square =
            self.work.iter().map(|&s| s * s).sum::<f32>() / self.work.len() as f32;
        let level_db = 10.0 * mean_square.log10();
        if !(level_db >= self.silence_threshold_db) {
            return PitchEstimate::unvoiced(peak);
        }

        let Some((rough_freq, clarity)) = self.detect_pitch_yin() else {
            return PitchEstimate::unvoiced(peak);
        };

        let magnitudes = self.analyzer.magnitudes(&self.work);
        let frequency = refine_from_spectrum(&magnitudes, rough_freq, self.sample_rate)
            .filter(|&refined| tuning::calculate_cents_deviation(refined, rough_freq).abs() < 25.0)
            .unwrap_or(rough_freq);

        if frequency < self.min_frequency || frequency > self.max_frequency {
            return PitchEstimate::unvoiced(peak);
        }
        let Some(note) = tuning::frequency_to_note_number(frequency) else {
            return PitchEstimate::unvoiced(peak);
        };
        let cents = tuning::calculate_cents_deviation(frequency, tuning::note_frequency(note));

        PitchEstimate {
            note: Some(note),
            frequency: Some(frequency),
            clarity: Some(clarity),
            cents: Some(cents),
            peak,
        }
    }

    /// Scaled mean absolute value of a hop.
    fn peak_level(&self, hop: &[f32]) -> f32 {
        if hop.is_empty() {
            return 0.0;
        }
        let mean = hop.iter().map(|s| s.abs()).sum::<f32>() / hop.len() as f32;
        let peak = mean * self.peak_scale;
        if peak.is_finite() { peak } else { 0.0 }
    }

    /// YIN over the DC-free working copy of the window.
    ///
    /// # Returns
    /// * `Some((frequency, clarity))` - Voiced window
    /// * `None` - No dip below the threshold inside the frequency range
    fn detect_pitch_yin(&mut self) -> Option<(f32, f32)> {
        let signal = &self.work;
        let half = signal.len() / 2;
        if half < 4 {
            return None;
        }

        // --- Step 1 & 2: difference function from energies and correlation ---
        let correlation = self.analyzer.head_correlation(signal, half);
        let mut prefix = Vec::with_capacity(signal.len() + 1);
        prefix.push(0.0f64);
        for &s in signal.iter() {
            let last = prefix[prefix.len() - 1];
            prefix.push(last + (s as f64) * (s as f64));
        }
        let head_energy = prefix[half];

        let mut yin_buffer = vec![0.0f32; half];
        for tau in 1..half {
            let shifted_energy = prefix[tau + half] - prefix[tau];
            let diff = head_energy + shifted_energy - 2.0 * correlation[tau] as f64;
            yin_buffer[tau] = diff.max(0.0) as f32;
        }

        // --- Step 3: Cumulative mean normalized difference ---
        let mut running_sum = 0.0f32;
        yin_buffer[0] = 1.0;
        for tau in 1..half {
            running_sum += yin_buffer[tau];
            if running_sum > 0.0 {
                yin_buffer[tau] *= tau as f32 / running_sum;
            } else {
                yin_buffer[tau] = 1.0;
            }
        }

        // --- Step 4: First dip under the threshold, walked down to its minimum ---
        let tau_min = ((self.sample_rate as f32 / self.max_frequency).floor() as usize).max(2);
        let tau_max = ((self.sample_rate as f32 / self.min_frequency).ceil() as usize).min(half - 2);
        if tau_min >= tau_max {
            return None;
        }

        let mut period = 0;
        for tau in tau_min..=tau_max {
            if yin_buffer[tau] < self.yin_threshold {
                let mut best = tau;
                while best < tau_max && yin_buffer[best + 1] < yin_buffer[best] {
                    best += 1;
                }
                period = best;
                break;
            }
        }
        if period == 0 {
            return None;
        }

        // --- Step 5: Parabolic interpolation for better precision ---
        let y1 = yin_buffer[period - 1];
        let y2 = yin_buffer[period];
        let y3 = yin_buffer[period + 1];

        let denominator = y1 - 2.0 * y2 + y3;
        let period_float = if denominator.abs() > f32::EPSILON {
            let peak_shift = (y1 - y3) / (2.0 * denominator);
            period as f32 + peak_shift.clamp(-1.0, 1.0)
        } else {
            period as f32
        };

        let frequency = self.sample_rate as f32 / period_float;
        let clarity = (1.0 - y2).clamp(0.0, 1.0);

        if frequency.is_finite() && frequency > 0.0 {
            Some((frequency, clarity))
        } else {
            None
        }
    }
}

/// Refines a frequency estimate using a pre-computed magnitude spectrum.
///
/// Searches two bins either side of the rough estimate for the strongest
/// bin and fits a parabola through the log magnitudes around it.
///
/// # Returns
/// * `Some(refined_freq)` - Refined frequency estimate (or the rough one if
///   the neighbourhood is unusable)
/// * `None` - The rough estimate is not a positive frequency
pub fn refine_from_spectrum(
    spectrum_magnitudes: &[f32],
    rough_freq: f32,
    sample_rate: u32,
) -> Option<f32> {
    if !(rough_freq > 0.0) || spectrum_magnitudes.len() < 3 {
        return None;
    }
    let buffer_size = spectrum_magnitudes.len() * 2;
    let target_bin = (rough_freq * buffer_size as f32) / sample_rate as f32;
    let search_radius = 2.0;
    let start_bin = (target_bin - search_radius).max(0.0) as usize;
    let end_bin =
        (target_bin + search_radius).min((spectrum_magnitudes.len() - 1) as f32) as usize;
    if start_bin >= end_bin {
        return Some(rough_freq);
    }

    let peak_bin_result = spectrum_magnitudes[start_bin..=end_bin]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));

    let peak_bin = match peak_bin_result {
        Some((offset, _)) => start_bin + offset,
        None => return Some(rough_freq),
    };

    if peak_bin == 0 || peak_bin >= spectrum_magnitudes.len() - 1 {
        return Some(rough_freq);
    }

    let y1 = spectrum_magnitudes[peak_bin - 1].ln();
    let y2 = spectrum_magnitudes[peak_bin].ln();
    let y3 = spectrum_magnitudes[peak_bin + 1].ln();

    if !y1.is_finite() || !y2.is_finite() || !y3.is_finite() {
        return Some(rough_freq);
    }

    let denominator = 2.0 * y2 - y1 - y3;
    if denominator.abs() < 1e-6 {
        return Some(rough_freq);
    }

    let peak_shift = (y3 - y1) / (2.0 * denominator);
    let interpolated_bin = peak_bin as f32 + peak_shift;
    let final_freq = (interpolated_bin * sample_rate as f32) / buffer_size as f32;

    if final_freq.is_finite() && final_freq > 0.0 {
        Some(final_freq)
    } else {
        Some(rough_freq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 44100;
    const WINDOW: usize = 4096;
    const HOP: usize = 1024;

    fn generate_sine(frequency: f32, amplitude: f32, sample_count: usize) -> Vec<f32> {
        (0..sample_count)
            .map(|i| {
                amplitude
                    * (2.0 * std::f32::consts::PI * frequency * i as f32 / SAMPLE_RATE as f32).sin()
            })
            .collect()
    }

    fn estimator() -> PitchEstimator {
        PitchEstimator::new(&PipelineConfig::default(), SAMPLE_RATE)
    }

    fn estimate(samples: &[f32]) -> PitchEstimate {
        let window = AnalysisWindow::new(samples, HOP, true);
        estimator().estimate(&window)
    }

    #[test]
    fn silence_has_no_pitch() {
        let estimate = estimate(&vec![0.0; WINDOW]);
        assert_eq!(estimate.note, None);
        assert_eq!(estimate.note_number(), 0);
        assert_eq!(estimate.peak, 0.0);
    }

    #[test]
    fn a440_is_note_69() {
        let estimate = estimate(&generate_sine(440.0, 0.5, WINDOW));
        assert_eq!(estimate.note, Some(69));
        let freq = estimate.frequency.unwrap();
        assert!((freq - 440.0).abs() < 2.0, "detected {} Hz", freq);
        assert!(estimate.clarity.unwrap() > 0.9);
        assert!(estimate.cents.unwrap().abs() < 10.0);
    }

    #[test]
    fn tones_across_the_range_map_to_their_notes() {
        for note in [33u8, 40, 52, 60, 64, 69, 76, 88, 96] {
            let freq = tuning::note_frequency(note);
            let estimate = estimate(&generate_sine(freq, 0.5, WINDOW));
            assert_eq!(estimate.note, Some(note), "tone at {} Hz", freq);
        }
    }

    #[test]
    fn unprimed_window_reports_peak_but_no_pitch() {
        let mut samples = vec![0.0; WINDOW];
        samples[WINDOW - HOP..].copy_from_slice(&generate_sine(440.0, 0.5, HOP));
        let window = AnalysisWindow::new(&samples, HOP, false);
        let estimate = estimator().estimate(&window);

        assert_eq!(estimate.note, None);
        assert!(estimate.peak > 0.0);
    }

    #[test]
    fn white_noise_is_unvoiced() {
        let mut state = 0x2545_f491_u32;
        let noise: Vec<f32> = (0..WINDOW)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) - 0.5
            })
            .collect();
        assert_eq!(estimate(&noise).note, None);
    }

    #[test]
    fn quiet_tone_is_below_silence_threshold() {
        let estimate = estimate(&generate_sine(440.0, 1e-5, WINDOW));
        assert_eq!(estimate.note, None);
    }

    #[test]
    fn saturated_input_does_not_fault() {
        let dc = estimate(&vec![1.0; WINDOW]);
        assert_eq!(dc.note, None);
        assert!((dc.peak - 2000.0).abs() < 1e-3);

        let clipped: Vec<f32> = generate_sine(440.0, 3.0, WINDOW)
            .into_iter()
            .map(|s| s.clamp(-1.0, 1.0))
            .collect();
        let estimate = estimate(&clipped);
        assert!(matches!(estimate.note, None | Some(69)));
        assert!(estimate.peak.is_finite());
    }

    #[test]
    fn non_finite_samples_are_unvoiced() {
        let mut samples = generate_sine(440.0, 0.5, WINDOW);
        samples[10] = f32::NAN;
        samples[WINDOW - 1] = f32::INFINITY;
        let estimate = estimate(&samples);
        assert_eq!(estimate.note, None);
        assert_eq!(estimate.peak, 0.0);
    }

    #[test]
    fn peak_is_scaled_mean_of_newest_hop() {
        let mut samples = vec![0.0; WINDOW];
        for (i, s) in samples[WINDOW - HOP..].iter_mut().enumerate() {
            *s = if i % 2 == 0 { 0.25 } else { -0.25 };
        }
        let estimate = estimate(&samples);
        assert!((estimate.peak - 500.0).abs() < 1e-2);
    }

    #[test]
    fn tone_outside_range_is_unvoiced() {
        let config = PipelineConfig {
            min_frequency: 100.0,
            max_frequency: 1000.0,
            ..PipelineConfig::default()
        };
        let mut estimator = PitchEstimator::new(&config, SAMPLE_RATE);
        let samples = generate_sine(2000.0, 0.5, WINDOW);
        let window = AnalysisWindow::new(&samples, HOP, true);
        assert_eq!(estimator.estimate(&window).note, None);
    }

    #[test]
    fn refine_snaps_to_spectral_peak() {
        let size = 4096;
        let signal = generate_sine(440.0, 0.5, size);
        let magnitudes = SpectrumAnalyzer::new(size).magnitudes(&signal);
        let refined = refine_from_spectrum(&magnitudes, 445.0, SAMPLE_RATE).unwrap();
        assert!((refined - 440.0).abs() < 1.0, "refined to {}", refined);
        assert_eq!(refine_from_spectrum(&magnitudes, 0.0, SAMPLE_RATE), None);
    }
}
