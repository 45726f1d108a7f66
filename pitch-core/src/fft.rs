//! # Fast Fourier Transform (FFT) Module
//!
//! FFT helpers for the pitch estimator, built on RustFFT. Plans are created
//! once per window size and reused on every tick.
//!
//! ## Features
//! - Hann windowing for reduced spectral leakage
//! - DC offset removal for accurate analysis
//! - Magnitude spectrum for peak refinement
//! - Zero-padded cross-correlation for the YIN difference function

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Removes the DC offset from a signal by making its average value zero.
pub fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Applies a Hann window to the buffer in place.
pub fn apply_hann_window(buffer: &mut [f32]) {
    let n = buffer.len();
    if n < 2 {
        return;
    }
    let n_minus_1 = (n - 1) as f32;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

/// Pre-planned transforms for one analysis window size.
pub struct SpectrumAnalyzer {
    window_size: usize,
    forward: Arc<dyn Fft<f32>>,
    correlation_forward: Arc<dyn Fft<f32>>,
    correlation_inverse: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
    scratch_b: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    pub fn new(window_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let padded = window_size * 2;
        Self {
            window_size,
            forward: planner.plan_fft_forward(window_size),
            correlation_forward: planner.plan_fft_forward(padded),
            correlation_inverse: planner.plan_fft_inverse(padded),
            scratch: vec![Complex::default(); padded],
            scratch_b: vec![Complex::default(); padded],
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Hann-windows the signal and returns the magnitudes up to Nyquist.
    ///
    /// `signal` must hold exactly `window_size` samples.
    pub fn magnitudes(&self, signal: &[f32]) -> Vec<f32> {
        debug_assert_eq!(signal.len(), self.window_size);
        let mut windowed = signal.to_vec();
        apply_hann_window(&mut windowed);

        let mut buffer: Vec<Complex<f32>> = windowed
            .into_iter()
            .map(|sample| Complex { re: sample, im: 0.0 })
            .collect();
        self.forward.process(&mut buffer);

        buffer
            .iter()
            .take(self.window_size / 2)
            .map(|c| c.norm())
            .collect()
    }

    /// Cross-correlates the first `lags` samples of `signal` with the whole
    /// signal: `out[tau] = sum_j signal[j] * signal[j + tau]` for `j < lags`.
    ///
    /// Both inputs are zero-padded to twice the window, so no circular
    /// wrap-around reaches the returned lags.
    pub fn head_correlation(&mut self, signal: &[f32], lags: usize) -> Vec<f32> {
        debug_assert_eq!(signal.len(), self.window_size);
        let padded = self.scratch.len();
        let lags = lags.min(self.window_size);

        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let re = signal.get(i).copied().unwrap_or(0.0);
            *slot = Complex { re, im: 0.0 };
        }
        for (i, slot) in self.scratch_b.iter_mut().enumerate() {
            let re = if i < lags { signal[i] } else { 0.0 };
            *slot = Complex { re, im: 0.0 };
        }

        self.correlation_forward.process(&mut self.scratch);
        self.correlation_forward.process(&mut self.scratch_b);

        // X * conj(A) is the spectrum of the correlation of A against X.
        for (x, a) in self.scratch.iter_mut().zip(self.scratch_b.iter()) {
            *x *= a.conj();
        }
        self.correlation_inverse.process(&mut self.scratch);

        let norm = 1.0 / padded as f32;
        self.scratch
            .iter()
            .take(lags)
            .map(|c| c.re * norm)
            .collect()
    }
}
