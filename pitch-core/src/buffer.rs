//! # Frame Buffer
//!
//! Slides incoming hops into a fixed-length analysis window. The window is
//! zero-padded at the head until enough samples have arrived to fill it.

use crate::audio::AudioFrame;

/// A borrowed view of the current analysis window.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisWindow<'a> {
    samples: &'a [f32],
    hop_len: usize,
    primed: bool,
}

impl<'a> AnalysisWindow<'a> {
    pub fn new(samples: &'a [f32], hop_len: usize, primed: bool) -> Self {
        Self {
            samples,
            hop_len: hop_len.min(samples.len()),
            primed,
        }
    }

    pub fn samples(&self) -> &'a [f32] {
        self.samples
    }

    /// The samples of the most recently pushed hop (the tail of the window).
    pub fn latest_hop(&self) -> &'a [f32] {
        &self.samples[self.samples.len() - self.hop_len..]
    }

    /// `false` while the head of the window is still zero padding.
    pub fn is_primed(&self) -> bool {
        self.primed
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

pub struct FrameBuffer {
    window: Vec<f32>,
    hop_size: usize,
    filled: usize,
}

impl FrameBuffer {
    pub fn new(window_size: usize, hop_size: usize) -> Self {
        Self {
            window: vec![0.0; window_size],
            hop_size,
            filled: 0,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window.len()
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Appends a frame, dropping the oldest samples, and returns the window.
    ///
    /// The window's latest hop is the newest `hop_size` samples, even when
    /// the frame carried several hops.
    pub fn push(&mut self, frame: &AudioFrame) -> AnalysisWindow<'_> {
        let incoming = frame.samples();
        let size = self.window.len();

        if incoming.len() >= size {
            self.window
                .copy_from_slice(&incoming[incoming.len() - size..]);
        } else if !incoming.is_empty() {
            self.window.copy_within(incoming.len().., 0);
            self.window[size - incoming.len()..].copy_from_slice(incoming);
        }
        self.filled = (self.filled + incoming.len()).min(size);

        let hop_len = incoming.len().min(self.hop_size);
        AnalysisWindow::new(&self.window, hop_len, self.filled == size)
    }

    /// Forgets all buffered samples.
    pub fn reset(&mut self) {
        self.window.iter_mut().for_each(|s| *s = 0.0);
        self.filled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(values: &[f32]) -> AudioFrame {
        AudioFrame::new(values.to_vec(), 44100)
    }

    #[test]
    fn startup_window_is_zero_padded_at_head() {
        let mut buffer = FrameBuffer::new(8, 2);
        let window = buffer.push(&frame(&[1.0, 2.0]));

        assert!(!window.is_primed());
        assert_eq!(window.samples(), &[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0]);
        assert_eq!(window.latest_hop(), &[1.0, 2.0]);
    }

    #[test]
    fn window_slides_by_hop_once_full() {
        let mut buffer = FrameBuffer::new(4, 2);
        buffer.push(&frame(&[1.0, 2.0]));
        let window = buffer.push(&frame(&[3.0, 4.0]));
        assert!(window.is_primed());
        assert_eq!(window.samples(), &[1.0, 2.0, 3.0, 4.0]);

        let window = buffer.push(&frame(&[5.0, 6.0]));
        assert!(window.is_primed());
        assert_eq!(window.samples(), &[3.0, 4.0, 5.0, 6.0]);
        assert_eq!(window.latest_hop(), &[5.0, 6.0]);
    }

    #[test]
    fn reference_sizes_need_four_hops() {
        let mut buffer = FrameBuffer::new(4096, 1024);
        let hop = vec![0.5; 1024];
        for _ in 0..3 {
            assert!(!buffer.push(&AudioFrame::new(hop.clone(), 44100)).is_primed());
        }
        let window = buffer.push(&AudioFrame::new(hop, 44100));
        assert!(window.is_primed());
        assert_eq!(window.len(), 4096);
    }

    #[test]
    fn oversized_frame_keeps_newest_samples() {
        let mut buffer = FrameBuffer::new(3, 1);
        let window = buffer.push(&frame(&[1.0, 2.0, 3.0, 4.0, 5.0]));
        assert!(window.is_primed());
        assert_eq!(window.samples(), &[3.0, 4.0, 5.0]);
        assert_eq!(window.latest_hop(), &[5.0]);
    }

    #[test]
    fn multi_hop_frame_slides_contiguously() {
        let mut buffer = FrameBuffer::new(6, 2);
        buffer.push(&frame(&[1.0, 2.0]));
        let window = buffer.push(&frame(&[3.0, 4.0, 5.0, 6.0, 7.0]));

        assert!(window.is_primed());
        assert_eq!(window.samples(), &[2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(window.latest_hop(), &[6.0, 7.0]);
    }

    #[test]
    fn reset_unprimes_the_window() {
        let mut buffer = FrameBuffer::new(2, 1);
        buffer.push(&frame(&[1.0]));
        buffer.push(&frame(&[2.0]));
        buffer.reset();
        let window = buffer.push(&frame(&[3.0]));
        assert!(!window.is_primed());
        assert_eq!(window.samples(), &[0.0, 3.0]);
    }
}
