//! Windowed-FFT spectrum snapshot of the playback signal.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::ring_buffer::OutputRingBuffer;

/// FFT window size in samples. The output ring buffer holds exactly one window.
pub const FFT_SIZE: usize = 1024;

/// Number of magnitude bins in a spectrum snapshot.
pub const SPECTRUM_BINS: usize = FFT_SIZE / 2;

/// Hann-windowed forward FFT over the most recent playback window, producing
/// a byte-per-bin magnitude spectrum normalized to the frame's own maximum.
///
/// Scratch buffers are reused across calls; the analyzer keeps the previous
/// result and returns it unchanged while the ring buffer has not yet filled.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    signal: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
    bins: [u8; SPECTRUM_BINS],
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);

        // Hann window, computed once
        let window: Vec<f32> = (0..FFT_SIZE)
            .map(|i| {
                0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (FFT_SIZE - 1) as f32).cos()
            })
            .collect();

        Self {
            fft,
            window,
            signal: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            magnitudes: vec![0.0; SPECTRUM_BINS],
            bins: [0; SPECTRUM_BINS],
        }
    }

    /// Analyze the most recent window in `ring` and return the byte spectrum.
    ///
    /// Normalization is relative to the current frame's own maximum, so the
    /// same physical loudness can map to different byte levels across frames.
    pub fn analyze(&mut self, ring: &OutputRingBuffer) -> [u8; SPECTRUM_BINS] {
        if !ring.is_filled() {
            return self.bins;
        }

        let samples = ring.read_last_window(FFT_SIZE);
        for (i, (&sample, &w)) in samples.iter().zip(self.window.iter()).enumerate() {
            self.signal[i] = Complex::new(sample as f32 / 32768.0 * w, 0.0);
        }

        self.fft.process(&mut self.signal);

        // DC and Nyquist carry real-only components; interior bins combine
        // real and imaginary parts.
        self.magnitudes[0] = self.signal[0].re.abs();
        for i in 1..SPECTRUM_BINS - 1 {
            self.magnitudes[i] = self.signal[i].norm();
        }
        self.magnitudes[SPECTRUM_BINS - 1] = self.signal[FFT_SIZE / 2].re.abs();

        let max = self.magnitudes.iter().copied().fold(0.0f32, f32::max);
        let divisor = if max > 0.0 { max } else { 1.0 };

        for (bin, &mag) in self.bins.iter_mut().zip(self.magnitudes.iter()) {
            *bin = ((mag / divisor * 255.0) as i32).clamp(0, 255) as u8;
        }
        self.bins
    }

    pub fn reset(&mut self) {
        self.bins = [0; SPECTRUM_BINS];
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
