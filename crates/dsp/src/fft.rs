use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Windowed forward FFT producing per-bin power.
///
/// Bin `k` holds the power at `bin_freq(k)`; bins above `size / 2` are the
/// negative frequencies, as rustfft leaves them.
pub struct PowerSpectrum {
    fft: Arc<dyn Fft<f32>>,
    size: usize,
    window: Vec<f32>,
    buffer: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl PowerSpectrum {
    /// `window` must be `size` long.
    pub fn new(size: usize, window: Vec<f32>) -> Self {
        assert_eq!(window.len(), size, "window length {} != FFT size {}", window.len(), size);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            fft,
            size,
            window,
            buffer: vec![Complex32::new(0.0, 0.0); size],
            scratch: vec![Complex32::new(0.0, 0.0); scratch_len],
        }
    }

    /// Window `input`, transform it and write `|X[k]|^2` into `power`.
    /// Both slices must be exactly `size` long.
    pub fn compute(&mut self, input: &[Complex32], power: &mut [f32]) {
        assert_eq!(input.len(), self.size, "input length {} != FFT size {}", input.len(), self.size);
        assert_eq!(power.len(), self.size);

        for ((b, &x), &w) in self.buffer.iter_mut().zip(input).zip(&self.window) {
            *b = x * w;
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);
        for (p, b) in power.iter_mut().zip(&self.buffer) {
            *p = b.norm_sqr();
        }
    }

    /// Signed frequency of bin `k` at `sample_rate`.
    pub fn bin_freq(&self, k: usize, sample_rate: f64) -> f64 {
        let k = if k < self.size / 2 {
            k as f64
        } else {
            k as f64 - self.size as f64
        };
        k * sample_rate / self.size as f64
    }

    pub fn size(&self) -> usize {
        self.size
    }
}
