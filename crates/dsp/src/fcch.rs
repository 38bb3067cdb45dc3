//! Frequency correction burst detector.
//!
//! An FCCH burst is 148 bits of all zeros, which GMSK turns into a pure tone
//! a quarter of the symbol rate above the carrier. A sliding windowed FFT
//! finds blocks dominated by a single tone near that frequency. The run of
//! such blocks locates the burst, and a phase-difference discriminator over
//! the middle of the run gives the fine frequency.

use std::f64::consts::PI;

use kal_gsm::FCCH_TONE_HZ;
use num_complex::Complex32;

use crate::fft::PowerSpectrum;
use crate::window;

/// FCCH detector parameters.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// FFT length in samples
    pub fft_len: usize,
    /// Samples between successive FFT blocks
    pub hop: usize,
    /// Minimum share of block power in the peak bin and its two neighbours
    pub peak_ratio: f32,
    /// Largest offset from the nominal tone accepted, Hz
    pub offset_max: f64,
    /// Window sidelobe attenuation, dB
    pub sidelobe_db: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            fft_len: 128,
            hop: 16,
            peak_ratio: 0.5,
            offset_max: 40e3,
            sidelobe_db: 54.0,
        }
    }
}

impl DetectorConfig {
    /// Kaiser shape giving the configured sidelobe attenuation.
    pub fn beta(&self) -> f64 {
        window::kaiser_beta(self.sidelobe_db)
    }
}

/// One detected burst.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Tone frequency minus the nominal FCCH tone, Hz
    pub offset_hz: f32,
    /// First sample of the span used for the fine estimate
    pub start: usize,
    /// Samples in that span
    pub len: usize,
    /// Peak power share of the strongest block in the run
    pub ratio: f32,
}

pub struct FcchDetector {
    config: DetectorConfig,
    sample_rate: f64,
    spectrum: PowerSpectrum,
    power: Vec<f32>,
    ratios: Vec<Option<f32>>,
}

impl FcchDetector {
    pub fn new(config: DetectorConfig, sample_rate: f64) -> Self {
        let fft_len = config.fft_len.max(4);
        let config = DetectorConfig {
            fft_len,
            hop: config.hop.max(1),
            ..config
        };
        let spectrum = PowerSpectrum::new(fft_len, window::kaiser(fft_len, config.beta()));
        Self {
            config,
            sample_rate,
            spectrum,
            power: vec![0.0; fft_len],
            ratios: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Peak share of one block, or `None` if the block does not look like an
    /// FCCH tone.
    fn score(&mut self, block: &[Complex32]) -> Option<f32> {
        self.spectrum.compute(block, &mut self.power);

        let n = self.power.len();
        let total: f32 = self.power.iter().sum();
        if total <= 0.0 {
            return None;
        }

        let (k, _) = self
            .power
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &p)| if p > best.1 { (i, p) } else { best });
        let peak = self.power[(k + n - 1) % n] + self.power[k] + self.power[(k + 1) % n];
        let ratio = peak / total;

        let freq = self.spectrum.bin_freq(k, self.sample_rate);
        if ratio >= self.config.peak_ratio && (freq - FCCH_TONE_HZ).abs() <= self.config.offset_max {
            Some(ratio)
        } else {
            None
        }
    }

    /// Look for an FCCH burst in `samples`, preferring the one covered by
    /// the most blocks.
    pub fn detect(&mut self, samples: &[Complex32]) -> Option<Detection> {
        let n = self.config.fft_len;
        let hop = self.config.hop;
        if samples.len() < n {
            return None;
        }

        let mut ratios = std::mem::take(&mut self.ratios);
        ratios.clear();
        for start in (0..=samples.len() - n).step_by(hop) {
            ratios.push(self.score(&samples[start..start + n]));
        }

        // Longest run of consecutive qualifying blocks, strongest on ties
        let mut best: Option<(usize, usize, f32)> = None;
        let mut i = 0;
        while i < ratios.len() {
            if ratios[i].is_none() {
                i += 1;
                continue;
            }
            let first = i;
            let mut peak = 0.0f32;
            while let Some(Some(r)) = ratios.get(i) {
                peak = peak.max(*r);
                i += 1;
            }
            let better = match best {
                Some((f, l, p)) => (i - first, peak) > (l - f + 1, p),
                None => true,
            };
            if better {
                best = Some((first, i - 1, peak));
            }
        }
        self.ratios = ratios;
        let (first, last, ratio) = best?;

        // Partial blocks at either edge qualify too; the middle of the run is
        // inside the burst
        let center = (first * hop + last * hop + n) / 2;
        let start = center - n / 4;
        let end = start + n / 2;

        let freq = discriminate(&samples[start..end]) * self.sample_rate / (2.0 * PI);
        let offset = freq - FCCH_TONE_HZ;
        if offset.abs() > self.config.offset_max {
            log::trace!("FCCH candidate at {} rejected: offset {:.1} Hz", start, offset);
            return None;
        }

        log::trace!(
            "FCCH at sample {} ({} samples, ratio {:.2}): {:.2} Hz",
            start,
            end - start,
            ratio,
            offset
        );
        Some(Detection {
            offset_hz: offset as f32,
            start,
            len: end - start,
            ratio,
        })
    }
}

/// Mean phase advance per sample in radians: `arg(sum x[n+1] * conj(x[n]))`.
pub fn discriminate(samples: &[Complex32]) -> f64 {
    let acc = samples
        .windows(2)
        .fold(Complex32::new(0.0, 0.0), |acc, w| acc + w[1] * w[0].conj());
    acc.arg() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{burst_window, Lcg};
    use kal_gsm::GSM_RATE;

    #[test]
    fn test_discriminate_pure_tone() {
        let step = 0.3f64;
        let x: Vec<Complex32> = (0..100)
            .map(|n| {
                let p = step * n as f64;
                Complex32::new(p.cos() as f32, p.sin() as f32)
            })
            .collect();
        assert!((discriminate(&x) - step).abs() < 1e-5);
        assert_eq!(discriminate(&x[..1]), 0.0);
    }

    #[test]
    fn test_detects_offset_burst() {
        let mut det = FcchDetector::new(DetectorConfig::default(), GSM_RATE);
        for &offset in &[1234.0f64, -2500.0, 0.0, 15_000.0] {
            let mut rng = Lcg::new(7);
            let samples = burst_window(&mut rng, 4000, 1500, 148, offset, 1.0);
            let d = det.detect(&samples).expect("burst not found");
            assert!(
                (d.offset_hz as f64 - offset).abs() < 1.0,
                "offset {} measured {}",
                offset,
                d.offset_hz
            );
            assert!(d.start >= 1500 && d.start + d.len <= 1648, "span {}+{}", d.start, d.len);
        }
    }

    #[test]
    fn test_ignores_noise() {
        let mut det = FcchDetector::new(DetectorConfig::default(), GSM_RATE);
        let mut rng = Lcg::new(3);
        let samples: Vec<Complex32> = (0..4000).map(|_| rng.phasor(1.0)).collect();
        assert_eq!(det.detect(&samples), None);
    }

    #[test]
    fn test_rejects_tone_outside_range() {
        let config = DetectorConfig {
            offset_max: 10e3,
            ..DetectorConfig::default()
        };
        let mut det = FcchDetector::new(config, GSM_RATE);
        let mut rng = Lcg::new(11);
        let samples = burst_window(&mut rng, 4000, 1000, 148, 30e3, 1.0);
        assert_eq!(det.detect(&samples), None);
    }

    #[test]
    fn test_short_input() {
        let mut det = FcchDetector::new(DetectorConfig::default(), GSM_RATE);
        assert_eq!(det.detect(&[Complex32::new(1.0, 0.0); 64]), None);
    }

    #[test]
    fn test_window_follows_sidelobe_target() {
        let config = DetectorConfig::default();
        assert!((config.beta() - 4.992).abs() < 0.001);

        let flat = DetectorConfig {
            sidelobe_db: 20.0,
            ..DetectorConfig::default()
        };
        assert_eq!(flat.beta(), 0.0);
        // Rectangular window still resolves a clean burst
        let mut det = FcchDetector::new(flat, GSM_RATE);
        let mut rng = Lcg::new(11);
        let x = burst_window(&mut rng, 4000, 1500, 148, 700.0, 1.0);
        let d = det.detect(&x).unwrap();
        assert!((d.offset_hz - 700.0).abs() < 20.0, "{}", d.offset_hz);
    }
}
