use kal_sdr::SdrSource;
use num_complex::Complex32;
use thiserror::Error;

use crate::fcch::{DetectorConfig, FcchDetector};

#[derive(Debug, Error, PartialEq)]
pub enum OffsetError {
    #[error("no FCCH burst found in {0} consecutive windows")]
    NoFcch(usize),

    #[error("receiver returned no samples")]
    NoSamples,

    #[error("invalid sample rate: {0} Hz")]
    SampleRate(f64),
}

/// Something that measures the frequency offset of the carrier the radio
/// is tuned to.
pub trait OffsetMeasurement<S: ?Sized> {
    fn measure(&mut self, radio: &mut S) -> Result<f32, OffsetError>;
}

impl<S: ?Sized, F> OffsetMeasurement<S> for F
where
    F: FnMut(&mut S) -> Result<f32, OffsetError>,
{
    fn measure(&mut self, radio: &mut S) -> Result<f32, OffsetError> {
        self(radio)
    }
}

/// Offset measurement parameters.
#[derive(Debug, Clone)]
pub struct OffsetConfig {
    /// Detections averaged per measurement
    pub avg_count: usize,
    /// Consecutive windows without a burst before giving up
    pub max_misses: usize,
    /// Samples discarded before measuring
    pub flush_count: usize,
    /// TDMA frames per search window
    pub frames_per_window: usize,
    pub detector: DetectorConfig,
}

impl Default for OffsetConfig {
    fn default() -> Self {
        Self {
            avg_count: 100,
            max_misses: 100,
            flush_count: 10,
            // FCCH repeats every 10 frames, with an 11 frame gap per multiframe
            frames_per_window: 12,
            detector: DetectorConfig::default(),
        }
    }
}

/// Summary of a set of offset detections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub mean: f32,
    pub min: f32,
    pub max: f32,
    pub stddev: f32,
}

/// Sort `values`, drop the lowest and highest 10 % and summarize the rest.
pub fn trimmed_stats(values: &mut [f32]) -> Option<Stats> {
    values.sort_by(|a, b| a.total_cmp(b));
    let cut = values.len() / 10;
    let kept = &values[cut..values.len() - cut];
    if kept.is_empty() {
        return None;
    }

    let n = kept.len() as f64;
    let mean = kept.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = kept.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    Some(Stats {
        mean: mean as f32,
        min: kept[0],
        max: kept[kept.len() - 1],
        stddev: var.sqrt() as f32,
    })
}

/// Averaged FCCH frequency offset of the tuned carrier.
pub struct FcchOffset {
    config: OffsetConfig,
    detector: Option<FcchDetector>,
    buf: Vec<Complex32>,
    offsets: Vec<f32>,
}

impl FcchOffset {
    pub fn new(config: OffsetConfig) -> Self {
        Self {
            config,
            detector: None,
            buf: Vec::new(),
            offsets: Vec::new(),
        }
    }

    /// Flush the radio, then collect `avg_count` FCCH detections and return
    /// their trimmed mean.
    pub fn measure<S: SdrSource + ?Sized>(&mut self, radio: &mut S) -> Result<f32, OffsetError> {
        let rate = radio.sample_rate();
        if rate.is_nan() || rate <= 0.0 {
            return Err(OffsetError::SampleRate(rate));
        }
        let detector = match self.detector.take() {
            Some(d) if d.sample_rate() == rate => d,
            _ => FcchDetector::new(self.config.detector.clone(), rate),
        };
        let detector = self.detector.insert(detector);

        let window = crate::frames_to_samples(self.config.frames_per_window, rate);
        self.buf.resize(window, Complex32::new(0.0, 0.0));
        self.offsets.clear();

        radio.flush(self.config.flush_count);

        let mut misses = 0;
        while self.offsets.len() < self.config.avg_count {
            let n = radio.read(&mut self.buf);
            if n == 0 {
                return Err(OffsetError::NoSamples);
            }
            match detector.detect(&self.buf[..n]) {
                Some(d) => {
                    log::trace!("offset {}: {:.2} Hz", self.offsets.len(), d.offset_hz);
                    self.offsets.push(d.offset_hz);
                    misses = 0;
                }
                None => {
                    misses += 1;
                    if misses >= self.config.max_misses {
                        log::debug!("no FCCH after {} windows", misses);
                        return Err(OffsetError::NoFcch(misses));
                    }
                }
            }
        }

        let stats = trimmed_stats(&mut self.offsets).ok_or(OffsetError::NoFcch(misses))?;
        log::debug!(
            "offset: mean {:.2} Hz, min {:.2}, max {:.2}, range {:.2}, stddev {:.2}",
            stats.mean,
            stats.min,
            stats.max,
            stats.max - stats.min,
            stats.stddev
        );
        Ok(stats.mean)
    }
}

impl<S: SdrSource + ?Sized> OffsetMeasurement<S> for FcchOffset {
    fn measure(&mut self, radio: &mut S) -> Result<f32, OffsetError> {
        FcchOffset::measure(self, radio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRadio;

    fn quick() -> OffsetConfig {
        OffsetConfig {
            avg_count: 5,
            max_misses: 3,
            ..OffsetConfig::default()
        }
    }

    #[test]
    fn test_trimmed_stats() {
        let mut v: Vec<f32> = (1..=10).map(|x| x as f32).collect();
        v.reverse();
        v[0] = 1000.0; // outlier, trimmed
        let s = trimmed_stats(&mut v).unwrap();
        assert_eq!(s.min, 2.0);
        assert_eq!(s.max, 9.0);
        assert!((s.mean - 5.5).abs() < 1e-6);

        let mut one = [3.0f32];
        assert_eq!(trimmed_stats(&mut one).unwrap().mean, 3.0);
        assert_eq!(trimmed_stats(&mut []), None);
    }

    #[test]
    fn test_measures_offset() {
        let mut radio = FakeRadio::new(|_, _| Some((1.0, -321.0)));
        let mut m = FcchOffset::new(quick());
        let off = m.measure(&mut radio).unwrap();
        assert!((off + 321.0).abs() < 1.0, "measured {}", off);
    }

    #[test]
    fn test_offset_follows_trim() {
        let mut radio = FakeRadio::new(|_, dac| Some((1.0, 10.0 * (dac as f64 - 100.0))));
        let mut m = FcchOffset::new(quick());
        radio.tune_dac(90);
        assert!((m.measure(&mut radio).unwrap() + 100.0).abs() < 1.0);
        radio.tune_dac(103);
        assert!((m.measure(&mut radio).unwrap() - 30.0).abs() < 1.0);
    }

    #[test]
    fn test_no_carrier() {
        let mut radio = FakeRadio::new(|_, _| None);
        let mut m = FcchOffset::new(quick());
        assert_eq!(m.measure(&mut radio), Err(OffsetError::NoFcch(3)));
    }

    #[test]
    fn test_closure_measurement() {
        struct Idle;

        let mut calls = 0;
        let mut m = |_: &mut Idle| -> Result<f32, OffsetError> {
            calls += 1;
            Ok(42.0)
        };
        assert_eq!(OffsetMeasurement::measure(&mut m, &mut Idle), Ok(42.0));
        assert_eq!(calls, 1);
    }
}
