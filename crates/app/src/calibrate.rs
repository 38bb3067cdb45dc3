//! VCTCXO trim search.
//!
//! Phase 1 walks the trim DAC one unit at a time toward zero offset until
//! the measured offset falls inside the capture range. Phase 2 then measures
//! every trim in a small neighborhood of that point. The best trim seen in
//! either phase is written back to the hardware.

use kal_dsp::{OffsetError, OffsetMeasurement};
use kal_sdr::SdrSource;

#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    /// Phase 1 measurement budget
    pub max_iterations: usize,
    /// |offset| below which phase 1 hands over to the neighborhood search, Hz
    pub capture_hz: f32,
    /// Phase 2 searches `center - neighborhood ..= center + neighborhood`
    pub neighborhood: u16,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            capture_hz: 50.0,
            neighborhood: 6,
        }
    }
}

/// Outcome of a calibration run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Trim DAC value with the smallest |offset| seen
    pub trim: u16,
    /// Offset measured at `trim`, Hz
    pub offset_hz: f32,
    /// Offset measurements taken
    pub measurements: usize,
}

pub struct CalibrationController<M> {
    config: CalibrationConfig,
    measure: M,
    best: Option<(u16, f32)>,
    measurements: usize,
}

impl<M> CalibrationController<M> {
    pub fn new(config: CalibrationConfig, measure: M) -> Self {
        Self {
            config,
            measure,
            best: None,
            measurements: 0,
        }
    }

    /// Write `trim`, measure, and keep it if it beats the best so far.
    fn probe<S>(&mut self, radio: &mut S, trim: u16) -> Result<f32, OffsetError>
    where
        S: SdrSource + ?Sized,
        M: OffsetMeasurement<S>,
    {
        log::info!("================================================");
        radio.tune_dac(trim);
        let offset = self.measure.measure(radio)?;
        self.measurements += 1;
        log::info!("trim {}: offset {:.2} Hz", trim, offset);

        match self.best {
            Some((_, best)) if offset.abs() >= best.abs() => {}
            _ => self.best = Some((trim, offset)),
        }
        Ok(offset)
    }

    /// Search for the trim with the smallest offset and leave the radio
    /// tuned to it. Fails only when a measurement fails.
    pub fn run<S>(&mut self, radio: &mut S) -> Result<Calibration, OffsetError>
    where
        S: SdrSource + ?Sized,
        M: OffsetMeasurement<S>,
    {
        self.best = None;
        self.measurements = 0;

        let mut trim = radio.get_dac() as u16;
        let mut captured = None;
        // +1: a positive offset raises the trim. Learned once, from the
        // first step that leaves the offset sign unchanged.
        let mut polarity = 1i8;
        let mut slope_known = false;
        let mut previous: Option<f32> = None;

        for _ in 0..self.config.max_iterations {
            let offset = self.probe(radio, trim)?;

            if offset == 0.0 {
                log::debug!("exact hit at trim {}", trim);
                break;
            }
            if offset.abs() < self.config.capture_hz {
                captured = Some(trim);
                break;
            }

            if let (false, Some(prev)) = (slope_known, previous) {
                if (prev > 0.0) == (offset > 0.0) && prev.abs() != offset.abs() {
                    slope_known = true;
                    if offset.abs() > prev.abs() {
                        polarity = -1;
                        log::debug!("offset grew from {:.2} to {:.2} Hz, reversing trim direction", prev, offset);
                    }
                }
            }
            previous = Some(offset);

            let up = (offset > 0.0) == (polarity > 0);
            trim = if up {
                trim.saturating_add(1)
            } else {
                trim.saturating_sub(1)
            };
        }

        if let Some(center) = captured {
            let lo = center.saturating_sub(self.config.neighborhood);
            let hi = center.saturating_add(self.config.neighborhood);
            log::info!("testing trim values in [{}-{}]", lo, hi);
            for t in lo..=hi {
                self.probe(radio, t)?;
            }
        }

        // At least one probe ran unless the budget is zero
        let (trim, offset_hz) = match self.best {
            Some(best) => best,
            None => (trim, f32::NAN),
        };
        radio.tune_dac(trim);

        Ok(Calibration {
            trim,
            offset_hz,
            measurements: self.measurements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kal_sdr::Result as SdrResult;
    use num_complex::Complex32;

    /// Radio exposing only the trim DAC.
    struct Trim {
        dac: u16,
        writes: Vec<u16>,
    }

    impl Trim {
        fn at(dac: u16) -> Self {
            Trim {
                dac,
                writes: Vec::new(),
            }
        }
    }

    impl SdrSource for Trim {
        fn sample_rate(&self) -> f64 {
            kal_gsm::GSM_RATE
        }
        fn tune(&mut self, freq: f64) -> SdrResult<f64> {
            Ok(freq)
        }
        fn read(&mut self, _buf: &mut [Complex32]) -> usize {
            0
        }
        fn flush(&mut self, _count: usize) {}
        fn tune_dac(&mut self, value: u16) {
            self.dac = value;
            self.writes.push(value);
        }
        fn get_dac(&mut self) -> f64 {
            self.dac as f64
        }
    }

    fn run_map<F: Fn(u16) -> f32>(start: u16, map: F) -> (Calibration, Trim) {
        let mut radio = Trim::at(start);
        let measure = |r: &mut Trim| -> Result<f32, OffsetError> { Ok(map(r.dac)) };
        let mut ctl = CalibrationController::new(CalibrationConfig::default(), measure);
        let cal = ctl.run(&mut radio).unwrap();
        (cal, radio)
    }

    #[test]
    fn test_linear_map_converges_either_sign() {
        for &k in &[-10.0f32, 10.0, -25.0, 40.0] {
            for &start in &[970u16, 1000, 1030] {
                let (cal, radio) = run_map(start, |t| k * (t as f32 - 1000.0));
                assert!(
                    (994..=1006).contains(&cal.trim),
                    "k={} start={}: trim {}",
                    k,
                    start,
                    cal.trim
                );
                assert_eq!(cal.trim, 1000, "exact trim inside the neighborhood");
                assert_eq!(cal.offset_hz, 0.0);
                assert_eq!(radio.dac, cal.trim, "hardware left at best trim");
                assert_eq!(radio.writes.last(), Some(&cal.trim));
            }
        }
    }

    #[test]
    fn test_best_never_worse_than_visited() {
        let k = 17.0f32;
        let (cal, radio) = run_map(980, |t| k * (t as f32 - 1000.0) + 3.0);
        let visited_min = radio.writes[..radio.writes.len() - 1]
            .iter()
            .map(|&t| (k * (t as f32 - 1000.0) + 3.0).abs())
            .fold(f32::MAX, f32::min);
        assert!(cal.offset_hz.abs() <= visited_min);
        assert!((994..=1006).contains(&cal.trim));
    }

    #[test]
    fn test_exact_zero_on_first_measurement() {
        let (cal, radio) = run_map(1234, |_| 0.0);
        assert_eq!(cal.measurements, 1);
        assert_eq!(cal.trim, 1234);
        assert_eq!(radio.writes, vec![1234, 1234]);
    }

    #[test]
    fn test_budget_when_never_captured() {
        let (cal, radio) = run_map(500, |_| 1000.0);
        assert_eq!(cal.measurements, 50);
        assert_eq!(cal.trim, 500, "first of equal offsets kept");
        assert_eq!(radio.writes.len(), 51);
    }

    #[test]
    fn test_v_shaped_map_start_below() {
        // min |offset| = 5 Hz at trim 1000
        let (cal, _) = run_map(950, |t| 5.0 + 10.0 * (t as f32 - 1000.0).abs());
        assert!((994..=1006).contains(&cal.trim), "trim {}", cal.trim);
        assert_eq!(cal.trim, 1000);
        assert_eq!(cal.offset_hz, 5.0);
        assert!(cal.measurements <= 50 + 13);
    }

    #[test]
    fn test_steps_past_bump_on_falling_map() {
        // |offset| grows from 979 to 980 without changing sign
        let (cal, _) = run_map(950, |t| {
            10.0 * (1000.0 - t as f32) + if t == 980 { 30.0 } else { 0.0 }
        });
        assert_eq!(cal.trim, 1000);
        assert_eq!(cal.offset_hz, 0.0);
        assert!(cal.measurements <= 50 + 13);
    }

    #[test]
    fn test_steps_past_bump_on_rising_map() {
        let (cal, radio) = run_map(950, |t| {
            10.0 * (t as f32 - 1000.0) - if t == 980 { 30.0 } else { 0.0 }
        });
        assert_eq!(cal.trim, 1000);
        // One step the wrong way, then straight up
        assert_eq!(&radio.writes[..4], &[950, 949, 950, 951]);
    }

    #[test]
    fn test_fixed_noise_sequence() {
        const NOISE: [f32; 7] = [3.0, -8.0, 11.0, -4.0, 9.0, -12.0, 6.0];
        let (cal, _) = run_map(950, |t| 20.0 * (1000.0 - t as f32) + NOISE[t as usize % 7]);
        assert!((994..=1006).contains(&cal.trim), "trim {}", cal.trim);
        assert_eq!(cal.trim, 1000);
        assert_eq!(cal.offset_hz, 6.0);
    }

    #[test]
    fn test_neighborhood_is_thirteen_trims() {
        let (cal, radio) = run_map(1000, |t| 20.0 + (t as f32 - 1000.0).abs());
        // One capture measurement, 13 neighbors, one final write
        assert_eq!(cal.measurements, 14);
        assert_eq!(&radio.writes[1..14], &(994..=1006).collect::<Vec<u16>>()[..]);
        assert_eq!(cal.trim, 1000);
    }

    #[test]
    fn test_saturates_at_dac_floor() {
        let (cal, radio) = run_map(2, |t| -100.0 - t as f32);
        assert_eq!(cal.measurements, 50);
        assert!(radio.writes.iter().all(|&t| t <= 3));
    }

    #[test]
    fn test_measurement_failure_propagates() {
        let mut radio = Trim::at(100);
        let mut calls = 0;
        let measure = |_: &mut Trim| -> Result<f32, OffsetError> {
            calls += 1;
            if calls < 3 {
                Ok(500.0)
            } else {
                Err(OffsetError::NoFcch(100))
            }
        };
        let mut ctl = CalibrationController::new(CalibrationConfig::default(), measure);
        assert_eq!(ctl.run(&mut radio), Err(OffsetError::NoFcch(100)));
    }
}
