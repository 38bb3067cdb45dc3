use kal_gsm::{arfcn_to_freq, Band};
use kal_sdr::SdrSource;
use num_complex::Complex32;

use crate::fcch::{DetectorConfig, FcchDetector};

/// Base station found by [`scan`].
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub arfcn: u16,
    pub band: Band,
    /// Downlink frequency, Hz
    pub freq: f64,
    /// FCCH offset of the carrier, Hz
    pub offset_hz: f32,
    /// Mean sample power of the probe window
    pub power: f64,
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Samples discarded after each retune
    pub flush_count: usize,
    /// TDMA frames per probe window
    pub frames_per_window: usize,
    /// Windows searched for an FCCH on a candidate channel
    pub fcch_windows: usize,
    pub detector: DetectorConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            flush_count: 10,
            frames_per_window: 12,
            fcch_windows: 4,
            detector: DetectorConfig::default(),
        }
    }
}

fn mean_power(samples: &[Complex32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s.norm_sqr() as f64).sum::<f64>() / samples.len() as f64
}

/// Probe every channel of `band` and return those carrying an FCCH.
///
/// Each channel's power is measured first; only channels above the band's
/// mean power are searched for a frequency correction burst.
pub fn scan<S: SdrSource + ?Sized>(radio: &mut S, band: Band, config: &ScanConfig) -> Vec<Channel> {
    let rate = radio.sample_rate();
    let window = crate::frames_to_samples(config.frames_per_window, rate);
    let mut buf = vec![Complex32::new(0.0, 0.0); window];

    let mut powers = Vec::new();
    for arfcn in band.channels() {
        let freq = match arfcn_to_freq(arfcn, Some(band)) {
            Some((f, _)) => f,
            None => continue,
        };
        if let Err(e) = radio.tune(freq) {
            log::warn!("skipping channel {}: {}", arfcn, e);
            continue;
        }
        radio.flush(config.flush_count);
        let n = radio.read(&mut buf);
        let power = mean_power(&buf[..n]);
        log::trace!("chan {} ({:.1} MHz): power {:.2}", arfcn, freq / 1e6, power);
        powers.push((arfcn, freq, power));
    }

    if powers.is_empty() {
        return Vec::new();
    }
    let threshold = powers.iter().map(|&(_, _, p)| p).sum::<f64>() / powers.len() as f64;
    log::debug!("{}: {} channels, power threshold {:.2}", band, powers.len(), threshold);

    let mut detector = FcchDetector::new(config.detector.clone(), rate);
    let mut found = Vec::new();
    for (arfcn, freq, power) in powers {
        if power <= threshold {
            continue;
        }
        if let Err(e) = radio.tune(freq) {
            log::warn!("skipping channel {}: {}", arfcn, e);
            continue;
        }
        radio.flush(config.flush_count);

        for _ in 0..config.fcch_windows {
            let n = radio.read(&mut buf);
            if let Some(d) = detector.detect(&buf[..n]) {
                log::info!(
                    "\tchan: {} ({:.1}MHz {:+.3}kHz)\tpower: {:.2}",
                    arfcn,
                    freq / 1e6,
                    d.offset_hz / 1e3,
                    power
                );
                found.push(Channel {
                    arfcn,
                    band,
                    freq,
                    offset_hz: d.offset_hz,
                    power,
                });
                break;
            }
        }
    }
    found
}
