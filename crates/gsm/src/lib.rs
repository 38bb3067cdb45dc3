use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// GSM symbol rate in Hz (13 MHz / 48)
pub const GSM_RATE: f64 = 1_625_000.0 / 6.0;

/// Frequency correction burst tone relative to the carrier
pub const FCCH_TONE_HZ: f64 = GSM_RATE / 4.0;

/// TDMA frame length in bits (8 timeslots of 156.25)
pub const FRAME_BITS: usize = 1250;

/// TDMA frame duration in seconds (~4.615 ms)
pub const FRAME_SECS: f64 = FRAME_BITS as f64 / GSM_RATE;

const CHANNEL_SPACING_HZ: i64 = 200_000;

/// Band indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Gsm850,
    Gsm900,
    Egsm,
    Dcs,
    Pcs,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown band: {0}")]
pub struct ParseBandError(pub String);

impl Band {
    pub const ALL: [Band; 5] = [Band::Gsm850, Band::Gsm900, Band::Egsm, Band::Dcs, Band::Pcs];

    /// Every ARFCN belonging to the band, in ascending order.
    pub fn channels(self) -> Vec<u16> {
        match self {
            Band::Gsm850 => (128..=251).collect(),
            Band::Gsm900 => (1..=124).collect(),
            Band::Egsm => (0..=124).chain(975..=1023).collect(),
            Band::Dcs => (512..=885).collect(),
            Band::Pcs => (512..=810).collect(),
        }
    }

    pub fn contains(self, arfcn: u16) -> bool {
        match self {
            Band::Gsm850 => (128..=251).contains(&arfcn),
            Band::Gsm900 => (1..=124).contains(&arfcn),
            Band::Egsm => arfcn <= 124 || (975..=1023).contains(&arfcn),
            Band::Dcs => (512..=885).contains(&arfcn),
            Band::Pcs => (512..=810).contains(&arfcn),
        }
    }

    /// Downlink frequency in Hz, or `None` if `arfcn` is outside the band.
    pub fn downlink(self, arfcn: u16) -> Option<f64> {
        if !self.contains(arfcn) {
            return None;
        }
        let (base_hz, first) = self.raster(arfcn);
        Some((base_hz + CHANNEL_SPACING_HZ * (arfcn as i64 - first)) as f64)
    }

    /// Raster origin: (frequency of channel `first`, `first`)
    fn raster(self, arfcn: u16) -> (i64, i64) {
        match self {
            Band::Gsm850 => (869_200_000, 128),
            Band::Gsm900 => (935_000_000, 0),
            Band::Egsm if arfcn >= 975 => (935_000_000, 1024),
            Band::Egsm => (935_000_000, 0),
            Band::Dcs => (1_805_200_000, 512),
            Band::Pcs => (1_930_200_000, 512),
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Band::Gsm850 => "GSM-850",
            Band::Gsm900 => "GSM-900",
            Band::Egsm => "E-GSM-900",
            Band::Dcs => "DCS-1800",
            Band::Pcs => "PCS-1900",
        };
        f.write_str(name)
    }
}

impl FromStr for Band {
    type Err = ParseBandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GSM850" | "GSM-850" | "850" => Ok(Band::Gsm850),
            "GSM900" | "GSM-900" | "900" => Ok(Band::Gsm900),
            "EGSM" | "E-GSM" | "EGSM900" | "E-GSM900" | "E-GSM-900" => Ok(Band::Egsm),
            "DCS" | "DCS1800" | "DCS-1800" | "1800" => Ok(Band::Dcs),
            "PCS" | "PCS1900" | "PCS-1900" | "1900" => Ok(Band::Pcs),
            _ => Err(ParseBandError(s.to_string())),
        }
    }
}

/// Downlink frequency for an ARFCN.
///
/// Channels 512-810 are shared by DCS and PCS; they resolve to PCS only when
/// `hint` is `Some(Band::Pcs)`. Any hint that does not contain the channel is
/// ignored.
pub fn arfcn_to_freq(arfcn: u16, hint: Option<Band>) -> Option<(f64, Band)> {
    let band = match hint {
        Some(b) if b.contains(arfcn) => b,
        _ => match arfcn {
            128..=251 => Band::Gsm850,
            1..=124 => Band::Gsm900,
            0 | 975..=1023 => Band::Egsm,
            512..=885 => Band::Dcs,
            _ => return None,
        },
    };
    band.downlink(arfcn).map(|f| (f, band))
}

/// ARFCN whose downlink lies within 1 kHz of `freq`.
pub fn freq_to_arfcn(freq: f64) -> Option<(u16, Band)> {
    // E-GSM is split in two rasters; GSM-900 wins for channels 1-124
    const CANDIDATES: [(Band, u16); 6] = [
        (Band::Gsm850, 0),
        (Band::Gsm900, 0),
        (Band::Egsm, 0),
        (Band::Egsm, 975),
        (Band::Dcs, 0),
        (Band::Pcs, 0),
    ];

    for (band, floor) in CANDIDATES {
        let (base_hz, first) = band.raster(floor);
        let steps = ((freq - base_hz as f64) / CHANNEL_SPACING_HZ as f64).round() as i64;
        let n = steps + first;
        if !(0..=u16::MAX as i64).contains(&n) {
            continue;
        }
        let n = n as u16;
        if n < floor || !band.contains(n) {
            continue;
        }
        match band.downlink(n) {
            Some(f) if (f - freq).abs() <= 1_000.0 => return Some((n, band)),
            _ => {}
        }
    }
    None
}
