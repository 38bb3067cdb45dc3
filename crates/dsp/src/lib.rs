pub mod fcch;
pub mod fft;
pub mod offset;
pub mod scan;
pub mod window;

pub use fcch::{DetectorConfig, Detection, FcchDetector};
pub use offset::{FcchOffset, OffsetConfig, OffsetError, OffsetMeasurement};
pub use scan::{scan, Channel, ScanConfig};

/// Samples in `frames` TDMA frames at `sample_rate`.
pub fn frames_to_samples(frames: usize, sample_rate: f64) -> usize {
    (frames as f64 * kal_gsm::FRAME_SECS * sample_rate).round() as usize
}
