pub mod driver;
pub mod error;
pub mod file;
#[cfg(feature = "limesdr")]
pub mod limesdr;
pub mod radio;
pub mod ring;

use num_complex::Complex32;

pub use driver::{Driver, Range, StreamConfig, StreamStatus};
pub use error::{Error, Result};
pub use file::{FileDriver, SampleFormat};
#[cfg(feature = "limesdr")]
pub use limesdr::LimeSuite;
pub use radio::{RadioConfig, RadioSource, RadioState};
pub use ring::RingBuffer;

/// Sample source consumed by offset measurement, scanning and calibration
pub trait SdrSource {
    /// Get the host sample rate in Hz
    fn sample_rate(&self) -> f64;

    /// Tune the receiver, returning the frequency actually set
    fn tune(&mut self, freq: f64) -> Result<f64>;

    /// Read up to `buf.len()` samples; may return fewer
    fn read(&mut self, buf: &mut [Complex32]) -> usize;

    /// Discard buffered samples plus the next `count` received
    fn flush(&mut self, count: usize);

    /// Write the oscillator trim DAC
    fn tune_dac(&mut self, value: u16);

    /// Read the oscillator trim DAC, 0.0 if unavailable
    fn get_dac(&mut self) -> f64;
}
