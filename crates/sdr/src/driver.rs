// Copyright 2025-2026 CEMAXECUTER LLC

//! Device-control and streaming surface consumed by [`RadioSource`].
//!
//! Mirrors the subset of the LimeSuite API the receive path needs, always on
//! RX channel 0. Errors are plain strings carrying the driver's last error
//! message; [`RadioSource`] decides which of them are fatal.
//!
//! [`RadioSource`]: crate::radio::RadioSource

/// Inclusive range reported by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

/// RX stream setup parameters.
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    /// Driver-side FIFO size in samples
    pub fifo_size: u32,
    /// 0.0 favours latency, 1.0 favours throughput
    pub throughput_vs_latency: f32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            fifo_size: 1024 * 1024,
            throughput_vs_latency: 0.3,
        }
    }
}

/// Stream health counters returned by [`Driver::stream_status`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStatus {
    pub active: bool,
    pub fifo_filled: u32,
    pub fifo_size: u32,
    pub overrun: u32,
    pub underrun: u32,
    pub dropped_packets: u32,
}

/// Low-level SDR driver. Not reentrant: callers must serialize access.
pub trait Driver: Send {
    /// Info strings of every attached device.
    fn device_list(&mut self) -> Result<Vec<String>, String>;

    fn open(&mut self, info: &str) -> Result<(), String>;

    /// Release the device handle. Safe to call when nothing is open.
    fn close(&mut self);

    /// Load the default configuration.
    fn init(&mut self) -> Result<(), String>;

    /// Set the external reference clock frequency; `-1.0` resets it.
    fn set_ext_ref_clock(&mut self, freq: f64) -> Result<(), String>;

    fn enable_rx_channel(&mut self, enable: bool) -> Result<(), String>;

    fn sample_rate_range(&mut self) -> Result<Range, String>;

    /// Request a host sample rate with the given RF oversampling factor.
    fn set_sample_rate(&mut self, rate: f64, oversample: usize) -> Result<(), String>;

    /// Negotiated (host, RF) sample rates.
    fn sample_rate(&mut self) -> Result<(f64, f64), String>;

    fn set_lo_frequency(&mut self, freq: f64) -> Result<(), String>;

    fn lo_frequency(&mut self) -> Result<f64, String>;

    fn antenna_list(&mut self) -> Result<Vec<String>, String>;

    fn set_antenna(&mut self, index: usize) -> Result<(), String>;

    fn set_gain_db(&mut self, gain: f64) -> Result<(), String>;

    /// Write the VCTCXO trim DAC.
    fn write_vctcxo(&mut self, value: u16) -> Result<(), String>;

    /// Read back the board trim DAC parameter.
    fn read_board_dac(&mut self) -> Result<f64, String>;

    fn setup_stream(&mut self, config: &StreamConfig) -> Result<(), String>;

    fn start_stream(&mut self) -> Result<(), String>;

    fn stop_stream(&mut self) -> Result<(), String>;

    fn destroy_stream(&mut self) -> Result<(), String>;

    /// Receive interleaved I/Q `i16` pairs into `buf`, waiting at most
    /// `timeout_ms`. Returns the number of complex samples received.
    fn recv_stream(&mut self, buf: &mut [i16], timeout_ms: u32) -> Result<usize, String>;

    fn stream_status(&mut self) -> Result<StreamStatus, String>;
}
