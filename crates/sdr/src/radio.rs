// Copyright 2025-2026 CEMAXECUTER LLC

//! Single owner of the radio and its sample buffer.
//!
//! The driver is not reentrant, so every hardware call goes through one
//! mutex. The lock is taken per call, never across a whole fill loop.
//! Buffer access (`fill`, `read`, `flush`, `buffer_mut`) needs `&mut self`,
//! which keeps callers from touching the ring while a fill is running.

use std::sync::{Mutex, MutexGuard, PoisonError};

use num_complex::Complex32;

use crate::driver::{Driver, StreamConfig, StreamStatus};
use crate::error::{Error, Result};
use crate::ring::RingBuffer;
use crate::SdrSource;

/// Boards whose external reference clock setup hangs the device.
const NO_EXT_REF_BOARD: &str = "LimeSDR Mini";

/// Consecutive empty receives tolerated before a fill gives up.
const MAX_EMPTY_RECVS: u32 = 10;

/// Construction parameters for [`RadioSource`].
#[derive(Debug, Clone)]
pub struct RadioConfig {
    /// Host sample rate to request
    pub sample_rate: f64,
    /// External reference clock in Hz, `None` for the internal TCXO
    pub external_ref: Option<f64>,
    /// Antenna selected at open
    pub antenna: String,
    /// RF oversampling factor
    pub oversample: usize,
    /// Complex samples per receive call
    pub samples_per_packet: usize,
    /// Ring buffer length (power of two)
    pub buffer_len: usize,
    /// Receive timeout per packet
    pub recv_timeout_ms: u32,
    /// Supported RX gain range in dB
    pub gain_range: (f64, f64),
    pub stream: StreamConfig,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 1_625_000.0 / 6.0,
            external_ref: None,
            antenna: "LNAH".to_string(),
            oversample: 32,
            samples_per_packet: 2040,
            buffer_len: 1 << 20,
            recv_timeout_ms: 100,
            gain_range: (0.0, 73.0),
            stream: StreamConfig::default(),
        }
    }
}

/// Lifecycle position of a [`RadioSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    Closed,
    Open,
    Tuned,
    Streaming,
}

struct Settings {
    state: RadioState,
    frequency: f64,
    gain: f64,
    antenna: Option<String>,
    dac: Option<u16>,
}

/// Exclusive owner of an SDR device and its receive ring buffer.
pub struct RadioSource<D: Driver> {
    dev: Mutex<D>,
    settings: Mutex<Settings>,
    config: RadioConfig,
    sample_rate: f64,
    ring: RingBuffer<Complex32>,
    packet: Vec<i16>,
}

impl<D: Driver> RadioSource<D> {
    /// Wrap a driver. Nothing touches the hardware until [`open`](Self::open).
    pub fn new(driver: D, config: RadioConfig) -> Self {
        let ring = RingBuffer::new(config.buffer_len);
        let packet = vec![0i16; config.samples_per_packet * 2];
        Self {
            dev: Mutex::new(driver),
            settings: Mutex::new(Settings {
                state: RadioState::Closed,
                frequency: 0.0,
                gain: 0.0,
                antenna: None,
                dac: None,
            }),
            config,
            sample_rate: 0.0,
            ring,
            packet,
        }
    }

    fn hw(&self) -> MutexGuard<'_, D> {
        self.dev.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settings(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Find, open and configure the device.
    ///
    /// `selector` picks the first device whose info string contains it;
    /// `None` takes the first device found. On failure the handle is closed
    /// again and the source stays `Closed`.
    pub fn open(&mut self, selector: Option<&str>) -> Result<()> {
        if self.state() != RadioState::Closed {
            return Ok(());
        }

        let devices = match self.hw().device_list() {
            Ok(list) => list,
            Err(e) => {
                log::error!("device enumeration failed: {}", e);
                Vec::new()
            }
        };
        log::info!("devices found: {}", devices.len());

        let info = devices
            .iter()
            .find(|info| selector.map_or(true, |s| info.contains(s)))
            .ok_or(Error::DeviceNotFound)?
            .clone();
        if devices.len() > 1 {
            log::info!("multiple devices attached, using the first match");
        }
        log::info!("device info: {}", info);

        self.hw().open(&info).map_err(Error::Init)?;

        if let Err(e) = self.configure(&info) {
            self.hw().close();
            return Err(e);
        }

        self.settings().state = RadioState::Open;

        let antenna = self.config.antenna.clone();
        self.set_antenna(&antenna);
        let (min, max) = self.config.gain_range;
        self.set_gain((min + max) / 2.0);

        Ok(())
    }

    fn configure(&mut self, info: &str) -> Result<()> {
        let mut dev = self.hw();

        dev.init().map_err(Error::Init)?;

        if info.contains(NO_EXT_REF_BOARD) {
            if self.config.external_ref.is_some() {
                log::warn!("{} does not support an external reference, ignoring", NO_EXT_REF_BOARD);
            }
        } else if let Some(ext_ref) = self.config.external_ref {
            // Setting the external clock directly can hang; reset it first
            dev.set_ext_ref_clock(-1.0)
                .map_err(|e| Error::Init(format!("failed to reset external clock: {}", e)))?;
            log::info!("setting external reference clock to {} Hz", ext_ref);
            dev.set_ext_ref_clock(ext_ref)
                .map_err(|e| Error::Init(format!("failed to set external clock: {}", e)))?;
        }

        dev.enable_rx_channel(true).map_err(Error::Init)?;

        let range = dev.sample_rate_range().map_err(Error::Init)?;
        log::info!(
            "sampling rate range: min={} max={} step={}",
            range.min,
            range.max,
            range.step
        );

        dev.set_sample_rate(self.config.sample_rate, self.config.oversample)
            .map_err(Error::Init)?;
        let (host, rf) = dev.sample_rate().map_err(Error::Init)?;
        drop(dev);

        if (host - self.config.sample_rate).abs() > 1.0 {
            log::info!(
                "sample rate: {} Hz (requested {} Hz, RF {} Hz)",
                host,
                self.config.sample_rate,
                rf
            );
        } else {
            log::info!("sample rate: {} Hz", host);
        }
        self.sample_rate = host;
        Ok(())
    }

    /// Tune the RX LO. The actual frequency is read back even when the
    /// request fails, and returned on success.
    pub fn tune(&self, freq: f64) -> Result<f64> {
        let (set, actual) = {
            let mut dev = self.hw();
            let set = dev.set_lo_frequency(freq);
            (set, dev.lo_frequency())
        };

        let actual = match actual {
            Ok(f) => f,
            Err(e) => {
                log::error!("failed to read back RX LO frequency: {}", e);
                0.0
            }
        };

        if let Err(e) = set {
            log::error!("failed to set RX LO frequency to {} Hz: {}", freq, e);
            return Err(Error::Tune {
                requested: freq,
                actual,
            });
        }

        log::debug!("tuned to {} Hz (requested {} Hz)", actual, freq);
        let mut s = self.settings();
        s.frequency = actual;
        if s.state == RadioState::Open {
            s.state = RadioState::Tuned;
        }
        Ok(actual)
    }

    /// Set RX gain in dB. Range checking is the caller's job.
    pub fn set_gain(&self, gain: f64) {
        let result = self.hw().set_gain_db(gain);
        match result {
            Ok(()) => self.settings().gain = gain,
            Err(e) => log::error!("error setting RX gain to {}: {}", gain, e),
        }
    }

    /// Select an RX antenna by its exact hardware name.
    pub fn set_antenna(&self, name: &str) {
        let mut dev = self.hw();
        let names = match dev.antenna_list() {
            Ok(names) => names,
            Err(e) => {
                log::error!("failed to list RX antennas: {}", e);
                return;
            }
        };

        let index = match names.iter().position(|n| n == name) {
            Some(i) => i,
            None => {
                log::error!("invalid RX antenna: {} (available: {})", name, names.join(", "));
                return;
            }
        };

        let result = dev.set_antenna(index);
        drop(dev);
        match result {
            Ok(()) => self.settings().antenna = Some(name.to_string()),
            Err(e) => log::error!("failed to set RX antenna {}: {}", name, e),
        }
    }

    /// Write the VCTCXO trim DAC. Failures are logged; read back with
    /// [`get_dac`](Self::get_dac) to confirm.
    pub fn tune_dac(&self, value: u16) {
        let result = self.hw().write_vctcxo(value);
        match result {
            Ok(()) => self.settings().dac = Some(value),
            Err(e) => log::error!("{}", Error::Dac(format!("write {}: {}", value, e))),
        }
        log::info!("VCTCXO DAC value set to: {}", self.get_dac());
    }

    /// Current trim DAC value, 0.0 when it cannot be read.
    pub fn get_dac(&self) -> f64 {
        match self.hw().read_board_dac() {
            Ok(v) => v,
            Err(e) => {
                log::error!("{}", Error::Dac(format!("read: {}", e)));
                0.0
            }
        }
    }

    /// Set up and start the RX stream. No-op when closed or already running.
    pub fn start(&self) {
        let mut s = self.settings();
        if matches!(s.state, RadioState::Closed | RadioState::Streaming) {
            return;
        }

        let mut dev = self.hw();
        if let Err(e) = dev.setup_stream(&self.config.stream) {
            log::error!("failed to set up RX stream: {}", e);
            return;
        }
        if let Err(e) = dev.start_stream() {
            log::error!("failed to start RX stream: {}", e);
            let _ = dev.destroy_stream();
            return;
        }
        s.state = RadioState::Streaming;
        log::debug!("RX stream started");
    }

    /// Stop and tear down the RX stream. No-op unless streaming.
    pub fn stop(&self) {
        let mut s = self.settings();
        if s.state != RadioState::Streaming {
            return;
        }

        let mut dev = self.hw();
        if let Err(e) = dev.stop_stream() {
            log::warn!("failed to stop RX stream: {}", e);
        }
        if let Err(e) = dev.destroy_stream() {
            log::warn!("failed to destroy RX stream: {}", e);
        }
        s.state = RadioState::Open;
        log::debug!("RX stream stopped");
    }

    /// Pull packets into the ring buffer until `num_samples` are buffered or
    /// the ring is full. Returns the number of hardware overruns reported.
    ///
    /// When the ring fills up the rest of the current packet is dropped and a
    /// local overrun warning is logged; the call still succeeds.
    pub fn fill(&mut self, num_samples: usize) -> u32 {
        let mut overruns = 0;
        let mut dropped = 0;
        let mut empty = 0;

        while self.ring.data_available() < num_samples && self.ring.space_available() > 0 {
            let received = {
                let mut dev = self.dev.lock().unwrap_or_else(PoisonError::into_inner);
                dev.recv_stream(&mut self.packet, self.config.recv_timeout_ms)
            };
            let received = match received {
                Ok(n) => n.min(self.packet.len() / 2),
                Err(e) => {
                    log::error!("RX receive failed: {}", e);
                    break;
                }
            };

            match self.hw().stream_status() {
                Ok(status) => {
                    if check_status(&status) {
                        overruns += 1;
                    }
                }
                Err(e) => log::warn!("{}", Error::Stream(e)),
            }

            if received == 0 {
                empty += 1;
                if empty >= MAX_EMPTY_RECVS {
                    log::warn!("no samples after {} receive timeouts", empty);
                    break;
                }
                continue;
            }
            empty = 0;

            let mut copied = 0;
            while copied < received {
                let region = self.ring.write_region();
                if region.is_empty() {
                    break;
                }
                let n = region.len().min(received - copied);
                for (i, out) in region[..n].iter_mut().enumerate() {
                    let j = (copied + i) * 2;
                    *out = Complex32::new(self.packet[j] as f32, self.packet[j + 1] as f32);
                }
                self.ring.commit(n);
                copied += n;
            }
            dropped += received - copied;
        }

        if self.ring.space_available() == 0 {
            log::warn!("{}", Error::LocalOverrun { dropped });
        }

        overruns
    }

    /// Fill, then copy up to `buf.len()` samples out. May return fewer.
    pub fn read(&mut self, buf: &mut [Complex32]) -> usize {
        self.fill(buf.len());
        self.ring.read(buf)
    }

    /// Discard buffered samples, pull `count` fresh ones and discard those too.
    pub fn flush(&mut self, count: usize) {
        self.ring.flush();
        self.fill(count);
        self.ring.flush();
    }

    /// Direct ring buffer access.
    pub fn buffer(&self) -> &RingBuffer<Complex32> {
        &self.ring
    }

    pub fn buffer_mut(&mut self) -> &mut RingBuffer<Complex32> {
        &mut self.ring
    }

    /// Negotiated host sample rate (0.0 before open).
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn state(&self) -> RadioState {
        self.settings().state
    }

    pub fn frequency(&self) -> f64 {
        self.settings().frequency
    }

    pub fn gain(&self) -> f64 {
        self.settings().gain
    }

    pub fn antenna(&self) -> Option<String> {
        self.settings().antenna.clone()
    }

    /// Last trim value written successfully.
    pub fn dac(&self) -> Option<u16> {
        self.settings().dac
    }
}

/// Log stream errors. Returns true when the hardware reported an overrun.
fn check_status(status: &StreamStatus) -> bool {
    if status.overrun > 0 {
        log::debug!("receive buffer is full (overrun: {})", status.overrun);
        true
    } else if status.underrun > 0 {
        log::debug!("receive buffer underrun: {}", status.underrun);
        false
    } else {
        false
    }
}

impl<D: Driver> SdrSource for RadioSource<D> {
    fn sample_rate(&self) -> f64 {
        RadioSource::sample_rate(self)
    }

    fn tune(&mut self, freq: f64) -> Result<f64> {
        RadioSource::tune(self, freq)
    }

    fn read(&mut self, buf: &mut [Complex32]) -> usize {
        RadioSource::read(self, buf)
    }

    fn flush(&mut self, count: usize) {
        RadioSource::flush(self, count)
    }

    fn tune_dac(&mut self, value: u16) {
        RadioSource::tune_dac(self, value)
    }

    fn get_dac(&mut self) -> f64 {
        RadioSource::get_dac(self)
    }
}

impl<D: Driver> Drop for RadioSource<D> {
    fn drop(&mut self) {
        if self.state() == RadioState::Closed {
            return;
        }
        self.stop();
        self.hw().close();
        self.settings().state = RadioState::Closed;
        log::debug!("radio closed");
    }
}
