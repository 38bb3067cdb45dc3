// Copyright 2025-2026 CEMAXECUTER LLC

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::PathBuf;

use crate::driver::{Driver, Range, StreamConfig, StreamStatus};

/// IQ sample format for file input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Complex int8 (CS8): pairs of i8
    Ci8,
    /// Complex int16 (CS16): pairs of i16, little-endian
    Ci16,
    /// Complex float32 (CF32): pairs of f32, little-endian
    Cf32,
}

impl SampleFormat {
    fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::Ci8 => 2,
            SampleFormat::Ci16 => 4,
            SampleFormat::Cf32 => 8,
        }
    }
}

/// Replays an IQ capture through the [`Driver`] interface.
///
/// The capture is served in receive-sized packets and rewinds at end of
/// file, so offset measurement and scans run offline. Tuning, gain and
/// trim writes are recorded but do not alter the samples.
pub struct FileDriver {
    path: PathBuf,
    format: SampleFormat,
    sample_rate: f64,
    reader: Option<BufReader<File>>,
    raw: Vec<u8>,
    lo_freq: f64,
    dac: u16,
    streaming: bool,
}

const ANTENNAS: [&str; 3] = ["LNAH", "LNAL", "LNAW"];

impl FileDriver {
    pub fn new(path: impl Into<PathBuf>, format: SampleFormat, sample_rate: f64) -> Self {
        Self {
            path: path.into(),
            format,
            sample_rate,
            reader: None,
            raw: Vec::new(),
            lo_freq: 0.0,
            dac: 0,
            streaming: false,
        }
    }

    fn reader(&mut self) -> Result<&mut BufReader<File>, String> {
        self.reader
            .as_mut()
            .ok_or_else(|| format!("{} not open", self.path.display()))
    }

    /// Fill `raw` with whole samples, rewinding once at end of file.
    fn read_raw(&mut self, num_samples: usize) -> io::Result<usize> {
        let bps = self.format.bytes_per_sample();
        self.raw.resize(num_samples * bps, 0);
        let reader = match self.reader.as_mut() {
            Some(r) => r,
            None => return Ok(0),
        };

        let mut filled = 0;
        let mut rewound = false;
        while filled < self.raw.len() {
            let n = reader.read(&mut self.raw[filled..])?;
            if n == 0 {
                if rewound || filled > 0 {
                    break;
                }
                log::debug!("end of file: {}, rewinding", self.path.display());
                reader.seek(SeekFrom::Start(0))?;
                rewound = true;
                continue;
            }
            filled += n;
        }
        Ok(filled / bps)
    }

    /// Convert `n` samples from `raw` into interleaved i16 pairs.
    fn convert(&self, out: &mut [i16], n: usize) {
        let raw = &self.raw;
        match self.format {
            SampleFormat::Ci8 => {
                for i in 0..n * 2 {
                    // Scale i8 [-128, 127] to i16 range by shifting left 8
                    out[i] = (raw[i] as i8 as i16) << 8;
                }
            }
            SampleFormat::Ci16 => {
                for i in 0..n * 2 {
                    out[i] = i16::from_le_bytes([raw[i * 2], raw[i * 2 + 1]]);
                }
            }
            SampleFormat::Cf32 => {
                for i in 0..n * 2 {
                    let b = i * 4;
                    let v = f32::from_le_bytes([raw[b], raw[b + 1], raw[b + 2], raw[b + 3]]);
                    // Convert float [-1, 1] to int16
                    out[i] = (v * 32767.0).clamp(-32768.0, 32767.0) as i16;
                }
            }
        }
    }
}

impl Driver for FileDriver {
    fn device_list(&mut self) -> Result<Vec<String>, String> {
        if self.path.is_file() {
            Ok(vec![format!("file:{}", self.path.display())])
        } else {
            Ok(Vec::new())
        }
    }

    fn open(&mut self, _info: &str) -> Result<(), String> {
        let file = File::open(&self.path)
            .map_err(|e| format!("failed to open {}: {}", self.path.display(), e))?;
        self.reader = Some(BufReader::with_capacity(1024 * 1024, file));
        log::info!(
            "replaying IQ from {} ({:?}, {} Hz)",
            self.path.display(),
            self.format,
            self.sample_rate
        );
        Ok(())
    }

    fn close(&mut self) {
        self.reader = None;
        self.streaming = false;
    }

    fn init(&mut self) -> Result<(), String> {
        self.reader()?;
        Ok(())
    }

    fn set_ext_ref_clock(&mut self, _freq: f64) -> Result<(), String> {
        Ok(())
    }

    fn enable_rx_channel(&mut self, _enable: bool) -> Result<(), String> {
        Ok(())
    }

    fn sample_rate_range(&mut self) -> Result<Range, String> {
        Ok(Range {
            min: self.sample_rate,
            max: self.sample_rate,
            step: 0.0,
        })
    }

    fn set_sample_rate(&mut self, rate: f64, _oversample: usize) -> Result<(), String> {
        if (rate - self.sample_rate).abs() > 1.0 {
            log::warn!(
                "capture rate is {} Hz, requested {} Hz; keeping capture rate",
                self.sample_rate,
                rate
            );
        }
        Ok(())
    }

    fn sample_rate(&mut self) -> Result<(f64, f64), String> {
        Ok((self.sample_rate, self.sample_rate))
    }

    fn set_lo_frequency(&mut self, freq: f64) -> Result<(), String> {
        self.lo_freq = freq;
        Ok(())
    }

    fn lo_frequency(&mut self) -> Result<f64, String> {
        Ok(self.lo_freq)
    }

    fn antenna_list(&mut self) -> Result<Vec<String>, String> {
        Ok(ANTENNAS.iter().map(|a| a.to_string()).collect())
    }

    fn set_antenna(&mut self, index: usize) -> Result<(), String> {
        if index < ANTENNAS.len() {
            Ok(())
        } else {
            Err(format!("no antenna at index {}", index))
        }
    }

    fn set_gain_db(&mut self, _gain: f64) -> Result<(), String> {
        Ok(())
    }

    fn write_vctcxo(&mut self, value: u16) -> Result<(), String> {
        self.dac = value;
        Ok(())
    }

    fn read_board_dac(&mut self) -> Result<f64, String> {
        Ok(self.dac as f64)
    }

    fn setup_stream(&mut self, _config: &StreamConfig) -> Result<(), String> {
        self.reader()?;
        Ok(())
    }

    fn start_stream(&mut self) -> Result<(), String> {
        self.streaming = true;
        Ok(())
    }

    fn stop_stream(&mut self) -> Result<(), String> {
        self.streaming = false;
        Ok(())
    }

    fn destroy_stream(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn recv_stream(&mut self, buf: &mut [i16], _timeout_ms: u32) -> Result<usize, String> {
        if !self.streaming {
            return Err("stream not started".to_string());
        }
        let n = self
            .read_raw(buf.len() / 2)
            .map_err(|e| format!("read error: {}", e))?;
        self.convert(buf, n);
        Ok(n)
    }

    fn stream_status(&mut self) -> Result<StreamStatus, String> {
        Ok(StreamStatus {
            active: self.streaming,
            ..StreamStatus::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_capture(name: &str, bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("kal-{}-{}.iq", name, std::process::id()));
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_ci16_replay_and_rewind() {
        let mut bytes = Vec::new();
        for v in [100i16, -100, 200, -200, 300, -300] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let path = temp_capture("ci16", &bytes);

        let mut drv = FileDriver::new(&path, SampleFormat::Ci16, 270_833.0);
        assert_eq!(drv.device_list().unwrap().len(), 1);
        drv.open("").unwrap();
        drv.setup_stream(&StreamConfig::default()).unwrap();
        drv.start_stream().unwrap();

        let mut buf = [0i16; 4];
        assert_eq!(drv.recv_stream(&mut buf, 100).unwrap(), 2);
        assert_eq!(buf, [100, -100, 200, -200]);

        // One sample left, then rewind on the next call
        assert_eq!(drv.recv_stream(&mut buf, 100).unwrap(), 1);
        assert_eq!(&buf[..2], &[300, -300]);
        assert_eq!(drv.recv_stream(&mut buf, 100).unwrap(), 2);
        assert_eq!(buf, [100, -100, 200, -200]);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_ci8_and_cf32_scaling() {
        let path = temp_capture("ci8", &[1u8, 0xff]);
        let mut drv = FileDriver::new(&path, SampleFormat::Ci8, 1.0);
        drv.open("").unwrap();
        drv.start_stream().unwrap();
        let mut buf = [0i16; 2];
        assert_eq!(drv.recv_stream(&mut buf, 100).unwrap(), 1);
        assert_eq!(buf, [256, -256]);
        std::fs::remove_file(path).ok();

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-2.0f32).to_le_bytes());
        let path = temp_capture("cf32", &bytes);
        let mut drv = FileDriver::new(&path, SampleFormat::Cf32, 1.0);
        drv.open("").unwrap();
        drv.start_stream().unwrap();
        assert_eq!(drv.recv_stream(&mut buf, 100).unwrap(), 1);
        assert_eq!(buf, [16383, -32768]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_file_lists_no_device() {
        let mut drv = FileDriver::new("/nonexistent/kal.iq", SampleFormat::Ci16, 1.0);
        assert!(drv.device_list().unwrap().is_empty());
        assert!(drv.open("").is_err());
    }

    #[test]
    fn test_trim_is_stored() {
        let mut drv = FileDriver::new("/nonexistent/kal.iq", SampleFormat::Ci16, 1.0);
        drv.write_vctcxo(125).unwrap();
        assert_eq!(drv.read_board_dac().unwrap(), 125.0);
    }
}
