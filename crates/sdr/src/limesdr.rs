// Copyright 2025-2026 CEMAXECUTER LLC

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_double, c_float, c_int, c_uint, c_void};
use std::ptr;

use crate::driver::{Driver, Range, StreamConfig, StreamStatus};

type LmsDevice = c_void;

// LimeSuite.h constants
const LMS_CH_RX: bool = false;
const LMS_CLOCK_EXTREF: usize = 6;
const BOARD_PARAM_DAC: u8 = 0;
const LMS_FMT_I16: c_int = 1;
const LMS_LINK_FMT_DEFAULT: c_int = 0;
const CHANNEL: usize = 0;

/// `lms_info_str_t`
type LmsInfoStr = [c_char; 256];
/// `lms_name_t`
type LmsName = [c_char; 16];

// Enough slots for every attached device / antenna port.
const MAX_DEVICES: usize = 8;
const MAX_ANTENNAS: usize = 12;

#[repr(C)]
struct LmsRange {
    min: c_double,
    max: c_double,
    step: c_double,
}

#[repr(C)]
struct LmsStream {
    handle: usize,
    is_tx: bool,
    channel: u32,
    fifo_size: u32,
    throughput_vs_latency: c_float,
    data_fmt: c_int,
    link_fmt: c_int,
}

#[repr(C)]
struct LmsStreamMeta {
    timestamp: u64,
    wait_for_timestamp: bool,
    flush_partial_packet: bool,
}

#[repr(C)]
#[derive(Default)]
struct LmsStreamStatus {
    active: bool,
    fifo_filled_count: u32,
    fifo_size: u32,
    underrun: u32,
    overrun: u32,
    dropped_packets: u32,
    sample_rate: c_double,
    link_rate: c_double,
    timestamp: u64,
}

extern "C" {
    fn LMS_GetDeviceList(dev_list: *mut LmsInfoStr) -> c_int;
    fn LMS_Open(device: *mut *mut LmsDevice, info: *const c_char, args: *mut c_void) -> c_int;
    fn LMS_Close(device: *mut LmsDevice) -> c_int;
    fn LMS_Init(device: *mut LmsDevice) -> c_int;
    fn LMS_SetClockFreq(device: *mut LmsDevice, clk_id: usize, freq: c_double) -> c_int;
    fn LMS_EnableChannel(device: *mut LmsDevice, dir_tx: bool, chan: usize, enabled: bool) -> c_int;
    fn LMS_GetSampleRateRange(device: *mut LmsDevice, dir_tx: bool, range: *mut LmsRange) -> c_int;
    fn LMS_SetSampleRate(device: *mut LmsDevice, rate: c_double, oversample: usize) -> c_int;
    fn LMS_GetSampleRate(
        device: *mut LmsDevice,
        dir_tx: bool,
        chan: usize,
        host_hz: *mut c_double,
        rf_hz: *mut c_double,
    ) -> c_int;
    fn LMS_SetLOFrequency(device: *mut LmsDevice, dir_tx: bool, chan: usize, freq: c_double) -> c_int;
    fn LMS_GetLOFrequency(
        device: *mut LmsDevice,
        dir_tx: bool,
        chan: usize,
        freq: *mut c_double,
    ) -> c_int;
    fn LMS_GetAntennaList(device: *mut LmsDevice, dir_tx: bool, chan: usize, list: *mut LmsName) -> c_int;
    fn LMS_SetAntenna(device: *mut LmsDevice, dir_tx: bool, chan: usize, index: usize) -> c_int;
    fn LMS_SetGaindB(device: *mut LmsDevice, dir_tx: bool, chan: usize, gain: c_uint) -> c_int;
    fn LMS_VCTCXOWrite(device: *mut LmsDevice, val: u16) -> c_int;
    fn LMS_ReadCustomBoardParam(
        device: *mut LmsDevice,
        id: u8,
        val: *mut c_double,
        units: *mut c_char,
    ) -> c_int;
    fn LMS_SetupStream(device: *mut LmsDevice, stream: *mut LmsStream) -> c_int;
    fn LMS_DestroyStream(device: *mut LmsDevice, stream: *mut LmsStream) -> c_int;
    fn LMS_StartStream(stream: *mut LmsStream) -> c_int;
    fn LMS_StopStream(stream: *mut LmsStream) -> c_int;
    fn LMS_RecvStream(
        stream: *mut LmsStream,
        samples: *mut c_void,
        sample_count: usize,
        meta: *mut LmsStreamMeta,
        timeout_ms: c_uint,
    ) -> c_int;
    fn LMS_GetStreamStatus(stream: *mut LmsStream, status: *mut LmsStreamStatus) -> c_int;
    fn LMS_GetLastErrorMessage() -> *const c_char;
}

fn last_error() -> String {
    unsafe {
        let p = LMS_GetLastErrorMessage();
        if p.is_null() {
            "unknown error".to_string()
        } else {
            CStr::from_ptr(p).to_string_lossy().to_string()
        }
    }
}

fn check(r: c_int, call: &str) -> Result<(), String> {
    if r != 0 {
        Err(format!("{} failed: {}", call, last_error()))
    } else {
        Ok(())
    }
}

fn c_str(raw: &[c_char]) -> String {
    unsafe { CStr::from_ptr(raw.as_ptr()).to_string_lossy().to_string() }
}

/// LimeSuite-backed driver for LimeSDR USB / Mini boards.
pub struct LimeSuite {
    dev: *mut LmsDevice,
    // Boxed: LimeSuite keeps the stream address between setup and destroy.
    stream: Option<Box<LmsStream>>,
}

// The device pointer has a single owner; RadioSource serializes every call.
unsafe impl Send for LimeSuite {}

impl LimeSuite {
    pub fn new() -> Self {
        Self {
            dev: ptr::null_mut(),
            stream: None,
        }
    }

    fn device(&self) -> Result<*mut LmsDevice, String> {
        if self.dev.is_null() {
            Err("device not open".to_string())
        } else {
            Ok(self.dev)
        }
    }

    fn stream_ptr(&mut self) -> Result<*mut LmsStream, String> {
        self.stream
            .as_deref_mut()
            .map(|s| s as *mut LmsStream)
            .ok_or_else(|| "stream not set up".to_string())
    }
}

impl Default for LimeSuite {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for LimeSuite {
    fn device_list(&mut self) -> Result<Vec<String>, String> {
        let mut list: [LmsInfoStr; MAX_DEVICES] = [[0; 256]; MAX_DEVICES];
        let n = unsafe { LMS_GetDeviceList(list.as_mut_ptr()) };
        if n < 0 {
            return Err(format!("LMS_GetDeviceList failed: {}", last_error()));
        }
        Ok(list[..(n as usize).min(MAX_DEVICES)]
            .iter()
            .map(|info| c_str(info))
            .collect())
    }

    fn open(&mut self, info: &str) -> Result<(), String> {
        let info = CString::new(info).map_err(|e| format!("CString error: {}", e))?;
        let mut dev: *mut LmsDevice = ptr::null_mut();
        let r = unsafe { LMS_Open(&mut dev, info.as_ptr(), ptr::null_mut()) };
        if r != 0 {
            if !dev.is_null() {
                unsafe { LMS_Close(dev) };
            }
            return Err(format!("LMS_Open failed: {}", last_error()));
        }
        self.dev = dev;
        Ok(())
    }

    fn close(&mut self) {
        if self.dev.is_null() {
            return;
        }
        if let Some(mut stream) = self.stream.take() {
            unsafe {
                LMS_StopStream(&mut *stream);
                LMS_DestroyStream(self.dev, &mut *stream);
            }
        }
        unsafe { LMS_Close(self.dev) };
        self.dev = ptr::null_mut();
    }

    fn init(&mut self) -> Result<(), String> {
        let dev = self.device()?;
        check(unsafe { LMS_Init(dev) }, "LMS_Init")
    }

    fn set_ext_ref_clock(&mut self, freq: f64) -> Result<(), String> {
        let dev = self.device()?;
        check(
            unsafe { LMS_SetClockFreq(dev, LMS_CLOCK_EXTREF, freq) },
            "LMS_SetClockFreq",
        )
    }

    fn enable_rx_channel(&mut self, enable: bool) -> Result<(), String> {
        let dev = self.device()?;
        check(
            unsafe { LMS_EnableChannel(dev, LMS_CH_RX, CHANNEL, enable) },
            "LMS_EnableChannel",
        )
    }

    fn sample_rate_range(&mut self) -> Result<Range, String> {
        let dev = self.device()?;
        let mut range = LmsRange {
            min: 0.0,
            max: 0.0,
            step: 0.0,
        };
        check(
            unsafe { LMS_GetSampleRateRange(dev, LMS_CH_RX, &mut range) },
            "LMS_GetSampleRateRange",
        )?;
        Ok(Range {
            min: range.min,
            max: range.max,
            step: range.step,
        })
    }

    fn set_sample_rate(&mut self, rate: f64, oversample: usize) -> Result<(), String> {
        let dev = self.device()?;
        check(
            unsafe { LMS_SetSampleRate(dev, rate, oversample) },
            "LMS_SetSampleRate",
        )
    }

    fn sample_rate(&mut self) -> Result<(f64, f64), String> {
        let dev = self.device()?;
        let mut host: c_double = 0.0;
        let mut rf: c_double = 0.0;
        check(
            unsafe { LMS_GetSampleRate(dev, LMS_CH_RX, CHANNEL, &mut host, &mut rf) },
            "LMS_GetSampleRate",
        )?;
        Ok((host, rf))
    }

    fn set_lo_frequency(&mut self, freq: f64) -> Result<(), String> {
        let dev = self.device()?;
        check(
            unsafe { LMS_SetLOFrequency(dev, LMS_CH_RX, CHANNEL, freq) },
            "LMS_SetLOFrequency",
        )
    }

    fn lo_frequency(&mut self) -> Result<f64, String> {
        let dev = self.device()?;
        let mut freq: c_double = 0.0;
        check(
            unsafe { LMS_GetLOFrequency(dev, LMS_CH_RX, CHANNEL, &mut freq) },
            "LMS_GetLOFrequency",
        )?;
        Ok(freq)
    }

    fn antenna_list(&mut self) -> Result<Vec<String>, String> {
        let dev = self.device()?;
        let mut names: [LmsName; MAX_ANTENNAS] = [[0; 16]; MAX_ANTENNAS];
        let n = unsafe { LMS_GetAntennaList(dev, LMS_CH_RX, CHANNEL, names.as_mut_ptr()) };
        if n < 0 {
            return Err(format!("LMS_GetAntennaList failed: {}", last_error()));
        }
        Ok(names[..(n as usize).min(MAX_ANTENNAS)]
            .iter()
            .map(|name| c_str(name))
            .collect())
    }

    fn set_antenna(&mut self, index: usize) -> Result<(), String> {
        let dev = self.device()?;
        check(
            unsafe { LMS_SetAntenna(dev, LMS_CH_RX, CHANNEL, index) },
            "LMS_SetAntenna",
        )
    }

    fn set_gain_db(&mut self, gain: f64) -> Result<(), String> {
        let dev = self.device()?;
        // LimeSuite takes whole dB; negative values saturate to 0
        let r = unsafe { LMS_SetGaindB(dev, LMS_CH_RX, CHANNEL, gain.round() as c_uint) };
        if r < 0 {
            return Err(format!("LMS_SetGaindB failed: {}", last_error()));
        }
        Ok(())
    }

    fn write_vctcxo(&mut self, value: u16) -> Result<(), String> {
        let dev = self.device()?;
        check(unsafe { LMS_VCTCXOWrite(dev, value) }, "LMS_VCTCXOWrite")
    }

    fn read_board_dac(&mut self) -> Result<f64, String> {
        let dev = self.device()?;
        let mut value: c_double = 0.0;
        check(
            unsafe { LMS_ReadCustomBoardParam(dev, BOARD_PARAM_DAC, &mut value, ptr::null_mut()) },
            "LMS_ReadCustomBoardParam",
        )?;
        Ok(value)
    }

    fn setup_stream(&mut self, config: &StreamConfig) -> Result<(), String> {
        let dev = self.device()?;
        let mut stream = Box::new(LmsStream {
            handle: 0,
            is_tx: LMS_CH_RX,
            channel: CHANNEL as u32,
            fifo_size: config.fifo_size,
            throughput_vs_latency: config.throughput_vs_latency,
            data_fmt: LMS_FMT_I16,
            link_fmt: LMS_LINK_FMT_DEFAULT,
        });
        check(
            unsafe { LMS_SetupStream(dev, &mut *stream) },
            "LMS_SetupStream",
        )?;
        self.stream = Some(stream);
        Ok(())
    }

    fn start_stream(&mut self) -> Result<(), String> {
        let stream = self.stream_ptr()?;
        check(unsafe { LMS_StartStream(stream) }, "LMS_StartStream")
    }

    fn stop_stream(&mut self) -> Result<(), String> {
        let stream = self.stream_ptr()?;
        check(unsafe { LMS_StopStream(stream) }, "LMS_StopStream")
    }

    fn destroy_stream(&mut self) -> Result<(), String> {
        let dev = self.device()?;
        let stream = self.stream_ptr()?;
        let r = unsafe { LMS_DestroyStream(dev, stream) };
        self.stream = None;
        check(r, "LMS_DestroyStream")
    }

    fn recv_stream(&mut self, buf: &mut [i16], timeout_ms: u32) -> Result<usize, String> {
        let stream = self.stream_ptr()?;
        let mut meta = LmsStreamMeta {
            timestamp: 0,
            wait_for_timestamp: false,
            flush_partial_packet: false,
        };
        let n = unsafe {
            LMS_RecvStream(
                stream,
                buf.as_mut_ptr() as *mut c_void,
                buf.len() / 2,
                &mut meta,
                timeout_ms,
            )
        };
        if n < 0 {
            return Err(format!("LMS_RecvStream failed: {}", last_error()));
        }
        Ok(n as usize)
    }

    fn stream_status(&mut self) -> Result<StreamStatus, String> {
        let stream = self.stream_ptr()?;
        let mut status = LmsStreamStatus::default();
        check(
            unsafe { LMS_GetStreamStatus(stream, &mut status) },
            "LMS_GetStreamStatus",
        )?;
        Ok(StreamStatus {
            active: status.active,
            fifo_filled: status.fifo_filled_count,
            fifo_size: status.fifo_size,
            overrun: status.overrun,
            underrun: status.underrun,
            dropped_packets: status.dropped_packets,
        })
    }
}

impl Drop for LimeSuite {
    fn drop(&mut self) {
        self.close();
    }
}
