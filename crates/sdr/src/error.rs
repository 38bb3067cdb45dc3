// Copyright 2025-2026 CEMAXECUTER LLC

//! Error types for the radio source.

use thiserror::Error;

/// Result type for radio source operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by [`RadioSource`](crate::radio::RadioSource).
///
/// Only `DeviceNotFound`, `Init` and `Tune` ever reach a caller. The stream,
/// local overrun and DAC conditions are logged where they happen and the
/// operation carries on; they exist here so log lines and tests can name them.
#[derive(Debug, Error)]
pub enum Error {
    /// The driver enumerated no device (or none matching the selector).
    #[error("no LimeSDR device found")]
    DeviceNotFound,

    /// Open, init, clock, channel enable or sample rate setup failed.
    #[error("device initialization failed: {0}")]
    Init(String),

    /// The LO frequency was rejected. `actual` is the read-back value.
    #[error("failed to tune to {requested:.0} Hz (device reports {actual:.0} Hz)")]
    Tune { requested: f64, actual: f64 },

    /// Stream status query failed.
    #[error("stream status unavailable: {0}")]
    Stream(String),

    /// Ring buffer full while filling; excess samples were dropped.
    #[error("local overrun: {dropped} samples dropped")]
    LocalOverrun { dropped: usize },

    /// VCTCXO trim read or write failed.
    #[error("DAC trim access failed: {0}")]
    Dac(String),
}
