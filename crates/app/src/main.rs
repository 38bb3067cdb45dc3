mod calibrate;

use clap::{ArgAction, Parser};
use std::path::PathBuf;

use calibrate::{CalibrationConfig, CalibrationController};
use kal_dsp::{FcchOffset, OffsetConfig, ScanConfig};
use kal_gsm::{arfcn_to_freq, freq_to_arfcn, Band, GSM_RATE};
use kal_sdr::{Driver, FileDriver, RadioConfig, RadioSource, SampleFormat};

#[derive(Parser, Debug)]
#[command(name = "kal")]
#[command(about = "GSM base station scanner and LimeSDR clock calibrator")]
struct Cli {
    /// Band to scan (GSM850, GSM900, EGSM, DCS, PCS)
    #[arg(short = 's', long)]
    scan: Option<Band>,

    /// Frequency of a nearby GSM base station in Hz
    #[arg(short = 'f', long)]
    freq: Option<f64>,

    /// Channel (ARFCN) of a nearby GSM base station
    #[arg(short = 'c', long)]
    chan: Option<u16>,

    /// Band indicator (GSM850, GSM900, EGSM, DCS, PCS)
    #[arg(short = 'b', long)]
    band: Option<Band>,

    /// Device selector, matched against the device info string
    #[arg(short = 'R', long)]
    device: Option<String>,

    /// RX antenna
    #[arg(short = 'A', long, default_value = "LNAH", value_parser = ["LNAH", "LNAL", "LNAW"])]
    antenna: String,

    /// RX gain in dB (0.0 - 73.0)
    #[arg(short = 'g', long, default_value_t = 36.5, value_parser = parse_gain)]
    gain: f64,

    /// FPGA master clock in Hz (reported only)
    #[arg(short = 'F', long, default_value_t = 30.72e6)]
    fpga_clock: f64,

    /// External reference clock in Hz; skips trim calibration
    #[arg(short = 'x', long)]
    external_ref: Option<f64>,

    /// Verbose output (repeat for more)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,

    /// Print the effective configuration
    #[arg(short = 'D', long)]
    debug: bool,

    /// IQ file to replay instead of live hardware
    #[arg(long)]
    iq_file: Option<PathBuf>,

    /// Sample format for file input: ci8, ci16, cf32
    #[arg(long, default_value = "ci16")]
    format: String,

    /// Sample rate of the IQ file in Hz
    #[arg(long, default_value_t = GSM_RATE)]
    rate: f64,

    /// FCCH detections averaged per offset measurement
    #[arg(long, default_value_t = 100)]
    avg_count: usize,

    /// Trim steps tried before giving up on the coarse search
    #[arg(long, default_value_t = 50, value_parser = parse_budget)]
    max_iterations: usize,
}

fn parse_gain(s: &str) -> Result<f64, String> {
    let gain: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if (0.0..=73.0).contains(&gain) {
        Ok(gain)
    } else {
        Err(format!("{} is outside 0.0 - 73.0", gain))
    }
}

fn parse_budget(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("at least one measurement is needed".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("{}", e)),
    }
}

/// What the run will do once the radio is up.
enum Task {
    Scan(Band),
    Offset { freq: f64, chan: Option<(u16, Band)> },
}

fn task(cli: &Cli) -> Result<Task, String> {
    if let Some(band) = cli.scan {
        return Ok(Task::Scan(band));
    }

    let freq = match (cli.freq, cli.chan) {
        (Some(f), _) => f,
        (None, Some(chan)) => match arfcn_to_freq(chan, cli.band) {
            Some((f, _)) => f,
            None => return Err(format!("bad channel: {}", chan)),
        },
        (None, None) => return Err("must enter channel or frequency".to_string()),
    };
    if !(869e6..=2e9).contains(&freq) {
        return Err(format!("bad frequency: {}", freq));
    }

    let chan = match cli.chan.and_then(|c| arfcn_to_freq(c, cli.band)) {
        Some((f, band)) if f == freq => cli.chan.map(|c| (c, band)),
        _ => freq_to_arfcn(freq),
    };
    Ok(Task::Offset { freq, chan })
}

fn sample_format(name: &str) -> Result<SampleFormat, String> {
    match name {
        "ci8" => Ok(SampleFormat::Ci8),
        "ci16" => Ok(SampleFormat::Ci16),
        "cf32" => Ok(SampleFormat::Cf32),
        other => Err(format!("unknown sample format: {} (use ci8, ci16, or cf32)", other)),
    }
}

fn run<D: Driver>(cli: &Cli, task: Task, driver: D) -> Result<(), String> {
    let config = RadioConfig {
        external_ref: cli.external_ref,
        antenna: cli.antenna.clone(),
        ..RadioConfig::default()
    };
    let mut radio = RadioSource::new(driver, config);
    radio
        .open(cli.device.as_deref())
        .map_err(|e| format!("radio open: {}", e))?;
    radio.set_gain(cli.gain);

    let (freq, chan) = match task {
        Task::Scan(band) => {
            radio.start();
            eprintln!("kal: Scanning for {} base stations.", band);
            let found = kal_dsp::scan(&mut radio, band, &ScanConfig::default());
            if found.is_empty() {
                eprintln!("no {} base stations found", band);
            }
            return Ok(());
        }
        Task::Offset { freq, chan } => (freq, chan),
    };

    radio.tune(freq).map_err(|e| format!("radio tune: {}", e))?;
    radio.start();

    eprintln!("kal: Calculating clock frequency offset.");
    match chan {
        Some((chan, band)) => eprintln!("Using {} channel {} ({:.1}MHz)", band, chan, freq / 1e6),
        None => eprintln!("Using {:.1}MHz", freq / 1e6),
    }

    let mut offset = FcchOffset::new(OffsetConfig {
        avg_count: cli.avg_count,
        ..OffsetConfig::default()
    });

    if cli.external_ref.is_some() {
        let off = offset.measure(&mut radio).map_err(|e| e.to_string())?;
        eprintln!(
            "offset: {:.3}Hz at {:.6}MHz ({:.3} ppm)",
            off,
            freq / 1e6,
            off as f64 / freq * 1e6
        );
        return Ok(());
    }

    let config = CalibrationConfig {
        max_iterations: cli.max_iterations,
        ..CalibrationConfig::default()
    };
    let cal = CalibrationController::new(config, offset)
        .run(&mut radio)
        .map_err(|e| e.to_string())?;
    log::debug!("{} measurements", cal.measurements);
    eprintln!(
        "Found lowest offset of {:.6}Hz at {:.6}MHz ({:.6} ppm) using DAC trim {}",
        cal.offset_hz,
        freq / 1e6,
        cal.offset_hz as f64 / freq * 1e6,
        cal.trim
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let task = match task(&cli) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    if cli.debug {
        eprintln!("debug: FPGA Master Clock Freq:\t{}", cli.fpga_clock);
        eprintln!(
            "debug: External Reference    :\t{}",
            if cli.external_ref.is_some() { "Yes" } else { "No" }
        );
        eprintln!("debug: Device Selector       :\t{}", cli.device.as_deref().unwrap_or(""));
        eprintln!("debug: Antenna               :\t{}", cli.antenna);
        eprintln!("debug: Gain                  :\t{}", cli.gain);
    }

    let result = if let Some(ref file) = cli.iq_file {
        sample_format(&cli.format).and_then(|format| run(&cli, task, FileDriver::new(file, format, cli.rate)))
    } else {
        live(&cli, task)
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "limesdr")]
fn live(cli: &Cli, task: Task) -> Result<(), String> {
    run(cli, task, kal_sdr::LimeSuite::new())
}

#[cfg(not(feature = "limesdr"))]
fn live(_cli: &Cli, _task: Task) -> Result<(), String> {
    Err("built without LimeSDR support; rebuild with --features limesdr or use --iq-file".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["kal"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["-c", "1"]);
        assert_eq!(cli.antenna, "LNAH");
        assert_eq!(cli.gain, 36.5);
        assert_eq!(cli.verbose, 0);
        assert_eq!(cli.max_iterations, 50);
        assert_eq!(cli.avg_count, 100);
    }

    #[test]
    fn test_rejects_bad_options() {
        assert!(Cli::try_parse_from(["kal", "-g", "80"]).is_err());
        assert!(Cli::try_parse_from(["kal", "-A", "LNAX"]).is_err());
        assert!(Cli::try_parse_from(["kal", "-s", "LTE"]).is_err());
        assert!(Cli::try_parse_from(["kal", "-c", "1", "--max-iterations", "0"]).is_err());
        assert_eq!(parse(&["-c", "1", "--max-iterations", "1"]).max_iterations, 1);
    }

    #[test]
    fn test_channel_task() {
        match task(&parse(&["-c", "3"])).unwrap() {
            Task::Offset { freq, chan } => {
                assert_eq!(freq, 935.6e6);
                assert_eq!(chan, Some((3, Band::Gsm900)));
            }
            Task::Scan(_) => panic!("expected offset task"),
        }

        match task(&parse(&["-c", "600", "-b", "PCS"])).unwrap() {
            Task::Offset { chan, .. } => assert_eq!(chan, Some((600, Band::Pcs))),
            Task::Scan(_) => panic!("expected offset task"),
        }
    }

    #[test]
    fn test_frequency_task() {
        match task(&parse(&["-f", "1842.6e6"])).unwrap() {
            Task::Offset { chan, .. } => assert_eq!(chan, Some((699, Band::Dcs))),
            Task::Scan(_) => panic!("expected offset task"),
        }
        assert!(task(&parse(&["-f", "100e6"])).is_err());
        assert!(task(&parse(&[])).is_err());
        assert!(task(&parse(&["-c", "300"])).is_err());
    }

    #[test]
    fn test_scan_task() {
        let cli = parse(&["-s", "egsm", "-vv"]);
        assert!(matches!(task(&cli), Ok(Task::Scan(Band::Egsm))));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_sample_format() {
        assert_eq!(sample_format("cf32"), Ok(SampleFormat::Cf32));
        assert!(sample_format("cu8").is_err());
    }
}
