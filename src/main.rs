//! Headless acquisition monitor.
//!
//! Usage: `edgemeter [device] [seconds]`. Streams records from the meter,
//! prints a line per second, and reports summary statistics plus a power
//! quality assessment at the end of the run.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use log::{info, warn};

use edgemeter::{
    analysis::{
        moving_average, recommendations, PowerQualityAnalyzer, SpectrumAnalyzer, SummaryStatistics,
    },
    available_ports, AcquisitionConfig, ReaderEvent, SerialReader, SignalChannel, StreamBuffer,
};

const DEFAULT_DEVICE: &str = "/dev/ttyACM0";
const STOP_TIMEOUT: Duration = Duration::from_secs(3);

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let device = args.next().unwrap_or_else(|| DEFAULT_DEVICE.to_string());
    let seconds: u64 = match args.next() {
        Some(raw) => raw.parse().context("run duration must be whole seconds")?,
        None => 30,
    };

    let ports = available_ports();
    if ports.is_empty() {
        warn!("no serial ports enumerated; trying {device} anyway");
    } else {
        info!("serial ports present: {}", ports.join(", "));
    }

    let config = AcquisitionConfig::default();
    let (tx, rx) = mpsc::channel();
    let reader = SerialReader::start(&device, &config, tx);
    info!("acquiring from {device} for {seconds} s");

    let mut buffer = StreamBuffer::new();
    let deadline = Instant::now() + Duration::from_secs(seconds);
    let mut next_report = Instant::now() + Duration::from_secs(1);
    let mut failure: Option<String> = None;

    while Instant::now() < deadline {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(ReaderEvent::Record(record)) => {
                buffer.append(&record);
            }
            Ok(ReaderEvent::Error(message)) => {
                failure = Some(message);
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
        if Instant::now() >= next_report {
            next_report += Duration::from_secs(1);
            if let Some((_, last)) = buffer.time_range() {
                println!("t={last:8.1}s  records={}", buffer.len());
            }
        }
    }

    reader.stop(STOP_TIMEOUT);

    if let Some(message) = failure {
        bail!("acquisition failed: {message}");
    }

    let snapshot = buffer.snapshot();
    let Some(stats) = SummaryStatistics::from_snapshot(&snapshot) else {
        bail!("not enough records for a summary ({} collected)", snapshot.len());
    };

    println!();
    println!(
        "records {}  duration {:.1} s  energy {:.4} Wh  charge {:.4} Ah",
        stats.count, stats.duration_seconds, stats.energy_wh, stats.charge_ah
    );
    println!(
        "voltage {:.3}..{:.3} V (mean {:.3})  current {:.3}..{:.3} A  power mean {:.3} W",
        stats.voltage.min,
        stats.voltage.max,
        stats.voltage.mean,
        stats.current.min,
        stats.current.max,
        stats.power.mean
    );

    if let Some(averaged) = moving_average(&snapshot.power, config.moving_average_window).last() {
        println!("averaged power (last {} samples) {averaged:.3} W", config.moving_average_window);
    }

    let spectrum = SpectrumAnalyzer::new(config.max_harmonics);
    if let Some(result) = spectrum.analyze(&snapshot, SignalChannel::Current, config.max_display_freq)
    {
        println!(
            "dominant load frequency {:.2} Hz  modulation depth {:.2} %",
            result.dominant_freq, result.modulation_depth_percent
        );
    }

    let quality = PowerQualityAnalyzer::default();
    if let Some(result) = quality.analyze(&snapshot, config.nominal_voltage) {
        println!(
            "ripple {:.1} mV ({:.3} %)  stability {}",
            result.ripple_mv, result.ripple_percent, result.stability
        );
        for line in recommendations(&result) {
            println!("  - {line}");
        }
    }

    Ok(())
}
