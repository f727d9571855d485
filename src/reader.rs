//! Background acquisition loop.
//!
//! One thread owns the port: it reads lines, parses them, applies rate
//! control, stamps session-relative timing, and pushes records to the
//! consumer over a channel. The consumer side (GUI, exporter, headless
//! monitor) never blocks the producer and vice versa.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::AcquisitionConfig;
use crate::parser::parse_line;
use crate::port::{PortAcquirer, ShutdownHandle};
use crate::sampler::RateController;
use crate::types::{ReaderEvent, Record};

/// Handle to a running acquisition session.
///
/// Owning the handle serializes the start/stop discipline: a new session can
/// only be started after `stop` has consumed the previous handle.
pub struct SerialReader {
    device: String,
    running: Arc<AtomicBool>,
    shutdown: ShutdownHandle,
    handle: Option<JoinHandle<()>>,
}

impl SerialReader {
    /// Spawn the acquisition thread. The port is opened on the thread; if
    /// every open strategy fails, exactly one [`ReaderEvent::Error`] is sent
    /// and the thread exits without entering the loop.
    pub fn start(device: &str, config: &AcquisitionConfig, events: Sender<ReaderEvent>) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let port = PortAcquirer::new(device, config.baud);
        let shutdown = port.shutdown_handle();
        let sampler = RateController::new(config.target_sample_rate, config.max_device_rate);

        let loop_running = running.clone();
        let handle = thread::spawn(move || run_loop(port, sampler, loop_running, events));

        Self {
            device: device.to_string(),
            running,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the session: clear the running flag, force-close the port to
    /// unblock a pending read, and wait up to `timeout` for the thread to
    /// finish. If it does not finish in time the thread is abandoned, never
    /// killed; its port handle has already been asked to close.
    pub fn stop(mut self, timeout: Duration) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.close_now();
        let Some(handle) = self.handle.take() else {
            return;
        };
        let deadline = Instant::now() + timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        if handle.is_finished() {
            let _ = handle.join();
            info!("acquisition thread for {} stopped", self.device);
        } else {
            warn!(
                "acquisition thread for {} did not stop within {:?}; abandoning it",
                self.device, timeout
            );
        }
    }
}

fn run_loop(
    mut port: PortAcquirer,
    mut sampler: RateController,
    running: Arc<AtomicBool>,
    events: Sender<ReaderEvent>,
) {
    if let Err(err) = port.open() {
        events.send(ReaderEvent::Error(err.to_string())).ok();
        return;
    }
    debug!(
        "acquisition on {} at effective {} Hz",
        port.device(),
        sampler.effective_rate()
    );

    // unix_time of the first accepted sample; anchors relative_time.
    let mut session_start: Option<f64> = None;

    while running.load(Ordering::SeqCst) {
        let line = match port.read_line() {
            Ok(Some(line)) => line,
            Ok(None) => continue, // timeout, no data yet
            Err(err) => {
                // A read failure caused by our own force-close during stop
                // is not reported.
                if running.load(Ordering::SeqCst) {
                    events
                        .send(ReaderEvent::Error(format!("serial read failed: {err}")))
                        .ok();
                }
                break;
            }
        };

        let Some(sample) = parse_line(&line) else {
            continue; // malformed line, skip
        };
        if !sampler.should_accept_sample() {
            continue;
        }

        let unix_time = sample.unix_time();
        let start = *session_start.get_or_insert(unix_time);
        let record = Record {
            timestamp: sample.timestamp,
            unix_time,
            relative_time: unix_time - start,
            voltage: sample.voltage,
            current: sample.current,
            power: sample.power,
        };
        if events.send(ReaderEvent::Record(record)).is_err() {
            // Consumer went away; nothing left to produce for.
            break;
        }
    }

    // Scoped-resource guarantee: the port closes on every exit path.
    port.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    const MISSING_DEVICE: &str = "/dev/edgemeter-test-nonexistent";

    #[test]
    fn failed_open_reports_one_error_and_exits() {
        let (tx, rx) = mpsc::channel();
        let reader = SerialReader::start(MISSING_DEVICE, &AcquisitionConfig::default(), tx);
        let event = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("reader should report the open failure");
        match event {
            ReaderEvent::Error(message) => {
                assert!(message.contains(MISSING_DEVICE), "{message}");
            }
            other => panic!("expected an error event, got {other:?}"),
        }
        // The thread exits on its own; no further events arrive.
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        reader.stop(Duration::from_secs(1));
    }

    #[test]
    fn stop_after_failed_open_joins_promptly() {
        let (tx, rx) = mpsc::channel();
        let reader = SerialReader::start(MISSING_DEVICE, &AcquisitionConfig::default(), tx);
        let _ = rx.recv_timeout(Duration::from_secs(10));
        let begun = Instant::now();
        reader.stop(Duration::from_secs(5));
        assert!(begun.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn dropping_the_consumer_ends_the_session() {
        let (tx, rx) = mpsc::channel();
        let reader = SerialReader::start(MISSING_DEVICE, &AcquisitionConfig::default(), tx);
        drop(rx);
        reader.stop(Duration::from_secs(5));
    }
}
