use chrono::{DateTime, Local};
use serde::Serialize;

/// One parsed measurement line, before it is accepted into the stream.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Local>,
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
}

impl Sample {
    /// Seconds since the Unix epoch, with sub-second precision.
    pub fn unix_time(&self) -> f64 {
        self.timestamp.timestamp_micros() as f64 / 1e6
    }
}

/// A sample accepted into the stream, stamped with session-relative timing.
/// Immutable once created.
#[derive(Clone, Debug, Serialize)]
pub struct Record {
    pub timestamp: DateTime<Local>,
    pub unix_time: f64,
    /// Seconds since the first record of the acquisition session.
    pub relative_time: f64,
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "t={:.3}s V={:.4} I={:.4} P={:.4}",
            self.relative_time, self.voltage, self.current, self.power
        )
    }
}

/// Messages the acquisition thread sends to its consumer.
#[derive(Clone, Debug)]
pub enum ReaderEvent {
    Record(Record),
    /// A user-presentable failure description. Sent at most once per session.
    Error(String),
}

/// Which measurement column an analysis operates on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SignalChannel {
    Voltage,
    Current,
    Power,
}
