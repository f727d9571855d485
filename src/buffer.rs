//! Append-only store for accepted records.
//!
//! Columns grow with O(1) amortized appends; read-only column views are
//! rebuilt lazily so a burst of appends with no reader pays nothing.

use std::sync::Arc;

use crate::types::{Record, SignalChannel};

/// Monotonic-time column store. Single writer; readers take [`snapshot`]s.
///
/// [`snapshot`]: StreamBuffer::snapshot
#[derive(Debug, Default)]
pub struct StreamBuffer {
    time: Vec<f64>,
    voltage: Vec<f64>,
    current: Vec<f64>,
    power: Vec<f64>,
    /// `unix_time` of the first stored record of this session.
    start_unix: Option<f64>,
    /// Rebuilt on demand; `None` marks it stale.
    cache: Option<ColumnViews>,
}

#[derive(Debug, Clone)]
struct ColumnViews {
    time: Arc<[f64]>,
    voltage: Arc<[f64]>,
    current: Arc<[f64]>,
    power: Arc<[f64]>,
}

/// Immutable view of the buffer at a point in time.
///
/// Cheap to clone (shared column storage). The length is fixed when the
/// snapshot is taken; the buffer may keep growing underneath without
/// affecting existing snapshots.
#[derive(Debug, Clone)]
pub struct BufferSnapshot {
    pub time: Arc<[f64]>,
    pub voltage: Arc<[f64]>,
    pub current: Arc<[f64]>,
    pub power: Arc<[f64]>,
}

impl BufferSnapshot {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Elapsed relative time covered by the snapshot, in seconds.
    pub fn duration(&self) -> f64 {
        match (self.time.first(), self.time.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    pub fn channel(&self, channel: SignalChannel) -> &[f64] {
        match channel {
            SignalChannel::Voltage => &self.voltage,
            SignalChannel::Current => &self.current,
            SignalChannel::Power => &self.power,
        }
    }
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record. Records whose relative time does not advance past
    /// the last stored record are dropped silently; returns whether the
    /// record was stored.
    pub fn append(&mut self, record: &Record) -> bool {
        if let Some(&last) = self.time.last() {
            if record.relative_time <= last {
                return false;
            }
        }
        if self.start_unix.is_none() {
            self.start_unix = Some(record.unix_time);
        }
        self.time.push(record.relative_time);
        self.voltage.push(record.voltage);
        self.current.push(record.current);
        self.power.push(record.power);
        self.cache = None;
        true
    }

    /// Drop everything and start a fresh session.
    pub fn clear(&mut self) {
        self.time.clear();
        self.voltage.clear();
        self.current.clear();
        self.power.clear();
        self.start_unix = None;
        self.cache = None;
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// `unix_time` of the first stored record, if any.
    pub fn start_unix(&self) -> Option<f64> {
        self.start_unix
    }

    /// First and last stored relative times.
    pub fn time_range(&self) -> Option<(f64, f64)> {
        match (self.time.first(), self.time.last()) {
            (Some(&first), Some(&last)) => Some((first, last)),
            _ => None,
        }
    }

    /// Immutable view of the current contents. Rebuilds the shared column
    /// storage only when appends have happened since the last snapshot.
    pub fn snapshot(&mut self) -> BufferSnapshot {
        let views = match &self.cache {
            Some(views) => views.clone(),
            None => {
                let views = ColumnViews {
                    time: Arc::from(self.time.as_slice()),
                    voltage: Arc::from(self.voltage.as_slice()),
                    current: Arc::from(self.current.as_slice()),
                    power: Arc::from(self.power.as_slice()),
                };
                self.cache = Some(views.clone());
                views
            }
        };
        BufferSnapshot {
            time: views.time,
            voltage: views.voltage,
            current: views.current,
            power: views.power,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn record(relative_time: f64, voltage: f64) -> Record {
        Record {
            timestamp: Local::now(),
            unix_time: 1_700_000_000.0 + relative_time,
            relative_time,
            voltage,
            current: voltage / 10.0,
            power: voltage * voltage / 10.0,
        }
    }

    #[test]
    fn appends_keep_relative_time_strictly_increasing() {
        let mut buffer = StreamBuffer::new();
        assert!(buffer.append(&record(0.0, 5.0)));
        assert!(buffer.append(&record(0.01, 5.1)));
        assert!(!buffer.append(&record(0.01, 9.9)), "duplicate time stored");
        assert!(!buffer.append(&record(0.005, 9.9)), "regression stored");
        assert_eq!(buffer.len(), 2);
        let snap = buffer.snapshot();
        assert!(snap.time.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn snapshot_length_is_fixed_while_buffer_grows() {
        let mut buffer = StreamBuffer::new();
        for i in 0..10 {
            buffer.append(&record(i as f64 * 0.01, 5.0));
        }
        let snap = buffer.snapshot();
        assert_eq!(snap.len(), 10);
        for i in 10..20 {
            buffer.append(&record(i as f64 * 0.01, 5.0));
        }
        assert_eq!(snap.len(), 10);
        assert_eq!(buffer.len(), 20);
        assert_eq!(buffer.snapshot().len(), 20);
    }

    #[test]
    fn repeated_snapshots_without_appends_share_storage() {
        let mut buffer = StreamBuffer::new();
        buffer.append(&record(0.0, 5.0));
        let a = buffer.snapshot();
        let b = buffer.snapshot();
        assert!(Arc::ptr_eq(&a.voltage, &b.voltage));
        buffer.append(&record(0.01, 5.0));
        let c = buffer.snapshot();
        assert!(!Arc::ptr_eq(&a.voltage, &c.voltage));
    }

    #[test]
    fn clear_starts_a_new_session() {
        let mut buffer = StreamBuffer::new();
        buffer.append(&record(0.0, 5.0));
        assert!(buffer.start_unix().is_some());
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.start_unix().is_none());
        assert!(buffer.snapshot().is_empty());
        // A fresh session restarts from any time.
        assert!(buffer.append(&record(0.0, 4.0)));
    }

    #[test]
    fn time_range_and_duration() {
        let mut buffer = StreamBuffer::new();
        assert!(buffer.time_range().is_none());
        buffer.append(&record(1.0, 5.0));
        buffer.append(&record(3.5, 5.0));
        assert_eq!(buffer.time_range(), Some((1.0, 3.5)));
        assert_eq!(buffer.snapshot().duration(), 2.5);
    }

    #[test]
    fn channel_selector_maps_columns() {
        let mut buffer = StreamBuffer::new();
        buffer.append(&record(0.0, 5.0));
        let snap = buffer.snapshot();
        assert_eq!(snap.channel(SignalChannel::Voltage), &[5.0][..]);
        assert_eq!(snap.channel(SignalChannel::Current), &[0.5][..]);
        assert_eq!(snap.channel(SignalChannel::Power), &[2.5][..]);
    }
}
