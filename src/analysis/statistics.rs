//! Summary statistics over a buffer snapshot.

use ndarray::ArrayView1;
use serde::Serialize;

use crate::buffer::BufferSnapshot;

/// Sample period assumed when timestamps are degenerate (~100 Hz firmware).
const ASSUMED_SAMPLE_PERIOD: f64 = 0.01;

/// Seconds per hour; converts integrated watt-seconds to watt-hours.
const SECONDS_PER_HOUR: f64 = 3600.0;

/// Per-channel descriptive statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator).
    pub std_dev: f64,
}

/// Full statistical summary of an acquisition, recomputed on demand.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryStatistics {
    pub count: usize,
    pub duration_seconds: f64,
    pub voltage: ChannelStats,
    pub current: ChannelStats,
    pub power: ChannelStats,
    /// Integrated energy in watt-hours.
    pub energy_wh: f64,
    /// Integrated charge in amp-hours.
    pub charge_ah: f64,
}

impl SummaryStatistics {
    /// Compute statistics from a snapshot. Fewer than two records is not an
    /// error; there is just nothing to report yet.
    pub fn from_snapshot(snapshot: &BufferSnapshot) -> Option<Self> {
        let n = snapshot.len();
        if n < 2 {
            return None;
        }

        let mut duration = snapshot.duration();
        if duration <= 0.0 {
            // Degenerate timestamps; estimate from the assumed device rate.
            duration = n as f64 * ASSUMED_SAMPLE_PERIOD;
        }

        // Trapezoidal integration. Each averaged pair is clamped to zero so
        // negative excursions from sensor zero-offset do not count as
        // returned energy.
        let mut energy_ws = 0.0;
        let mut charge_as = 0.0;
        for i in 1..n {
            let dt = snapshot.time[i] - snapshot.time[i - 1];
            let avg_power = ((snapshot.power[i] + snapshot.power[i - 1]) / 2.0).max(0.0);
            let avg_current = ((snapshot.current[i] + snapshot.current[i - 1]) / 2.0).max(0.0);
            energy_ws += avg_power * dt;
            charge_as += avg_current * dt;
        }

        Some(Self {
            count: n,
            duration_seconds: duration,
            voltage: channel_stats(&snapshot.voltage),
            current: channel_stats(&snapshot.current),
            power: channel_stats(&snapshot.power),
            energy_wh: energy_ws / SECONDS_PER_HOUR,
            charge_ah: charge_as / SECONDS_PER_HOUR,
        })
    }
}

fn channel_stats(values: &[f64]) -> ChannelStats {
    let view = ArrayView1::from(values);
    let mean = view.mean().unwrap_or(0.0);
    let std_dev = view.std(1.0);
    let (min, max) = values.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    });
    ChannelStats {
        min,
        max,
        mean,
        std_dev,
    }
}

/// Trailing moving average used for the averaged-power readout. Each output
/// point averages the last `window` values seen so far.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 || values.is_empty() {
        return values.to_vec();
    }
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, &value) in values.iter().enumerate() {
        sum += value;
        if i >= window {
            sum -= values[i - window];
        }
        let span = (i + 1).min(window);
        out.push(sum / span as f64);
    }
    out
}
