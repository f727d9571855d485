//! DC power-supply quality analysis: ripple, stability classification,
//! and load-regulation estimation from detected load steps.

use std::fmt;

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::buffer::BufferSnapshot;

/// Minimum record count for a quality analysis.
const MIN_RECORDS: usize = 10;

/// Ripple-percentage boundaries for the stability tiers.
const EXCELLENT_THRESHOLD: f64 = 0.05;
const GOOD_THRESHOLD: f64 = 0.1;
const FAIR_THRESHOLD: f64 = 1.0;

/// Four-tier stability classification by ripple percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StabilityRating {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl fmt::Display for StabilityRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StabilityRating::Excellent => "Excellent",
            StabilityRating::Good => "Good",
            StabilityRating::Fair => "Fair",
            StabilityRating::Poor => "Poor",
        };
        f.write_str(name)
    }
}

/// Windows and thresholds for the load-step heuristic. The defaults come
/// from empirical tuning on bench supplies; treat them as starting points,
/// not requirements.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Samples averaged before the step for the reference voltage.
    pub pre_step_window: usize,
    /// Rolling-window length used to judge "settled".
    pub settle_window: usize,
    /// How far past the step to scan for a settling point.
    pub settle_scan_limit: usize,
    /// Voltage std-dev (V) below which a window counts as settled.
    pub settle_std_threshold: f64,
    /// Offset used when no settling point is found within the scan.
    pub settle_fallback_offset: usize,
    /// Current first-difference threshold, in standard deviations.
    pub step_sigma: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            pre_step_window: 5,
            settle_window: 10,
            settle_scan_limit: 100,
            settle_std_threshold: 0.001,
            settle_fallback_offset: 20,
            step_sigma: 2.0,
        }
    }
}

/// Quality metrics of a DC rail over a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct PowerQualityResult {
    pub nominal_voltage: f64,
    pub min_voltage: f64,
    pub max_voltage: f64,
    /// Peak-to-peak variation as a percentage of nominal.
    pub ripple_percent: f64,
    /// Peak-to-peak variation in millivolts.
    pub ripple_mv: f64,
    /// RMS deviation from the mean (V).
    pub rms_noise: f64,
    pub std_deviation: f64,
    pub stability: StabilityRating,
    /// Voltage change across a detected load step, percent of nominal.
    /// `None` when no load step was detected.
    pub load_regulation_percent: Option<f64>,
    /// Time from the load step to the first settled window, in ms.
    pub settling_time_ms: Option<f64>,
    /// Ripple under 1 % (typical switching supply).
    pub meets_1percent_spec: bool,
    /// Ripple under 0.1 % (typical linear supply).
    pub meets_01percent_spec: bool,
    /// Ripple under 0.05 % (precision supply).
    pub meets_005percent_spec: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PowerQualityAnalyzer {
    config: QualityConfig,
}

impl PowerQualityAnalyzer {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Analyze voltage quality over a snapshot. `nominal_voltage` defaults
    /// to the observed mean when not supplied. Returns `None` when there is
    /// too little data or the nominal voltage is effectively zero.
    pub fn analyze(
        &self,
        snapshot: &BufferSnapshot,
        nominal_voltage: Option<f64>,
    ) -> Option<PowerQualityResult> {
        let n = snapshot.len();
        if n < MIN_RECORDS {
            return None;
        }

        let voltages = ArrayView1::from(&snapshot.voltage[..]);
        let v_mean = voltages.mean().unwrap_or(0.0);
        let v_std = voltages.std(0.0);
        let (v_min, v_max) = snapshot
            .voltage
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });

        let nominal = nominal_voltage.unwrap_or(v_mean);
        if nominal.abs() < 1e-9 {
            return None;
        }

        let ripple_v = v_max - v_min;
        let ripple_percent = ripple_v / nominal * 100.0;

        let rms_noise = (snapshot
            .voltage
            .iter()
            .map(|v| (v - v_mean).powi(2))
            .sum::<f64>()
            / n as f64)
            .sqrt();

        let stability = if ripple_percent < EXCELLENT_THRESHOLD {
            StabilityRating::Excellent
        } else if ripple_percent < GOOD_THRESHOLD {
            StabilityRating::Good
        } else if ripple_percent < FAIR_THRESHOLD {
            StabilityRating::Fair
        } else {
            StabilityRating::Poor
        };

        let (load_regulation_percent, settling_time_ms) = self.load_regulation(snapshot, nominal);

        Some(PowerQualityResult {
            nominal_voltage: nominal,
            min_voltage: v_min,
            max_voltage: v_max,
            ripple_percent,
            ripple_mv: ripple_v * 1000.0,
            rms_noise,
            std_deviation: v_std,
            stability,
            load_regulation_percent,
            settling_time_ms,
            meets_1percent_spec: ripple_percent < FAIR_THRESHOLD,
            meets_01percent_spec: ripple_percent < GOOD_THRESHOLD,
            meets_005percent_spec: ripple_percent < EXCELLENT_THRESHOLD,
        })
    }

    /// Load-regulation and settling-time estimate around the first detected
    /// load step. A step is the first index where the absolute current
    /// first-difference exceeds `step_sigma` standard deviations of current.
    /// `(None, None)` means no usable step, not an error.
    fn load_regulation(
        &self,
        snapshot: &BufferSnapshot,
        nominal: f64,
    ) -> (Option<f64>, Option<f64>) {
        let cfg = &self.config;
        let voltages = &snapshot.voltage;
        let currents = &snapshot.current;
        let n = voltages.len();

        let threshold = ArrayView1::from(&currents[..]).std(0.0) * cfg.step_sigma;
        let Some(step_idx) = currents
            .windows(2)
            .position(|w| (w[1] - w[0]).abs() > threshold)
        else {
            return (None, None);
        };

        // Need room for the pre-step window before and the settling scan
        // after; steps at either edge are not analyzable.
        if step_idx < cfg.pre_step_window || step_idx + cfg.settle_fallback_offset >= n {
            return (None, None);
        }

        let v_before = mean(&voltages[step_idx - cfg.pre_step_window..step_idx]);

        let scan_end = (step_idx + cfg.settle_scan_limit).min(n.saturating_sub(cfg.settle_window));
        let settling_idx = (step_idx + 1..scan_end)
            .find(|&i| {
                ArrayView1::from(&voltages[i..i + cfg.settle_window]).std(0.0)
                    < cfg.settle_std_threshold
            })
            .unwrap_or_else(|| (step_idx + cfg.settle_fallback_offset).min(n - 1));

        let after_end = (settling_idx + cfg.pre_step_window).min(n);
        let v_after = mean(&voltages[settling_idx..after_end]);

        let regulation = (v_after - v_before).abs() / nominal * 100.0;
        let settling_ms = (snapshot.time[settling_idx] - snapshot.time[step_idx]) * 1000.0;
        (Some(regulation), Some(settling_ms))
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Plain-language advice derived from a quality result, suitable for a
/// report footer.
pub fn recommendations(quality: &PowerQualityResult) -> Vec<String> {
    let mut advice = Vec::new();

    match quality.stability {
        StabilityRating::Excellent => {
            advice.push("Excellent voltage stability, suitable for precision applications".into());
        }
        StabilityRating::Good => {
            advice.push("Good voltage stability, suitable for most applications".into());
        }
        StabilityRating::Fair => {
            advice.push("Fair voltage stability, consider upgrading for sensitive loads".into());
            advice.push("Add output filtering capacitors to reduce ripple".into());
        }
        StabilityRating::Poor => {
            advice.push("Poor voltage stability, not recommended for sensitive electronics".into());
            advice.push("Consider replacing the power supply".into());
            advice.push("Add an LC filter to the output".into());
            advice.push("Check for loose connections or damaged components".into());
        }
    }

    if let Some(regulation) = quality.load_regulation_percent {
        if regulation < 0.5 {
            advice.push("Excellent load regulation".into());
        } else if regulation < 1.0 {
            advice.push("Good load regulation".into());
        } else if regulation < 3.0 {
            advice.push("Fair load regulation, voltage drops under load".into());
        } else {
            advice.push("Poor load regulation, significant voltage drop under load".into());
        }
    }

    if let Some(settling) = quality.settling_time_ms {
        if settling < 10.0 {
            advice.push("Fast transient response (under 10 ms)".into());
        } else if settling < 100.0 {
            advice.push("Good transient response (under 100 ms)".into());
        } else {
            advice.push("Slow transient response, may affect dynamic loads".into());
        }
    }

    advice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::StreamBuffer;
    use crate::types::Record;
    use chrono::Local;

    fn snapshot_from(points: &[(f64, f64, f64)]) -> BufferSnapshot {
        let mut buffer = StreamBuffer::new();
        for &(t, v, i) in points {
            buffer.append(&Record {
                timestamp: Local::now(),
                unix_time: 1_700_000_000.0 + t,
                relative_time: t,
                voltage: v,
                current: i,
                power: v * i,
            });
        }
        buffer.snapshot()
    }

    /// `count` samples at `dt` with voltage alternating `nominal +/- swing`.
    fn oscillating(nominal: f64, swing: f64, count: usize) -> BufferSnapshot {
        let points: Vec<_> = (0..count)
            .map(|i| {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                (i as f64 * 0.01, nominal + sign * swing, 0.5)
            })
            .collect();
        snapshot_from(&points)
    }

    #[test]
    fn too_few_records_yields_no_result() {
        let snapshot = oscillating(5.0, 0.001, 5);
        let analyzer = PowerQualityAnalyzer::default();
        assert!(analyzer.analyze(&snapshot, None).is_none());
    }

    #[test]
    fn tiny_ripple_classifies_as_excellent() {
        // +/- 0.001 V around 5 V is 0.04 % peak to peak.
        let snapshot = oscillating(5.0, 0.001, 50);
        let analyzer = PowerQualityAnalyzer::default();
        let result = analyzer.analyze(&snapshot, Some(5.0)).unwrap();
        assert_eq!(result.stability, StabilityRating::Excellent);
        assert!((result.ripple_percent - 0.04).abs() < 1e-9);
        assert!((result.ripple_mv - 2.0).abs() < 1e-9);
        assert!(result.meets_1percent_spec);
        assert!(result.meets_01percent_spec);
        assert!(result.meets_005percent_spec);
    }

    #[test]
    fn large_ripple_classifies_as_poor_with_no_compliance() {
        // +/- 2 % around 5 V is 4 % peak to peak.
        let snapshot = oscillating(5.0, 0.1, 50);
        let analyzer = PowerQualityAnalyzer::default();
        let result = analyzer.analyze(&snapshot, Some(5.0)).unwrap();
        assert_eq!(result.stability, StabilityRating::Poor);
        assert!(!result.meets_1percent_spec);
        assert!(!result.meets_01percent_spec);
        assert!(!result.meets_005percent_spec);
    }

    #[test]
    fn steady_load_reports_no_regulation() {
        let snapshot = oscillating(5.0, 0.001, 50);
        let analyzer = PowerQualityAnalyzer::default();
        let result = analyzer.analyze(&snapshot, Some(5.0)).unwrap();
        assert!(result.load_regulation_percent.is_none());
        assert!(result.settling_time_ms.is_none());
    }

    #[test]
    fn load_step_yields_regulation_and_settling() {
        // 30 samples at 0.1 A / 5.0 V, then 70 at 1.0 A / 4.9 V, 10 ms
        // apart. The 0.9 A step clears the 2-sigma threshold (~0.82 A) and
        // the voltage settles immediately after the step.
        let points: Vec<_> = (0..100)
            .map(|i| {
                let t = i as f64 * 0.01;
                if i < 30 {
                    (t, 5.0, 0.1)
                } else {
                    (t, 4.9, 1.0)
                }
            })
            .collect();
        let snapshot = snapshot_from(&points);
        let analyzer = PowerQualityAnalyzer::default();
        let result = analyzer.analyze(&snapshot, Some(5.0)).unwrap();

        // |4.9 - 5.0| / 5.0 = 2 %.
        let regulation = result.load_regulation_percent.unwrap();
        assert!((regulation - 2.0).abs() < 1e-9, "regulation {regulation}");
        // Settled at the first post-step index, one sample after the step.
        let settling = result.settling_time_ms.unwrap();
        assert!((settling - 10.0).abs() < 1e-6, "settling {settling} ms");
    }

    #[test]
    fn step_too_close_to_the_edge_is_skipped() {
        // Step at index 2, inside the pre-step window.
        let points: Vec<_> = (0..30)
            .map(|i| {
                let t = i as f64 * 0.01;
                if i < 2 {
                    (t, 5.0, 0.1)
                } else {
                    (t, 4.9, 1.0)
                }
            })
            .collect();
        let snapshot = snapshot_from(&points);
        let analyzer = PowerQualityAnalyzer::default();
        let result = analyzer.analyze(&snapshot, Some(5.0)).unwrap();
        assert!(result.load_regulation_percent.is_none());
    }

    #[test]
    fn recommendations_follow_the_rating() {
        let snapshot = oscillating(5.0, 0.1, 50);
        let analyzer = PowerQualityAnalyzer::default();
        let result = analyzer.analyze(&snapshot, Some(5.0)).unwrap();
        let advice = recommendations(&result);
        assert!(advice[0].contains("Poor"));
        assert!(advice.len() >= 4);
    }

    #[test]
    fn display_names_match_tiers() {
        assert_eq!(StabilityRating::Excellent.to_string(), "Excellent");
        assert_eq!(StabilityRating::Poor.to_string(), "Poor");
    }
}
