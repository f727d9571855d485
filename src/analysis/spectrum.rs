//! Frequency-spectrum analysis of the measurement stream.
//!
//! This telemetry is a DC rail with load-driven variation, not an AC
//! waveform, so the headline distortion figure is modulation depth
//! (std-dev over mean, in percent) rather than classical THD. A harmonic
//! decomposition with IEC 61000-3-2 per-order limits is available as an
//! opt-in second pass for signals that really are periodic.

use ndarray::Array1;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::Serialize;

use crate::buffer::BufferSnapshot;
use crate::types::SignalChannel;

/// Minimum record count for a meaningful spectrum.
const MIN_RECORDS: usize = 100;

/// Signals with less residual deviation than this (after DC removal) are
/// judged too flat to analyze.
const FLATNESS_THRESHOLD: f64 = 1e-4;

/// Mean magnitude below this is treated as zero when normalizing.
const MEAN_EPSILON: f64 = 1e-4;

/// IEC 61000-3-2 Class A current-harmonic limits, percent of fundamental.
pub const IEC_61000_3_2_LIMITS: [(usize, f64); 6] = [
    (3, 86.0),
    (5, 61.0),
    (7, 43.0),
    (9, 28.0),
    (11, 20.0),
    (13, 15.0),
];

/// One harmonic of the detected fundamental.
#[derive(Debug, Clone, Serialize)]
pub struct HarmonicComponent {
    /// 1 = fundamental, 2 = second harmonic, ...
    pub order: usize,
    pub frequency: f64,
    pub amplitude: f64,
    pub percent_of_fundamental: f64,
    pub phase_degrees: f64,
}

/// IEC limit check for a single harmonic order.
#[derive(Debug, Clone, Serialize)]
pub struct HarmonicCompliance {
    pub order: usize,
    pub measured_percent: f64,
    pub limit_percent: f64,
    pub compliant: bool,
    /// Remaining headroom below the limit; negative when exceeded.
    pub margin_percent: f64,
}

/// Spectrum of one measurement channel.
#[derive(Debug, Clone, Serialize)]
pub struct SpectrumResult {
    pub channel: SignalChannel,
    /// Largest-magnitude bin excluding DC, within the display ceiling.
    pub dominant_freq: f64,
    pub dominant_amplitude: f64,
    /// (std dev / mean) * 100; the distortion proxy for DC telemetry.
    pub modulation_depth_percent: f64,
    pub frequencies: Vec<f64>,
    pub magnitudes: Vec<f64>,
    /// Populated only by [`SpectrumAnalyzer::analyze_harmonics`].
    pub harmonics: Vec<HarmonicComponent>,
}

pub struct SpectrumAnalyzer {
    max_harmonics: usize,
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new(10)
    }
}

impl SpectrumAnalyzer {
    pub fn new(max_harmonics: usize) -> Self {
        Self { max_harmonics }
    }

    /// Compute the single-sided spectrum of `channel` up to
    /// `max_display_freq`. Returns `None` when the snapshot is too short,
    /// the timing is degenerate, or the signal is too flat — all expected
    /// conditions, not errors.
    pub fn analyze(
        &self,
        snapshot: &BufferSnapshot,
        channel: SignalChannel,
        max_display_freq: f64,
    ) -> Option<SpectrumResult> {
        self.spectrum(snapshot, channel, max_display_freq)
            .map(|s| s.result)
    }

    /// Like [`analyze`], then decompose the spectrum into harmonics of the
    /// detected fundamental. Only meaningful for genuinely periodic signals.
    ///
    /// [`analyze`]: SpectrumAnalyzer::analyze
    pub fn analyze_harmonics(
        &self,
        snapshot: &BufferSnapshot,
        channel: SignalChannel,
        max_display_freq: f64,
    ) -> Option<SpectrumResult> {
        let spectrum = self.spectrum(snapshot, channel, max_display_freq)?;
        let mut result = spectrum.result;
        let fundamental_freq = result.dominant_freq;
        let fundamental_amp = result.dominant_amplitude;
        if fundamental_freq <= 0.0 || fundamental_amp <= 0.0 {
            return Some(result);
        }

        let bin_width = 1.0 / (spectrum.n as f64 * spectrum.dt);
        let nyquist_bins = spectrum.n / 2;
        let mut harmonics = Vec::new();
        for order in 1..=self.max_harmonics {
            let frequency = fundamental_freq * order as f64;
            let bin = (frequency / bin_width).round() as usize;
            if bin == 0 || bin > nyquist_bins {
                break;
            }
            let value = spectrum.bins[bin];
            let amplitude = value.norm() * 2.0 / spectrum.n as f64;
            harmonics.push(HarmonicComponent {
                order,
                frequency,
                amplitude,
                percent_of_fundamental: amplitude / fundamental_amp * 100.0,
                phase_degrees: value.arg().to_degrees(),
            });
        }
        result.harmonics = harmonics;
        Some(result)
    }

    /// Check extracted harmonics against the IEC 61000-3-2 Class A limits.
    /// Orders without a tabulated limit are skipped.
    pub fn check_compliance(harmonics: &[HarmonicComponent]) -> Vec<HarmonicCompliance> {
        harmonics
            .iter()
            .filter_map(|harmonic| {
                let (_, limit) = IEC_61000_3_2_LIMITS
                    .iter()
                    .find(|(order, _)| *order == harmonic.order)?;
                Some(HarmonicCompliance {
                    order: harmonic.order,
                    measured_percent: harmonic.percent_of_fundamental,
                    limit_percent: *limit,
                    compliant: harmonic.percent_of_fundamental <= *limit,
                    margin_percent: limit - harmonic.percent_of_fundamental,
                })
            })
            .collect()
    }

    fn spectrum(
        &self,
        snapshot: &BufferSnapshot,
        channel: SignalChannel,
        max_display_freq: f64,
    ) -> Option<Spectrum> {
        let n = snapshot.len();
        if n < MIN_RECORDS {
            return None;
        }

        // Mean interval between consecutive samples.
        let dt = (snapshot.time[n - 1] - snapshot.time[0]) / (n - 1) as f64;
        if dt <= 0.0 {
            return None;
        }

        let signal = Array1::from_iter(snapshot.channel(channel).iter().copied());
        let mean = signal.mean().unwrap_or(0.0);
        // Analyze variation around the DC level, not the level itself.
        let ac = &signal - mean;
        let std_dev = ac.std(0.0);
        if std_dev < FLATNESS_THRESHOLD {
            return None;
        }

        // Hann window against spectral leakage, then forward FFT.
        let mut bins: Vec<Complex<f64>> = ac
            .iter()
            .enumerate()
            .map(|(i, &v)| Complex::new(v * hann(i, n), 0.0))
            .collect();
        FftPlanner::new().plan_fft_forward(n).process(&mut bins);

        // Single-sided spectrum, scaled to physical amplitude, limited to
        // the display ceiling.
        let bin_width = 1.0 / (n as f64 * dt);
        let mut frequencies = Vec::new();
        let mut magnitudes = Vec::new();
        for (k, value) in bins.iter().enumerate().take(n / 2 + 1) {
            let freq = k as f64 * bin_width;
            if freq > max_display_freq {
                break;
            }
            frequencies.push(freq);
            magnitudes.push(value.norm() * 2.0 / n as f64);
        }

        // Peak excluding the DC bin.
        let (dominant_freq, dominant_amplitude) = magnitudes
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, &mag)| (frequencies[k], mag))
            .unwrap_or((0.0, 0.0));

        let modulation_depth_percent = if mean > MEAN_EPSILON {
            std_dev / mean * 100.0
        } else {
            0.0
        };

        Some(Spectrum {
            result: SpectrumResult {
                channel,
                dominant_freq,
                dominant_amplitude,
                modulation_depth_percent,
                frequencies,
                magnitudes,
                harmonics: Vec::new(),
            },
            bins,
            n,
            dt,
        })
    }
}

/// Spectrum plus the raw FFT state the harmonic pass needs.
struct Spectrum {
    result: SpectrumResult,
    bins: Vec<Complex<f64>>,
    n: usize,
    dt: f64,
}

fn hann(i: usize, n: usize) -> f64 {
    use std::f64::consts::PI;
    if n < 2 {
        return 1.0;
    }
    0.5 * (1.0 - (2.0 * PI * i as f64 / (n - 1) as f64).cos())
}

/// Power factor over a snapshot: real power over apparent power, clamped to
/// [0, 1]. `None` when there is too little data or the apparent power is
/// effectively zero.
pub fn power_factor(snapshot: &BufferSnapshot) -> Option<f64> {
    if snapshot.len() < MIN_RECORDS {
        return None;
    }
    let v_rms = rms(&snapshot.voltage);
    let i_rms = rms(&snapshot.current);
    let apparent = v_rms * i_rms;
    if apparent < 1e-6 {
        return None;
    }
    let real = Array1::from_iter(snapshot.power.iter().copied())
        .mean()
        .unwrap_or(0.0);
    Some((real / apparent).abs().clamp(0.0, 1.0))
}

fn rms(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}
