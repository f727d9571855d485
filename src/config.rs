use serde::Deserialize;

/// Immutable acquisition and analysis configuration.
///
/// Built once by the embedding application (GUI, exporter, headless monitor)
/// and passed by value at construction time. This crate never reads or
/// writes persisted settings itself.
#[derive(Debug, Clone, Deserialize)]
pub struct AcquisitionConfig {
    /// Serial baud rate. High-speed default for the ESP32-C3 USB-CDC link.
    #[serde(default = "default_baud")]
    pub baud: u32,

    /// Target sample rate in Hz. 0 accepts every sample the device sends.
    #[serde(default)]
    pub target_sample_rate: u32,

    /// Maximum rate the device firmware can deliver, in Hz.
    #[serde(default = "default_max_device_rate")]
    pub max_device_rate: u32,

    /// Expected supply voltage for quality analysis. `None` uses the
    /// measured mean.
    #[serde(default)]
    pub nominal_voltage: Option<f64>,

    /// Window length for the averaged-power readout.
    #[serde(default = "default_moving_average_window")]
    pub moving_average_window: usize,

    /// Upper frequency bound for reported spectra, in Hz.
    #[serde(default = "default_max_display_freq")]
    pub max_display_freq: f64,

    /// Highest harmonic order extracted by the harmonic decomposition.
    #[serde(default = "default_max_harmonics")]
    pub max_harmonics: usize,
}

fn default_baud() -> u32 {
    921_600
}

fn default_max_device_rate() -> u32 {
    400
}

fn default_moving_average_window() -> usize {
    100
}

fn default_max_display_freq() -> f64 {
    25.0
}

fn default_max_harmonics() -> usize {
    10
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            baud: default_baud(),
            target_sample_rate: 0,
            max_device_rate: default_max_device_rate(),
            nominal_voltage: None,
            moving_average_window: default_moving_average_window(),
            max_display_freq: default_max_display_freq(),
            max_harmonics: default_max_harmonics(),
        }
    }
}
