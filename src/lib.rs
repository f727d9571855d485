//! Serial power-telemetry acquisition and analysis.
//!
//! Data flows strictly downward: bytes from the device, lines, candidate
//! samples, rate-controlled records, the stream buffer, and finally the
//! on-demand analysis engines. Control flows upward only for
//! start/stop/error signaling.

pub mod analysis;
pub mod buffer;
pub mod config;
pub mod error;
pub mod parser;
pub mod port;
pub mod reader;
pub mod sampler;
pub mod types;

pub use analysis::{
    power_factor, recommendations, PowerQualityAnalyzer, PowerQualityResult, QualityConfig,
    SpectrumAnalyzer, SpectrumResult, StabilityRating, SummaryStatistics,
};
pub use buffer::{BufferSnapshot, StreamBuffer};
pub use config::AcquisitionConfig;
pub use error::{AcquireError, Result};
pub use parser::parse_line;
pub use port::{available_ports, PortAcquirer};
pub use reader::SerialReader;
pub use sampler::RateController;
pub use types::{ReaderEvent, Record, Sample, SignalChannel};
