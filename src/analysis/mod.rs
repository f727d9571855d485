pub mod quality;
pub mod spectrum;
pub mod statistics;

pub use quality::{
    recommendations, PowerQualityAnalyzer, PowerQualityResult, QualityConfig, StabilityRating,
};
pub use spectrum::{
    power_factor, HarmonicComponent, HarmonicCompliance, SpectrumAnalyzer, SpectrumResult,
    IEC_61000_3_2_LIMITS,
};
pub use statistics::{moving_average, ChannelStats, SummaryStatistics};
