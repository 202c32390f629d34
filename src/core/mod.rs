//! Core time-series analytics modules

pub mod aoi_mask;
pub mod smoothing;
pub mod quality_gate;
pub mod statistics;
pub mod ice_threshold;
pub mod freeze_detection;
pub mod resample;
pub mod reflector;

// Re-export main types
pub use aoi_mask::{AoiMask, AoiPolygon};
pub use smoothing::TemporalSmoother;
pub use quality_gate::{GateOutcome, QualityGate, Rejection, RejectionReason};
pub use statistics::{BandStatistics, MergedRecord, StatisticsRecord, StatisticsReporter};
pub use ice_threshold::{IceFrame, IceSeries, IceThresholdEstimator, SeasonalState};
pub use freeze_detection::{FreezeDateDetector, FreezeEvent};
pub use resample::upsample_bilinear;
pub use reflector::{ReflectorFix, ReflectorLocator, ReflectorObservation, ReflectorSample};
