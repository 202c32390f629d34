//! Run configuration for the time-series engine
//!
//! Every threshold below was tuned empirically for boreal lakes observed by
//! Sentinel-1 and is exposed so that other regions can retune it. A config
//! file only needs the fields it overrides:
//!
//! ```json
//! { "quality": { "std_threshold": 12.0 }, "smoothing": { "enabled": true, "window": 4 } }
//! ```

use crate::types::{SarError, SarResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What to do when two input files carry the same acquisition date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the file encountered first in file-name order
    KeepFirst,
    /// Replace with the file encountered last in file-name order
    KeepLast,
    /// Fail the load with `DuplicateDate`
    Abort,
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        DuplicatePolicy::KeepFirst
    }
}

/// Input discovery and file-name schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Field separator inside the file stem
    pub separator: char,
    /// Field holding the `YYYYMMDD` token; negative values count from the end
    pub date_field: isize,
    /// File extension of input rasters (without the dot)
    pub extension: String,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            separator: '_',
            date_field: 0, // YYYYMMDD_processed.tif
            extension: "tif".to_string(),
            duplicate_policy: DuplicatePolicy::KeepFirst,
        }
    }
}

/// Moving-average smoothing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub enabled: bool,
    /// Number of observations averaged per output frame
    pub window: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window: 4,
        }
    }
}

/// AOI masking and frame acceptance criteria
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Inward buffer applied to the AOI polygon, in map units
    pub aoi_buffer: f64,
    /// Maximum VV standard deviation (dB)
    pub std_threshold: f64,
    /// Maximum fraction of nodata VV pixels inside the AOI
    pub nodata_threshold: f64,
    /// VV values below this are counted as implausibly low (dB)
    pub low_value_threshold: f64,
    /// Maximum fraction of implausibly low VV pixels inside the AOI
    pub low_fraction_threshold: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            aoi_buffer: 20.0,
            std_threshold: 15.0,
            nodata_threshold: 0.10,
            low_value_threshold: -49.0,
            low_fraction_threshold: 0.05,
        }
    }
}

/// Seasonal adaptive ice threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IceConfig {
    /// Threshold (dB) used until the first season has been accumulated
    pub initial_threshold: f64,
    /// Half width (dB) of the linear ramp mapping VV to ice fraction
    pub ramp_half_width: f64,
    /// First month of the open-water accumulation window
    pub accumulation_start_month: u32,
    /// Last month of the open-water accumulation window
    pub accumulation_end_month: u32,
    /// Number of samples of the fitted density used to locate the inflection point
    pub density_samples: usize,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            initial_threshold: -18.0,
            ramp_half_width: 0.7,
            accumulation_start_month: 7,
            accumulation_end_month: 10,
            density_samples: 100,
        }
    }
}

/// Sustained-freeze onset detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreezeConfig {
    /// Mean ice fraction that counts as frozen
    pub fraction_threshold: f64,
    /// Observations skipped after an onset is recorded
    pub cooldown: usize,
    /// First month of the winter window (wraps over the year end)
    pub winter_start_month: u32,
    /// Last month of the winter window
    pub winter_end_month: u32,
}

impl Default for FreezeConfig {
    fn default() -> Self {
        Self {
            fraction_threshold: 0.5,
            cooldown: 20,
            winter_start_month: 11,
            winter_end_month: 2,
        }
    }
}

/// Corner reflector localization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectorConfig {
    pub enabled: bool,
    /// Number of most recent frames used for localization
    pub frame_count: usize,
    /// Integer bilinear upsampling factor
    pub upscale_factor: usize,
    /// Coarse search radius around the frame center, in upsampled pixels
    pub search_radius: f64,
    /// Absolute z-score above which an observation is an outlier
    pub outlier_z: f64,
    /// Upper bound on hill-climb moves per frame
    pub max_fine_steps: usize,
}

impl Default for ReflectorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            frame_count: 20,
            upscale_factor: 10,
            search_radius: 100.0,
            outlier_z: 2.0,
            max_fine_steps: 10_000,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub loader: LoaderConfig,
    pub smoothing: SmoothingConfig,
    pub quality: QualityConfig,
    pub ice: IceConfig,
    pub freeze: FreezeConfig,
    pub reflector: ReflectorConfig,
}

impl AnalyticsConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> SarResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> SarResult<Self> {
        log::info!("Reading configuration from: {}", path.as_ref().display());
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Reject values that would make a stage meaningless
    pub fn validate(&self) -> SarResult<()> {
        if self.loader.extension.is_empty() {
            return invalid("loader.extension must not be empty");
        }
        if self.smoothing.window == 0 {
            return invalid("smoothing.window must be at least 1");
        }
        let q = &self.quality;
        if q.aoi_buffer < 0.0 {
            return invalid("quality.aoi_buffer must be non-negative");
        }
        if q.std_threshold <= 0.0 {
            return invalid("quality.std_threshold must be positive");
        }
        for (name, value) in [
            ("quality.nodata_threshold", q.nodata_threshold),
            ("quality.low_fraction_threshold", q.low_fraction_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(&format!("{} must lie in [0, 1], got {}", name, value));
            }
        }
        let ice = &self.ice;
        check_month("ice.accumulation_start_month", ice.accumulation_start_month)?;
        check_month("ice.accumulation_end_month", ice.accumulation_end_month)?;
        if ice.accumulation_start_month > ice.accumulation_end_month {
            return invalid("ice accumulation window must not wrap over the year end");
        }
        if ice.ramp_half_width <= 0.0 {
            return invalid("ice.ramp_half_width must be positive");
        }
        if ice.density_samples < 2 {
            return invalid("ice.density_samples must be at least 2");
        }
        check_month("freeze.winter_start_month", self.freeze.winter_start_month)?;
        check_month("freeze.winter_end_month", self.freeze.winter_end_month)?;
        let r = &self.reflector;
        if r.frame_count == 0 || r.upscale_factor == 0 || r.max_fine_steps == 0 {
            return invalid("reflector frame_count, upscale_factor and max_fine_steps must be at least 1");
        }
        if r.search_radius < 0.0 || r.outlier_z <= 0.0 {
            return invalid("reflector search_radius must be non-negative and outlier_z positive");
        }
        Ok(())
    }
}

fn check_month(name: &str, month: u32) -> SarResult<()> {
    if (1..=12).contains(&month) {
        Ok(())
    } else {
        invalid(&format!("{} must be a month number 1-12, got {}", name, month))
    }
}

fn invalid(message: &str) -> SarResult<()> {
    Err(SarError::InvalidConfig(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalyticsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.quality.std_threshold, 15.0);
        assert_eq!(config.freeze.cooldown, 20);
        assert_eq!(config.loader.duplicate_policy, DuplicatePolicy::KeepFirst);
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = AnalyticsConfig::from_json_str(
            r#"{ "quality": { "std_threshold": 12.5 },
                 "loader": { "duplicate_policy": "keep_last" },
                 "smoothing": { "enabled": true } }"#,
        )
        .unwrap();
        assert_eq!(config.quality.std_threshold, 12.5);
        assert_eq!(config.quality.nodata_threshold, 0.10);
        assert_eq!(config.loader.duplicate_policy, DuplicatePolicy::KeepLast);
        assert!(config.smoothing.enabled);
        assert_eq!(config.smoothing.window, 4);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = AnalyticsConfig::from_json_str(r#"{ "smoothing": { "window": 0 } }"#);
        assert!(matches!(err, Err(SarError::InvalidConfig(_))));

        let err = AnalyticsConfig::from_json_str(r#"{ "freeze": { "winter_start_month": 13 } }"#);
        assert!(matches!(err, Err(SarError::InvalidConfig(_))));

        let err = AnalyticsConfig::from_json_str(r#"{ "quality": { "nodata_threshold": 1.5 } }"#);
        assert!(matches!(err, Err(SarError::InvalidConfig(_))));
    }
}
