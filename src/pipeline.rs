/*!
 * End-to-end time-series analysis
 *
 * Loader -> [TemporalSmoother] -> QualityGate -> { StatisticsReporter,
 * IceThresholdEstimator -> FreezeDateDetector }. The reflector stage runs
 * independently on the unmasked input series.
 */

use crate::config::AnalyticsConfig;
use crate::core::aoi_mask::AoiMask;
use crate::core::freeze_detection::{FreezeDateDetector, FreezeEvent};
use crate::core::ice_threshold::{IceSeries, IceThresholdEstimator};
use crate::core::quality_gate::{QualityGate, Rejection};
use crate::core::reflector::{ReflectorFix, ReflectorLocator, ReflectorSample};
use crate::core::smoothing::TemporalSmoother;
use crate::core::statistics::{MergedRecord, StatisticsRecord, StatisticsReporter};
use crate::io::weather::WeatherLookup;
use crate::types::{RasterSeries, SarResult};

/// Consensus reflector position plus the values sampled there
#[derive(Debug, Clone)]
pub struct ReflectorResult {
    pub fix: ReflectorFix,
    pub samples: Vec<ReflectorSample>,
}

/// Everything one analysis run produces, in memory
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    /// Masked frames that passed the quality gate (smoothed first when enabled)
    pub accepted: RasterSeries,
    pub rejected: Vec<Rejection>,
    pub statistics: Vec<StatisticsRecord>,
    /// Statistics joined with weather, when a weather lookup is attached
    pub merged_statistics: Option<Vec<MergedRecord>>,
    pub ice: IceSeries,
    pub freeze_events: Vec<FreezeEvent>,
    pub reflector: Option<ReflectorResult>,
}

pub struct TimeseriesPipeline {
    config: AnalyticsConfig,
    weather: Option<Box<dyn WeatherLookup>>,
}

impl TimeseriesPipeline {
    pub fn new(config: AnalyticsConfig) -> SarResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            weather: None,
        })
    }

    /// Merge the statistics table with weather from `lookup`
    pub fn with_weather(mut self, lookup: Box<dyn WeatherLookup>) -> Self {
        self.weather = Some(lookup);
        self
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Run every analysis stage on an in-memory, date-sorted series
    pub fn analyze(&self, series: &RasterSeries, mask: &AoiMask) -> SarResult<AnalysisOutcome> {
        log::info!("Analyzing series of {} frames", series.len());

        let smoothed;
        let gate_input = if self.config.smoothing.enabled {
            smoothed = TemporalSmoother::new(self.config.smoothing.window)?.smooth(series)?;
            &smoothed
        } else {
            series
        };

        let gate = QualityGate::new(mask, self.config.quality.clone());
        let outcome = gate.filter(gate_input)?;

        let statistics = StatisticsReporter::report(&outcome.accepted);
        let merged_statistics = self
            .weather
            .as_deref()
            .map(|lookup| StatisticsReporter::merge_weather(&statistics, lookup, mask.center()));

        let ice = IceThresholdEstimator::new(self.config.ice.clone()).run(&outcome.accepted)?;
        let freeze_events = FreezeDateDetector::new(self.config.freeze.clone()).detect(&ice.mean_fractions());

        let reflector = if self.config.reflector.enabled {
            Some(self.locate_reflector(series)?)
        } else {
            None
        };

        Ok(AnalysisOutcome {
            accepted: outcome.accepted,
            rejected: outcome.rejected,
            statistics,
            merged_statistics,
            ice,
            freeze_events,
            reflector,
        })
    }

    /// Reflector fix over the latest frames of `series`, sampled at every frame
    pub fn locate_reflector(&self, series: &RasterSeries) -> SarResult<ReflectorResult> {
        let locator = ReflectorLocator::new(self.config.reflector.clone());
        let fix = locator.locate(series)?;
        let samples = locator.extract(series, fix.position)?;
        Ok(ReflectorResult { fix, samples })
    }
}

#[cfg(feature = "geotiff")]
mod disk {
    use super::{AnalysisOutcome, TimeseriesPipeline};
    use crate::core::aoi_mask::AoiMask;
    use crate::io::aoi::read_aoi;
    use crate::io::geotiff::{GeoTiffReader, GeoTiffWriter};
    use crate::io::series_loader::SeriesLoader;
    use crate::io::tables;
    use crate::types::SarResult;
    use std::path::Path;

    impl TimeseriesPipeline {
        /// Load `input_dir`, analyze it against the AOI at `aoi_path` and write
        /// every product under `output_dir`
        pub fn run<P, Q, R>(&self, input_dir: P, aoi_path: Q, output_dir: R) -> SarResult<AnalysisOutcome>
        where
            P: AsRef<Path>,
            Q: AsRef<Path>,
            R: AsRef<Path>,
        {
            let loader = SeriesLoader::from_config(&self.config.loader)?;
            let series = loader.load_dir(input_dir.as_ref(), &GeoTiffReader::new())?;
            let mask = AoiMask::new(read_aoi(aoi_path)?, self.config.quality.aoi_buffer)?;

            let outcome = self.analyze(&series, &mask)?;
            self.write_outputs(&outcome, output_dir.as_ref())?;
            Ok(outcome)
        }

        /// Write rasters to `masked/` and `ice/`, tables to the top level
        pub fn write_outputs(&self, outcome: &AnalysisOutcome, output_dir: &Path) -> SarResult<()> {
            let masked_dir = output_dir.join("masked");
            let ice_dir = output_dir.join("ice");
            std::fs::create_dir_all(&masked_dir)?;
            std::fs::create_dir_all(&ice_dir)?;

            let writer = GeoTiffWriter::new();
            for frame in outcome.accepted.iter() {
                writer.write_raster(&frame.raster, masked_dir.join(format!("{}_masked.tif", frame.name)))?;
            }
            for frame in &outcome.ice.frames {
                writer.write_band(
                    frame.fraction.view(),
                    &frame.transform,
                    &frame.projection,
                    ice_dir.join(format!("{}_ice.tif", frame.name)),
                )?;
            }

            tables::write_to_path(output_dir.join("statistics.csv"), |w| {
                tables::write_statistics(w, &outcome.statistics)
            })?;
            if let Some(merged) = &outcome.merged_statistics {
                tables::write_to_path(output_dir.join("statistics_weather.csv"), |w| {
                    tables::write_merged_statistics(w, merged)
                })?;
            }
            tables::write_to_path(output_dir.join("rejected.csv"), |w| {
                tables::write_rejections(w, &outcome.rejected)
            })?;
            tables::write_to_path(output_dir.join("ice_series.csv"), |w| {
                tables::write_ice_series(w, &outcome.ice.frames)
            })?;
            tables::write_to_path(output_dir.join("freeze_dates.csv"), |w| {
                tables::write_freeze_events(w, &outcome.freeze_events)
            })?;
            if let Some(reflector) = &outcome.reflector {
                tables::write_to_path(output_dir.join("reflector_observations.csv"), |w| {
                    tables::write_reflector_observations(w, &reflector.fix)
                })?;
                tables::write_to_path(output_dir.join("reflector_series.csv"), |w| {
                    tables::write_reflector_series(w, &reflector.samples)
                })?;
            }

            log::info!("All outputs written to {}", output_dir.display());
            Ok(())
        }
    }
}
