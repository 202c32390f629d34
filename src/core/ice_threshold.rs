/*!
 * Seasonal adaptive ice threshold
 *
 * During the open-water months (July-October by default) every accepted frame
 * contributes the inflection point of a normal density fitted to its VV
 * backscatter. Once the season is over the mean inflection point becomes the
 * frozen threshold, which is then applied to every frame until the next
 * season has been accumulated. Rising VV over the frozen threshold indicates
 * ice and snow cover.
 *
 * The season bookkeeping is an immutable `SeasonalState` folded over the
 * frames in strictly increasing date order.
 */

use crate::config::IceConfig;
use crate::core::statistics::BandStatistics;
use crate::types::{DatedRaster, GeoTransform, RasterSeries, SarError, SarResult};
use chrono::{Datelike, NaiveDate};
use ndarray::{Array2, ArrayView2};
use statrs::distribution::{Continuous, Normal};

/// Season bookkeeping, advanced once per accepted frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeasonalState {
    /// Year of the season currently or last accumulated
    pub active_year: Option<i32>,
    pub accumulator_sum: f64,
    pub accumulator_count: usize,
    /// Threshold applied to frames; only changes when a season closes
    pub frozen_threshold: f64,
    /// Inside the accumulation window of the active season
    pub accumulating: bool,
    /// The next accumulation-start month may open a new season
    pub reset_armed: bool,
    /// Date of the last frame folded in
    pub last_date: Option<NaiveDate>,
}

impl SeasonalState {
    pub fn new(initial_threshold: f64) -> Self {
        Self {
            active_year: None,
            accumulator_sum: 0.0,
            accumulator_count: 0,
            frozen_threshold: initial_threshold,
            accumulating: false,
            reset_armed: true,
            last_date: None,
        }
    }

    /// Advance the state by one frame.
    ///
    /// `inflection` is only evaluated for frames inside the accumulation
    /// window of the active season. Frames must arrive in strictly increasing
    /// date order; anything else is an `OutOfOrder` error that must abort the run.
    pub fn step<F>(self, date: NaiveDate, config: &IceConfig, inflection: F) -> SarResult<Self>
    where
        F: FnOnce() -> SarResult<f64>,
    {
        if let Some(previous) = self.last_date {
            if date <= previous {
                return Err(SarError::OutOfOrder {
                    previous,
                    current: date,
                });
            }
        }

        let mut next = Self {
            last_date: Some(date),
            ..self
        };
        let (year, month) = (date.year(), date.month());

        let newer_year = next.active_year.map_or(true, |active| year > active);
        if month == config.accumulation_start_month && next.reset_armed && newer_year {
            log::info!("Starting ice season {} at {}", year, date);
            next.active_year = Some(year);
            next.accumulator_sum = 0.0;
            next.accumulator_count = 0;
            next.accumulating = true;
            next.reset_armed = false;
        }

        if next.active_year != Some(year) || !next.accumulating {
            return Ok(next);
        }

        if (config.accumulation_start_month..=config.accumulation_end_month).contains(&month) {
            match inflection() {
                Ok(point) => {
                    log::debug!("{}: inflection point {:.3} dB", date, point);
                    next.accumulator_sum += point;
                    next.accumulator_count += 1;
                }
                Err(e) => log::warn!("{}: no inflection point ({}); frame not accumulated", date, e),
            }
        } else if month > config.accumulation_end_month {
            next = next.close_season(year);
        }

        Ok(next)
    }

    /// Freeze the accumulated mean as the new threshold and re-arm the reset
    fn close_season(self, year: i32) -> Self {
        let mut next = Self {
            accumulating: false,
            reset_armed: true,
            ..self
        };
        if self.accumulator_count == 0 {
            let err = SarError::DataInsufficient(format!(
                "no inflection points accumulated for season {}",
                year
            ));
            log::warn!("{}; keeping threshold {:.3} dB", err, self.frozen_threshold);
        } else {
            next.frozen_threshold = self.accumulator_sum / self.accumulator_count as f64;
            log::info!(
                "Season {} closed: threshold {:.3} dB from {} frames",
                year,
                next.frozen_threshold,
                self.accumulator_count
            );
        }
        next
    }
}

/// Ice-fraction product of one frame
#[derive(Debug, Clone, PartialEq)]
pub struct IceFrame {
    pub date: NaiveDate,
    pub name: String,
    /// Threshold the ramp was centred on (dB)
    pub threshold: f64,
    /// Per-pixel ice fraction in [0, 1], NaN where VV is nodata
    pub fraction: Array2<f32>,
    /// Mean of the finite ice-fraction pixels (NaN when there are none)
    pub mean_fraction: f64,
    pub transform: GeoTransform,
    pub projection: String,
}

/// Output of a full estimator run
#[derive(Debug, Clone)]
pub struct IceSeries {
    pub frames: Vec<IceFrame>,
    pub final_state: SeasonalState,
}

impl IceSeries {
    /// `(date, mean ice fraction)` pairs for freeze detection
    pub fn mean_fractions(&self) -> Vec<(NaiveDate, f64)> {
        self.frames.iter().map(|f| (f.date, f.mean_fraction)).collect()
    }
}

/// Value at the steepest descent of the normal density fitted to `values`.
///
/// The density is sampled at `samples` evenly spaced points between the
/// observed minimum and maximum; the returned value is the sample at which the
/// forward difference of the density is most negative.
pub fn inflection_point(values: ArrayView2<'_, f32>, samples: usize) -> SarResult<f64> {
    let stats = BandStatistics::compute(values.iter().copied())
        .ok_or_else(|| SarError::DataInsufficient("VV band has no valid pixels".to_string()))?;
    if samples < 2 {
        return Err(SarError::DataInsufficient(format!(
            "need at least 2 density samples, got {}",
            samples
        )));
    }
    let normal = Normal::new(stats.mean, stats.std).map_err(|e| {
        SarError::DataInsufficient(format!("cannot fit a normal density (std {}): {}", stats.std, e))
    })?;

    let step = (stats.max - stats.min) / (samples - 1) as f64;
    let xs: Vec<f64> = (0..samples).map(|i| stats.min + i as f64 * step).collect();
    let density: Vec<f64> = xs.iter().map(|&x| normal.pdf(x)).collect();

    let mut best = 0usize;
    let mut steepest = f64::INFINITY;
    for (i, pair) in density.windows(2).enumerate() {
        let slope = pair[1] - pair[0];
        if slope < steepest {
            steepest = slope;
            best = i;
        }
    }
    Ok(xs[best])
}

/// Linear ramp of VV over `[threshold - half_width, threshold + half_width]` onto `[0, 1]`
pub fn ice_fraction(vv: ArrayView2<'_, f32>, threshold: f64, half_width: f64) -> Array2<f32> {
    let low = threshold - half_width;
    let high = threshold + half_width;
    vv.mapv(|value| {
        if value.is_nan() {
            return f32::NAN;
        }
        let v = value as f64;
        if v <= low {
            0.0
        } else if v >= high {
            1.0
        } else {
            ((v - low) / (high - low)) as f32
        }
    })
}

/// Applies the seasonal threshold to a date-ordered series of accepted frames
pub struct IceThresholdEstimator {
    config: IceConfig,
}

impl IceThresholdEstimator {
    pub fn new(config: IceConfig) -> Self {
        Self { config }
    }

    pub fn initial_state(&self) -> SeasonalState {
        SeasonalState::new(self.config.initial_threshold)
    }

    fn in_accumulation_window(&self, date: NaiveDate) -> bool {
        (self.config.accumulation_start_month..=self.config.accumulation_end_month).contains(&date.month())
    }

    /// Threshold and ice fraction for every frame of `series`
    pub fn run(&self, series: &RasterSeries) -> SarResult<IceSeries> {
        let frames = series.frames();
        log::info!("Estimating ice fractions for {} frames", frames.len());

        // Per-frame inflection points are independent; the seasonal fold is not.
        let samples = self.config.density_samples;
        let candidate = |frame: &DatedRaster| -> Option<SarResult<f64>> {
            self.in_accumulation_window(frame.date)
                .then(|| inflection_point(frame.raster.vv(), samples))
        };

        #[cfg(feature = "parallel")]
        let inflections: Vec<Option<SarResult<f64>>> = {
            use rayon::prelude::*;
            frames.par_iter().map(candidate).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let inflections: Vec<Option<SarResult<f64>>> = frames.iter().map(candidate).collect();

        let mut thresholds = Vec::with_capacity(frames.len());
        let final_state = frames.iter().zip(inflections).try_fold(
            self.initial_state(),
            |state, (frame, precomputed)| {
                let next = state.step(frame.date, &self.config, || {
                    precomputed.unwrap_or_else(|| inflection_point(frame.raster.vv(), samples))
                })?;
                thresholds.push(next.frozen_threshold);
                Ok::<_, SarError>(next)
            },
        )?;

        let half_width = self.config.ramp_half_width;
        let build = |(frame, threshold): (&DatedRaster, f64)| -> IceFrame {
            let fraction = ice_fraction(frame.raster.vv(), threshold, half_width);
            let mean_fraction = BandStatistics::compute(fraction.iter().copied())
                .map_or(f64::NAN, |s| s.mean);
            IceFrame {
                date: frame.date,
                name: frame.name.clone(),
                threshold,
                fraction,
                mean_fraction,
                transform: *frame.raster.transform(),
                projection: frame.raster.projection().to_string(),
            }
        };

        #[cfg(feature = "parallel")]
        let ice_frames: Vec<IceFrame> = {
            use rayon::prelude::*;
            frames
                .par_iter()
                .zip(thresholds.par_iter().copied())
                .map(build)
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let ice_frames: Vec<IceFrame> = frames.iter().zip(thresholds.iter().copied()).map(build).collect();

        Ok(IceSeries {
            frames: ice_frames,
            final_state,
        })
    }
}
