//! NaN-aware band statistics and the per-date statistics table

use crate::io::weather::{WeatherLookup, WeatherObservation};
use crate::types::{DatedRaster, Polarization};
use chrono::NaiveDate;
use num_traits::Float;
use serde::Serialize;

/// Summary of the non-NaN samples of a band
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandStatistics {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation
    pub std: f64,
    /// Number of non-NaN samples
    pub valid: usize,
    /// Number of samples inspected, NaN included
    pub total: usize,
}

impl BandStatistics {
    /// Statistics over `values` with NaN entries skipped.
    ///
    /// Only NaN is nodata: infinities (such as the dB value of a zero
    /// intensity) take part in the statistics. Returns `None` when every
    /// value is NaN.
    pub fn compute<T, I>(values: I) -> Option<Self>
    where
        T: Float,
        I: IntoIterator<Item = T>,
    {
        let mut total = 0usize;
        let mut valid = 0usize;
        let mut sum = 0.0f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut samples = Vec::new();

        for value in values {
            total += 1;
            let v = match value.to_f64() {
                Some(v) if !v.is_nan() => v,
                _ => continue,
            };
            valid += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
            samples.push(v);
        }

        if valid == 0 {
            return None;
        }

        let mean = sum / valid as f64;
        let variance = samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / valid as f64;

        Some(Self {
            mean,
            min,
            max,
            std: variance.sqrt(),
            valid,
            total,
        })
    }

    /// Fraction of inspected samples that were NaN
    pub fn nodata_fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.total - self.valid) as f64 / self.total as f64
    }
}

/// One row of the statistics table
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatisticsRecord {
    pub date: NaiveDate,
    pub vv: Option<BandStatistics>,
    pub vh: Option<BandStatistics>,
}

/// A statistics row joined with the weather observed on the same day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRecord {
    pub statistics: StatisticsRecord,
    pub weather: Option<WeatherObservation>,
}

/// Stateless per-date statistics of the VV and VH bands
pub struct StatisticsReporter;

impl StatisticsReporter {
    /// Statistics for one frame
    pub fn frame_record(frame: &DatedRaster) -> StatisticsRecord {
        StatisticsRecord {
            date: frame.date,
            vv: BandStatistics::compute(frame.raster.band(Polarization::VV).iter().copied()),
            vh: BandStatistics::compute(frame.raster.band(Polarization::VH).iter().copied()),
        }
    }

    /// One record per frame, in the order given
    pub fn report<'a, I>(frames: I) -> Vec<StatisticsRecord>
    where
        I: IntoIterator<Item = &'a DatedRaster>,
    {
        let records: Vec<StatisticsRecord> = frames.into_iter().map(Self::frame_record).collect();
        log::info!("Computed band statistics for {} dates", records.len());
        records
    }

    /// Join each record with the weather at `location` on the record's date
    pub fn merge_weather(
        records: &[StatisticsRecord],
        weather: &dyn WeatherLookup,
        location: (f64, f64),
    ) -> Vec<MergedRecord> {
        let merged: Vec<MergedRecord> = records
            .iter()
            .map(|record| MergedRecord {
                statistics: *record,
                weather: weather.lookup(record.date, location),
            })
            .collect();
        let missing = merged.iter().filter(|m| m.weather.is_none()).count();
        if missing > 0 {
            log::warn!("No weather observation for {} of {} dates", missing, merged.len());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoTransform, Raster};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_statistics_skip_nan() {
        let stats = BandStatistics::compute([1.0f32, f32::NAN, 3.0, 5.0]).unwrap();
        assert_abs_diff_eq!(stats.mean, 3.0);
        assert_abs_diff_eq!(stats.min, 1.0);
        assert_abs_diff_eq!(stats.max, 5.0);
        assert_abs_diff_eq!(stats.std, (8.0f64 / 3.0).sqrt(), epsilon = 1e-12);
        assert_eq!(stats.valid, 3);
        assert_abs_diff_eq!(stats.nodata_fraction(), 0.25);
    }

    #[test]
    fn test_infinity_is_a_sample_not_nodata() {
        let stats = BandStatistics::compute([f32::NEG_INFINITY, -10.0, f32::NAN, -12.0]).unwrap();
        assert_eq!(stats.valid, 3);
        assert_eq!(stats.total, 4);
        assert_abs_diff_eq!(stats.nodata_fraction(), 0.25);
        assert_eq!(stats.min, f64::NEG_INFINITY);
        assert_eq!(stats.mean, f64::NEG_INFINITY);
        assert_abs_diff_eq!(stats.max, -10.0);
    }

    #[test]
    fn test_all_nan_has_no_statistics() {
        assert!(BandStatistics::compute([f64::NAN, f64::NAN]).is_none());
        assert!(BandStatistics::compute(Vec::<f64>::new()).is_none());
    }

    #[test]
    fn test_report_preserves_order() {
        let raster = Raster::from_bands(
            array![[-20.0, -22.0], [f32::NAN, -24.0]],
            array![[-10.0, -12.0], [-14.0, -16.0]],
            GeoTransform::default(),
        )
        .unwrap();
        let frames: Vec<DatedRaster> = [3u32, 9, 15]
            .iter()
            .map(|d| DatedRaster::new(NaiveDate::from_ymd_opt(2020, 8, *d).unwrap(), "f", raster.clone()))
            .collect();

        let records = StatisticsReporter::report(&frames);
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].date, NaiveDate::from_ymd_opt(2020, 8, 15).unwrap());
        let vv = records[0].vv.unwrap();
        let vh = records[0].vh.unwrap();
        assert_abs_diff_eq!(vv.mean, -13.0);
        assert_abs_diff_eq!(vh.mean, -22.0);
        assert_eq!(vh.valid, 3);
    }
}
