/*!
 * Frame-level quality gating
 *
 * Each frame is masked to the buffered AOI and then accepted or rejected
 * using VV/VH statistics computed over the pixels inside the AOI:
 * 1. degenerate capture (VV or VH mean exactly zero, or no valid pixel),
 * 2. excessive VV spread (miscalibration or residual speckle),
 * 3. too much VV nodata,
 * 4. too many implausibly low VV values.
 *
 * Rejections are logged and the frame dropped; they never abort the run.
 * Only an AOI that covers no pixel of a frame is fatal.
 */

use crate::config::QualityConfig;
use crate::core::aoi_mask::AoiMask;
use crate::core::statistics::BandStatistics;
use crate::types::{DatedRaster, Raster, RasterSeries, SarError, SarResult};
use chrono::NaiveDate;
use ndarray::{Array2, Axis, Zip};
use serde::Serialize;
use std::collections::HashMap;

/// Geotransform bits plus `(rows, cols)`: frames with equal keys share a mask
pub type GridKey = ([u64; 6], (usize, usize));

fn grid_key(raster: &Raster) -> GridKey {
    (raster.transform().to_gdal().map(f64::to_bits), raster.dim())
}

/// Why a frame was dropped
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum RejectionReason {
    /// Mean VV or VH is zero, or a band has no valid pixel inside the AOI
    Degenerate { vv_mean: f64, vh_mean: f64 },
    /// VV standard deviation above the limit
    HighVariance { std: f64 },
    /// Fraction of VV nodata inside the AOI above the limit
    ExcessNodata { fraction: f64 },
    /// Fraction of VV samples below the low-value threshold above the limit
    ExcessLowValues { fraction: f64 },
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::Degenerate { vv_mean, vh_mean } => {
                write!(f, "degenerate capture (VV mean {}, VH mean {})", vv_mean, vh_mean)
            }
            RejectionReason::HighVariance { std } => write!(f, "VV std {:.2} dB", std),
            RejectionReason::ExcessNodata { fraction } => {
                write!(f, "{:.1}% VV nodata", fraction * 100.0)
            }
            RejectionReason::ExcessLowValues { fraction } => {
                write!(f, "{:.1}% VV values implausibly low", fraction * 100.0)
            }
        }
    }
}

/// Outcome of gating one frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameVerdict {
    /// Masked frame, forwarded downstream
    Accepted(DatedRaster),
    Rejected {
        date: NaiveDate,
        name: String,
        reason: RejectionReason,
    },
}

/// Rejected frame record kept for reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub date: NaiveDate,
    pub name: String,
    pub reason: RejectionReason,
}

/// Accepted frames plus the rejection log
#[derive(Debug, Clone, Default)]
pub struct GateOutcome {
    pub accepted: RasterSeries,
    pub rejected: Vec<Rejection>,
}

/// Masks frames to the AOI and filters out unusable captures
pub struct QualityGate<'a> {
    mask: &'a AoiMask,
    config: QualityConfig,
}

impl<'a> QualityGate<'a> {
    pub fn new(mask: &'a AoiMask, config: QualityConfig) -> Self {
        Self { mask, config }
    }

    /// Set every pixel outside the AOI to NaN in both bands
    pub fn apply_mask(&self, frame: &DatedRaster) -> SarResult<(DatedRaster, Array2<bool>)> {
        let raster = &frame.raster;
        let keep = self.mask.rasterize(raster.transform(), raster.dim())?;
        let masked = self.mask_with(frame, &keep)?;
        Ok((masked, keep))
    }

    fn mask_with(&self, frame: &DatedRaster, keep: &Array2<bool>) -> SarResult<DatedRaster> {
        let raster = &frame.raster;
        let mut data = raster.data().clone();
        for mut band in data.axis_iter_mut(Axis(0)) {
            Zip::from(&mut band).and(keep).for_each(|value, &inside| {
                if !inside {
                    *value = f32::NAN;
                }
            });
        }
        Ok(DatedRaster::new(frame.date, frame.name.clone(), raster.with_data(data)?))
    }

    /// Rasterize the AOI once per distinct grid of `series`
    pub fn grid_masks(&self, series: &RasterSeries) -> SarResult<HashMap<GridKey, Array2<bool>>> {
        let mut masks = HashMap::new();
        for frame in series.iter() {
            let key = grid_key(&frame.raster);
            if !masks.contains_key(&key) {
                let keep = self.mask.rasterize(frame.raster.transform(), frame.raster.dim())?;
                masks.insert(key, keep);
            }
        }
        log::debug!("AOI rasterized onto {} distinct grid(s)", masks.len());
        Ok(masks)
    }

    /// Classify an already masked frame; `keep` is the AOI pixel mask
    pub fn classify(&self, frame: &DatedRaster, keep: &Array2<bool>) -> Option<RejectionReason> {
        let inside = |band: ndarray::ArrayView2<'_, f32>| -> Vec<f32> {
            Zip::from(&band)
                .and(keep)
                .fold(Vec::new(), |mut acc, &value, &k| {
                    if k {
                        acc.push(value);
                    }
                    acc
                })
        };
        let vv = inside(frame.raster.vv());
        let vh = inside(frame.raster.vh());

        let vv_stats = BandStatistics::compute(vv.iter().copied());
        let vh_stats = BandStatistics::compute(vh.iter().copied());

        let (vv_stats, vh_stats) = match (vv_stats, vh_stats) {
            (Some(vv_s), Some(vh_s)) if vv_s.mean != 0.0 && vh_s.mean != 0.0 => (vv_s, vh_s),
            (vv_s, vh_s) => {
                return Some(RejectionReason::Degenerate {
                    vv_mean: vv_s.map_or(f64::NAN, |s| s.mean),
                    vh_mean: vh_s.map_or(f64::NAN, |s| s.mean),
                })
            }
        };
        log::debug!(
            "{}: VV mean {:.2} std {:.2}, VH mean {:.2}",
            frame.date,
            vv_stats.mean,
            vv_stats.std,
            vh_stats.mean
        );

        if vv_stats.std > self.config.std_threshold {
            return Some(RejectionReason::HighVariance { std: vv_stats.std });
        }

        let nodata = vv_stats.nodata_fraction();
        if nodata > self.config.nodata_threshold {
            return Some(RejectionReason::ExcessNodata { fraction: nodata });
        }

        let low = vv
            .iter()
            .filter(|&&v| (v as f64) < self.config.low_value_threshold)
            .count() as f64
            / vv.len() as f64;
        if low > self.config.low_fraction_threshold {
            return Some(RejectionReason::ExcessLowValues { fraction: low });
        }

        None
    }

    /// Mask and classify one frame
    pub fn evaluate(&self, frame: &DatedRaster) -> SarResult<FrameVerdict> {
        let raster = &frame.raster;
        let keep = self.mask.rasterize(raster.transform(), raster.dim())?;
        self.evaluate_with(frame, &keep)
    }

    fn evaluate_with(&self, frame: &DatedRaster, keep: &Array2<bool>) -> SarResult<FrameVerdict> {
        let masked = self.mask_with(frame, keep)?;
        Ok(match self.classify(&masked, keep) {
            None => FrameVerdict::Accepted(masked),
            Some(reason) => FrameVerdict::Rejected {
                date: frame.date,
                name: frame.name.clone(),
                reason,
            },
        })
    }

    /// Gate a whole series, preserving date order
    pub fn filter(&self, series: &RasterSeries) -> SarResult<GateOutcome> {
        let masks = self.grid_masks(series)?;
        let gate_frame = |frame: &DatedRaster| -> SarResult<FrameVerdict> {
            let keep = masks
                .get(&grid_key(&frame.raster))
                .ok_or_else(|| SarError::Processing(format!("no AOI mask for frame {}", frame.name)))?;
            self.evaluate_with(frame, keep)
        };

        #[cfg(feature = "parallel")]
        let verdicts: SarResult<Vec<FrameVerdict>> = {
            use rayon::prelude::*;
            series.frames().par_iter().map(gate_frame).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let verdicts: SarResult<Vec<FrameVerdict>> = series.frames().iter().map(gate_frame).collect();

        let mut outcome = GateOutcome::default();
        for verdict in verdicts? {
            match verdict {
                FrameVerdict::Accepted(frame) => outcome.accepted.push(frame)?,
                FrameVerdict::Rejected { date, name, reason } => {
                    log::warn!("Rejecting frame {} ({}): {}", date, name, reason);
                    outcome.rejected.push(Rejection { date, name, reason });
                }
            }
        }

        log::info!(
            "Quality gate: {} accepted, {} rejected",
            outcome.accepted.len(),
            outcome.rejected.len()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aoi_mask::AoiPolygon;
    use crate::types::{GeoTransform, Raster};

    fn mask() -> AoiMask {
        let ring = vec![(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)];
        AoiMask::new(vec![AoiPolygon::new(ring)], 20.0).unwrap()
    }

    fn frame(vv: Array2<f32>, vh: Array2<f32>) -> DatedRaster {
        let raster = Raster::from_bands(vh, vv, GeoTransform::north_up(0.0, 100.0, 10.0)).unwrap();
        DatedRaster::new(NaiveDate::from_ymd_opt(2020, 9, 1).unwrap(), "20200901_processed", raster)
    }

    fn gradient(base: f32) -> Array2<f32> {
        Array2::from_shape_fn((10, 10), |(r, c)| base + 0.1 * (r + c) as f32)
    }

    #[test]
    fn test_good_frame_accepted_and_masked() {
        let mask = mask();
        let gate = QualityGate::new(&mask, QualityConfig::default());
        let verdict = gate.evaluate(&frame(gradient(-15.0), gradient(-22.0))).unwrap();
        match verdict {
            FrameVerdict::Accepted(masked) => {
                assert!(masked.raster.vv()[[0, 0]].is_nan());
                assert!(masked.raster.vh()[[0, 0]].is_nan());
                assert!((masked.raster.vv()[[5, 5]] - (-14.0)).abs() < 1e-5);
            }
            other => panic!("expected acceptance, got {:?}", other),
        }
    }

    #[test]
    fn test_masking_is_idempotent() {
        let mask = mask();
        let gate = QualityGate::new(&mask, QualityConfig::default());
        let (once, _) = gate.apply_mask(&frame(gradient(-15.0), gradient(-22.0))).unwrap();
        let (twice, _) = gate.apply_mask(&once).unwrap();
        let same = once
            .raster
            .data()
            .iter()
            .zip(twice.raster.data().iter())
            .all(|(a, b)| (a.is_nan() && b.is_nan()) || a == b);
        assert!(same);
    }

    #[test]
    fn test_zero_mean_is_degenerate() {
        let mask = mask();
        let gate = QualityGate::new(&mask, QualityConfig::default());
        let verdict = gate
            .evaluate(&frame(gradient(-15.0), Array2::zeros((10, 10))))
            .unwrap();
        assert!(matches!(
            verdict,
            FrameVerdict::Rejected { reason: RejectionReason::Degenerate { .. }, .. }
        ));
    }

    #[test]
    fn test_high_variance_rejected() {
        let mask = mask();
        let gate = QualityGate::new(&mask, QualityConfig::default());
        let noisy = Array2::from_shape_fn((10, 10), |(r, c)| if (r + c) % 2 == 0 { -40.0 } else { 0.5 });
        let verdict = gate.evaluate(&frame(noisy, gradient(-22.0))).unwrap();
        assert!(matches!(
            verdict,
            FrameVerdict::Rejected { reason: RejectionReason::HighVariance { .. }, .. }
        ));
    }

    #[test]
    fn test_nodata_and_low_value_fractions() {
        let mask = mask();
        let gate = QualityGate::new(&mask, QualityConfig::default());

        // 36 AOI pixels; 4 NaN -> 11% nodata
        let mut vv = gradient(-15.0);
        for c in 2..6 {
            vv[[2, c]] = f32::NAN;
        }
        let verdict = gate.evaluate(&frame(vv, gradient(-22.0))).unwrap();
        assert!(matches!(
            verdict,
            FrameVerdict::Rejected { reason: RejectionReason::ExcessNodata { .. }, .. }
        ));

        // 3 of 36 below -49 dB -> 8.3% low values
        let mut vv = gradient(-15.0);
        for c in 3..6 {
            vv[[4, c]] = -50.0;
        }
        let verdict = gate.evaluate(&frame(vv, gradient(-22.0))).unwrap();
        assert!(matches!(
            verdict,
            FrameVerdict::Rejected { reason: RejectionReason::ExcessLowValues { .. }, .. }
        ));
    }

    #[test]
    fn test_mask_rasterized_once_per_grid() {
        let mask = mask();
        let gate = QualityGate::new(&mask, QualityConfig::default());
        let dated = |day: u32, origin: f64| {
            let raster = Raster::from_bands(gradient(-22.0), gradient(-15.0), GeoTransform::north_up(origin, 100.0, 10.0))
                .unwrap();
            DatedRaster::new(NaiveDate::from_ymd_opt(2020, 9, day).unwrap(), format!("202009{:02}_processed", day), raster)
        };

        let shared = RasterSeries::from_frames(vec![dated(1, 0.0), dated(2, 0.0), dated(3, 0.0)]).unwrap();
        assert_eq!(gate.grid_masks(&shared).unwrap().len(), 1);

        let shifted = RasterSeries::from_frames(vec![dated(1, 0.0), dated(2, 10.0), dated(3, 0.0)]).unwrap();
        let masks = gate.grid_masks(&shifted).unwrap();
        assert_eq!(masks.len(), 2);
        let shifted_keep = &masks[&grid_key(&shifted.frames()[1].raster)];
        assert!(shifted_keep[[2, 1]]);
        assert!(!shifted_keep[[2, 7]]);

        let outcome = gate.filter(&shifted).unwrap();
        assert_eq!(outcome.accepted.len(), 3);
        assert!(outcome.accepted.frames()[1].raster.vv()[[2, 7]].is_nan());
        assert!(!outcome.accepted.frames()[0].raster.vv()[[2, 7]].is_nan());
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let mask = mask();
        let config = QualityConfig {
            low_fraction_threshold: 0.5,
            ..QualityConfig::default()
        };
        let gate = QualityGate::new(&mask, config);
        let mut vv = gradient(-15.0);
        for c in 3..6 {
            vv[[4, c]] = -50.0;
        }
        assert!(matches!(
            gate.evaluate(&frame(vv, gradient(-22.0))).unwrap(),
            FrameVerdict::Accepted(_)
        ));
    }
}
