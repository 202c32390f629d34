/*!
 * Corner reflector localization
 *
 * A corner reflector shows up as a persistent bright point near the center of
 * a small, reflector-centred subset. For each of the most recent frames:
 * 1. upsample both bands (bilinear) for sub-pixel stability,
 * 2. coarse stage: brightest VV pixel within a radius of the frame center,
 * 3. fine stage: hill-climb on 3x3 neighborhood means with a visited set and
 *    a step cap, so plateaus and ties cannot loop.
 *
 * The consensus position is the rounded mean location over *all* observations.
 * Observations with |z| above the outlier threshold in row or column are
 * flagged and reported as a diagnostic, but they still contribute to the
 * position.
 */

use crate::config::ReflectorConfig;
use crate::core::resample::upsample_bilinear;
use crate::core::statistics::BandStatistics;
use crate::types::{DatedRaster, Polarization, Raster, RasterSeries, SarError, SarResult};
use chrono::NaiveDate;
use ndarray::ArrayView2;
use serde::Serialize;
use std::collections::HashSet;

/// Queen neighborhood in row-major scan order, center excluded
const NEIGHBORS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Reflector location found in one frame (upsampled pixel coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReflectorObservation {
    pub date: NaiveDate,
    pub row: usize,
    pub col: usize,
    /// Mean VV of the 3x3 neighborhood around the located pixel
    pub neighborhood_mean: f64,
    /// VV at the located pixel
    pub vv: f32,
    /// VH at the located pixel (NaN where VH was exactly zero)
    pub vh: f32,
}

/// Result of the fine stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimbResult {
    pub row: usize,
    pub col: usize,
    pub neighborhood_mean: f64,
    pub steps: usize,
    /// The step cap stopped the climb before a local maximum was reached
    pub capped: bool,
}

/// Consensus over all observations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReflectorFix {
    pub observations: Vec<ReflectorObservation>,
    /// `true` where the observation passed the z-score filter
    pub inliers: Vec<bool>,
    /// Rounded mean `(row, col)` over every observation, outliers included
    pub position: (usize, usize),
    pub upscale_factor: usize,
}

impl ReflectorFix {
    pub fn filtered(&self) -> Vec<ReflectorObservation> {
        self.observations
            .iter()
            .zip(&self.inliers)
            .filter(|(_, keep)| **keep)
            .map(|(obs, _)| *obs)
            .collect()
    }
}

/// Band values at the consensus position for one date
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReflectorSample {
    pub date: NaiveDate,
    pub vv: f32,
    pub vh: f32,
}

/// Brightest finite pixel within `radius` of the grid center, first maximum in row-major order
pub fn coarse_search(vv: ArrayView2<'_, f32>, radius: f64) -> Option<(usize, usize)> {
    let (rows, cols) = vv.dim();
    if rows == 0 || cols == 0 {
        return None;
    }
    let (center_row, center_col) = (rows / 2, cols / 2);
    let reach = radius.max(0.0).min(rows.max(cols) as f64).floor() as usize;

    let row_range = center_row.saturating_sub(reach)..=(center_row + reach).min(rows - 1);
    let col_range = center_col.saturating_sub(reach)..=(center_col + reach).min(cols - 1);

    let mut best: Option<((usize, usize), f32)> = None;
    for i in row_range {
        for j in col_range.clone() {
            let dr = i as f64 - center_row as f64;
            let dc = j as f64 - center_col as f64;
            if (dr * dr + dc * dc).sqrt() > radius {
                continue;
            }
            let value = vv[[i, j]];
            if value.is_nan() {
                continue;
            }
            if best.map_or(true, |(_, max)| value > max) {
                best = Some(((i, j), value));
            }
        }
    }
    best.map(|(index, _)| index)
}

/// Mean of the in-bounds 3x3 neighborhood; NaN if any sample in it is NaN
pub fn neighborhood_mean(vv: ArrayView2<'_, f32>, row: usize, col: usize) -> f64 {
    let (rows, cols) = vv.dim();
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for dr in -1isize..=1 {
        for dc in -1isize..=1 {
            if let Some((r, c)) = offset(row, col, dr, dc, rows, cols) {
                sum += vv[[r, c]] as f64;
                count += 1;
            }
        }
    }
    sum / count as f64
}

fn offset(row: usize, col: usize, dr: isize, dc: isize, rows: usize, cols: usize) -> Option<(usize, usize)> {
    let r = row.checked_add_signed(dr)?;
    let c = col.checked_add_signed(dc)?;
    (r < rows && c < cols).then_some((r, c))
}

/// Bounded hill-climb on neighborhood means starting at `start`.
///
/// At each step every unvisited 8-neighbor's neighborhood mean is evaluated;
/// the climb moves to the best neighbor only if it is strictly greater than
/// the current mean (ties resolved by scan order), and stops otherwise or after
/// `max_steps` moves.
pub fn fine_search(vv: ArrayView2<'_, f32>, start: (usize, usize), max_steps: usize) -> ClimbResult {
    let (rows, cols) = vv.dim();
    let (mut row, mut col) = start;
    let mut current = neighborhood_mean(vv, row, col);
    let mut visited: HashSet<(usize, usize)> = HashSet::from([start]);
    let mut steps = 0usize;

    loop {
        if steps >= max_steps {
            log::warn!("Fine search stopped after {} steps at ({}, {})", steps, row, col);
            return ClimbResult {
                row,
                col,
                neighborhood_mean: current,
                steps,
                capped: true,
            };
        }

        let mut best: Option<((usize, usize), f64)> = None;
        for &(dr, dc) in NEIGHBORS.iter() {
            let Some(candidate) = offset(row, col, dr, dc, rows, cols) else {
                continue;
            };
            if visited.contains(&candidate) {
                continue;
            }
            let mean = neighborhood_mean(vv, candidate.0, candidate.1);
            if mean > current && best.map_or(true, |(_, b)| mean > b) {
                best = Some((candidate, mean));
            }
        }

        match best {
            Some(((r, c), mean)) => {
                row = r;
                col = c;
                current = mean;
                visited.insert((r, c));
                steps += 1;
            }
            None => {
                return ClimbResult {
                    row,
                    col,
                    neighborhood_mean: current,
                    steps,
                    capped: false,
                }
            }
        }
    }
}

/// Population z-scores; all zero when the values do not vary
pub fn z_scores(values: &[f64]) -> Vec<f64> {
    match BandStatistics::compute(values.iter().copied()) {
        Some(stats) if stats.std > 0.0 => values.iter().map(|v| (v - stats.mean) / stats.std).collect(),
        _ => vec![0.0; values.len()],
    }
}

/// Inlier flags and the unfiltered rounded mean position of `observations`
pub fn consensus(observations: &[ReflectorObservation], outlier_z: f64) -> SarResult<(Vec<bool>, (usize, usize))> {
    if observations.is_empty() {
        return Err(SarError::DataInsufficient(
            "no reflector observations to combine".to_string(),
        ));
    }
    let rows: Vec<f64> = observations.iter().map(|o| o.row as f64).collect();
    let cols: Vec<f64> = observations.iter().map(|o| o.col as f64).collect();

    let inliers: Vec<bool> = z_scores(&rows)
        .iter()
        .zip(z_scores(&cols))
        .map(|(zr, zc)| zr.abs() <= outlier_z && zc.abs() <= outlier_z)
        .collect();

    let n = observations.len() as f64;
    let mean_row = rows.iter().sum::<f64>() / n;
    let mean_col = cols.iter().sum::<f64>() / n;
    let position = (
        mean_row.round_ties_even() as usize,
        mean_col.round_ties_even() as usize,
    );
    Ok((inliers, position))
}

/// VH sample with exact zeros treated as nodata
fn vh_value(raster: &Raster, row: usize, col: usize) -> f32 {
    let value = raster.band(Polarization::VH)[[row, col]];
    if value == 0.0 {
        f32::NAN
    } else {
        value
    }
}

/// Locates a corner reflector across the most recent frames of a series
pub struct ReflectorLocator {
    config: ReflectorConfig,
}

impl ReflectorLocator {
    pub fn new(config: ReflectorConfig) -> Self {
        Self { config }
    }

    /// Coarse + fine localization in one already upsampled frame
    pub fn locate_in(&self, date: NaiveDate, raster: &Raster) -> Option<ReflectorObservation> {
        let vv = raster.vv();
        let Some(start) = coarse_search(vv, self.config.search_radius) else {
            log::warn!("{}: no valid VV pixel within the search radius", date);
            return None;
        };
        let climb = fine_search(vv, start, self.config.max_fine_steps);
        log::debug!(
            "{}: coarse ({}, {}) -> fine ({}, {}) after {} steps, mean {:.2} dB",
            date,
            start.0,
            start.1,
            climb.row,
            climb.col,
            climb.steps,
            climb.neighborhood_mean
        );
        Some(ReflectorObservation {
            date,
            row: climb.row,
            col: climb.col,
            neighborhood_mean: climb.neighborhood_mean,
            vv: vv[[climb.row, climb.col]],
            vh: vh_value(raster, climb.row, climb.col),
        })
    }

    fn observe(&self, frame: &DatedRaster) -> Option<ReflectorObservation> {
        match upsample_bilinear(&frame.raster, self.config.upscale_factor) {
            Ok(upsampled) => self.locate_in(frame.date, &upsampled),
            Err(e) => {
                log::warn!("{}: cannot upsample frame ({})", frame.date, e);
                None
            }
        }
    }

    /// Observe the reflector in the most recent `frame_count` frames and combine
    pub fn locate(&self, series: &RasterSeries) -> SarResult<ReflectorFix> {
        let frames = series.latest(self.config.frame_count);
        log::info!(
            "Locating reflector in {} frames (upsampling x{})",
            frames.len(),
            self.config.upscale_factor
        );

        #[cfg(feature = "parallel")]
        let observed: Vec<Option<ReflectorObservation>> = {
            use rayon::prelude::*;
            frames.par_iter().map(|f| self.observe(f)).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let observed: Vec<Option<ReflectorObservation>> = frames.iter().map(|f| self.observe(f)).collect();

        let observations: Vec<ReflectorObservation> = observed.into_iter().flatten().collect();
        let (inliers, position) = consensus(&observations, self.config.outlier_z)?;

        let outliers = inliers.iter().filter(|&&keep| !keep).count();
        log::info!(
            "Reflector position ({}, {}) from {} observations ({} flagged as outliers)",
            position.0,
            position.1,
            observations.len(),
            outliers
        );

        Ok(ReflectorFix {
            observations,
            inliers,
            position,
            upscale_factor: self.config.upscale_factor,
        })
    }

    /// VV/VH at `position` (upsampled coordinates) for every frame of `series`
    pub fn extract(&self, series: &RasterSeries, position: (usize, usize)) -> SarResult<Vec<ReflectorSample>> {
        let factor = self.config.upscale_factor;
        let sample = |frame: &DatedRaster| -> SarResult<ReflectorSample> {
            let upsampled = upsample_bilinear(&frame.raster, factor)?;
            let (rows, cols) = upsampled.dim();
            let (row, col) = position;
            if row >= rows || col >= cols {
                log::warn!(
                    "{}: position ({}, {}) outside {}x{} frame",
                    frame.date,
                    row,
                    col,
                    rows,
                    cols
                );
                return Ok(ReflectorSample {
                    date: frame.date,
                    vv: f32::NAN,
                    vh: f32::NAN,
                });
            }
            Ok(ReflectorSample {
                date: frame.date,
                vv: upsampled.vv()[[row, col]],
                vh: vh_value(&upsampled, row, col),
            })
        };

        #[cfg(feature = "parallel")]
        let samples: SarResult<Vec<ReflectorSample>> = {
            use rayon::prelude::*;
            series.frames().par_iter().map(sample).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let samples: SarResult<Vec<ReflectorSample>> = series.frames().iter().map(sample).collect();

        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn observation(row: usize, col: usize) -> ReflectorObservation {
        ReflectorObservation {
            date: NaiveDate::from_ymd_opt(2021, 6, 1).unwrap(),
            row,
            col,
            neighborhood_mean: 0.0,
            vv: 0.0,
            vh: 0.0,
        }
    }

    #[test]
    fn test_coarse_search_respects_radius() {
        let mut vv = Array2::from_elem((21, 21), -20.0f32);
        vv[[0, 0]] = 30.0; // bright corner outside the radius
        vv[[12, 13]] = 5.0;
        assert_eq!(coarse_search(vv.view(), 5.0), Some((12, 13)));
        assert_eq!(coarse_search(vv.view(), 20.0), Some((0, 0)));
    }

    #[test]
    fn test_coarse_search_huge_radius_covers_grid() {
        let mut vv = Array2::from_elem((11, 11), -20.0f32);
        vv[[10, 0]] = 3.0;
        assert_eq!(coarse_search(vv.view(), 1e30), Some((10, 0)));
        assert_eq!(coarse_search(vv.view(), f64::INFINITY), Some((10, 0)));
    }

    #[test]
    fn test_coarse_search_first_maximum_wins() {
        let mut vv = Array2::from_elem((11, 11), -20.0f32);
        vv[[4, 6]] = 1.0;
        vv[[6, 4]] = 1.0;
        assert_eq!(coarse_search(vv.view(), 5.0), Some((4, 6)));
    }

    #[test]
    fn test_coarse_search_skips_nan() {
        let vv = Array2::from_elem((5, 5), f32::NAN);
        assert_eq!(coarse_search(vv.view(), 3.0), None);
    }

    #[test]
    fn test_neighborhood_mean_at_edge_uses_in_bounds_cells() {
        let vv = Array2::from_shape_fn((3, 3), |(r, c)| (r * 3 + c) as f32);
        assert_eq!(neighborhood_mean(vv.view(), 1, 1), 4.0);
        // (0,0) neighborhood: 0, 1, 3, 4
        assert_eq!(neighborhood_mean(vv.view(), 0, 0), 2.0);
    }

    #[test]
    fn test_fine_search_stops_on_plateau() {
        let vv = Array2::from_elem((9, 9), -15.0f32);
        let climb = fine_search(vv.view(), (4, 4), 100);
        assert_eq!((climb.row, climb.col), (4, 4));
        assert_eq!(climb.steps, 0);
        assert!(!climb.capped);
    }

    #[test]
    fn test_fine_search_step_cap() {
        // Monotone ramp towards the bottom-right corner
        let vv = Array2::from_shape_fn((50, 50), |(r, c)| (r + c) as f32);
        let climb = fine_search(vv.view(), (0, 0), 3);
        assert!(climb.capped);
        assert_eq!(climb.steps, 3);
        assert_eq!((climb.row, climb.col), (3, 3));
    }

    #[test]
    fn test_z_scores_constant_input() {
        assert_eq!(z_scores(&[4.0, 4.0, 4.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_consensus_rounds_half_to_even() {
        let obs = vec![observation(10, 11), observation(11, 12)];
        let (inliers, position) = consensus(&obs, 2.0).unwrap();
        assert_eq!(inliers, vec![true, true]);
        assert_eq!(position, (10, 12));
    }

    #[test]
    fn test_consensus_requires_observations() {
        assert!(matches!(consensus(&[], 2.0), Err(SarError::DataInsufficient(_))));
    }
}
