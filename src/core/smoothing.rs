use crate::types::{DatedRaster, RasterSeries, SarError, SarResult};
use ndarray::{s, Array3};

/// Moving-average smoothing of a raster series
///
/// Output frame `i` (for `i >= window`) is the pixel-wise mean of frame `i`
/// and the `window - 1` frames before it. The first `window` frames produce
/// no output, so a series of length `L` smooths to `L - window` frames.
pub struct TemporalSmoother {
    window: usize,
}

impl TemporalSmoother {
    pub fn new(window: usize) -> SarResult<Self> {
        if window == 0 {
            return Err(SarError::InvalidConfig(
                "smoothing window must be at least 1".to_string(),
            ));
        }
        Ok(Self { window })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Smooth the whole series
    pub fn smooth(&self, series: &RasterSeries) -> SarResult<RasterSeries> {
        let frames = series.frames();
        let indices: Vec<usize> = (self.window..frames.len()).collect();

        log::info!(
            "Applying {}-frame moving average to {} frames ({} outputs)",
            self.window,
            frames.len(),
            indices.len()
        );

        #[cfg(feature = "parallel")]
        let smoothed: SarResult<Vec<DatedRaster>> = {
            use rayon::prelude::*;
            indices
                .into_par_iter()
                .map(|i| self.average_at(frames, i))
                .collect()
        };

        #[cfg(not(feature = "parallel"))]
        let smoothed: SarResult<Vec<DatedRaster>> =
            indices.into_iter().map(|i| self.average_at(frames, i)).collect();

        RasterSeries::from_frames(smoothed?)
    }

    /// Mean of frame `index` and the `window - 1` frames preceding it
    fn average_at(&self, frames: &[DatedRaster], index: usize) -> SarResult<DatedRaster> {
        let current = &frames[index];
        let mut sum = current.raster.data().mapv(f64::from);

        for previous in &frames[index + 1 - self.window..index] {
            let data = previous.raster.data();
            if data.dim() != current.raster.data().dim() {
                let mismatch = SarError::ShapeMismatch {
                    expected: current.raster.dim(),
                    found: previous.raster.dim(),
                };
                log::warn!(
                    "{} vs {}: {}; padding/cropping to the newer frame",
                    previous.date,
                    current.date,
                    mismatch
                );
                let fitted = fit_to_shape(data, current.raster.data().dim());
                sum += &fitted.mapv(f64::from);
            } else {
                sum += &data.mapv(f64::from);
            }
        }

        let n = self.window as f64;
        let averaged = sum.mapv(|v| (v / n) as f32);
        let raster = current.raster.with_data(averaged)?;
        Ok(DatedRaster::new(
            current.date,
            format!("{}_averaged", current.name),
            raster,
        ))
    }
}

/// Zero-pad or crop a `(band, row, col)` cube to `shape`, anchored at the origin.
///
/// Geographically naive: assumes both grids share their top-left corner.
pub fn fit_to_shape(data: &Array3<f32>, shape: (usize, usize, usize)) -> Array3<f32> {
    let (bands, rows, cols) = shape;
    let mut fitted = Array3::<f32>::zeros(shape);
    let (src_bands, src_rows, src_cols) = data.dim();
    let b = bands.min(src_bands);
    let r = rows.min(src_rows);
    let c = cols.min(src_cols);
    fitted
        .slice_mut(s![..b, ..r, ..c])
        .assign(&data.slice(s![..b, ..r, ..c]));
    fitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoTransform, Raster};
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;
    use ndarray::Array2;

    fn series_of(values: &[f32], shape: (usize, usize)) -> RasterSeries {
        let frames = values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                // VV carries `v`, VH sits 5 dB below
                let raster = Raster::from_bands(
                    Array2::from_elem(shape, v - 5.0),
                    Array2::from_elem(shape, v),
                    GeoTransform::default(),
                )
                .unwrap();
                let date = NaiveDate::from_ymd_opt(2021, 5, 1 + i as u32).unwrap();
                DatedRaster::new(date, format!("{}_processed", date.format("%Y%m%d")), raster)
            })
            .collect();
        RasterSeries::from_frames(frames).unwrap()
    }

    #[test]
    fn test_output_length_is_len_minus_window() {
        let series = series_of(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (3, 3));
        for window in 1..=6 {
            let smoothed = TemporalSmoother::new(window).unwrap().smooth(&series).unwrap();
            assert_eq!(smoothed.len(), series.len() - window);
        }
    }

    #[test]
    fn test_window_averages_current_and_previous() {
        let series = series_of(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (3, 3));
        let smoothed = TemporalSmoother::new(3).unwrap().smooth(&series).unwrap();

        // First output is frame 3 averaged with frames 1 and 2
        let first = &smoothed.frames()[0];
        assert_eq!(first.date, series.frames()[3].date);
        assert_abs_diff_eq!(first.raster.vv()[[1, 1]], 3.0);
        assert_abs_diff_eq!(first.raster.vh()[[1, 1]], -2.0);
        assert!(first.name.ends_with("_averaged"));

        let last = &smoothed.frames()[2];
        assert_abs_diff_eq!(last.raster.vv()[[0, 0]], 5.0);
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(TemporalSmoother::new(0).is_err());
    }

    #[test]
    fn test_mismatched_previous_frame_is_padded() {
        let mut frames = series_of(&[2.0], (2, 2)).into_frames();
        frames.extend(series_of(&[4.0, 6.0], (3, 3)).into_frames().into_iter().enumerate().map(
            |(i, mut f)| {
                f.date = NaiveDate::from_ymd_opt(2021, 6, 1 + i as u32).unwrap();
                f
            },
        ));
        let series = RasterSeries::from_frames(frames).unwrap();

        let smoothed = TemporalSmoother::new(2).unwrap().smooth(&series).unwrap();
        assert_eq!(smoothed.len(), 1);
        let out = &smoothed.frames()[0];
        assert_eq!(out.raster.dim(), (3, 3));
        // Frame 2 (6.0) + frame 1 (4.0) -> 5.0 everywhere
        assert_abs_diff_eq!(out.raster.vv()[[2, 2]], 5.0);
        assert_abs_diff_eq!(out.raster.vh()[[0, 0]], 0.0);

        // Smoothing the (2,2) frame into a (3,3) grid pads with zeros
        let padded = fit_to_shape(series.frames()[0].raster.data(), (2, 3, 3));
        assert_abs_diff_eq!(padded[[0, 0, 0]], -3.0);
        assert_abs_diff_eq!(padded[[1, 0, 0]], 2.0);
        assert_abs_diff_eq!(padded[[1, 2, 2]], 0.0);
    }

    #[test]
    fn test_fit_to_shape_crops() {
        let data = Array3::<f32>::from_elem((2, 4, 4), 1.0);
        let cropped = fit_to_shape(&data, (2, 2, 3));
        assert_eq!(cropped.dim(), (2, 2, 3));
        assert!(cropped.iter().all(|&v| v == 1.0));
    }
}
