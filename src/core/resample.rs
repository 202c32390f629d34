use crate::types::{Raster, SarError, SarResult};
use ndarray::{Array2, Array3, ArrayView2, Axis};

/// Upsample both bands of a raster by an integer factor using bilinear interpolation.
///
/// Output pixel centers are mapped back onto the source grid
/// (`src = (dst + 0.5) / factor - 0.5`) and clamped to the edge pixels, so the
/// upsampled image covers exactly the original footprint.
pub fn upsample_bilinear(raster: &Raster, factor: usize) -> SarResult<Raster> {
    if factor == 0 {
        return Err(SarError::InvalidConfig(
            "upsampling factor must be at least 1".to_string(),
        ));
    }
    let (rows, cols) = raster.dim();
    if rows == 0 || cols == 0 {
        return Err(SarError::Processing("cannot upsample an empty raster".to_string()));
    }
    if factor == 1 {
        return Ok(raster.clone());
    }

    log::debug!(
        "Upsampling {}x{} raster by {} -> {}x{}",
        rows,
        cols,
        factor,
        rows * factor,
        cols * factor
    );

    let bands: Vec<Array2<f32>> = raster
        .data()
        .axis_iter(Axis(0))
        .map(|band| upsample_band(band, factor))
        .collect();
    let views: Vec<ArrayView2<'_, f32>> = bands.iter().map(|b| b.view()).collect();
    let data: Array3<f32> = ndarray::stack(Axis(0), &views)
        .map_err(|e| SarError::Processing(format!("Failed to stack upsampled bands: {}", e)))?;

    Ok(Raster::new(data, raster.transform().refined(factor))?.with_projection(raster.projection()))
}

fn upsample_band(band: ArrayView2<'_, f32>, factor: usize) -> Array2<f32> {
    let (rows, cols) = band.dim();
    let scale = factor as f64;
    let row_coords: Vec<(usize, usize, f64)> = (0..rows * factor)
        .map(|i| source_coordinate(i, scale, rows))
        .collect();
    let col_coords: Vec<(usize, usize, f64)> = (0..cols * factor)
        .map(|j| source_coordinate(j, scale, cols))
        .collect();

    Array2::from_shape_fn((rows * factor, cols * factor), |(i, j)| {
        let (y1, y2, dy) = row_coords[i];
        let (x1, x2, dx) = col_coords[j];

        let v11 = band[[y1, x1]] as f64;
        let v12 = band[[y2, x1]] as f64;
        let v21 = band[[y1, x2]] as f64;
        let v22 = band[[y2, x2]] as f64;

        let interpolated = v11 * (1.0 - dx) * (1.0 - dy)
            + v21 * dx * (1.0 - dy)
            + v12 * (1.0 - dx) * dy
            + v22 * dx * dy;

        interpolated as f32
    })
}

/// Lower/upper source index and interpolation weight for output index `dst`
fn source_coordinate(dst: usize, scale: f64, len: usize) -> (usize, usize, f64) {
    let max = (len - 1) as f64;
    let src = ((dst as f64 + 0.5) / scale - 0.5).clamp(0.0, max);
    let lower = src.floor() as usize;
    let upper = (lower + 1).min(len - 1);
    (lower, upper, src - lower as f64)
}
