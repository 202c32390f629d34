//! GeoTIFF reading and writing through GDAL

use crate::io::series_loader::RasterSource;
use crate::types::{GeoTransform, Raster, SarError, SarResult, BAND_COUNT};
use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use std::path::Path;

/// Reads two-band (VH, VV) backscatter GeoTIFFs
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffReader;

impl GeoTiffReader {
    pub fn new() -> Self {
        Self
    }

    /// Read bands 1 (VH) and 2 (VV); the band no-data value becomes NaN
    pub fn read_raster<P: AsRef<Path>>(&self, path: P) -> SarResult<Raster> {
        let dataset = Dataset::open(path.as_ref())?;
        let (width, height) = dataset.raster_size();
        let band_count = dataset.raster_count();
        if band_count < BAND_COUNT as isize {
            return Err(SarError::InvalidFormat(format!(
                "{} has {} band(s), expected VH and VV",
                path.as_ref().display(),
                band_count
            )));
        }

        let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        log::debug!(
            "Reading {} ({}x{}), geotransform {:?}",
            path.as_ref().display(),
            width,
            height,
            transform
        );

        let mut data = Array3::<f32>::zeros((BAND_COUNT, height, width));
        for (index, mut plane) in data.axis_iter_mut(Axis(0)).enumerate() {
            let rasterband = dataset.rasterband(index as isize + 1)?;
            let nodata = rasterband.no_data_value();
            let buffer = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
            let band = Array2::from_shape_vec((height, width), buffer.data)
                .map_err(|e| SarError::Processing(format!("Failed to reshape band {}: {}", index + 1, e)))?;

            plane.assign(&band);
            if let Some(nodata) = nodata.filter(|v| !v.is_nan()) {
                plane.mapv_inplace(|v| if v as f64 == nodata { f32::NAN } else { v });
            }
        }

        Ok(Raster::new(data, transform)?.with_projection(dataset.projection()))
    }
}

impl RasterSource for GeoTiffReader {
    fn read(&self, path: &Path) -> SarResult<Raster> {
        self.read_raster(path)
    }
}

/// Writes float32 GeoTIFFs with NaN as the no-data value
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffWriter;

impl GeoTiffWriter {
    pub fn new() -> Self {
        Self
    }

    /// Write both bands of `raster` (band 1 VH, band 2 VV)
    pub fn write_raster<P: AsRef<Path>>(&self, raster: &Raster, path: P) -> SarResult<()> {
        let bands: Vec<ArrayView2<'_, f32>> = raster.data().axis_iter(Axis(0)).collect();
        self.write_bands(&bands, raster.transform(), raster.projection(), path.as_ref())
    }

    /// Write a single-band product such as an ice-fraction map
    pub fn write_band<P: AsRef<Path>>(
        &self,
        band: ArrayView2<'_, f32>,
        transform: &GeoTransform,
        projection: &str,
        path: P,
    ) -> SarResult<()> {
        self.write_bands(&[band], transform, projection, path.as_ref())
    }

    fn write_bands(
        &self,
        bands: &[ArrayView2<'_, f32>],
        transform: &GeoTransform,
        projection: &str,
        path: &Path,
    ) -> SarResult<()> {
        let (height, width) = bands
            .first()
            .map(|b| b.dim())
            .ok_or_else(|| SarError::Processing("nothing to write".to_string()))?;

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset = driver.create_with_band_type::<f32, _>(
            path,
            width as isize,
            height as isize,
            bands.len() as isize,
        )?;

        dataset.set_geo_transform(&transform.to_gdal())?;
        if !projection.is_empty() {
            dataset.set_projection(projection)?;
        }

        for (index, band) in bands.iter().enumerate() {
            let mut rasterband = dataset.rasterband(index as isize + 1)?;
            let flat_data: Vec<f32> = band.iter().cloned().collect();
            let buffer = Buffer::new((width, height), flat_data);
            rasterband.write((0, 0), (width, height), &buffer)?;
            rasterband.set_no_data_value(Some(f32::NAN as f64))?;
        }

        log::info!("Wrote {} ({} band(s), {}x{})", path.display(), bands.len(), width, height);
        Ok(())
    }
}
