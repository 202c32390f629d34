use chrono::NaiveDate;
use ndarray::{Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Real-valued backscatter sample in dB
pub type SarReal = f32;

/// 2D real SAR data array (rows x cols)
pub type SarRealImage = Array2<SarReal>;

/// Number of bands carried by every raster in a series
pub const BAND_COUNT: usize = 2;

/// Polarization channels of a dual-pol (VH + VV) product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    VH,
    VV,
}

impl Polarization {
    /// Zero-based band index inside a `Raster` (band 1 = VH, band 2 = VV on disk)
    pub fn band_index(self) -> usize {
        match self {
            Polarization::VH => 0,
            Polarization::VV => 1,
        }
    }
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarization::VH => write!(f, "VH"),
            Polarization::VV => write!(f, "VV"),
        }
    }
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square pixels
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Map coordinates of the center of pixel `(row, col)`
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        (
            self.top_left_x + c * self.pixel_width + r * self.rotation_x,
            self.top_left_y + c * self.rotation_y + r * self.pixel_height,
        )
    }

    /// Transform of the same footprint sampled `factor` times finer along both axes
    pub fn refined(&self, factor: usize) -> Self {
        let f = factor as f64;
        Self {
            top_left_x: self.top_left_x,
            pixel_width: self.pixel_width / f,
            rotation_x: self.rotation_x / f,
            top_left_y: self.top_left_y,
            rotation_y: self.rotation_y / f,
            pixel_height: self.pixel_height / f,
        }
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::north_up(0.0, 0.0, 1.0)
    }
}

/// Immutable two-band (VH, VV) backscatter grid. Nodata is NaN.
///
/// Every transform produces a new `Raster`; the sample buffer is never
/// mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    data: Array3<SarReal>,
    transform: GeoTransform,
    projection: String,
}

impl Raster {
    /// Build a raster from a `(band, row, col)` cube holding exactly two bands
    pub fn new(data: Array3<SarReal>, transform: GeoTransform) -> SarResult<Self> {
        let bands = data.len_of(Axis(0));
        if bands != BAND_COUNT {
            return Err(SarError::InvalidFormat(format!(
                "expected {} bands (VH, VV), found {}",
                BAND_COUNT, bands
            )));
        }
        Ok(Self {
            data,
            transform,
            projection: String::new(),
        })
    }

    /// Build a raster from separate VH and VV grids of identical shape
    pub fn from_bands(vh: SarRealImage, vv: SarRealImage, transform: GeoTransform) -> SarResult<Self> {
        if vh.dim() != vv.dim() {
            return Err(SarError::ShapeMismatch {
                expected: vh.dim(),
                found: vv.dim(),
            });
        }
        let data = ndarray::stack(Axis(0), &[vh.view(), vv.view()])
            .map_err(|e| SarError::Processing(format!("Failed to stack bands: {}", e)))?;
        Self::new(data, transform)
    }

    pub fn with_projection(mut self, projection: impl Into<String>) -> Self {
        self.projection = projection.into();
        self
    }

    /// Same georeferencing, new samples
    pub fn with_data(&self, data: Array3<SarReal>) -> SarResult<Self> {
        Ok(Self::new(data, self.transform)?.with_projection(self.projection.clone()))
    }

    pub fn band(&self, pol: Polarization) -> ArrayView2<'_, SarReal> {
        self.data.index_axis(Axis(0), pol.band_index())
    }

    pub fn vh(&self) -> ArrayView2<'_, SarReal> {
        self.band(Polarization::VH)
    }

    pub fn vv(&self) -> ArrayView2<'_, SarReal> {
        self.band(Polarization::VV)
    }

    pub fn data(&self) -> &Array3<SarReal> {
        &self.data
    }

    /// Grid shape as `(rows, cols)`
    pub fn dim(&self) -> (usize, usize) {
        let (_, rows, cols) = self.data.dim();
        (rows, cols)
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn projection(&self) -> &str {
        &self.projection
    }
}

/// A raster tagged with its acquisition date
#[derive(Debug, Clone, PartialEq)]
pub struct DatedRaster {
    pub date: NaiveDate,
    /// Stem used to name derived products (e.g. `20200103_processed`)
    pub name: String,
    pub raster: Raster,
}

impl DatedRaster {
    pub fn new(date: NaiveDate, name: impl Into<String>, raster: Raster) -> Self {
        Self {
            date,
            name: name.into(),
            raster,
        }
    }
}

/// Date-ordered sequence of rasters, strictly increasing by acquisition date
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RasterSeries {
    frames: Vec<DatedRaster>,
}

impl RasterSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series from frames that must already be strictly increasing by date
    pub fn from_frames(frames: Vec<DatedRaster>) -> SarResult<Self> {
        for pair in frames.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(SarError::OutOfOrder {
                    previous: pair[0].date,
                    current: pair[1].date,
                });
            }
        }
        Ok(Self { frames })
    }

    /// Append a frame; its date must be later than the last one
    pub fn push(&mut self, frame: DatedRaster) -> SarResult<()> {
        if let Some(last) = self.frames.last() {
            if frame.date <= last.date {
                return Err(SarError::OutOfOrder {
                    previous: last.date,
                    current: frame.date,
                });
            }
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn frames(&self) -> &[DatedRaster] {
        &self.frames
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DatedRaster> {
        self.frames.iter()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.frames.iter().map(|f| f.date).collect()
    }

    /// The most recent `n` frames (all frames when the series is shorter)
    pub fn latest(&self, n: usize) -> &[DatedRaster] {
        let start = self.frames.len().saturating_sub(n);
        &self.frames[start..]
    }

    pub fn into_frames(self) -> Vec<DatedRaster> {
        self.frames
    }
}

impl<'a> IntoIterator for &'a RasterSeries {
    type Item = &'a DatedRaster;
    type IntoIter = std::slice::Iter<'a, DatedRaster>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

/// Error types for time-series processing
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed file name '{name}': {reason}")]
    MalformedFilename { name: String, reason: String },

    #[error("Duplicate acquisition date {0}")]
    DuplicateDate(NaiveDate),

    #[error("Insufficient data: {0}")]
    DataInsufficient(String),

    #[error("Empty intersection: {0}")]
    EmptyIntersection(String),

    #[error("Shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Frame dated {current} processed after {previous}")]
    OutOfOrder {
        previous: NaiveDate,
        current: NaiveDate,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("GDAL error: {0}")]
    Gdal(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(feature = "geotiff")]
impl From<gdal::errors::GdalError> for SarError {
    fn from(err: gdal::errors::GdalError) -> Self {
        SarError::Gdal(err.to_string())
    }
}

/// Result type for time-series operations
pub type SarResult<T> = Result<T, SarError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(day: u32) -> DatedRaster {
        let raster = Raster::from_bands(
            Array2::zeros((2, 2)),
            Array2::zeros((2, 2)),
            GeoTransform::default(),
        )
        .unwrap();
        DatedRaster::new(NaiveDate::from_ymd_opt(2021, 1, day).unwrap(), "f", raster)
    }

    #[test]
    fn test_series_rejects_unordered_frames() {
        assert!(RasterSeries::from_frames(vec![frame(1), frame(3)]).is_ok());
        assert!(matches!(
            RasterSeries::from_frames(vec![frame(3), frame(1)]),
            Err(SarError::OutOfOrder { .. })
        ));

        let mut series = RasterSeries::new();
        series.push(frame(2)).unwrap();
        assert!(series.push(frame(2)).is_err());
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_raster_requires_two_bands() {
        let cube = Array3::<f32>::zeros((3, 4, 4));
        assert!(Raster::new(cube, GeoTransform::default()).is_err());
    }

    #[test]
    fn test_pixel_center() {
        let gt = GeoTransform::north_up(100.0, 200.0, 10.0);
        assert_eq!(gt.pixel_center(0, 0), (105.0, 195.0));
        assert_eq!(gt.pixel_center(2, 1), (115.0, 175.0));
        let fine = gt.refined(10);
        assert_eq!(fine.pixel_center(0, 0), (100.5, 199.5));
    }

    #[test]
    fn test_latest_frames() {
        let series = RasterSeries::from_frames((1..=5).map(frame).collect()).unwrap();
        assert_eq!(series.latest(2).len(), 2);
        assert_eq!(series.latest(2)[0].date.format("%d").to_string(), "04");
        assert_eq!(series.latest(10).len(), 5);
    }
}
