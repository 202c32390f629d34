//! I/O modules for raster series, AOI geometries, weather and output tables

pub mod series_loader;
pub mod weather;
pub mod tables;
#[cfg(feature = "geotiff")]
pub mod geotiff;
#[cfg(feature = "geotiff")]
pub mod aoi;

pub use series_loader::{FilenameSchema, RasterSource, SeriesLoader};
pub use weather::{WeatherLookup, WeatherObservation, WeatherTable};
#[cfg(feature = "geotiff")]
pub use geotiff::{GeoTiffReader, GeoTiffWriter};
