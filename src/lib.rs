//! sarseries: time-series analytics for calibrated Sentinel-1 backscatter
//!
//! Turns a directory of per-date two-band (VH, VV) rasters into a
//! quality-filtered series, an adaptively thresholded ice-fraction series with
//! freeze onset dates, and a sub-pixel stable corner reflector position with
//! its backscatter time series.

pub mod types;
pub mod config;
pub mod io;
pub mod core;
pub mod pipeline;

// Re-export main types
pub use types::{DatedRaster, GeoTransform, Polarization, Raster, RasterSeries, SarError, SarResult};
pub use config::AnalyticsConfig;
pub use pipeline::{AnalysisOutcome, TimeseriesPipeline};

#[cfg(feature = "python")]
mod python {
    use crate::config::{AnalyticsConfig, FreezeConfig};
    use crate::core::freeze_detection::FreezeDateDetector;
    use crate::core::ice_threshold;
    use crate::pipeline::TimeseriesPipeline;
    use chrono::NaiveDate;
    use numpy::{PyReadonlyArray2, ToPyArray};
    use pyo3::exceptions::PyValueError;
    use pyo3::prelude::*;
    use pyo3::types::PyDict;

    fn to_py_err(e: crate::SarError) -> PyErr {
        PyValueError::new_err(e.to_string())
    }

    /// Convert PyReadonlyArray2 to ndarray Array2
    fn numpy_to_array2<T>(arr: PyReadonlyArray2<T>) -> ndarray::Array2<T>
    where
        T: Copy + numpy::Element,
    {
        arr.as_array().to_owned()
    }

    /// Run the full analysis on a directory of GeoTIFFs and write all products
    #[cfg(feature = "geotiff")]
    #[pyfunction]
    fn run_timeseries(
        py: Python,
        config_json: &str,
        input_dir: &str,
        aoi_path: &str,
        output_dir: &str,
    ) -> PyResult<PyObject> {
        let config = if config_json.trim().is_empty() {
            AnalyticsConfig::default()
        } else {
            AnalyticsConfig::from_json_str(config_json).map_err(to_py_err)?
        };
        let pipeline = TimeseriesPipeline::new(config).map_err(to_py_err)?;
        let outcome = py
            .allow_threads(|| pipeline.run(input_dir, aoi_path, output_dir))
            .map_err(to_py_err)?;

        let result = PyDict::new(py);
        result.set_item("accepted", outcome.accepted.len())?;
        result.set_item(
            "rejected",
            outcome
                .rejected
                .iter()
                .map(|r| (r.date.to_string(), r.reason.to_string()))
                .collect::<Vec<_>>(),
        )?;
        result.set_item(
            "thresholds",
            outcome
                .ice
                .frames
                .iter()
                .map(|f| (f.date.to_string(), f.threshold, f.mean_fraction))
                .collect::<Vec<_>>(),
        )?;
        result.set_item(
            "freeze_onsets",
            outcome
                .freeze_events
                .iter()
                .map(|e| e.onset_date.to_string())
                .collect::<Vec<_>>(),
        )?;
        if let Some(reflector) = &outcome.reflector {
            result.set_item("reflector_position", reflector.fix.position)?;
        }
        Ok(result.into())
    }

    /// Ice fraction ramp of a VV array around `threshold`
    #[pyfunction]
    #[pyo3(signature = (vv, threshold, half_width = 0.7))]
    fn ice_fraction(
        py: Python,
        vv: PyReadonlyArray2<f32>,
        threshold: f64,
        half_width: f64,
    ) -> PyResult<PyObject> {
        let array = numpy_to_array2(vv);
        let fraction = ice_threshold::ice_fraction(array.view(), threshold, half_width);
        Ok(fraction.to_pyarray(py).into())
    }

    /// Inflection point of the normal density fitted to a VV array
    #[pyfunction]
    #[pyo3(signature = (vv, samples = 100))]
    fn inflection_point(vv: PyReadonlyArray2<f32>, samples: usize) -> PyResult<f64> {
        let array = numpy_to_array2(vv);
        ice_threshold::inflection_point(array.view(), samples).map_err(to_py_err)
    }

    /// Freeze onset dates (ISO strings) from dates and mean ice fractions
    #[pyfunction]
    fn detect_freeze_onsets(dates: Vec<String>, fractions: Vec<f64>) -> PyResult<Vec<String>> {
        if dates.len() != fractions.len() {
            return Err(PyValueError::new_err(format!(
                "{} dates but {} fractions",
                dates.len(),
                fractions.len()
            )));
        }
        let observations = dates
            .iter()
            .zip(fractions)
            .map(|(date, fraction)| {
                NaiveDate::parse_from_str(date, "%Y-%m-%d")
                    .map(|d| (d, fraction))
                    .map_err(|e| PyValueError::new_err(format!("invalid date '{}': {}", date, e)))
            })
            .collect::<PyResult<Vec<_>>>()?;

        let detector = FreezeDateDetector::new(FreezeConfig::default());
        Ok(detector
            .detect(&observations)
            .iter()
            .map(|e| e.onset_date.to_string())
            .collect())
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        #[cfg(feature = "geotiff")]
        m.add_function(wrap_pyfunction!(run_timeseries, m)?)?;
        m.add_function(wrap_pyfunction!(ice_fraction, m)?)?;
        m.add_function(wrap_pyfunction!(inflection_point, m)?)?;
        m.add_function(wrap_pyfunction!(detect_freeze_onsets, m)?)?;
        m.add("__version__", env!("CARGO_PKG_VERSION"))?;
        Ok(())
    }
}
