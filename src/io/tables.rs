//! Tab-separated output tables

use crate::core::freeze_detection::FreezeEvent;
use crate::core::ice_threshold::IceFrame;
use crate::core::quality_gate::Rejection;
use crate::core::reflector::{ReflectorFix, ReflectorSample};
use crate::core::statistics::{BandStatistics, MergedRecord, StatisticsRecord};
use crate::types::SarResult;
use std::io::Write;
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";

const STATISTICS_HEADER: [&str; 9] = [
    "Date", "VV Mean", "VV Min", "VV Max", "VV Std", "VH Mean", "VH Min", "VH Max", "VH Std",
];

const WEATHER_HEADER: [&str; 4] = [
    "Temperature",
    "Snow",
    "Precipitation Amount",
    "Precipitation Intensity",
];

fn tab_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new().delimiter(b'\t').from_writer(writer)
}

fn number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        value.to_string()
    }
}

fn optional(value: Option<f64>) -> String {
    value.map(number).unwrap_or_default()
}

fn band_fields(stats: Option<BandStatistics>) -> [String; 4] {
    match stats {
        Some(s) => [number(s.mean), number(s.min), number(s.max), number(s.std)],
        None => Default::default(),
    }
}

fn statistics_fields(record: &StatisticsRecord) -> Vec<String> {
    let mut fields = vec![record.date.format(DATE_FORMAT).to_string()];
    fields.extend(band_fields(record.vv));
    fields.extend(band_fields(record.vh));
    fields
}

/// `Date, VV Mean, VV Min, VV Max, VV Std, VH Mean, VH Min, VH Max, VH Std`
pub fn write_statistics<W: Write>(writer: W, records: &[StatisticsRecord]) -> SarResult<()> {
    let mut out = tab_writer(writer);
    out.write_record(STATISTICS_HEADER)?;
    for record in records {
        out.write_record(statistics_fields(record))?;
    }
    out.flush()?;
    Ok(())
}

/// Statistics columns followed by the weather columns; missing weather is left blank
pub fn write_merged_statistics<W: Write>(writer: W, records: &[MergedRecord]) -> SarResult<()> {
    let mut out = tab_writer(writer);
    out.write_record(STATISTICS_HEADER.iter().chain(WEATHER_HEADER.iter()))?;
    for record in records {
        let mut fields = statistics_fields(&record.statistics);
        let weather = record.weather.unwrap_or_default();
        fields.extend([
            optional(weather.temperature),
            optional(weather.snow_depth),
            optional(weather.precipitation_amount),
            optional(weather.precipitation_intensity),
        ]);
        out.write_record(fields)?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_rejections<W: Write>(writer: W, rejections: &[Rejection]) -> SarResult<()> {
    let mut out = tab_writer(writer);
    out.write_record(["Date", "Name", "Reason"])?;
    for rejection in rejections {
        out.write_record([
            rejection.date.format(DATE_FORMAT).to_string(),
            rejection.name.clone(),
            rejection.reason.to_string(),
        ])?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_freeze_events<W: Write>(writer: W, events: &[FreezeEvent]) -> SarResult<()> {
    let mut out = tab_writer(writer);
    out.write_record(["Freeze Onset"])?;
    for event in events {
        out.write_record([event.onset_date.format(DATE_FORMAT).to_string()])?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_ice_series<W: Write>(writer: W, frames: &[IceFrame]) -> SarResult<()> {
    let mut out = tab_writer(writer);
    out.write_record(["Date", "Threshold", "Ice Fraction"])?;
    for frame in frames {
        out.write_record([
            frame.date.format(DATE_FORMAT).to_string(),
            number(frame.threshold),
            number(frame.mean_fraction),
        ])?;
    }
    out.flush()?;
    Ok(())
}

/// Every per-frame observation with its z-score verdict
pub fn write_reflector_observations<W: Write>(writer: W, fix: &ReflectorFix) -> SarResult<()> {
    let mut out = tab_writer(writer);
    out.write_record(["Date", "Row", "Col", "Neighborhood Mean", "Inlier"])?;
    for (obs, inlier) in fix.observations.iter().zip(&fix.inliers) {
        out.write_record([
            obs.date.format(DATE_FORMAT).to_string(),
            obs.row.to_string(),
            obs.col.to_string(),
            number(obs.neighborhood_mean),
            inlier.to_string(),
        ])?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_reflector_series<W: Write>(writer: W, samples: &[ReflectorSample]) -> SarResult<()> {
    let mut out = tab_writer(writer);
    out.write_record(["Date", "VV", "VH"])?;
    for sample in samples {
        out.write_record([
            sample.date.format(DATE_FORMAT).to_string(),
            number(sample.vv as f64),
            number(sample.vh as f64),
        ])?;
    }
    out.flush()?;
    Ok(())
}

/// Create `path` and hand a buffered writer to `write`
pub fn write_to_path<P, F>(path: P, write: F) -> SarResult<()>
where
    P: AsRef<Path>,
    F: FnOnce(std::io::BufWriter<std::fs::File>) -> SarResult<()>,
{
    let file = std::fs::File::create(path.as_ref())?;
    log::info!("Writing table {}", path.as_ref().display());
    write(std::io::BufWriter::new(file))
}
