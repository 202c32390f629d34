//! Weather observations joined against the statistics table

use crate::types::{SarError, SarResult};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

/// Daily weather at one location; a variable without a valid reading is `None`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub temperature: Option<f64>,
    pub snow_depth: Option<f64>,
    pub precipitation_amount: Option<f64>,
    pub precipitation_intensity: Option<f64>,
}

/// Source of daily weather for a date and a map location `(x, y)`
pub trait WeatherLookup: Send + Sync {
    fn lookup(&self, date: NaiveDate, location: (f64, f64)) -> Option<WeatherObservation>;
}

/// A sub-daily station reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherReading {
    pub time: NaiveDateTime,
    pub observation: WeatherObservation,
}

#[derive(Debug, Deserialize)]
struct WeatherRow {
    date: NaiveDate,
    temperature: Option<f64>,
    snow: Option<f64>,
    precipitation_amount: Option<f64>,
    precipitation_intensity: Option<f64>,
}

/// Daily weather table already extracted for the area of interest.
///
/// The table is location independent: `lookup` ignores the location.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherTable {
    days: BTreeMap<NaiveDate, WeatherObservation>,
}

impl WeatherTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, date: NaiveDate, observation: WeatherObservation) {
        self.days.insert(date, observation);
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Load a comma separated table with header
    /// `date,temperature,snow,precipitation_amount,precipitation_intensity`
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> SarResult<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        log::info!("Reading weather table {}", path.as_ref().display());
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> SarResult<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let mut table = Self::new();
        for (row_no, row) in reader.deserialize::<WeatherRow>().enumerate() {
            let row = row.map_err(|e| SarError::InvalidFormat(format!("weather row {}: {}", row_no, e)))?;
            if table.days.contains_key(&row.date) {
                log::warn!("Duplicate weather row for {}, keeping the first", row.date);
                continue;
            }
            table.insert(
                row.date,
                WeatherObservation {
                    temperature: finite(row.temperature),
                    snow_depth: finite(row.snow),
                    precipitation_amount: finite(row.precipitation_amount),
                    precipitation_intensity: finite(row.precipitation_intensity),
                },
            );
        }
        log::debug!("Loaded {} weather days", table.len());
        Ok(table)
    }
}

impl WeatherLookup for WeatherTable {
    fn lookup(&self, date: NaiveDate, _location: (f64, f64)) -> Option<WeatherObservation> {
        self.days.get(&date).copied()
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sum: f64,
    count: usize,
}

impl Accumulator {
    fn add(self, value: Option<f64>) -> Self {
        match finite(value) {
            Some(v) => Self {
                sum: self.sum + v,
                count: self.count + 1,
            },
            None => self,
        }
    }

    fn total(self) -> Option<f64> {
        (self.count > 0).then_some(self.sum)
    }

    fn mean(self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Fold sub-daily readings into a daily table.
///
/// Precipitation amount is summed over the day; temperature, snow depth and
/// precipitation intensity are averaged. Missing and NaN readings are ignored.
pub fn aggregate_daily<I>(readings: I) -> WeatherTable
where
    I: IntoIterator<Item = WeatherReading>,
{
    let days = readings.into_iter().fold(
        BTreeMap::<NaiveDate, [Accumulator; 4]>::new(),
        |mut days, reading| {
            let acc = days.entry(reading.time.date()).or_default();
            let obs = reading.observation;
            *acc = [
                acc[0].add(obs.temperature),
                acc[1].add(obs.snow_depth),
                acc[2].add(obs.precipitation_amount),
                acc[3].add(obs.precipitation_intensity),
            ];
            days
        },
    );

    WeatherTable {
        days: days
            .into_iter()
            .map(|(date, [temperature, snow, amount, intensity])| {
                (
                    date,
                    WeatherObservation {
                        temperature: temperature.mean(),
                        snow_depth: snow.mean(),
                        precipitation_amount: amount.total(),
                        precipitation_intensity: intensity.mean(),
                    },
                )
            })
            .collect(),
    }
}
