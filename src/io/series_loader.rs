use crate::config::{DuplicatePolicy, LoaderConfig};
use crate::types::{DatedRaster, Raster, RasterSeries, SarError, SarResult};
use chrono::NaiveDate;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Anything that can turn a file into a two-band `Raster`
pub trait RasterSource: Sync {
    fn read(&self, path: &Path) -> SarResult<Raster>;
}

/// Validated schema for the acquisition date embedded in a file name.
///
/// The file stem is split on `separator`; field `date_field` (negative values
/// count from the end) must be exactly eight ASCII digits forming a valid
/// `YYYYMMDD` calendar date. With the defaults, `20200103_processed.tif`
/// parses to 2020-01-03.
#[derive(Debug, Clone)]
pub struct FilenameSchema {
    separator: char,
    date_field: isize,
    token: Regex,
}

impl FilenameSchema {
    pub fn new(separator: char, date_field: isize) -> SarResult<Self> {
        let token = Regex::new(r"^[0-9]{8}$")
            .map_err(|e| SarError::InvalidConfig(format!("date token pattern: {}", e)))?;
        Ok(Self {
            separator,
            date_field,
            token,
        })
    }

    pub fn from_config(config: &LoaderConfig) -> SarResult<Self> {
        Self::new(config.separator, config.date_field)
    }

    /// Acquisition date encoded in `file_name` (directory components are ignored)
    pub fn parse(&self, file_name: &str) -> SarResult<NaiveDate> {
        let malformed = |reason: String| SarError::MalformedFilename {
            name: file_name.to_string(),
            reason,
        };

        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| malformed("no file stem".to_string()))?;
        let fields: Vec<&str> = stem.split(self.separator).collect();

        let index = if self.date_field >= 0 {
            Some(self.date_field as usize)
        } else {
            fields.len().checked_sub(self.date_field.unsigned_abs())
        };
        let token = index
            .and_then(|i| fields.get(i))
            .ok_or_else(|| malformed(format!("no field {} in '{}'", self.date_field, stem)))?;

        if !self.token.is_match(token) {
            return Err(malformed(format!("date token '{}' is not 8 ASCII digits", token)));
        }
        NaiveDate::parse_from_str(token, "%Y%m%d")
            .map_err(|e| malformed(format!("date token '{}' is not a calendar date: {}", token, e)))
    }
}

/// Builds a date-sorted `RasterSeries` from a directory of rasters
pub struct SeriesLoader {
    schema: FilenameSchema,
    extension: String,
    policy: DuplicatePolicy,
}

impl SeriesLoader {
    pub fn new(schema: FilenameSchema, extension: impl Into<String>, policy: DuplicatePolicy) -> Self {
        Self {
            schema,
            extension: extension.into(),
            policy,
        }
    }

    pub fn from_config(config: &LoaderConfig) -> SarResult<Self> {
        Ok(Self::new(
            FilenameSchema::from_config(config)?,
            config.extension.clone(),
            config.duplicate_policy,
        ))
    }

    fn has_extension(&self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case(&self.extension))
    }

    /// Select and date the files to load, sorted by acquisition date.
    ///
    /// Names are visited in lexicographic order so "first encountered" does not
    /// depend on directory listing order. Names with a malformed date token are
    /// skipped with a warning; duplicates follow the configured policy.
    pub fn plan<I, S>(&self, names: I) -> SarResult<Vec<(NaiveDate, String)>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names
            .into_iter()
            .map(Into::into)
            .filter(|n| self.has_extension(n))
            .collect();
        names.sort();

        let mut by_date: BTreeMap<NaiveDate, String> = BTreeMap::new();
        for name in names {
            let date = match self.schema.parse(&name) {
                Ok(date) => date,
                Err(e) => {
                    log::warn!("Skipping file: {}", e);
                    continue;
                }
            };

            match (by_date.get(&date), self.policy) {
                (None, _) => {
                    by_date.insert(date, name);
                }
                (Some(kept), DuplicatePolicy::KeepFirst) => {
                    log::warn!("Duplicate date {}: keeping {}, skipping {}", date, kept, name);
                }
                (Some(kept), DuplicatePolicy::KeepLast) => {
                    log::warn!("Duplicate date {}: replacing {} with {}", date, kept, name);
                    by_date.insert(date, name);
                }
                (Some(_), DuplicatePolicy::Abort) => return Err(SarError::DuplicateDate(date)),
            }
        }

        Ok(by_date.into_iter().collect())
    }

    /// Dated paths of all usable rasters in `dir`
    pub fn scan_dir<P: AsRef<Path>>(&self, dir: P) -> SarResult<Vec<(NaiveDate, PathBuf)>> {
        let dir = dir.as_ref();
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => log::warn!("Skipping non UTF-8 file name {:?}", raw),
            }
        }
        Ok(self
            .plan(names)?
            .into_iter()
            .map(|(date, name)| (date, dir.join(name)))
            .collect())
    }

    /// Read every usable raster in `dir` into a date-sorted series.
    ///
    /// A file that cannot be read is logged and left out.
    pub fn load_dir<P: AsRef<Path>>(&self, dir: P, source: &dyn RasterSource) -> SarResult<RasterSeries> {
        let planned = self.scan_dir(dir.as_ref())?;
        log::info!(
            "Loading {} rasters from {}",
            planned.len(),
            dir.as_ref().display()
        );

        let read = |(date, path): &(NaiveDate, PathBuf)| -> Option<DatedRaster> {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            match source.read(path) {
                Ok(raster) => Some(DatedRaster::new(*date, stem, raster)),
                Err(e) => {
                    log::warn!("Skipping {}: {}", path.display(), e);
                    None
                }
            }
        };

        #[cfg(feature = "parallel")]
        let frames: Vec<Option<DatedRaster>> = {
            use rayon::prelude::*;
            planned.par_iter().map(read).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let frames: Vec<Option<DatedRaster>> = planned.iter().map(read).collect();

        RasterSeries::from_frames(frames.into_iter().flatten().collect())
    }
}
