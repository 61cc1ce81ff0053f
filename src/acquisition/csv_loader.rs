//! CSV snapshot loader
//!
//! Discovers every `*.csv` file in the data directory (sorted by path),
//! parses each one with the `csv` crate and concatenates the records.
//!
//! Columns are resolved by header name rather than position, so files with
//! extra or reordered columns load fine. The combined column set is the union
//! of all headers; schema validation happens later in the feature builder.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::{debug, info, warn};

use super::{LoadError, RawLoader};
use crate::types::{RawDataset, RawRecord};

/// Naive layouts accepted for timestamps without an explicit offset (read as UTC).
const NAIVE_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

/// Offset-aware layouts beyond strict RFC 3339.
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Epoch values above this are treated as milliseconds.
const EPOCH_MILLIS_CUTOFF: i64 = 100_000_000_000;

/// Normalize a timestamp cell to UTC.
///
/// Accepts RFC 3339, common naive date-time layouts (interpreted as UTC), a
/// bare `YYYY-MM-DD` date, or integer epoch seconds / milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
    }
    if let Ok(epoch) = s.parse::<i64>() {
        return if epoch.abs() >= EPOCH_MILLIS_CUTOFF {
            DateTime::from_timestamp_millis(epoch)
        } else {
            DateTime::from_timestamp(epoch, 0)
        };
    }
    None
}

/// Loads every CSV file found directly inside a data directory.
#[derive(Debug, Clone)]
pub struct CsvDirectoryLoader {
    data_dir: PathBuf,
    extension: String,
}

impl CsvDirectoryLoader {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self::with_extension(data_dir, "csv")
    }

    pub fn with_extension(data_dir: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            data_dir: data_dir.into(),
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Input files in deterministic (sorted) order.
    ///
    /// A missing data directory is not an error: there is simply nothing to load.
    pub fn list_files(&self) -> Result<Vec<PathBuf>, LoadError> {
        if !self.data_dir.exists() {
            warn!(dir = %self.data_dir.display(), "Data directory does not exist");
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.data_dir).map_err(|source| LoadError::Io {
            path: self.data_dir.clone(),
            source,
        })?;

        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
            })
            .collect();
        files.sort();

        info!(dir = %self.data_dir.display(), count = files.len(), "Found input files");
        Ok(files)
    }

    /// Parse a single file into its header list and records.
    pub fn load_file(path: &Path) -> Result<(Vec<String>, Vec<RawRecord>), LoadError> {
        let csv_err = |source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(csv_err)?;

        let headers: Vec<String> = rdr
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(str::to_string)
            .collect();
        let positions: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.as_str(), i))
            .collect();

        let mut records = Vec::new();
        let mut bad_timestamps = 0usize;

        for result in rdr.records() {
            let row = result.map_err(csv_err)?;
            let cell = |name: &str| -> Option<&str> {
                positions
                    .get(name)
                    .and_then(|&i| row.get(i))
                    .filter(|s| !s.is_empty())
            };

            let timestamp = cell("timestamp").and_then(parse_timestamp);
            if timestamp.is_none() && cell("timestamp").is_some() {
                bad_timestamps += 1;
            }

            records.push(RawRecord {
                timestamp,
                device_id: cell("device_id").map(str::to_string),
                device_name: cell("device_name").map(str::to_string),
                employee_id: cell("employee_id").map(str::to_string),
                employee_name: cell("employee_name").map(str::to_string),
                category: cell("category").map(str::to_string),
                parameter: cell("parameter").map(str::to_string),
                value: cell("value").and_then(|v| v.parse::<f64>().ok()),
            });
        }

        if bad_timestamps > 0 {
            warn!(
                file = %path.display(),
                count = bad_timestamps,
                "Unparseable timestamps treated as missing"
            );
        }
        debug!(file = %path.display(), rows = records.len(), "Loaded input file");

        Ok((headers, records))
    }
}

impl RawLoader for CsvDirectoryLoader {
    fn load_all_raw(&self) -> Result<RawDataset, LoadError> {
        let mut columns: Vec<String> = Vec::new();
        let mut records = Vec::new();

        for path in self.list_files()? {
            let (headers, rows) = Self::load_file(&path)?;
            for h in headers {
                if !columns.contains(&h) {
                    columns.push(h);
                }
            }
            records.extend(rows);
        }

        Ok(RawDataset::new(columns, records))
    }

    fn source_name(&self) -> &str {
        "csv-dir"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use std::fs;

    const HEADER: &str = "timestamp,device_id,device_name,employee_id,employee_name,category,parameter,value";

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(parse_timestamp("2024-05-06T07:08:09Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-06 07:08:09"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-06T07:08:09"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-06T09:08:09+02:00"), Some(expected));
        assert_eq!(parse_timestamp(&expected.timestamp().to_string()), Some(expected));
        assert_eq!(
            parse_timestamp(&expected.timestamp_millis().to_string()),
            Some(expected)
        );
        assert_eq!(parse_timestamp("2024-05-06").map(|t| t.hour()), Some(0));
        assert_eq!(parse_timestamp("not a date"), None);
        assert_eq!(parse_timestamp("  "), None);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let loader = CsvDirectoryLoader::new("/definitely/not/here");
        let ds = loader.load_all_raw().unwrap();
        assert!(ds.is_empty());
        assert!(ds.columns.is_empty());
    }

    #[test]
    fn test_loads_and_concatenates_sorted_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("b.csv"),
            format!("{HEADER}\n2024-01-01 00:01:00,d1,Gas Sensor,e1,Ana,env,co,3.5\n"),
        )
        .unwrap();
        fs::write(
            dir.path().join("a.csv"),
            format!("{HEADER}\n2024-01-01 00:00:00,d1,Gas Sensor,e1,Ana,env,co,\n"),
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loader = CsvDirectoryLoader::new(dir.path());
        let ds = loader.load_all_raw().unwrap();

        assert_eq!(ds.len(), 2);
        assert!(ds.missing_columns().is_empty());
        // a.csv first; its blank value cell is missing, not zero
        assert_eq!(ds.records[0].value, None);
        assert_eq!(ds.records[1].value, Some(3.5));
        assert_eq!(ds.records[1].device_name.as_deref(), Some("Gas Sensor"));
    }

    #[test]
    fn test_column_union_across_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.csv"), "timestamp,parameter,value\n2024-01-01,temp,1\n").unwrap();
        fs::write(dir.path().join("b.csv"), "timestamp,category\n2024-01-01,env\n").unwrap();

        let ds = CsvDirectoryLoader::new(dir.path()).load_all_raw().unwrap();
        assert_eq!(ds.columns, vec!["timestamp", "parameter", "value", "category"]);
        assert_eq!(ds.missing_columns().len(), 4);
    }
}
