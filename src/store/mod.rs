// src/store/mod.rs

use chrono::NaiveDate;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::table::{Maturity, YieldRecord, YieldTable};

/// Token written in place of a missing yield.
pub const NULL_MARKER: &str = "nan";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const COLUMNS: usize = Maturity::COUNT + 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("yield file not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("malformed row {line} in {path}: {message}")]
    Malformed {
        path: PathBuf,
        line: u64,
        message: String,
    },
}

/// Flat-file home of the yield table: one space-separated row per date,
/// `date 1M 2M ... 30Y`, no header.
#[derive(Clone, Debug)]
pub struct YieldStore {
    path: PathBuf,
}

impl YieldStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file. Missing files and malformed rows are errors.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<YieldTable, StoreError> {
        if !self.path.exists() {
            return Err(StoreError::NotFound(self.path.clone()));
        }
        let csv_err = |source| StoreError::Csv {
            path: self.path.clone(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .map_err(csv_err)?;

        let mut table = YieldTable::new();
        for result in reader.records() {
            let row = result.map_err(csv_err)?;
            let line = row.position().map(|p| p.line()).unwrap_or_default();
            let record = self.parse_row(&row, line)?;
            if let Some(previous) = table.insert(record) {
                warn!(date = %previous.date, line, "duplicate date in yield file; keeping later row");
            }
        }

        debug!(rows = table.len(), "loaded yield table");
        Ok(table)
    }

    fn parse_row(&self, row: &csv::StringRecord, line: u64) -> Result<YieldRecord, StoreError> {
        let malformed = |message: String| StoreError::Malformed {
            path: self.path.clone(),
            line,
            message,
        };

        if row.len() != COLUMNS {
            return Err(malformed(format!(
                "expected {} columns, found {}",
                COLUMNS,
                row.len()
            )));
        }

        let date = NaiveDate::parse_from_str(&row[0], DATE_FORMAT)
            .map_err(|e| malformed(format!("bad date `{}`: {}", &row[0], e)))?;

        let mut yields = [None; Maturity::COUNT];
        for (slot, maturity) in yields.iter_mut().zip(Maturity::ALL) {
            let raw = &row[maturity.position() + 1];
            *slot = parse_yield(raw)
                .ok_or_else(|| malformed(format!("bad {} yield `{}`", maturity, raw)))?;
        }

        Ok(YieldRecord::new(date, yields))
    }

    /// Replace the file with `table`. Writes a sibling `.tmp` file and renames it into place.
    #[instrument(level = "debug", skip(self, table), fields(path = %self.path.display(), rows = table.len()))]
    pub fn save(&self, table: &YieldTable) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let csv_err = |source| StoreError::Csv {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .quote_style(csv::QuoteStyle::Never)
            .from_path(&tmp)
            .map_err(csv_err)?;

        for record in table.iter() {
            let mut fields = Vec::with_capacity(COLUMNS);
            fields.push(record.date.format(DATE_FORMAT).to_string());
            fields.extend(record.yields.iter().map(|y| format_yield(*y)));
            writer.write_record(&fields).map_err(csv_err)?;
        }
        writer.flush().map_err(io_err)?;
        drop(writer);

        fs::rename(&tmp, &self.path).map_err(io_err)?;
        info!(rows = table.len(), path = %self.path.display(), "saved yield table");
        Ok(())
    }
}

/// `Some(None)` for a null cell, `None` when the cell is not a usable yield.
fn parse_yield(raw: &str) -> Option<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case(NULL_MARKER) {
        return Some(None);
    }
    let value: f64 = raw.parse().ok()?;
    match value {
        v if v.is_nan() => Some(None),
        v if v.is_finite() => Some(Some(v)),
        _ => None,
    }
}

fn format_yield(value: Option<f64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => NULL_MARKER.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::{date, record};
    use tempfile::tempdir;

    fn sample_table() -> YieldTable {
        let mut gappy = record("2019-01-03", 2.42, 2.39, 2.66);
        gappy.yields[Maturity::M2.position()] = None;
        gappy.yields[Maturity::Y20.position()] = None;
        YieldTable::from_records(vec![
            record("2019-01-04", 2.45, 2.5, 2.67),
            gappy,
            record("2019-01-02", 2.4, 2.49, 2.66),
        ])
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let tmp = tempdir().unwrap();
        let store = YieldStore::new(tmp.path().join("treasury_yields.csv"));
        let table = sample_table();

        store.save(&table).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, table);
        assert!(!tmp.path().join("treasury_yields.csv.tmp").exists());
    }

    #[test]
    fn test_saved_layout() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("yields.csv");
        let store = YieldStore::new(&path);
        store.save(&sample_table()).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "2019-01-02 2.4 2.4 2.4 2.4 2.4 2.49 2.4 2.4 2.4 2.66 2.4 2.4"
        );
        assert_eq!(
            lines[1],
            "2019-01-03 2.42 nan 2.42 2.42 2.42 2.39 2.42 2.42 2.42 2.66 nan 2.42"
        );
        assert!(lines[2].starts_with("2019-01-04 "));
    }

    #[test]
    fn test_load_sorts_and_accepts_pandas_output() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("yields.csv");
        fs::write(
            &path,
            "2019-01-03 2.42 NaN 2.42 2.47 2.6 2.39 2.37 2.37 2.44 2.56 2.75 2.92\n\
             2019-01-02 2.4 2.4 2.42 2.51 2.6 2.5 2.47 2.49 2.56 2.66 2.83 2.97\n",
        )
        .unwrap();

        let table = YieldStore::new(&path).load().unwrap();
        assert_eq!(table.first_date(), Some(date("2019-01-02")));
        let second = table.get(&date("2019-01-03")).unwrap();
        assert_eq!(second.get(Maturity::M2), None);
        assert_eq!(second.get(Maturity::Y30), Some(2.92));
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = tempdir().unwrap();
        let store = YieldStore::new(tmp.path().join("absent.csv"));
        assert!(matches!(store.load(), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_load_rejects_malformed_rows() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("yields.csv");

        fs::write(&path, "2019-01-02 2.4 2.4\n").unwrap();
        let err = YieldStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Malformed { line: 1, .. }), "{err}");

        fs::write(
            &path,
            "2019-01-02 2.4 2.4 2.42 2.51 2.6 2.5 2.47 2.49 2.56 2.66 2.83 2.97\n\
             2019-01-03 2.42 abc 2.42 2.47 2.6 2.39 2.37 2.37 2.44 2.56 2.75 2.92\n",
        )
        .unwrap();
        let err = YieldStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Malformed { line: 2, .. }), "{err}");

        fs::write(
            &path,
            "01/02/2019 2.4 2.4 2.42 2.51 2.6 2.5 2.47 2.49 2.56 2.66 2.83 2.97\n",
        )
        .unwrap();
        assert!(YieldStore::new(&path).load().is_err());
    }

    #[test]
    fn test_load_rejects_infinite_yields() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("yields.csv");

        for bad in ["inf", "-inf", "1e400"] {
            fs::write(
                &path,
                format!("2019-01-02 {bad} 2.4 2.42 2.51 2.6 2.5 2.47 2.49 2.56 2.66 2.83 2.97\n"),
            )
            .unwrap();
            let err = YieldStore::new(&path).load().unwrap_err();
            assert!(
                matches!(&err, StoreError::Malformed { line: 1, message, .. } if message.contains("1M")),
                "{bad}: {err}"
            );
        }
    }
}
