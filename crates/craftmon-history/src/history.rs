//! Bounded, append-only CSV history.
//!
//! One file per dataset under a data directory. Each append adds a row
//! and trims the file to the newest `max_rows` data rows, keeping the
//! header. Reads return the newest rows first.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use craftmon_core::{MonitorError, write_atomic};
use tracing::{debug, warn};

use crate::csv::{decode_record, encode_record};

/// A row type stored in its own CSV file.
pub trait HistoryRow: Sized {
    /// File stem, also the name clients ask for.
    const DATASET: &'static str;
    const HEADER: &'static [&'static str];

    fn timestamp(&self) -> DateTime<Utc>;
    fn to_record(&self) -> Vec<String>;
    /// `None` for a row that does not parse.
    fn from_record(record: &[String]) -> Option<Self>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    pub dir: PathBuf,
    pub max_rows: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/data"),
            max_rows: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CsvHistory {
    config: HistoryConfig,
}

impl CsvHistory {
    pub fn new(config: HistoryConfig) -> Self {
        Self { config }
    }

    pub fn path_for<R: HistoryRow>(&self) -> PathBuf {
        self.config.dir.join(format!("{}.csv", R::DATASET))
    }

    /// Append `row`, writing the header first on a new file, then trim.
    pub fn append<R: HistoryRow>(&self, row: &R) -> Result<(), MonitorError> {
        let path = self.path_for::<R>();
        let persist = |source| MonitorError::Persistence {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.config.dir).map_err(persist)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(persist)?;
        let mut text = String::new();
        if file.metadata().map_err(persist)?.len() == 0 {
            text.push_str(&encode_record(R::HEADER));
            text.push('\n');
        }
        text.push_str(&encode_record(&row.to_record()));
        text.push('\n');
        file.write_all(text.as_bytes()).map_err(persist)?;
        drop(file);

        self.trim(&path)
    }

    /// Newest `limit` rows, newest first. A missing file is empty history;
    /// rows that do not parse are skipped.
    pub fn recent<R: HistoryRow>(&self, limit: usize) -> Result<Vec<R>, MonitorError> {
        let path = self.path_for::<R>();
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MonitorError::from_read(R::DATASET, &path, e)),
        };

        let mut skipped = 0usize;
        let mut rows: Vec<R> = content
            .lines()
            .skip(1)
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                let row = decode_record(line).and_then(|record| R::from_record(&record));
                if row.is_none() {
                    skipped += 1;
                }
                row
            })
            .collect();
        if skipped > 0 {
            debug!(dataset = R::DATASET, skipped, "skipped malformed history rows");
        }

        // Stable: rows sharing a timestamp keep newest-appended first.
        rows.reverse();
        rows.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        rows.truncate(limit);
        Ok(rows)
    }

    fn trim(&self, path: &Path) -> Result<(), MonitorError> {
        let content = fs::read_to_string(path).map_err(|e| MonitorError::from_read("history", path, e))?;
        let mut lines = content.lines();
        let Some(header) = lines.next() else {
            return Ok(());
        };
        let data: Vec<&str> = lines.collect();
        if data.len() <= self.config.max_rows {
            return Ok(());
        }

        let keep = &data[data.len() - self.config.max_rows..];
        let mut out = String::with_capacity(content.len());
        out.push_str(header);
        out.push('\n');
        for line in keep {
            out.push_str(line);
            out.push('\n');
        }
        debug!(path = %path.display(), dropped = data.len() - keep.len(), "trimmed history");
        write_atomic(path, out.as_bytes()).inspect_err(|e| {
            warn!(path = %path.display(), error = %e, "failed to trim history");
        })
    }
}
