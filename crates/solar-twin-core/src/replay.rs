//! Replay source: the finite, ordered, pre-recorded dataset.
//!
//! Records are read once at startup from a CSV export with a header row
//! and are immutable afterwards. Columns are located by header name, so
//! their order does not matter.
//!
//! # Field policy
//!
//! Parsing follows [`FieldPolicy::ZeroOnMalformed`]: an empty or
//! non-numeric reading becomes `0.0` instead of rejecting the record, and
//! a missing reading column yields `0.0` for every record. Each defaulted
//! cell in a present column is counted in
//! [`ReplaySource::malformed_fields`] so the leniency stays visible.
//!
//! A missing file is not an error: [`ReplaySource::load`] returns an empty
//! source and the engine runs fleet-only.

use std::io;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use csv::{ReaderBuilder, StringRecord, Trim};
use solar_twin_types::{Readings, ReplayRecord};
use tracing::{info, warn};

/// Errors that can occur while loading the replay dataset.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The file exists but could not be opened or read.
    #[error("failed to read replay file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: io::Error,
    },

    /// The file could not be decoded as CSV.
    #[error("failed to decode replay CSV: {source}")]
    Csv {
        /// The underlying CSV error.
        #[from]
        source: csv::Error,
    },
}

/// How unparseable reading cells are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Substitute `0.0` and count the cell as malformed.
    #[default]
    ZeroOnMalformed,
}

impl FieldPolicy {
    /// Parse one reading cell. Returns the value and whether the cell was
    /// defaulted.
    pub fn parse(self, raw: Option<&str>) -> (f64, bool) {
        match self {
            Self::ZeroOnMalformed => match raw.map(str::parse::<f64>) {
                Some(Ok(value)) if value.is_finite() => (value, false),
                _ => (0.0, true),
            },
        }
    }
}

/// The loaded replay dataset. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    records: Arc<[ReplayRecord]>,
    malformed_fields: u64,
    missing_columns: Vec<&'static str>,
}

impl ReplaySource {
    /// A source with no records.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap already-built records. Indices are taken as given.
    pub fn from_records(records: Vec<ReplayRecord>) -> Self {
        Self {
            records: records.into(),
            ..Self::default()
        }
    }

    /// Load the CSV at `path`.
    ///
    /// A missing file yields an empty source and a warning.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the file exists but cannot be read or is
    /// not valid CSV.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        if !path.exists() {
            warn!(
                path = %path.display(),
                expected_columns = ?expected_columns(),
                "replay file not found, running fleet-only"
            );
            return Ok(Self::empty());
        }

        let file = std::fs::File::open(path)?;
        let source = Self::from_reader(file, FieldPolicy::default())?;
        info!(
            path = %path.display(),
            records = source.len(),
            malformed_fields = source.malformed_fields,
            missing_columns = ?source.missing_columns,
            "replay data loaded"
        );
        Ok(source)
    }

    /// Parse CSV from any reader, assigning indices from 1.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Csv`] if the header or a row cannot be decoded.
    pub fn from_reader<R: io::Read>(reader: R, policy: FieldPolicy) -> Result<Self, LoadError> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let columns = ColumnMap::from_headers(csv_reader.headers()?);
        let missing_columns = columns.missing();
        if !missing_columns.is_empty() {
            warn!(columns = ?missing_columns, "replay columns missing, defaulting to zero");
        }

        let mut records = Vec::new();
        let mut malformed_fields: u64 = 0;
        let mut id: u64 = 0;

        for row in csv_reader.records() {
            let row = row?;
            id = id.saturating_add(1);

            let (record, malformed) = columns.record(id, &row, policy);
            malformed_fields = malformed_fields.saturating_add(malformed);
            records.push(record);
        }

        if malformed_fields > 0 {
            warn!(malformed_fields, "replay cells defaulted to zero");
        }

        Ok(Self {
            records: records.into(),
            malformed_fields,
            missing_columns,
        })
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records are loaded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The record at 0-based position `index`.
    pub fn get(&self, index: usize) -> Option<&ReplayRecord> {
        self.records.get(index)
    }

    /// All records in order.
    pub fn records(&self) -> &[ReplayRecord] {
        &self.records
    }

    /// The first `n` records (fewer if the source is shorter).
    pub fn sample(&self, n: usize) -> &[ReplayRecord] {
        self.records.get(..n.min(self.records.len())).unwrap_or_default()
    }

    /// Number of reading cells that were present but defaulted to zero.
    pub const fn malformed_fields(&self) -> u64 {
        self.malformed_fields
    }

    /// Reading columns absent from the header.
    pub fn missing_columns(&self) -> &[&'static str] {
        &self.missing_columns
    }
}

fn expected_columns() -> Vec<&'static str> {
    std::iter::once(TIMESTAMP_COLUMN)
        .chain(Readings::COLUMNS)
        .collect()
}

const TIMESTAMP_COLUMN: &str = "timestamp";

/// Header positions of the known columns.
struct ColumnMap {
    timestamp: Option<usize>,
    readings: [Option<usize>; 5],
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> Self {
        let find = |name: &str| headers.iter().position(|h| h == name);
        Self {
            timestamp: find(TIMESTAMP_COLUMN),
            readings: Readings::COLUMNS.map(find),
        }
    }

    fn missing(&self) -> Vec<&'static str> {
        Readings::COLUMNS
            .iter()
            .zip(self.readings)
            .filter(|(_, position)| position.is_none())
            .map(|(name, _)| *name)
            .collect()
    }

    /// Build one record; the second value is the number of defaulted cells.
    fn record(&self, id: u64, row: &StringRecord, policy: FieldPolicy) -> (ReplayRecord, u64) {
        let mut malformed: u64 = 0;
        let mut values = [0.0_f64; 5];

        for (value, position) in values.iter_mut().zip(self.readings) {
            // Absent columns were reported once at load; only count cells
            // the file actually tried to provide.
            let Some(position) = position else { continue };
            let (parsed, defaulted) = policy.parse(row.get(position));
            *value = parsed;
            if defaulted {
                malformed = malformed.saturating_add(1);
            }
        }

        let [active_power, current, voltage, irradiation, temperature] = values;

        let timestamp = self
            .timestamp
            .and_then(|position| row.get(position))
            .filter(|raw| !raw.is_empty())
            .map_or_else(|| Utc::now().to_rfc3339(), str::to_owned);

        let record = ReplayRecord {
            id,
            timestamp,
            readings: Readings {
                active_power,
                current,
                voltage,
                irradiation,
                temperature,
            },
        };
        (record, malformed)
    }
}
