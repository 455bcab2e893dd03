//! Raw record loading
//!
//! Reads a delimited feed with a header row into field-name → raw-string
//! records. Rows outside the analysis (no status, legacy credit policy,
//! missing presence fields for the feed) are rejected here and counted;
//! nothing else is validated until normalization.

use crate::errors::Result;
use crate::feed::{FeedKind, FeedProfile};
use crate::types::{ID_FIELD, STATUS_FIELD};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Status text marking loans issued under the older credit policy
pub const LEGACY_POLICY_MARKER: &str = "Does not meet the current credit policy";

/// One source row, unnormalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    row: usize,
    fields: BTreeMap<String, String>,
}

impl RawRecord {
    pub fn new(row: usize, fields: BTreeMap<String, String>) -> Self {
        Self { row, fields }
    }

    /// Build a record from literal pairs
    pub fn from_pairs<K, V>(row: usize, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            row,
            fields: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Source line of the row
    pub fn row(&self) -> usize {
        self.row
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Identifier used in diagnostics: the loan id when present, else the row
    pub fn identifier(&self) -> String {
        match self.get(ID_FIELD) {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => format!("row {}", self.row),
        }
    }
}

/// Why a row was left out of the loaded population
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RowRejection {
    MissingStatus,
    LegacyCreditPolicy,
    MissingField(&'static str),
}

impl fmt::Display for RowRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingStatus => f.write_str("missing status"),
            Self::LegacyCreditPolicy => f.write_str("legacy credit policy"),
            Self::MissingField(field) => write!(f, "missing field `{field}`"),
        }
    }
}

/// Outcome of reading one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedRow {
    Accepted(RawRecord),
    Rejected { row: usize, reason: RowRejection },
}

/// Everything read from one feed
#[derive(Debug, Clone, Default)]
pub struct LoadedFeed {
    pub headers: Vec<String>,
    pub records: Vec<RawRecord>,
    pub rejected: BTreeMap<RowRejection, usize>,
}

impl LoadedFeed {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }
}

/// Reads feeds and applies the inclusion filter for one feed profile
#[derive(Debug, Clone)]
pub struct RecordLoader {
    profile: FeedProfile,
}

impl RecordLoader {
    pub fn new(profile: FeedProfile) -> Self {
        Self { profile }
    }

    pub fn for_kind(kind: FeedKind) -> Self {
        Self::new(FeedProfile::for_kind(kind))
    }

    pub fn profile(&self) -> &FeedProfile {
        &self.profile
    }

    /// Load a feed from a file path
    pub fn load_path<P: AsRef<Path>>(&self, path: P) -> Result<LoadedFeed> {
        let path = path.as_ref();
        info!("Loading {} feed from {}", self.profile.kind, path.display());
        let file = File::open(path)?;
        self.load_reader(file)
    }

    /// Load a feed from any reader, collecting accepted rows
    pub fn load_reader<R: Read>(&self, reader: R) -> Result<LoadedFeed> {
        let rows = self.records(reader)?;
        let mut feed = LoadedFeed {
            headers: rows.headers().to_vec(),
            ..LoadedFeed::default()
        };

        for row in rows {
            match row? {
                LoadedRow::Accepted(record) => feed.records.push(record),
                LoadedRow::Rejected { row, reason } => {
                    debug!(row, %reason, "Skipping row");
                    *feed.rejected.entry(reason).or_insert(0) += 1;
                }
            }
        }

        info!(
            "Loaded {} {} records ({} rejected)",
            feed.records.len(),
            self.profile.kind,
            feed.rejected_total()
        );
        Ok(feed)
    }

    /// Lazily iterate the rows of a feed
    pub fn records<R: Read>(&self, reader: R) -> Result<RecordIter<R>> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers = csv_reader.byte_headers()?.iter().map(decode_field).collect();

        Ok(RecordIter {
            loader: self.clone(),
            headers,
            rows: csv_reader.into_byte_records(),
            next_row: 1,
        })
    }

    /// Apply the inclusion filter to one record
    pub fn check(&self, record: &RawRecord) -> Option<RowRejection> {
        match record.get(STATUS_FIELD) {
            None | Some("") => return Some(RowRejection::MissingStatus),
            Some(status) if status.contains(LEGACY_POLICY_MARKER) => {
                return Some(RowRejection::LegacyCreditPolicy)
            }
            Some(_) => {}
        }

        self.profile
            .required_presence
            .iter()
            .copied()
            .find(|field| !record.contains(field))
            .map(RowRejection::MissingField)
    }
}

/// Streaming row iterator returned by [`RecordLoader::records`]
pub struct RecordIter<R> {
    loader: RecordLoader,
    headers: Vec<String>,
    rows: csv::ByteRecordsIntoIter<R>,
    next_row: usize,
}

impl<R> RecordIter<R> {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl<R: Read> Iterator for RecordIter<R> {
    type Item = Result<LoadedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let byte_record = match self.rows.next()? {
            Ok(record) => record,
            Err(err) => return Some(Err(err.into())),
        };

        let row = byte_record
            .position()
            .map(|pos| pos.line() as usize)
            .unwrap_or(self.next_row);
        self.next_row += 1;

        // Short rows simply lack the trailing columns
        let fields = self
            .headers
            .iter()
            .zip(byte_record.iter())
            .map(|(name, value)| (name.clone(), decode_field(value)))
            .collect();
        let record = RawRecord::new(row, fields);

        Some(Ok(match self.loader.check(&record) {
            Some(reason) => LoadedRow::Rejected { row, reason },
            None => LoadedRow::Accepted(record),
        }))
    }
}

/// Decode a field as UTF-8, falling back to Latin-1 for legacy exports
fn decode_field(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRAINING_CSV: &str = "\
Loan ID,Status,Loan Length,Employment Length
1,Fully Paid,36 months,3 years
2,Does not meet the current credit policy.  Status: Charged Off,36 months,1 year
3,,60 months,n/a
4,Charged Off,60 months,10+ years
";

    #[test]
    fn test_training_filter() {
        let feed = RecordLoader::for_kind(FeedKind::Training)
            .load_reader(TRAINING_CSV.as_bytes())
            .unwrap();

        let ids: Vec<_> = feed.records.iter().map(RawRecord::identifier).collect();
        assert_eq!(ids, vec!["1", "4"]);
        assert_eq!(feed.rejected[&RowRejection::LegacyCreditPolicy], 1);
        assert_eq!(feed.rejected[&RowRejection::MissingStatus], 1);
        assert_eq!(feed.headers.len(), 4);
    }

    #[test]
    fn test_live_requires_presence_fields() {
        let csv = "Loan ID,Status,Loan Length\n10,In Funding,36 months\n";
        let feed = RecordLoader::for_kind(FeedKind::Live)
            .load_reader(csv.as_bytes())
            .unwrap();
        assert!(feed.is_empty());
        assert_eq!(
            feed.rejected[&RowRejection::MissingField("Employment Length")],
            1
        );

        // the training feed has no presence requirement
        let feed = RecordLoader::for_kind(FeedKind::Training)
            .load_reader(csv.as_bytes())
            .unwrap();
        assert_eq!(feed.len(), 1);
    }

    #[test]
    fn test_latin1_fallback() {
        let mut bytes = b"Loan ID,Status,City\n1,Current,".to_vec();
        bytes.extend_from_slice(&[0x4d, 0xfc, 0x6e]); // "Mün" in Latin-1
        bytes.push(b'\n');
        let feed = RecordLoader::for_kind(FeedKind::Training)
            .load_reader(bytes.as_slice())
            .unwrap();
        assert_eq!(feed.records[0].get("City"), Some("Mün"));
    }

    #[test]
    fn test_short_rows_lack_trailing_fields() {
        let csv = "Loan ID,Status,Loan Length\n1,Current\n";
        let feed = RecordLoader::for_kind(FeedKind::Training)
            .load_reader(csv.as_bytes())
            .unwrap();
        assert!(!feed.records[0].contains("Loan Length"));
    }

    #[test]
    fn test_lazy_iteration_reports_rows() {
        let loader = RecordLoader::for_kind(FeedKind::Training);
        let rows: Vec<LoadedRow> = loader
            .records(TRAINING_CSV.as_bytes())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 4);
        assert!(matches!(
            rows[2],
            LoadedRow::Rejected {
                reason: RowRejection::MissingStatus,
                ..
            }
        ));
    }
}
