//! Record normalization
//!
//! Turns one raw record into an ordered feature vector plus label. The
//! steps run in a fixed order because later ones read what earlier ones
//! produce:
//!
//! 1. label derivation
//! 2. denylist pruning
//! 3. field renaming onto the shared schema
//! 4. unit stripping (loan term, employment length)
//! 5. derived fields (monthly payment, credit line age)
//! 6. generic numeric coercion
//! 7. monetary banding
//! 8. column ordering (identifier first, label last)

use crate::errors::{LcError, Result};
use crate::feed::FeedProfile;
use crate::record::{LoadedFeed, RawRecord};
use crate::types::{
    FeatureSet, FeatureValue, FeatureVector, Schema, StatusLabel, ID_FIELD, STATUS_FIELD,
};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

pub const LOAN_LENGTH: &str = "Loan Length";
pub const EMPLOYMENT_LENGTH: &str = "Employment Length";
pub const INTEREST_RATE: &str = "Interest Rate";
pub const AMOUNT_REQUESTED: &str = "Amount Requested";
pub const MONTHLY_PAYMENT: &str = "Monthly PAYMENT";
pub const EARLIEST_CREDIT_LINE: &str = "Earliest CREDIT Line";
pub const CREDIT_LINE_AGE: &str = "Credit Line Age";

/// Monetary fields coarsened into bands, whichever the feed still carries
pub const BANDED_FIELDS: [&str; 3] = [
    AMOUNT_REQUESTED,
    "Amount Funded By Investors",
    "Total Amount Funded",
];

/// Width of one monetary band
pub const BAND_WIDTH: i64 = 2500;

/// Accepted layouts for the earliest credit line date, tried in order
pub const CREDIT_LINE_DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// A field mid-normalization: still raw text, or already a typed value
#[derive(Debug, Clone)]
enum Field {
    Raw(String),
    Value(FeatureValue),
}

/// Normalized vector together with the column names of its positions
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub schema: Schema,
    pub vector: FeatureVector,
}

/// A record that failed normalization
#[derive(Debug)]
pub struct RecordFailure {
    pub record: String,
    pub row: usize,
    pub error: LcError,
}

/// Result of normalizing a whole population
#[derive(Debug)]
pub struct NormalizationOutcome {
    pub set: FeatureSet,
    pub failures: Vec<RecordFailure>,
}

impl NormalizationOutcome {
    pub fn failed_records(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.record.as_str()).collect()
    }
}

/// Normalizes records of one feed
#[derive(Debug, Clone)]
pub struct Normalizer {
    profile: FeedProfile,
    as_of: NaiveDate,
}

impl Normalizer {
    /// Create a normalizer that measures credit line age up to today (UTC)
    pub fn new(profile: FeedProfile) -> Self {
        Self {
            profile,
            as_of: chrono::Utc::now().date_naive(),
        }
    }

    /// Fix the processing date used for credit line age
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = as_of;
        self
    }

    pub fn profile(&self) -> &FeedProfile {
        &self.profile
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    /// Derive the outcome label of a raw record
    pub fn derive_label(&self, record: &RawRecord) -> StatusLabel {
        if record.contains(self.profile.live_marker) {
            return StatusLabel::Test;
        }
        match record.get(STATUS_FIELD) {
            None | Some("") => StatusLabel::Test,
            Some(status) => StatusLabel::from_status(status),
        }
    }

    /// Normalize a single record
    pub fn normalize(&self, record: &RawRecord) -> Result<NormalizedRecord> {
        let id = record.identifier();
        let label = self.derive_label(record);

        let mut row: BTreeMap<String, Field> = record
            .fields()
            .iter()
            .filter(|(name, _)| name.as_str() != STATUS_FIELD)
            .filter(|(name, _)| !self.profile.is_denied(name))
            .map(|(name, value)| (name.clone(), Field::Raw(value.clone())))
            .collect();

        for (from, to) in self.profile.renames {
            if let Some(value) = row.remove(*from) {
                row.insert((*to).to_string(), value);
            }
        }

        let term = strip_term_units(require_raw(&row, &id, LOAN_LENGTH)?);
        let employment = employment_years(require_raw(&row, &id, EMPLOYMENT_LENGTH)?);

        if !row.contains_key(MONTHLY_PAYMENT) {
            let payment = self.derive_monthly_payment(&row, &id, &term)?;
            row.insert(MONTHLY_PAYMENT.to_string(), Field::Value(FeatureValue::Float(payment)));
        }
        row.insert(LOAN_LENGTH.to_string(), Field::Raw(term));
        row.insert(EMPLOYMENT_LENGTH.to_string(), Field::Raw(employment));

        let earliest = row.remove(EARLIEST_CREDIT_LINE);
        if !row.contains_key(CREDIT_LINE_AGE) {
            let raw = match &earliest {
                Some(Field::Raw(raw)) => raw.as_str(),
                _ => return Err(LcError::violation(&id, EARLIEST_CREDIT_LINE, "is missing")),
            };
            let since = parse_credit_line_date(raw).ok_or_else(|| {
                LcError::violation(&id, EARLIEST_CREDIT_LINE, format!("has unparseable date `{raw}`"))
            })?;
            let age = credit_line_age(since, self.as_of);
            row.insert(CREDIT_LINE_AGE.to_string(), Field::Value(FeatureValue::Int(age)));
        }

        let mut values: BTreeMap<String, FeatureValue> = row
            .into_iter()
            .map(|(name, field)| {
                let value = match field {
                    Field::Raw(raw) => coerce(&raw),
                    Field::Value(value) => value,
                };
                (name, value)
            })
            .collect();

        for name in BANDED_FIELDS {
            if let Some(value) = values.get_mut(name) {
                let banded = band(value).ok_or_else(|| {
                    LcError::violation(&id, name, format!("is not a monetary amount: `{value}`"))
                })?;
                *value = FeatureValue::Int(banded);
            }
        }

        let id_value = values
            .remove(ID_FIELD)
            .ok_or_else(|| LcError::violation(&id, ID_FIELD, "is missing"))?;

        let mut columns = Vec::with_capacity(values.len() + 2);
        columns.push(ID_FIELD.to_string());
        columns.extend(values.keys().cloned());
        columns.push(STATUS_FIELD.to_string());

        let vector = FeatureVector::new(id_value, values.into_values().collect(), Some(label));
        debug!(record = %id, %label, width = vector.len(), "Normalized record");

        Ok(NormalizedRecord {
            schema: Schema::new(columns),
            vector,
        })
    }

    /// Normalize a population, collecting per-record failures instead of stopping
    ///
    /// The schema shared by most records becomes the population schema; on a
    /// tie the one seen first wins. Records with any other schema fail.
    pub fn normalize_all<'a, I>(&self, records: I) -> NormalizationOutcome
    where
        I: IntoIterator<Item = &'a RawRecord>,
    {
        let results: Vec<_> = records
            .into_iter()
            .map(|record| (record, self.normalize(record)))
            .collect();
        let schema = majority_schema(&results);
        self.assemble(schema, results)
    }

    /// Normalize a loaded feed against the schema its headers imply
    pub fn normalize_feed(&self, feed: &LoadedFeed) -> NormalizationOutcome {
        let schema = self.expected_schema(&feed.headers);
        let results = feed
            .records
            .iter()
            .map(|record| (record, self.normalize(record)))
            .collect();
        self.assemble(schema, results)
    }

    /// Schema of a complete record of a feed with these raw headers
    pub fn expected_schema(&self, headers: &[String]) -> Schema {
        let mut columns: BTreeSet<String> = headers
            .iter()
            .filter(|name| name.as_str() != STATUS_FIELD && !self.profile.is_denied(name))
            .map(|name| self.profile.canonical_name(name).to_string())
            .collect();

        columns.remove(ID_FIELD);
        columns.remove(EARLIEST_CREDIT_LINE);
        for derived in [LOAN_LENGTH, EMPLOYMENT_LENGTH, MONTHLY_PAYMENT, CREDIT_LINE_AGE] {
            columns.insert(derived.to_string());
        }

        let mut ordered = Vec::with_capacity(columns.len() + 2);
        ordered.push(ID_FIELD.to_string());
        ordered.extend(columns);
        ordered.push(STATUS_FIELD.to_string());
        Schema::new(ordered)
    }

    fn assemble(
        &self,
        schema: Schema,
        results: Vec<(&RawRecord, Result<NormalizedRecord>)>,
    ) -> NormalizationOutcome {
        let mut set = FeatureSet::new(schema);
        let mut failures = Vec::new();

        for (record, result) in results {
            let result =
                result.and_then(|normalized| set.push(&normalized.schema, normalized.vector));

            if let Err(error) = result {
                warn!(record = %record.identifier(), row = record.row(), %error, "Failed to normalize record");
                failures.push(RecordFailure {
                    record: record.identifier(),
                    row: record.row(),
                    error,
                });
            }
        }

        info!(
            "Normalized {} {} records ({} failed)",
            set.len(),
            self.profile.kind,
            failures.len()
        );
        NormalizationOutcome { set, failures }
    }

    fn derive_monthly_payment(
        &self,
        row: &BTreeMap<String, Field>,
        id: &str,
        term: &str,
    ) -> Result<f64> {
        let principal = match row.get(AMOUNT_REQUESTED) {
            None => 0.0,
            Some(Field::Raw(raw)) => raw.trim().parse::<f64>().map_err(|_| {
                LcError::violation(id, AMOUNT_REQUESTED, format!("is not a number: `{raw}`"))
            })?,
            Some(Field::Value(value)) => value.as_f64().ok_or_else(|| {
                LcError::violation(id, AMOUNT_REQUESTED, "is not a number")
            })?,
        };

        let months = term.trim().parse::<i64>().map_err(|_| {
            LcError::violation(id, LOAN_LENGTH, format!("is not a whole number of months: `{term}`"))
        })?;
        if months <= 0 {
            return Err(LcError::violation(id, LOAN_LENGTH, "must be positive"));
        }

        let rate_text = require_raw(row, id, INTEREST_RATE)?;
        let rate = parse_rate(rate_text).ok_or_else(|| {
            LcError::violation(id, INTEREST_RATE, format!("is not a rate: `{rate_text}`"))
        })?;

        Ok(monthly_payment(principal, months, rate))
    }
}

fn require_raw<'a>(row: &'a BTreeMap<String, Field>, id: &str, field: &str) -> Result<&'a str> {
    match row.get(field) {
        Some(Field::Raw(raw)) => Ok(raw),
        _ => Err(LcError::violation(id, field, "is missing")),
    }
}

fn majority_schema(results: &[(&RawRecord, Result<NormalizedRecord>)]) -> Schema {
    let mut counts: Vec<(&Schema, usize)> = Vec::new();
    for normalized in results.iter().filter_map(|(_, result)| result.as_ref().ok()) {
        match counts.iter_mut().find(|(schema, _)| **schema == normalized.schema) {
            Some((_, count)) => *count += 1,
            None => counts.push((&normalized.schema, 1)),
        }
    }

    counts
        .into_iter()
        .rev()
        .max_by_key(|(_, count)| *count)
        .map(|(schema, _)| schema.clone())
        .unwrap_or_else(|| Schema::new(Vec::new()))
}

/// Reduce a term such as `"36 months"` to `"36"`
pub fn strip_term_units(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_suffix("months")
        .map(str::trim_end)
        .unwrap_or(trimmed)
        .to_string()
}

/// Map employment length text onto a number of years, as text
///
/// Unrecognised text is returned trimmed and left to coercion.
pub fn employment_years(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed {
        "n/a" => "0".to_string(),
        "< 1 year" => "0.5".to_string(),
        "10+ years" => "10.0".to_string(),
        other => other
            .strip_suffix(" years")
            .or_else(|| other.strip_suffix(" year"))
            .unwrap_or(other)
            .to_string(),
    }
}

/// Interest rate as a fraction; the percent sign is optional
fn parse_rate(raw: &str) -> Option<f64> {
    let rate = raw.replace('%', "").trim().parse::<f64>().ok()?;
    rate.is_finite().then_some(rate / 100.0)
}

/// Monthly payment under simple (non-compounding) interest, rounded to cents
pub fn monthly_payment(principal: f64, months: i64, annual_rate: f64) -> f64 {
    let months = months as f64;
    let interest = principal * annual_rate * (months / 12.0);
    round_cents((principal + interest) / months)
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn parse_credit_line_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    CREDIT_LINE_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

/// Whole years between `since` and `as_of`, floored
pub fn credit_line_age(since: NaiveDate, as_of: NaiveDate) -> i64 {
    (as_of - since).num_days().div_euclid(365)
}

/// Coerce raw text into an integer, a float (percentages scaled down), or text
pub fn coerce(raw: &str) -> FeatureValue {
    let trimmed = raw.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return FeatureValue::Int(int);
    }

    let has_percent = trimmed.contains('%');
    match trimmed.replace('%', "").trim().parse::<f64>() {
        Ok(float) if float.is_finite() => {
            FeatureValue::Float(if has_percent { float / 100.0 } else { float })
        }
        _ => FeatureValue::Text(raw.to_string()),
    }
}

/// Monetary band of a numeric value; `None` for text
pub fn band(value: &FeatureValue) -> Option<i64> {
    match value {
        FeatureValue::Int(amount) => Some(amount.div_euclid(BAND_WIDTH)),
        FeatureValue::Float(amount) => Some((amount.trunc() as i64).div_euclid(BAND_WIDTH)),
        FeatureValue::Text(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedProfile;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2011, 1, 15).unwrap()
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(FeedProfile::training()).with_as_of(as_of())
    }

    fn training_record() -> RawRecord {
        RawRecord::from_pairs(
            2,
            [
                ("Loan ID", "1001"),
                ("Status", "Fully Paid"),
                ("Amount Requested", "10000"),
                ("Interest Rate", "10.00%"),
                ("Loan Length", "36 months"),
                ("Employment Length", "3 years"),
                ("Earliest CREDIT Line", "2000-01-15"),
                ("CREDIT Grade", "B2"),
                ("Home Ownership", "RENT"),
                ("Debt-To-Income Ratio", "12.5%"),
                ("Application Date", "2010-12-01"),
                ("Screen Name", "lender42"),
            ],
        )
    }

    #[test]
    fn test_full_training_record() {
        let normalized = normalizer().normalize(&training_record()).unwrap();

        let columns: Vec<&str> = normalized.schema.columns().iter().map(String::as_str).collect();
        assert_eq!(
            columns,
            vec![
                "Loan ID",
                "Amount Requested",
                "CREDIT Rating",
                "Credit Line Age",
                "Debt-To-Income Ratio",
                "Employment Length",
                "Home Ownership",
                "Interest Rate",
                "Loan Length",
                "Monthly PAYMENT",
                "Status",
            ]
        );
        assert_eq!(
            normalized.vector.values(),
            &[
                FeatureValue::Int(1001),
                FeatureValue::Int(4),
                FeatureValue::Text("B2".into()),
                FeatureValue::Int(11),
                FeatureValue::Float(0.125),
                FeatureValue::Int(3),
                FeatureValue::Text("RENT".into()),
                FeatureValue::Float(0.1),
                FeatureValue::Int(36),
                FeatureValue::Float(361.11),
                FeatureValue::Text("GOOD".into()),
            ]
        );
        assert_eq!(normalized.vector.label(), Some(StatusLabel::Good));
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let record = training_record();
        let n = normalizer();
        assert_eq!(n.normalize(&record).unwrap(), n.normalize(&record).unwrap());
    }

    #[test]
    fn test_bad_status_and_live_marker() {
        let n = normalizer();
        let mut fields = training_record().fields().clone();
        fields.insert("Status".into(), "Charged Off".into());
        let bad = RawRecord::new(3, fields.clone());
        assert_eq!(n.derive_label(&bad), StatusLabel::Bad);

        fields.insert("Number of Lenders".into(), "12".into());
        let live = RawRecord::new(4, fields);
        assert_eq!(n.derive_label(&live), StatusLabel::Test);

        let unlabelled = RawRecord::from_pairs(5, [("Loan ID", "1")]);
        assert_eq!(n.derive_label(&unlabelled), StatusLabel::Test);
    }

    #[test]
    fn test_term_units() {
        for n in [12, 36, 60] {
            let stripped = strip_term_units(&format!("{n} months"));
            assert_eq!(coerce(&stripped), FeatureValue::Int(n));
        }
        assert_eq!(strip_term_units("36"), "36");
    }

    #[test]
    fn test_employment_table() {
        assert_eq!(coerce(&employment_years("n/a")), FeatureValue::Int(0));
        assert_eq!(coerce(&employment_years("< 1 year")), FeatureValue::Float(0.5));
        assert_eq!(coerce(&employment_years("10+ years")), FeatureValue::Float(10.0));
        assert_eq!(coerce(&employment_years("3 years")), FeatureValue::Int(3));
        assert_eq!(coerce(&employment_years("1 year")), FeatureValue::Int(1));
    }

    #[test]
    fn test_monthly_payment() {
        assert_eq!(monthly_payment(1000.0, 12, 0.10), 91.67);
        assert_eq!(monthly_payment(0.0, 36, 0.12), 0.0);
    }

    #[test]
    fn test_existing_monthly_payment_is_kept() {
        let mut fields = training_record().fields().clone();
        fields.insert(MONTHLY_PAYMENT.into(), "322.67".into());
        fields.remove(INTEREST_RATE);
        let normalized = normalizer().normalize(&RawRecord::new(2, fields)).unwrap();
        let idx = normalized
            .schema
            .columns()
            .iter()
            .position(|c| c == MONTHLY_PAYMENT)
            .unwrap();
        assert_eq!(normalized.vector.values()[idx], FeatureValue::Float(322.67));
    }

    #[test]
    fn test_banding() {
        assert_eq!(band(&FeatureValue::Int(10000)), Some(4));
        assert_eq!(band(&FeatureValue::Int(2499)), Some(0));
        assert_eq!(band(&FeatureValue::Float(7500.75)), Some(3));
        assert_eq!(band(&FeatureValue::Text("lots".into())), None);
    }

    #[test]
    fn test_coercion() {
        assert_eq!(coerce("42"), FeatureValue::Int(42));
        assert_eq!(coerce(" 42 "), FeatureValue::Int(42));
        assert_eq!(coerce("12.5"), FeatureValue::Float(12.5));
        assert_eq!(coerce("7.5%"), FeatureValue::Float(0.075));
        assert_eq!(coerce("MORTGAGE"), FeatureValue::Text("MORTGAGE".into()));
        assert_eq!(coerce("nan"), FeatureValue::Text("nan".into()));
        assert_eq!(coerce(""), FeatureValue::Text(String::new()));
    }

    #[test]
    fn test_credit_line_age() {
        let since = NaiveDate::from_ymd_opt(2000, 1, 15).unwrap();
        assert_eq!(credit_line_age(since, as_of()), 11);
        assert_eq!(parse_credit_line_date("01/15/2000"), Some(since));
        assert_eq!(parse_credit_line_date("Jan-2000"), None);
    }

    #[test]
    fn test_missing_required_fields_fail() {
        for field in [LOAN_LENGTH, EMPLOYMENT_LENGTH, INTEREST_RATE, EARLIEST_CREDIT_LINE, ID_FIELD] {
            let mut fields = training_record().fields().clone();
            fields.remove(field);
            let err = normalizer().normalize(&RawRecord::new(9, fields)).unwrap_err();
            match err {
                LcError::SchemaViolation { field: f, .. } => assert_eq!(f, field),
                other => panic!("unexpected error for {field}: {other}"),
            }
        }
    }

    #[test]
    fn test_unparseable_date_fails() {
        let mut fields = training_record().fields().clone();
        fields.insert(EARLIEST_CREDIT_LINE.into(), "sometime".into());
        let err = normalizer().normalize(&RawRecord::new(2, fields)).unwrap_err();
        assert!(err.to_string().contains("record 1001"));
        assert!(err.to_string().contains(EARLIEST_CREDIT_LINE));
    }

    #[test]
    fn test_unparseable_amount_fails() {
        let mut fields = training_record().fields().clone();
        fields.insert(AMOUNT_REQUESTED.into(), "ten thousand".into());
        let err = normalizer().normalize(&RawRecord::new(2, fields)).unwrap_err();
        assert!(err.is_record_scoped());
    }

    #[test]
    fn test_normalize_all_accumulates_failures() {
        let good = training_record();
        let mut fields = good.fields().clone();
        fields.insert("Loan ID".into(), "2002".into());
        fields.remove(LOAN_LENGTH);
        let broken = RawRecord::new(3, fields);

        let outcome = normalizer().normalize_all([&good, &broken, &good]);
        assert_eq!(outcome.set.len(), 2);
        assert_eq!(outcome.failed_records(), vec!["2002"]);
        assert_eq!(outcome.failures[0].row, 3);
    }

    #[test]
    fn test_live_record_matches_training_columns() {
        let mut fields = training_record().fields().clone();
        fields.insert("Status".into(), "In Funding".into());
        fields.insert("Number of Lenders".into(), "12".into());
        fields.insert("Amount Funded".into(), "2500".into());
        fields.insert("Expiration Date".into(), "2011-02-01".into());
        let live = RawRecord::new(2, fields);

        let n = Normalizer::new(FeedProfile::live()).with_as_of(as_of());
        let normalized = n.normalize(&live).unwrap();
        let columns = normalized.schema.columns();
        assert!(!columns.iter().any(|c| c == "Number of Lenders"));
        assert!(!columns.iter().any(|c| c == "Amount Funded"));
        assert!(!columns.iter().any(|c| c == "Expiration Date"));
        assert_eq!(normalized.vector.values().last(), Some(&FeatureValue::Text("TEST".into())));
        assert_eq!(normalized.vector.label(), Some(StatusLabel::Test));

        let training = normalizer().normalize(&training_record()).unwrap();
        assert_eq!(normalized.schema.feature_columns(), training.schema.feature_columns());
    }

    #[test]
    fn test_expected_schema_from_headers() {
        let record = training_record();
        let headers: Vec<String> = record.fields().keys().cloned().collect();
        let normalized = normalizer().normalize(&record).unwrap();
        assert_eq!(normalizer().expected_schema(&headers), normalized.schema);
    }

    #[test]
    fn test_short_first_record_is_the_only_failure() {
        let mut fields = training_record().fields().clone();
        fields.insert("Loan ID".into(), "7".into());
        fields.remove("Home Ownership");
        let short = RawRecord::new(2, fields);
        let good = training_record();

        let outcome = normalizer().normalize_all([&short, &good, &good, &good]);
        assert_eq!(outcome.set.len(), 3);
        assert_eq!(outcome.failed_records(), vec!["7"]);
        assert!(matches!(outcome.failures[0].error, LcError::SchemaMismatch(_)));

        let headers: Vec<String> = good.fields().keys().cloned().collect();
        let feed = LoadedFeed {
            headers,
            records: vec![short, good.clone(), good],
            rejected: Default::default(),
        };
        let outcome = normalizer().normalize_feed(&feed);
        assert_eq!(outcome.set.len(), 2);
        assert_eq!(outcome.failed_records(), vec!["7"]);
    }
}
