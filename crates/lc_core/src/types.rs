//! Shared data structures: labels, feature values, vectors and schemas

use crate::errors::{LcError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Raw statuses that mark a loan as a bad outcome
pub const BAD_STATUSES: [&str; 4] = [
    "Late (31-120 days)",
    "Default",
    "Performing Payment Plan",
    "Charged Off",
];

/// Field carrying the loan identifier; always the first vector position
pub const ID_FIELD: &str = "Loan ID";

/// Field carrying the outcome; always the last vector position when present
pub const STATUS_FIELD: &str = "Status";

/// Outcome classification derived from the raw status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusLabel {
    Good,
    Bad,
    /// Unlabelled live record
    Test,
}

impl StatusLabel {
    /// Classify a raw status string
    pub fn from_status(status: &str) -> Self {
        if BAD_STATUSES.contains(&status) {
            Self::Bad
        } else {
            Self::Good
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "GOOD",
            Self::Bad => "BAD",
            Self::Test => "TEST",
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusLabel {
    type Err = LcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GOOD" => Ok(Self::Good),
            "BAD" => Ok(Self::Bad),
            "TEST" => Ok(Self::Test),
            other => Err(LcError::InvalidParameters(format!(
                "unknown status label `{other}`"
            ))),
        }
    }
}

/// A single scalar in a feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Int(i64),
    /// Always finite
    Float(f64),
    Text(String),
}

impl FeatureValue {
    /// Numeric view used by threshold splits; `None` for text
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Text(_))
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Column names matching the positions of a feature vector
///
/// The identifier column comes first and the status column, when present,
/// comes last. Carried beside vector batches so consumers can check that
/// training and evaluation vectors line up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn has_label(&self) -> bool {
        self.columns.last().map(String::as_str) == Some(STATUS_FIELD)
    }

    /// Names of the columns between the identifier and the label
    pub fn feature_columns(&self) -> &[String] {
        let end = self.columns.len() - usize::from(self.has_label());
        self.columns.get(1..end).unwrap_or(&[])
    }

    /// Describe how `other` differs from `self`, or `None` when identical
    pub fn diff(&self, other: &Schema) -> Option<String> {
        if self == other {
            return None;
        }
        let missing: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| !other.columns.contains(c))
            .map(String::as_str)
            .collect();
        let extra: Vec<&str> = other
            .columns
            .iter()
            .filter(|c| !self.columns.contains(c))
            .map(String::as_str)
            .collect();
        if missing.is_empty() && extra.is_empty() {
            Some("columns are in a different order".to_string())
        } else {
            Some(format!("missing {missing:?}, unexpected {extra:?}"))
        }
    }
}

/// Ordered, type-coerced representation of one loan record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    values: Vec<FeatureValue>,
    label: Option<StatusLabel>,
}

impl FeatureVector {
    /// Assemble a vector from the identifier, the ordered features and an optional label
    pub fn new(id: FeatureValue, features: Vec<FeatureValue>, label: Option<StatusLabel>) -> Self {
        let mut values = Vec::with_capacity(features.len() + 2);
        values.push(id);
        values.extend(features);
        if let Some(label) = label {
            values.push(FeatureValue::Text(label.to_string()));
        }
        Self { values, label }
    }

    /// All positional values, identifier first and label last
    pub fn values(&self) -> &[FeatureValue] {
        &self.values
    }

    pub fn id(&self) -> &FeatureValue {
        &self.values[0]
    }

    pub fn label(&self) -> Option<StatusLabel> {
        self.label
    }

    /// Values without the identifier and label
    pub fn features(&self) -> &[FeatureValue] {
        let end = self.values.len() - usize::from(self.label.is_some());
        &self.values[1..end]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A batch of vectors sharing one schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSet {
    schema: Schema,
    vectors: Vec<FeatureVector>,
}

impl FeatureSet {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            vectors: Vec::new(),
        }
    }

    /// Build a set, checking every vector against the schema width
    pub fn with_vectors(schema: Schema, vectors: Vec<FeatureVector>) -> Result<Self> {
        let mut set = Self::new(schema);
        for vector in vectors {
            set.push_vector(vector)?;
        }
        Ok(set)
    }

    /// Append a vector produced under `schema`
    pub fn push(&mut self, schema: &Schema, vector: FeatureVector) -> Result<()> {
        if let Some(diff) = self.schema.diff(schema) {
            return Err(LcError::SchemaMismatch(diff));
        }
        self.push_vector(vector)
    }

    fn push_vector(&mut self, vector: FeatureVector) -> Result<()> {
        if vector.len() != self.schema.len() {
            return Err(LcError::SchemaMismatch(format!(
                "vector has {} values, schema has {} columns",
                vector.len(),
                self.schema.len()
            )));
        }
        self.vectors.push(vector);
        Ok(())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn vectors(&self) -> &[FeatureVector] {
        &self.vectors
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Split into the vectors at `indices` and the rest, preserving order
    pub fn partition(self, indices: &std::collections::BTreeSet<usize>) -> (FeatureSet, FeatureSet) {
        let mut selected = FeatureSet::new(self.schema.clone());
        let mut rest = FeatureSet::new(self.schema);
        for (i, vector) in self.vectors.into_iter().enumerate() {
            if indices.contains(&i) {
                selected.vectors.push(vector);
            } else {
                rest.vectors.push(vector);
            }
        }
        (selected, rest)
    }

    /// Copy the vectors at `indices` into a new set
    pub fn select(&self, indices: impl IntoIterator<Item = usize>) -> FeatureSet {
        let vectors = indices
            .into_iter()
            .filter_map(|i| self.vectors.get(i).cloned())
            .collect();
        FeatureSet {
            schema: self.schema.clone(),
            vectors,
        }
    }
}

/// Candidate labels a classifier considers plausible, with supporting counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelDistribution(BTreeMap<StatusLabel, usize>);

impl LabelDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, label: StatusLabel, count: usize) {
        *self.0.entry(label).or_insert(0) += count;
    }

    pub fn contains(&self, label: StatusLabel) -> bool {
        self.0.contains_key(&label)
    }

    pub fn count(&self, label: StatusLabel) -> usize {
        self.0.get(&label).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    /// Most supported label; ties go to the label that sorts first
    pub fn best(&self) -> Option<StatusLabel> {
        self.0
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(label, _)| *label)
    }

    pub fn candidates(&self) -> impl Iterator<Item = (StatusLabel, usize)> + '_ {
        self.0.iter().map(|(l, c)| (*l, *c))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<StatusLabel> for LabelDistribution {
    fn from_iter<I: IntoIterator<Item = StatusLabel>>(iter: I) -> Self {
        let mut dist = Self::new();
        for label in iter {
            dist.add(label, 1);
        }
        dist
    }
}

impl fmt::Display for LabelDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (label, count)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{label}: {count}")?;
        }
        f.write_str("}")
    }
}
