//! Decision tree structure and traversal
//!
//! Nodes live in a flat arena with the root at index 0. Every child index is
//! greater than its parent's, so traversal always terminates.

use crate::errors::{LcError, Result};
use crate::evaluation::Classifier;
use crate::types::{FeatureValue, LabelDistribution, Schema};
use serde::Serialize;
use std::fmt;

/// Test applied to one feature at a split
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Criterion {
    /// Numeric value greater than or equal to the threshold
    AtLeast(f64),
    /// Text value equal to the category
    Equals(String),
}

impl Criterion {
    /// Whether `value` takes the matched branch; mismatched kinds never match
    pub fn matches(&self, value: &FeatureValue) -> bool {
        match self {
            Self::AtLeast(threshold) => value.as_f64().is_some_and(|v| v >= *threshold),
            Self::Equals(category) => value.as_text() == Some(category.as_str()),
        }
    }

    /// Criterion splitting on `value`, the kind following the value's kind
    pub fn for_value(value: &FeatureValue) -> Self {
        match value {
            FeatureValue::Text(text) => Self::Equals(text.clone()),
            other => Self::AtLeast(other.as_f64().unwrap_or_default()),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AtLeast(threshold) => write!(f, ">= {threshold}"),
            Self::Equals(category) => write!(f, "== {category:?}"),
        }
    }
}

/// A decision tree node (split or leaf)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Node {
    Split {
        /// Index into the feature slice
        column: usize,
        criterion: Criterion,
        matched: usize,
        unmatched: usize,
    },
    /// Training labels that reached this leaf
    Leaf(LabelDistribution),
}

/// Classification tree over positional feature vectors
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionTree {
    feature_columns: Vec<String>,
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Create a tree, validating the node arena
    pub fn new(feature_columns: Vec<String>, nodes: Vec<Node>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(LcError::InvalidParameters("tree has no nodes".to_string()));
        }
        for (idx, node) in nodes.iter().enumerate() {
            if let Node::Split {
                column,
                matched,
                unmatched,
                ..
            } = node
            {
                if *column >= feature_columns.len() {
                    return Err(LcError::InvalidParameters(format!(
                        "node {idx} splits on column {column} of {}",
                        feature_columns.len()
                    )));
                }
                for child in [*matched, *unmatched] {
                    if child <= idx || child >= nodes.len() {
                        return Err(LcError::InvalidParameters(format!(
                            "node {idx} has invalid child {child}"
                        )));
                    }
                }
            }
        }
        Ok(Self {
            feature_columns,
            nodes,
        })
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf(_)))
            .count()
    }

    /// Longest root-to-leaf path, counted in splits
    pub fn depth(&self) -> usize {
        self.depth_from(0)
    }

    fn depth_from(&self, idx: usize) -> usize {
        match &self.nodes[idx] {
            Node::Leaf(_) => 0,
            Node::Split {
                matched, unmatched, ..
            } => 1 + self.depth_from(*matched).max(self.depth_from(*unmatched)),
        }
    }

    /// Walk the tree and return the distribution of the leaf reached
    pub fn predict(&self, features: &[FeatureValue]) -> Result<&LabelDistribution> {
        if features.len() != self.feature_columns.len() {
            return Err(LcError::SchemaMismatch(format!(
                "expected {} features, got {}",
                self.feature_columns.len(),
                features.len()
            )));
        }

        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf(distribution) => return Ok(distribution),
                Node::Split {
                    column,
                    criterion,
                    matched,
                    unmatched,
                } => {
                    idx = if criterion.matches(&features[*column]) {
                        *matched
                    } else {
                        *unmatched
                    };
                }
            }
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, idx: usize, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        match &self.nodes[idx] {
            Node::Leaf(distribution) => writeln!(f, "{pad}{distribution}"),
            Node::Split {
                column,
                criterion,
                matched,
                unmatched,
            } => {
                writeln!(f, "{pad}{} {criterion}?", self.feature_columns[*column])?;
                writeln!(f, "{pad}T->")?;
                self.render(f, *matched, indent + 1)?;
                writeln!(f, "{pad}F->")?;
                self.render(f, *unmatched, indent + 1)
            }
        }
    }
}

impl Classifier for DecisionTree {
    fn classify(&self, schema: &Schema, features: &[FeatureValue]) -> Result<LabelDistribution> {
        if schema.feature_columns() != self.feature_columns.as_slice() {
            let trained = Schema::new(self.feature_columns.clone());
            let given = Schema::new(schema.feature_columns().to_vec());
            let diff = trained.diff(&given).unwrap_or_default();
            return Err(LcError::SchemaMismatch(format!(
                "features differ from the training schema: {diff}"
            )));
        }
        self.predict(features).cloned()
    }
}

impl fmt::Display for DecisionTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0, 0)
    }
}
