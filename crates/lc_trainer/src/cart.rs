//! CART-style classification tree builder
//!
//! Grows a tree greedily: at every node each column is split on each of its
//! distinct values (`>=` for numbers, `==` for text) and the split with the
//! highest entropy gain wins. Candidates are visited in a fixed order and a
//! later candidate only wins on strictly greater gain, so the same training
//! set always produces the same tree.

use lc_core::{
    Criterion, DecisionTree, FeatureSet, FeatureValue, LabelDistribution, LcError, ModelBuilder,
    Node, StatusLabel, TreeConfig,
};
use std::collections::BTreeSet;

/// Labelled training row borrowed from the feature set
#[derive(Clone, Debug)]
struct Sample<'a> {
    features: &'a [FeatureValue],
    label: StatusLabel,
}

/// Split candidate with its gain
#[derive(Debug, Clone)]
struct SplitCandidate {
    column: usize,
    criterion: Criterion,
    gain: f64,
}

/// Builds [`DecisionTree`]s from labelled feature sets
#[derive(Debug, Clone, Default)]
pub struct CartBuilder {
    config: TreeConfig,
}

impl CartBuilder {
    pub fn new(config: TreeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }
}

impl ModelBuilder for CartBuilder {
    type Model = DecisionTree;

    fn build(&self, training: &FeatureSet) -> lc_core::Result<DecisionTree> {
        if training.is_empty() {
            return Err(LcError::InvalidParameters(
                "cannot grow a tree from an empty training set".to_string(),
            ));
        }

        let samples = training
            .vectors()
            .iter()
            .map(|vector| {
                let label = vector.label().ok_or_else(|| {
                    LcError::InvalidParameters(format!(
                        "training vector {} has no label",
                        vector.id()
                    ))
                })?;
                Ok(Sample {
                    features: vector.features(),
                    label,
                })
            })
            .collect::<lc_core::Result<Vec<_>>>()?;

        let grower = Grower {
            config: &self.config,
            feature_count: training.schema().feature_columns().len(),
            samples,
        };

        let mut nodes = Vec::new();
        let indices: Vec<usize> = (0..grower.samples.len()).collect();
        grower.build_node(&indices, 0, &mut nodes);

        let tree = DecisionTree::new(training.schema().feature_columns().to_vec(), nodes)?;
        tracing::info!(
            "Grew tree with {} nodes ({} leaves, depth {})",
            tree.nodes().len(),
            tree.leaf_count(),
            tree.depth()
        );
        Ok(tree)
    }
}

struct Grower<'a> {
    config: &'a TreeConfig,
    feature_count: usize,
    samples: Vec<Sample<'a>>,
}

impl Grower<'_> {
    /// Recursively build tree nodes, returning the index of the node created
    fn build_node(&self, indices: &[usize], depth: usize, nodes: &mut Vec<Node>) -> usize {
        let current_idx = nodes.len();
        let distribution = self.distribution(indices);

        // Check stopping conditions
        let pure = distribution.candidates().count() <= 1;
        if pure
            || depth >= self.config.max_depth
            || indices.len() < 2 * self.config.min_samples_leaf
        {
            nodes.push(Node::Leaf(distribution));
            return current_idx;
        }

        let split = match self.find_best_split(indices) {
            Some(split) if split.gain > self.config.min_gain => split,
            _ => {
                nodes.push(Node::Leaf(distribution));
                return current_idx;
            }
        };

        let (matched, unmatched) = self.split_samples(indices, split.column, &split.criterion);

        // Reserve space for current node; children are appended after it
        nodes.push(Node::Leaf(LabelDistribution::new()));

        let matched_idx = self.build_node(&matched, depth + 1, nodes);
        let unmatched_idx = self.build_node(&unmatched, depth + 1, nodes);

        nodes[current_idx] = Node::Split {
            column: split.column,
            criterion: split.criterion,
            matched: matched_idx,
            unmatched: unmatched_idx,
        };
        current_idx
    }

    /// Find best split using exhaustive search over distinct values
    fn find_best_split(&self, indices: &[usize]) -> Option<SplitCandidate> {
        let parent_entropy = entropy(&self.distribution(indices));
        let mut best_split: Option<SplitCandidate> = None;

        for column in 0..self.feature_count {
            for criterion in self.candidate_criteria(indices, column) {
                let (matched, unmatched) = self.split_samples(indices, column, &criterion);

                if matched.len() < self.config.min_samples_leaf
                    || unmatched.len() < self.config.min_samples_leaf
                {
                    continue;
                }

                let p = matched.len() as f64 / indices.len() as f64;
                let gain = parent_entropy
                    - p * entropy(&self.distribution(&matched))
                    - (1.0 - p) * entropy(&self.distribution(&unmatched));

                if best_split.as_ref().map_or(true, |best| gain > best.gain) {
                    best_split = Some(SplitCandidate {
                        column,
                        criterion,
                        gain,
                    });
                }
            }
        }

        best_split
    }

    /// Distinct values of a column as criteria, numbers ascending then text
    fn candidate_criteria(&self, indices: &[usize], column: usize) -> Vec<Criterion> {
        let mut numbers: Vec<f64> = Vec::new();
        let mut texts: BTreeSet<&str> = BTreeSet::new();

        for &idx in indices {
            let value = &self.samples[idx].features[column];
            match value.as_text() {
                Some(text) => {
                    texts.insert(text);
                }
                None => numbers.extend(value.as_f64()),
            }
        }

        numbers.sort_by(f64::total_cmp);
        numbers.dedup();

        numbers
            .into_iter()
            .map(Criterion::AtLeast)
            .chain(texts.into_iter().map(|t| Criterion::Equals(t.to_string())))
            .collect()
    }

    /// Split samples on a criterion
    fn split_samples(
        &self,
        indices: &[usize],
        column: usize,
        criterion: &Criterion,
    ) -> (Vec<usize>, Vec<usize>) {
        indices
            .iter()
            .copied()
            .partition(|&idx| criterion.matches(&self.samples[idx].features[column]))
    }

    fn distribution(&self, indices: &[usize]) -> LabelDistribution {
        indices.iter().map(|&idx| self.samples[idx].label).collect()
    }
}

/// Shannon entropy of a label distribution, in bits
fn entropy(distribution: &LabelDistribution) -> f64 {
    let total = distribution.total() as f64;
    if total == 0.0 {
        return 0.0;
    }
    distribution
        .candidates()
        .map(|(_, count)| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lc_core::{Classifier, FeatureVector, Schema};

    fn schema() -> Schema {
        Schema::new(vec![
            "Loan ID".into(),
            "Credit Line Age".into(),
            "Home Ownership".into(),
            "Status".into(),
        ])
    }

    fn training_set(rows: &[(i64, &str, StatusLabel)]) -> FeatureSet {
        let vectors = rows
            .iter()
            .enumerate()
            .map(|(i, (age, home, label))| {
                FeatureVector::new(
                    FeatureValue::Int(i as i64),
                    vec![FeatureValue::Int(*age), FeatureValue::from(*home)],
                    Some(*label),
                )
            })
            .collect();
        FeatureSet::with_vectors(schema(), vectors).unwrap()
    }

    #[test]
    fn test_separable_numeric_split() {
        let set = training_set(&[
            (1, "RENT", StatusLabel::Bad),
            (2, "OWN", StatusLabel::Bad),
            (10, "RENT", StatusLabel::Good),
            (12, "OWN", StatusLabel::Good),
        ]);
        let tree = CartBuilder::default().build(&set).unwrap();

        assert_eq!(tree.depth(), 1);
        for vector in set.vectors() {
            let dist = tree.classify(set.schema(), vector.features()).unwrap();
            assert_eq!(dist.best(), vector.label());
            assert_eq!(dist.candidates().count(), 1);
        }
    }

    #[test]
    fn test_categorical_split() {
        let set = training_set(&[
            (5, "RENT", StatusLabel::Bad),
            (5, "RENT", StatusLabel::Bad),
            (5, "OWN", StatusLabel::Good),
            (5, "MORTGAGE", StatusLabel::Good),
        ]);
        let tree = CartBuilder::default().build(&set).unwrap();
        let dist = tree
            .predict(&[FeatureValue::Int(5), FeatureValue::from("RENT")])
            .unwrap();
        assert_eq!(dist.best(), Some(StatusLabel::Bad));
    }

    #[test]
    fn test_inseparable_rows_keep_all_candidates() {
        let set = training_set(&[
            (3, "RENT", StatusLabel::Good),
            (3, "RENT", StatusLabel::Bad),
        ]);
        let tree = CartBuilder::default().build(&set).unwrap();
        assert_eq!(tree.nodes().len(), 1);
        let dist = tree
            .predict(&[FeatureValue::Int(3), FeatureValue::from("RENT")])
            .unwrap();
        assert!(dist.contains(StatusLabel::Good));
        assert!(dist.contains(StatusLabel::Bad));
    }

    #[test]
    fn test_depth_limit() {
        let rows: Vec<(i64, &str, StatusLabel)> = (0..16)
            .map(|i| {
                let label = if i % 2 == 0 { StatusLabel::Good } else { StatusLabel::Bad };
                (i, "RENT", label)
            })
            .collect();
        let config = TreeConfig {
            max_depth: 2,
            ..TreeConfig::default()
        };
        let tree = CartBuilder::new(config).build(&training_set(&rows)).unwrap();
        assert!(tree.depth() <= 2);
    }

    #[test]
    fn test_min_samples_leaf() {
        let set = training_set(&[
            (1, "RENT", StatusLabel::Bad),
            (10, "RENT", StatusLabel::Good),
            (11, "RENT", StatusLabel::Good),
        ]);
        let config = TreeConfig {
            min_samples_leaf: 2,
            ..TreeConfig::default()
        };
        let tree = CartBuilder::new(config).build(&set).unwrap();
        assert_eq!(tree.nodes().len(), 1);
    }

    #[test]
    fn test_deterministic_build() {
        let set = training_set(&[
            (1, "RENT", StatusLabel::Bad),
            (4, "OWN", StatusLabel::Good),
            (4, "RENT", StatusLabel::Bad),
            (9, "OWN", StatusLabel::Good),
            (9, "MORTGAGE", StatusLabel::Bad),
        ]);
        let builder = CartBuilder::default();
        assert_eq!(builder.build(&set).unwrap(), builder.build(&set).unwrap());
    }

    #[test]
    fn test_empty_and_unlabelled_rejected() {
        assert!(CartBuilder::default()
            .build(&FeatureSet::new(schema()))
            .is_err());

        let live_schema = Schema::new(vec![
            "Loan ID".into(),
            "Credit Line Age".into(),
            "Home Ownership".into(),
        ]);
        let unlabelled = FeatureSet::with_vectors(
            live_schema,
            vec![FeatureVector::new(
                FeatureValue::Int(1),
                vec![FeatureValue::Int(2), FeatureValue::from("OWN")],
                None,
            )],
        )
        .unwrap();
        assert!(CartBuilder::default().build(&unlabelled).is_err());
    }

    #[test]
    fn test_entropy() {
        let pure: LabelDistribution = [StatusLabel::Good; 4].into_iter().collect();
        assert_eq!(entropy(&pure), 0.0);
        let even: LabelDistribution = [StatusLabel::Good, StatusLabel::Bad].into_iter().collect();
        assert!((entropy(&even) - 1.0).abs() < 1e-12);
    }
}
