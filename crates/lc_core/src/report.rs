//! Human-readable and JSON summaries of evaluation runs and feed schemas

use crate::evaluation::Scored;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Summary of one evaluation run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub sample_size: usize,
    pub evaluation_size: usize,
    pub correct_pct: f64,
    pub false_negative_pct: f64,
    pub false_positive_pct: f64,
    /// Records that failed normalization and were left out
    pub failed_records: Vec<String>,
}

impl EvaluationReport {
    pub fn new(scored: &Scored, failed_records: Vec<String>) -> Self {
        let tally = &scored.tally;
        Self {
            sample_size: scored.training_size,
            evaluation_size: tally.total,
            correct_pct: tally.accuracy_pct(),
            false_negative_pct: tally.false_negative_pct(),
            false_positive_pct: tally.false_positive_pct(),
            failed_records,
        }
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "sample size={}, testing size={}",
            self.sample_size, self.evaluation_size
        )?;
        writeln!(f, "{:.2} correct", self.correct_pct)?;
        writeln!(f, "{:.2} false negatives (kinda ok)", self.false_negative_pct)?;
        write!(f, "{:.2} false positives (bad)", self.false_positive_pct)?;
        if !self.failed_records.is_empty() {
            write!(
                f,
                "\n{} records skipped: {}",
                self.failed_records.len(),
                self.failed_records.join(", ")
            )?;
        }
        Ok(())
    }
}

/// Raw columns that appear in only one of the two feeds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaDiff {
    pub only_in_training: Vec<String>,
    pub only_in_live: Vec<String>,
}

impl SchemaDiff {
    pub fn between(training: &[String], live: &[String]) -> Self {
        let training: BTreeSet<&String> = training.iter().collect();
        let live: BTreeSet<&String> = live.iter().collect();
        Self {
            only_in_training: training.difference(&live).map(|c| c.to_string()).collect(),
            only_in_live: live.difference(&training).map(|c| c.to_string()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.only_in_training.is_empty() && self.only_in_live.is_empty()
    }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "in training, missing from live:")?;
        for column in &self.only_in_training {
            writeln!(f, "{column}")?;
        }
        writeln!(f)?;
        writeln!(f, "in live, missing from training:")?;
        for column in &self.only_in_live {
            writeln!(f, "{column}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::EvaluationTally;

    #[test]
    fn test_report_lines() {
        let scored = Scored {
            training_size: 20,
            tally: EvaluationTally {
                total: 80,
                correct: 60,
                false_positive: 4,
                false_negative: 16,
            },
        };
        let report = EvaluationReport::new(&scored, Vec::new());
        let text = report.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "sample size=20, testing size=80");
        assert_eq!(lines[1], "75.00 correct");
        assert_eq!(lines[2], "20.00 false negatives (kinda ok)");
        assert_eq!(lines[3], "5.00 false positives (bad)");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_report_lists_failures() {
        let scored = Scored {
            training_size: 1,
            tally: EvaluationTally::default(),
        };
        let report = EvaluationReport::new(&scored, vec!["17".into(), "row 9".into()]);
        assert!(report.to_string().ends_with("2 records skipped: 17, row 9"));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["failed_records"][1], "row 9");
    }

    #[test]
    fn test_schema_diff() {
        let training: Vec<String> = ["Loan ID", "Status", "Issued Date"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let live: Vec<String> = ["Loan ID", "Status", "Number of Lenders"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let diff = SchemaDiff::between(&training, &live);
        assert_eq!(diff.only_in_training, vec!["Issued Date"]);
        assert_eq!(diff.only_in_live, vec!["Number of Lenders"]);
        assert!(!diff.is_empty());
        assert!(SchemaDiff::between(&training, &training).is_empty());
    }
}
