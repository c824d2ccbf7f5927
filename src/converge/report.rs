//! The structured record of outcomes for one convergence run.

use chrono::{DateTime, Utc};
use std::fmt::{self, Display};

/// What happened to a single resource.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// Actual state already matched desired state; nothing was applied.
    Unchanged,

    /// Nothing existed at the asserted location; it was created (or installed).
    Created,

    /// Something existed but differed; it was brought to the desired state.
    Modified,

    /// Probing, diffing, or applying failed; the error is captured on the record.
    Failed,
}

impl Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            Outcome::Unchanged => "unchanged",
            Outcome::Created => "created",
            Outcome::Modified => "modified",
            Outcome::Failed => "failed",
        };
        write!(f, "{word}")
    }
}

/// The outcome of converging one resource. Every planned resource produces exactly one record,
/// in plan order, regardless of how its neighbors fared.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionRecord {
    /// The role that declared the resource.
    pub role: String,

    /// The resource's one-line description.
    pub resource: String,

    pub outcome: Outcome,

    /// A short description of what changed (or would change, on a dry run), when the delta was
    /// non-empty.
    pub diff: Option<String>,

    /// The captured error, when the outcome is [Outcome::Failed].
    pub error: Option<String>,
}

/// The result of one convergence run.
#[derive(Clone, Debug)]
pub struct Report {
    /// One record per planned resource, in plan order.
    pub records: Vec<ActionRecord>,

    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
}

impl Report {
    /// Returns whether the run converged without failures. Callers typically map this to their
    /// exit status.
    pub fn success(&self) -> bool {
        !self
            .records
            .iter()
            .any(|record| record.outcome == Outcome::Failed)
    }

    /// The number of resources that were created or modified.
    pub fn changed(&self) -> usize {
        self.records
            .iter()
            .filter(|record| {
                matches!(record.outcome, Outcome::Created | Outcome::Modified)
            })
            .count()
    }

    /// The number of resources already in their desired state.
    pub fn unchanged(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.outcome == Outcome::Unchanged)
            .count()
    }

    /// The number of resources that failed.
    pub fn failed(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.outcome == Outcome::Failed)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(outcome: Outcome) -> ActionRecord {
        ActionRecord {
            role: "r".to_string(),
            resource: "package git".to_string(),
            outcome,
            diff: None,
            error: None,
        }
    }

    fn report(outcomes: &[Outcome]) -> Report {
        let now = Utc::now();
        Report {
            records: outcomes.iter().copied().map(record).collect(),
            started: now,
            finished: now,
        }
    }

    #[test]
    fn success_requires_no_failures() {
        assert!(report(&[Outcome::Unchanged, Outcome::Created]).success());
        assert!(!report(&[Outcome::Created, Outcome::Failed]).success());
    }

    #[test]
    fn an_empty_report_is_a_success() {
        assert!(report(&[]).success());
    }

    #[test]
    fn counts_by_outcome() {
        let report = report(&[
            Outcome::Unchanged,
            Outcome::Created,
            Outcome::Modified,
            Outcome::Failed,
            Outcome::Created,
        ]);
        assert_eq!(3, report.changed());
        assert_eq!(1, report.unchanged());
        assert_eq!(1, report.failed());
    }

    #[test]
    fn outcomes_display_as_lowercase_words() {
        assert_eq!("unchanged", Outcome::Unchanged.to_string());
        assert_eq!("created", Outcome::Created.to_string());
        assert_eq!("modified", Outcome::Modified.to_string());
        assert_eq!("failed", Outcome::Failed.to_string());
    }
}
