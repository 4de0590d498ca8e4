use std::fmt::Write as _;

use crate::{
    entry::Entry,
    extract::{Failure, FailureKind},
    metadata::Metadata,
};

/// Final state of one entry.
#[derive(Debug, Clone)]
pub enum Outcome {
    Committed { entry: Entry, metadata: Metadata },
    Failed { entry: Entry, failure: Failure },
}

impl Outcome {
    pub fn entry(&self) -> &Entry {
        match self {
            Self::Committed { entry, .. } | Self::Failed { entry, .. } => entry,
        }
    }

    pub fn identity(&self) -> String {
        self.entry().identity()
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Committed { .. } => None,
            Self::Failed { failure, .. } => Some(failure),
        }
    }

    pub fn kind(&self) -> Option<FailureKind> {
        self.failure().map(|f| f.kind)
    }
}

/// Outcomes of a batch, in the order the aggregator drained them.
#[derive(Debug, Clone, Default)]
pub struct Report {
    outcomes: Vec<Outcome>,
}

impl Report {
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn committed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_committed()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.committed()
    }

    pub fn count(&self, kind: FailureKind) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.kind() == Some(kind))
            .count()
    }

    /// The outcome recorded for `identity` (`namespace/name@version`).
    pub fn find(&self, identity: &str) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.identity() == identity)
    }

    /// One-line totals, e.g. `3 entries: 2 committed, 1 failed (version-mismatch: 1)`.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} entries: {} committed, {} failed",
            self.len(),
            self.committed(),
            self.failed()
        );

        let counts: Vec<String> = FailureKind::ALL
            .iter()
            .map(|kind| (kind, self.count(*kind)))
            .filter(|(_, count)| *count > 0)
            .map(|(kind, count)| format!("{kind}: {count}"))
            .collect();

        if !counts.is_empty() {
            let _ = write!(summary, " ({})", counts.join(", "));
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> Entry {
        Entry::new("heroku", name, "1.0.0", "ghcr.io/heroku/x@sha256:00")
    }

    fn failed(name: &str, kind: FailureKind) -> Outcome {
        Outcome::Failed {
            entry: entry(name),
            failure: Failure::new(kind, "boom"),
        }
    }

    #[test]
    fn test_report_counts() {
        let report = Report::new(vec![
            Outcome::Committed {
                entry: entry("nodejs"),
                metadata: Metadata::default(),
            },
            failed("go", FailureKind::VersionMismatch),
            failed("java", FailureKind::VersionMismatch),
            failed("php", FailureKind::SinkFailed),
        ]);

        assert_eq!(report.len(), 4);
        assert_eq!(report.committed(), 1);
        assert_eq!(report.failed(), 3);
        assert_eq!(report.count(FailureKind::VersionMismatch), 2);
        assert_eq!(report.count(FailureKind::FetchFailed), 0);
        assert_eq!(
            report.summary(),
            "4 entries: 1 committed, 3 failed (version-mismatch: 2, sink-failed: 1)"
        );
        assert!(report.find("heroku/go@1.0.0").is_some_and(|o| !o.is_committed()));
    }

    #[test]
    fn test_empty_report_summary() {
        let report = Report::default();
        assert!(report.is_empty());
        assert_eq!(report.summary(), "0 entries: 0 committed, 0 failed");
    }
}
