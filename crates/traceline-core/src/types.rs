//! Analysis options, issues, and result types.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative cancellation signal shared between a driver and its walkers.
///
/// Cancelling is sticky and propagates through clones; walkers consult the
/// token on every fragment dequeue and drain rather than abort.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// An issue encountered during analysis (error, warning, or info).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// Severity level
    pub severity: Severity,

    /// Machine-readable issue code
    pub code: String,

    /// Human-readable message
    pub message: String,

    /// Optional: which statement index this issue relates to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_index: Option<usize>,
}

impl Issue {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: code.into(),
            message: message.into(),
            statement_index: None,
        }
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code: code.into(),
            message: message.into(),
            statement_index: None,
        }
    }

    pub fn info(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            code: code.into(),
            message: message.into(),
            statement_index: None,
        }
    }

    pub fn with_statement(mut self, index: usize) -> Self {
        self.statement_index = Some(index);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Machine-readable issue codes.
pub mod issue_codes {
    pub const PARSE_ERROR: &str = "PARSE_ERROR";
    pub const UNSUPPORTED_SYNTAX: &str = "UNSUPPORTED_SYNTAX";
    pub const UNRESOLVED_REFERENCE: &str = "UNRESOLVED_REFERENCE";
    pub const HANDLER_FAILURE: &str = "HANDLER_FAILURE";
    pub const BUDGET_EXCEEDED: &str = "BUDGET_EXCEEDED";
    pub const CANCELLED: &str = "CANCELLED";
    pub const COLUMN_COUNT_MISMATCH: &str = "COLUMN_COUNT_MISMATCH";
}

/// Tuning knobs for a single-script analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzeOptions {
    /// Wall-clock budget per script.
    #[serde(with = "duration_millis")]
    pub time_budget: Duration,

    /// Maximum number of syntax fragments visited per script.
    pub max_fragments: usize,

    /// Initial node storage capacity; grows geometrically when exceeded.
    pub initial_node_capacity: usize,

    /// Initial edge storage capacity; grows geometrically when exceeded.
    pub initial_edge_capacity: usize,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            time_budget: Duration::from_secs(30),
            max_fragments: 50_000,
            initial_node_capacity: 1024,
            initial_edge_capacity: 2048,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Summary statistics for an analysis result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Number of statements analyzed
    pub statement_count: usize,

    /// Total nodes in the produced graph
    pub node_count: usize,

    /// Total edges in the produced graph
    pub edge_count: usize,

    /// Issue counts by severity
    pub issue_count: IssueCount,

    /// Quick check: true if any errors were encountered
    pub has_errors: bool,
}

/// Counts of issues by severity level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCount {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
}

impl IssueCount {
    pub fn tally(issues: &[Issue]) -> Self {
        let mut count = Self::default();
        for issue in issues {
            match issue.severity {
                Severity::Error => count.errors += 1,
                Severity::Warning => count.warnings += 1,
                Severity::Info => count.infos += 1,
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_builder() {
        let issue = Issue::warning(issue_codes::UNRESOLVED_REFERENCE, "no such column")
            .with_statement(2);
        assert_eq!(issue.severity, Severity::Warning);
        assert_eq!(issue.statement_index, Some(2));
    }

    #[test]
    fn default_budgets_match_contract() {
        let options = AnalyzeOptions::default();
        assert_eq!(options.time_budget, Duration::from_secs(30));
        assert_eq!(options.max_fragments, 50_000);
        assert_eq!(options.initial_node_capacity, 1024);
        assert_eq!(options.initial_edge_capacity, 2048);
    }

    #[test]
    fn issue_count_tally() {
        let issues = vec![
            Issue::error("X", "a"),
            Issue::warning("Y", "b"),
            Issue::warning("Z", "c"),
        ];
        let count = IssueCount::tally(&issues);
        assert_eq!(count.errors, 1);
        assert_eq!(count.warnings, 2);
        assert_eq!(count.infos, 0);
    }
}
