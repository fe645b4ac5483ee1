//! The lineage analyzer: walker, resolution context, handler dispatch, and
//! expression linking over a parsed T-SQL script.

pub mod context;
mod expression;
mod handlers;
mod helpers;
mod walker;

use crate::ast::FragmentRef;
use crate::error::ParseError;
use crate::graph::LineageGraph;
use crate::metadata::{MetadataProvider, NullMetadata};
use crate::parser::parse_sql;
use crate::types::{
    AnalyzeOptions, CancellationToken, Issue, IssueCount, Severity, Summary,
};
use context::ResolutionContext;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// The result of analyzing one script.
pub struct AnalysisReport {
    /// The produced lineage graph.
    pub graph: LineageGraph,
    /// Non-fatal findings collected during analysis.
    pub issues: Vec<Issue>,
    /// Summary statistics.
    pub summary: Summary,
    /// True when a time/fragment budget or cancellation cut the walk short.
    /// The graph is partial but well-formed.
    pub should_stop: bool,
    /// Wall-clock time spent analyzing.
    pub elapsed: Duration,
}

/// Analyzes a T-SQL script with default options and no schema metadata.
pub fn analyze(sql: &str) -> Result<AnalysisReport, ParseError> {
    analyze_with(
        sql,
        &AnalyzeOptions::default(),
        &NullMetadata,
        CancellationToken::new(),
    )
}

/// Analyzes a T-SQL script.
pub fn analyze_with(
    sql: &str,
    options: &AnalyzeOptions,
    provider: &dyn MetadataProvider,
    cancel: CancellationToken,
) -> Result<AnalysisReport, ParseError> {
    let statements = parse_sql(sql)?;
    let graph = LineageGraph::with_options(sql, options);
    let started = Instant::now();
    let (issues, should_stop) =
        run_statements(&graph, &statements, options, provider, cancel);
    let elapsed = started.elapsed();

    let issue_count = IssueCount::tally(&issues);
    let summary = Summary {
        statement_count: statements.len(),
        node_count: graph.node_count(),
        edge_count: graph.edge_count(),
        has_errors: issue_count.errors > 0,
        issue_count,
    };
    graph.set_metadata("shouldStop", serde_json::Value::Bool(should_stop));
    if !issues.is_empty() {
        graph.set_metadata(
            "issues",
            serde_json::to_value(&issues).unwrap_or_default(),
        );
    }

    Ok(AnalysisReport {
        graph,
        issues,
        summary,
        should_stop,
        elapsed,
    })
}

/// Analyzes already-parsed statements into an existing graph. This is the
/// batch driver's merge-mode entry point: multiple scripts may target the
/// same graph concurrently.
pub fn analyze_into(
    graph: &LineageGraph,
    statements: &[sqlparser::ast::Statement],
    options: &AnalyzeOptions,
    provider: &dyn MetadataProvider,
    cancel: CancellationToken,
) -> (Vec<Issue>, bool) {
    run_statements(graph, statements, options, provider, cancel)
}

fn run_statements(
    graph: &LineageGraph,
    statements: &[sqlparser::ast::Statement],
    options: &AnalyzeOptions,
    provider: &dyn MetadataProvider,
    cancel: CancellationToken,
) -> (Vec<Issue>, bool) {
    let mut analysis = Analysis::new(graph, options, provider, cancel);
    for (index, statement) in statements.iter().enumerate() {
        analysis.statement_index = index;
        analysis.walk(FragmentRef::Statement(statement));
    }
    (analysis.issues, analysis.should_stop)
}

/// Mutable state for one script walk. Handler modules extend this with
/// `impl` blocks.
pub(crate) struct Analysis<'a> {
    pub(crate) graph: &'a LineageGraph,
    pub(crate) ctx: ResolutionContext,
    pub(crate) provider: &'a dyn MetadataProvider,
    pub(crate) options: &'a AnalyzeOptions,
    pub(crate) issues: Vec<Issue>,
    pub(crate) statement_index: usize,
    pub(crate) cancel: CancellationToken,
    pub(crate) visited: HashSet<usize>,
    pub(crate) fragments_visited: usize,
    pub(crate) started: Instant,
    pub(crate) should_stop: bool,
}

impl<'a> Analysis<'a> {
    pub(crate) fn new(
        graph: &'a LineageGraph,
        options: &'a AnalyzeOptions,
        provider: &'a dyn MetadataProvider,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            graph,
            ctx: ResolutionContext::new(),
            provider,
            options,
            issues: Vec::new(),
            statement_index: 0,
            cancel,
            visited: HashSet::new(),
            fragments_visited: 0,
            started: Instant::now(),
            should_stop: false,
        }
    }

    pub(crate) fn issue(&mut self, severity: Severity, code: &str, message: impl Into<String>) {
        let issue = match severity {
            Severity::Error => Issue::error(code, message),
            Severity::Warning => Issue::warning(code, message),
            Severity::Info => Issue::info(code, message),
        };
        self.issues.push(issue.with_statement(self.statement_index));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_script_produces_empty_graph() {
        let report = analyze("").unwrap();
        assert_eq!(report.graph.node_count(), 0);
        assert_eq!(report.graph.edge_count(), 0);
        assert_eq!(report.summary.statement_count, 0);
        assert!(!report.should_stop);
    }

    #[test]
    fn unknown_table_yields_single_table_node() {
        let report = analyze("SELECT * FROM MysteryTable").unwrap();
        let table = report.graph.get_table("MysteryTable").expect("table node");
        let node = report.graph.get_node(table).unwrap();
        assert!(node.columns().is_empty());
    }
}
