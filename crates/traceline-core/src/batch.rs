//! Parallel analysis of many scripts on a bounded worker pool.
//!
//! Each script gets its own resolution context and (outside merge mode) its
//! own graph, so workers share nothing but the cancellation token. The
//! worker count adapts to a memory-pressure signal supplied by the caller as
//! an explicit probe, and the chunk size grows and shrinks with it.

use crate::analyzer::{analyze_into, analyze_with, AnalysisReport};
use crate::error::ParseError;
use crate::graph::LineageGraph;
use crate::metadata::MetadataProvider;
use crate::parser::parse_sql;
use crate::types::{AnalyzeOptions, CancellationToken, Issue};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{info, warn};

/// Memory-pressure signal consumed by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressure {
    Low,
    Medium,
    High,
}

/// Supplies the current memory-pressure level. Passed in explicitly; the
/// driver never consults ambient process state.
pub trait PressureProbe: Send + Sync {
    fn current(&self) -> MemoryPressure;
}

/// A probe pinned to one level.
#[derive(Debug, Clone, Copy)]
pub struct ConstantPressure(pub MemoryPressure);

impl PressureProbe for ConstantPressure {
    fn current(&self) -> MemoryPressure {
        self.0
    }
}

/// One script to analyze.
#[derive(Debug, Clone)]
pub struct ScriptInput {
    pub name: String,
    pub sql: String,
}

impl ScriptInput {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
        }
    }
}

/// Per-input outcome of a batch run.
pub struct BatchItem {
    pub name: String,
    pub outcome: BatchOutcome,
}

pub enum BatchOutcome {
    Report(AnalysisReport),
    ParseFailed(ParseError),
    /// The driver was cancelled before this input started.
    Skipped,
}

/// Per-input outcome of a merge-mode run.
pub struct MergedItem {
    pub name: String,
    pub issues: Vec<Issue>,
    pub should_stop: bool,
    pub error: Option<ParseError>,
}

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub analyze: AnalyzeOptions,
    /// Starting chunk size; adapts between 1 and `max_batch_size`.
    pub initial_batch_size: usize,
    pub max_batch_size: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            analyze: AnalyzeOptions::default(),
            initial_batch_size: 16,
            max_batch_size: 256,
        }
    }
}

/// Runs independent analyzer instances over many scripts with bounded,
/// pressure-adaptive concurrency.
pub struct BatchDriver<'a> {
    options: BatchOptions,
    probe: &'a dyn PressureProbe,
    provider: &'a dyn MetadataProvider,
}

impl<'a> BatchDriver<'a> {
    pub fn new(
        options: BatchOptions,
        probe: &'a dyn PressureProbe,
        provider: &'a dyn MetadataProvider,
    ) -> Self {
        Self {
            options,
            probe,
            provider,
        }
    }

    /// Analyzes every script into its own graph. Input order is preserved
    /// in the result; no inter-script ordering is promised during
    /// execution.
    pub fn run(&self, scripts: &[ScriptInput], cancel: &CancellationToken) -> Vec<BatchItem> {
        let mut results = Vec::with_capacity(scripts.len());
        let mut batch_size = self.options.initial_batch_size.max(1);
        let mut index = 0;

        while index < scripts.len() {
            if cancel.is_cancelled() {
                warn!(remaining = scripts.len() - index, "batch cancelled");
                for script in &scripts[index..] {
                    results.push(BatchItem {
                        name: script.name.clone(),
                        outcome: BatchOutcome::Skipped,
                    });
                }
                break;
            }

            let pressure = self.probe.current();
            let workers = concurrency_for(pressure);
            batch_size = adapt_batch_size(batch_size, pressure, self.options.max_batch_size);
            let end = (index + batch_size).min(scripts.len());
            info!(
                from = index,
                to = end,
                workers,
                ?pressure,
                "processing batch"
            );

            let chunk = &scripts[index..end];
            let chunk_results: Vec<BatchItem> = match ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
            {
                Ok(pool) => pool.install(|| {
                    chunk
                        .par_iter()
                        .map(|script| self.run_one(script, cancel))
                        .collect()
                }),
                Err(error) => {
                    warn!(%error, "thread pool unavailable; running sequentially");
                    chunk
                        .iter()
                        .map(|script| self.run_one(script, cancel))
                        .collect()
                }
            };
            results.extend(chunk_results);
            index = end;
        }
        results
    }

    fn run_one(&self, script: &ScriptInput, cancel: &CancellationToken) -> BatchItem {
        let outcome = match analyze_with(
            &script.sql,
            &self.options.analyze,
            self.provider,
            cancel.clone(),
        ) {
            Ok(report) => BatchOutcome::Report(report),
            Err(error) => BatchOutcome::ParseFailed(error),
        };
        BatchItem {
            name: script.name.clone(),
            outcome,
        }
    }

    /// Merge mode: every script writes into one shared graph. Writers
    /// serialize through the graph's lock partitions.
    pub fn run_merged(
        &self,
        scripts: &[ScriptInput],
        graph: &LineageGraph,
        cancel: &CancellationToken,
    ) -> Vec<MergedItem> {
        let workers = concurrency_for(self.probe.current());
        let run = || {
            scripts
                .par_iter()
                .map(|script| match parse_sql(&script.sql) {
                    Ok(statements) => {
                        let (issues, should_stop) = analyze_into(
                            graph,
                            &statements,
                            &self.options.analyze,
                            self.provider,
                            cancel.clone(),
                        );
                        MergedItem {
                            name: script.name.clone(),
                            issues,
                            should_stop,
                            error: None,
                        }
                    }
                    Err(error) => MergedItem {
                        name: script.name.clone(),
                        issues: Vec::new(),
                        should_stop: false,
                        error: Some(error),
                    },
                })
                .collect()
        };
        match ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool.install(run),
            Err(_) => run(),
        }
    }
}

/// Worker permits per pressure level: all cores when Low, half when Medium,
/// a quarter (minimum 2) when High.
fn concurrency_for(pressure: MemoryPressure) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    match pressure {
        MemoryPressure::Low => cores.max(1),
        MemoryPressure::Medium => (cores / 2).max(2),
        MemoryPressure::High => (cores / 4).max(2),
    }
}

fn adapt_batch_size(current: usize, pressure: MemoryPressure, max: usize) -> usize {
    match pressure {
        MemoryPressure::Low => (current * 2).min(max.max(1)),
        MemoryPressure::Medium => current.max(1),
        MemoryPressure::High => (current / 2).max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::NullMetadata;

    #[test]
    fn analyzes_scripts_independently() {
        let scripts = vec![
            ScriptInput::new("a", "SELECT a FROM T1"),
            ScriptInput::new("b", "SELECT b FROM T2"),
            ScriptInput::new("broken", "SELECT FROM"),
        ];
        let driver = BatchDriver::new(
            BatchOptions::default(),
            &ConstantPressure(MemoryPressure::Low),
            &NullMetadata,
        );
        let results = driver.run(&scripts, &CancellationToken::new());
        assert_eq!(results.len(), 3);
        assert!(matches!(results[0].outcome, BatchOutcome::Report(_)));
        assert!(matches!(results[1].outcome, BatchOutcome::Report(_)));
        assert!(matches!(results[2].outcome, BatchOutcome::ParseFailed(_)));
        if let BatchOutcome::Report(report) = &results[0].outcome {
            assert!(report.graph.get_table("T1").is_some());
            assert!(report.graph.get_table("T2").is_none());
        }
    }

    #[test]
    fn cancellation_skips_remaining_inputs() {
        let scripts = vec![
            ScriptInput::new("a", "SELECT a FROM T1"),
            ScriptInput::new("b", "SELECT b FROM T2"),
        ];
        let cancel = CancellationToken::new();
        cancel.cancel();
        let driver = BatchDriver::new(
            BatchOptions::default(),
            &ConstantPressure(MemoryPressure::Low),
            &NullMetadata,
        );
        let results = driver.run(&scripts, &cancel);
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|item| matches!(item.outcome, BatchOutcome::Skipped)));
    }

    #[test]
    fn merge_mode_deduplicates_into_shared_graph() {
        let scripts: Vec<ScriptInput> = (0..8)
            .map(|i| ScriptInput::new(format!("s{i}"), "SELECT a, b FROM Shared"))
            .collect();
        let graph = LineageGraph::new("");
        let driver = BatchDriver::new(
            BatchOptions::default(),
            &ConstantPressure(MemoryPressure::Medium),
            &NullMetadata,
        );
        let results = driver.run_merged(&scripts, &graph, &CancellationToken::new());
        assert_eq!(results.len(), 8);
        assert!(results.iter().all(|item| item.error.is_none()));
        // Shared, Shared.a, Shared.b exist exactly once despite 8 writers.
        assert!(graph.get_table("Shared").is_some());
        assert_eq!(
            graph
                .nodes_of_kind(crate::graph::NodeKind::Column)
                .iter()
                .filter(|&&id| {
                    let node = graph.get_node(id).unwrap();
                    node.table_owner() == Some("Shared")
                })
                .count(),
            2
        );
    }

    #[test]
    fn pressure_scales_concurrency_down() {
        let low = concurrency_for(MemoryPressure::Low);
        let medium = concurrency_for(MemoryPressure::Medium);
        let high = concurrency_for(MemoryPressure::High);
        assert!(low >= medium);
        assert!(medium >= high);
        assert!(high >= 2);
    }
}
