//! traceline CLI - T-SQL column-level lineage analyzer

mod cli;
mod input;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Args, OutputFormat};
use serde_json::json;
use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;
use traceline_core::{
    analyze_with, AnalyzeOptions, BatchDriver, BatchOptions, BatchOutcome, CancellationToken,
    ConstantPressure, MemoryPressure, MetadataProvider, NullMetadata, ScriptInput,
    StaticMetadata, TableSchema,
};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    match run() {
        Ok(has_errors) => {
            if has_errors {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("traceline: error: {e:#}");
            ExitCode::from(66)
        }
    }
}

fn run() -> Result<bool> {
    let args = Args::parse();

    let sources = input::read_input(&args.files)?;
    let schema = load_schema(&args)?;
    let provider: &dyn MetadataProvider = match &schema {
        Some(schema) => schema,
        None => &NullMetadata,
    };

    let options = AnalyzeOptions {
        time_budget: Duration::from_secs(args.time_budget),
        max_fragments: args.max_fragments,
        ..AnalyzeOptions::default()
    };

    let mut has_errors = false;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.batch {
        let scripts: Vec<ScriptInput> = sources
            .into_iter()
            .map(|source| ScriptInput::new(source.name, source.sql))
            .collect();
        let driver = BatchDriver::new(
            BatchOptions {
                analyze: options,
                ..BatchOptions::default()
            },
            &ConstantPressure(MemoryPressure::Low),
            provider,
        );
        for item in driver.run(&scripts, &CancellationToken::new()) {
            match item.outcome {
                BatchOutcome::Report(mut report) => {
                    if args.compact {
                        report.graph.compact();
                    }
                    has_errors |= report.summary.has_errors;
                    write_report(&mut out, &args, &item.name, &report)?;
                }
                BatchOutcome::ParseFailed(error) => {
                    has_errors = true;
                    eprintln!("{}: {error}", item.name);
                }
                BatchOutcome::Skipped => eprintln!("{}: skipped", item.name),
            }
        }
        return Ok(has_errors);
    }

    for source in sources {
        match analyze_with(&source.sql, &options, provider, CancellationToken::new()) {
            Ok(mut report) => {
                if args.compact {
                    report.graph.compact();
                }
                has_errors |= report.summary.has_errors;
                write_report(&mut out, &args, &source.name, &report)?;
            }
            Err(error) => {
                has_errors = true;
                eprintln!("{}: {error}", source.name);
            }
        }
    }
    Ok(has_errors)
}

fn write_report(
    out: &mut impl Write,
    args: &Args,
    name: &str,
    report: &traceline_core::AnalysisReport,
) -> Result<()> {
    match args.format {
        OutputFormat::Json => {
            let value = json!({
                "source": name,
                "summary": report.summary,
                "issues": report.issues,
                "graph": report.graph.snapshot(),
            });
            serde_json::to_writer_pretty(&mut *out, &value).context("failed to write JSON")?;
            writeln!(out)?;
        }
        OutputFormat::Summary => {
            writeln!(
                out,
                "{name}: {} statements, {} nodes, {} edges, {} issues{}",
                report.summary.statement_count,
                report.summary.node_count,
                report.summary.edge_count,
                report.issues.len(),
                if report.should_stop { " (partial)" } else { "" },
            )?;
        }
    }
    Ok(())
}

fn load_schema(args: &Args) -> Result<Option<StaticMetadata>> {
    let Some(path) = &args.schema else {
        return Ok(None);
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema file {}", path.display()))?;
    let tables: Vec<TableSchema> =
        serde_json::from_str(&text).context("schema file is not a valid table list")?;
    Ok(Some(StaticMetadata::new(tables)))
}
