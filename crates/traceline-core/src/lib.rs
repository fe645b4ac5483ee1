//! Core T-SQL column-level lineage analysis engine.
//!
//! Feed a T-SQL script to [`analyze`] and get back a [`LineageGraph`]: a
//! directed multigraph whose vertices are tables, columns, and expressions,
//! and whose edges describe how data flows from source columns into target
//! columns through SELECTs, INSERTs, UPDATEs, joins, CTEs, subqueries, CASE
//! expressions, window functions, PIVOT/UNPIVOT, temp tables, and stored
//! procedure parameters.

pub mod analyzer;
pub mod ast;
pub mod batch;
pub mod error;
pub mod graph;
pub mod intern;
pub mod metadata;
pub mod parser;
pub mod types;

// Re-export main entry points and types
pub use analyzer::{analyze, analyze_into, analyze_with, AnalysisReport};
pub use batch::{
    BatchDriver, BatchItem, BatchOptions, BatchOutcome, ConstantPressure, MemoryPressure,
    MergedItem, PressureProbe, ScriptInput,
};
pub use error::{ParseError, ParseErrorKind, Position, StoreError};
pub use graph::{
    ColumnFlags, Edge, EdgeId, EdgeType, ExpressionKind, GraphSnapshot, LineageGraph, Node,
    NodeData, NodeId, NodeKind, TableKind,
};
pub use metadata::{ColumnSpec, MetadataProvider, NullMetadata, StaticMetadata, TableSchema};
pub use parser::parse_sql;
pub use types::{
    issue_codes, AnalyzeOptions, CancellationToken, Issue, IssueCount, Severity, Summary,
};
