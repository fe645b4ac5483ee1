//! Error types for graph mutation and analysis.
//!
//! Two complementary patterns are used throughout the crate:
//!
//! - [`StoreError`]: structural faults in the graph store (dangling edge
//!   endpoints, lookups of unknown IDs). These indicate programming errors
//!   and are surfaced to the caller as `Result`s.
//!
//! - [`crate::types::Issue`]: non-fatal findings collected during analysis
//!   (unresolved references, unsupported syntax, tripped budgets). These
//!   accumulate alongside a successful, partial result so one malformed
//!   fragment never sinks a whole script.

use crate::graph::NodeId;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Structural fault in the graph store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// An edge referenced a node that is not present in the graph.
    #[error("unknown edge endpoint: node {0:?} is not in the graph")]
    UnknownEndpoint(NodeId),

    /// A lookup by ID found nothing.
    #[error("no entity with the requested id")]
    NotFound,
}

/// Failure inside a single statement/expression handler.
///
/// Handler failures are always recovered locally: the walker logs them at
/// warning level, records an issue, and continues with the next sibling
/// fragment.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Message(String),
}

impl HandlerError {
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}

/// Error encountered while parsing a T-SQL script.
///
/// Preserves structured information from the underlying parser, including
/// position information when available.
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Human-readable error message.
    pub message: String,
    /// Position where the error occurred, if available.
    pub position: Option<Position>,
    /// The specific category of parse error.
    pub kind: ParseErrorKind,
}

/// Position information for a parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Line number (1-indexed).
    pub line: usize,
    /// Column number (1-indexed).
    pub column: usize,
}

/// Category of parse error for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseErrorKind {
    /// Unexpected token or character in input.
    #[default]
    SyntaxError,
    /// Missing required clause or keyword.
    MissingClause,
    /// Invalid or unexpected end of input.
    UnexpectedEof,
    /// Feature not supported by the dialect.
    UnsupportedFeature,
    /// Lexer/tokenization error.
    LexerError,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
            kind: ParseErrorKind::SyntaxError,
        }
    }

    /// Parses position from the sqlparser error message format
    /// ("... at Line: X, Column: Y").
    fn parse_position_from_message(message: &str) -> Option<Position> {
        static POSITION_REGEX: OnceLock<Regex> = OnceLock::new();
        let re = POSITION_REGEX.get_or_init(|| {
            Regex::new(r"Line:\s*(\d+)\s*,\s*Column:\s*(\d+)").expect("Invalid regex pattern")
        });

        re.captures(message).and_then(|caps| {
            let line: usize = caps.get(1)?.as_str().parse().ok()?;
            let column: usize = caps.get(2)?.as_str().parse().ok()?;
            Some(Position { line, column })
        })
    }

    /// Determines the error kind from the message content. Relies on
    /// patterns in `sqlparser` error messages and may need updates if those
    /// messages change.
    fn infer_kind_from_message(message: &str) -> ParseErrorKind {
        let lower = message.to_lowercase();
        if lower.contains("unexpected end") || lower.contains("eof") {
            ParseErrorKind::UnexpectedEof
        } else if lower.contains("expected") {
            ParseErrorKind::MissingClause
        } else if lower.contains("not supported") || lower.contains("unsupported") {
            ParseErrorKind::UnsupportedFeature
        } else if lower.contains("lexer") || lower.contains("token") {
            ParseErrorKind::LexerError
        } else {
            ParseErrorKind::SyntaxError
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parse error")?;
        if let Some(pos) = self.position {
            write!(f, " at line {}, column {}", pos.line, pos.column)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<sqlparser::parser::ParserError> for ParseError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        let message = err.to_string();
        let position = Self::parse_position_from_message(&message);
        let kind = Self::infer_kind_from_message(&message);
        Self {
            message,
            position,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_position_from_message() {
        let msg = "Expected SELECT, found 'INSERT' at Line: 1, Column: 5";
        let pos = ParseError::parse_position_from_message(msg);
        assert_eq!(pos, Some(Position { line: 1, column: 5 }));
    }

    #[test]
    fn parse_position_absent() {
        assert_eq!(ParseError::parse_position_from_message("Unexpected token"), None);
    }

    #[test]
    fn infer_kinds() {
        assert_eq!(
            ParseError::infer_kind_from_message("Unexpected end of input"),
            ParseErrorKind::UnexpectedEof
        );
        assert_eq!(
            ParseError::infer_kind_from_message("Expected SELECT keyword"),
            ParseErrorKind::MissingClause
        );
        assert_eq!(
            ParseError::infer_kind_from_message("Something went wrong"),
            ParseErrorKind::SyntaxError
        );
    }

    #[test]
    fn display_with_position() {
        let mut err = ParseError::new("Unexpected token");
        err.position = Some(Position { line: 10, column: 5 });
        assert_eq!(
            err.to_string(),
            "Parse error at line 10, column 5: Unexpected token"
        );
    }
}
