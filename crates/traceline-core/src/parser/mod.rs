//! T-SQL parsing front-end.
//!
//! The analyzer core consumes the syntax tree produced here; everything else
//! about parsing (grammar, tokenization) belongs to `sqlparser`.

use crate::error::ParseError;
use sqlparser::ast::Statement;
use sqlparser::dialect::MsSqlDialect;
use sqlparser::parser::Parser;

/// Parses a T-SQL script into statements.
pub fn parse_sql(sql: &str) -> Result<Vec<Statement>, ParseError> {
    let dialect = MsSqlDialect {};
    Parser::parse_sql(&dialect, sql).map_err(ParseError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_select() {
        let statements = parse_sql("SELECT a, b FROM T1").unwrap();
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn parses_multiple_statements() {
        let statements = parse_sql("SELECT 1; SELECT 2;").unwrap();
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn parses_temp_table_names() {
        let statements = parse_sql("SELECT c1 FROM #TempOrders").unwrap();
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn parses_variable_references() {
        let statements = parse_sql("SELECT * FROM Orders WHERE CustomerId = @id").unwrap();
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn parses_cte() {
        let sql = "WITH C AS (SELECT x, y FROM T) SELECT x FROM C";
        assert!(parse_sql(sql).is_ok());
    }

    #[test]
    fn parses_insert_select() {
        let sql = "INSERT INTO #X (c1, c2) SELECT a, a + b FROM T1";
        assert!(parse_sql(sql).is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_sql("SELECT * FROM").is_err());
    }
}
