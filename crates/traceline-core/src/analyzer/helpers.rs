//! Small naming and expression helpers shared by the handlers.

use sqlparser::ast::{BinaryOperator, Expr};

/// True for `[quoted]`, `"quoted"`, or `` `quoted` `` identifiers.
pub(crate) fn is_quoted_identifier(name: &str) -> bool {
    (name.starts_with('[') && name.ends_with(']'))
        || (name.starts_with('"') && name.ends_with('"'))
        || (name.starts_with('`') && name.ends_with('`'))
}

pub(crate) fn unquote_identifier(name: &str) -> &str {
    if is_quoted_identifier(name) && name.len() >= 2 {
        &name[1..name.len() - 1]
    } else {
        name
    }
}

/// Normalizes a possibly-qualified object name for storage: strips quoting
/// from each dot-separated part, preserves case.
pub(crate) fn clean_object_name(name: &str) -> String {
    name.split('.')
        .map(unquote_identifier)
        .collect::<Vec<_>>()
        .join(".")
}

pub(crate) fn is_variable_name(name: &str) -> bool {
    name.starts_with('@')
}

pub(crate) fn is_temp_table_name(name: &str) -> bool {
    name.starts_with('#')
}

/// Splits a column-reference expression into `(qualifier, column)`.
/// Returns `None` for anything that is not a bare column reference.
pub(crate) fn column_ref_parts(expr: &Expr) -> Option<(Option<String>, String)> {
    match expr {
        Expr::Identifier(ident) => Some((None, ident.value.clone())),
        Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
            let qualifier = parts[..parts.len() - 1]
                .iter()
                .map(|ident| ident.value.as_str())
                .collect::<Vec<_>>()
                .join(".");
            let column = parts.last()?.value.clone();
            Some((Some(qualifier), column))
        }
        _ => None,
    }
}

/// Calls `f` for each `left = right` equality conjunct in a predicate,
/// looking through AND/OR and parentheses.
pub(crate) fn for_each_equality<'e>(expr: &'e Expr, f: &mut impl FnMut(&'e Expr, &'e Expr)) {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            BinaryOperator::And | BinaryOperator::Or => {
                for_each_equality(left, f);
                for_each_equality(right, f);
            }
            BinaryOperator::Eq => f(left, right),
            _ => {}
        },
        Expr::Nested(inner) => for_each_equality(inner, f),
        _ => {}
    }
}

/// Display text of an expression, bounded so pathological inputs do not
/// bloat node payloads.
pub(crate) fn expr_display(expr: &Expr) -> String {
    let mut text = expr.to_string();
    const MAX: usize = 512;
    if text.len() > MAX {
        let mut cut = MAX;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    text
}
