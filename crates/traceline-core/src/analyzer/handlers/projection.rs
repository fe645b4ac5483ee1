//! Select-list processing: bare column references, computed expressions,
//! wildcard expansion, and T-SQL variable assignment in SELECT.

use super::super::context::CURRENT_TARGET_COLUMN;
use super::super::helpers::{column_ref_parts, expr_display, is_variable_name};
use super::super::Analysis;
use super::{Handled, HandlerError, Target};
use crate::ast::FragmentRef;
use crate::graph::EdgeType;
use sqlparser::ast::{BinaryOperator, Expr, SelectItem};

/// Organic entry for a select element reached outside a query-spec handler;
/// positional insert pairing is unavailable on this path.
pub(super) fn select_element(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let FragmentRef::SelectItem(item) = fragment else {
        return Ok(Handled::No);
    };
    analysis.process_select_item(item, usize::MAX);
    Ok(Handled::Yes)
}

impl Analysis<'_> {
    /// Processes one select element at its positional `index`.
    pub(crate) fn process_select_item(&mut self, item: &SelectItem, index: usize) {
        match item {
            SelectItem::UnnamedExpr(expr) => self.process_select_expr(expr, None, index),
            SelectItem::ExprWithAlias { expr, alias } => {
                self.process_select_expr(expr, Some(alias.value.as_str()), index)
            }
            SelectItem::QualifiedWildcard(kind, _) => {
                let qualifier = kind.to_string();
                let qualifier = qualifier.trim_end_matches('*').trim_end_matches('.');
                self.expand_wildcard(Some(qualifier.to_string()));
            }
            SelectItem::Wildcard(_) => self.expand_wildcard(None),
        }
    }

    fn process_select_expr(&mut self, expr: &Expr, alias: Option<&str>, index: usize) {
        self.mark_visited(FragmentRef::Expr(expr));

        // T-SQL assignment form: SELECT @total = expr FROM ...
        if let Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } = expr
        {
            if let Some((None, name)) = column_ref_parts(left) {
                if is_variable_name(&name) {
                    let variable = self.ensure_variable(&name);
                    self.process_assignment(variable, right, "SET");
                    return;
                }
            }
        }

        // Bare column reference: a Direct edge into the target.
        if let Some((qualifier, column)) = column_ref_parts(expr) {
            let target_name = alias.unwrap_or(&column);
            let Some(target) = self.ensure_target_column(target_name, index) else {
                return;
            };
            let source = self.resolve_column_source(qualifier.as_deref(), &column);
            let _ = self.graph.add_edge(
                source,
                target.column,
                EdgeType::Direct,
                target.operation,
                Some(&expr_display(expr)),
            );
            return;
        }

        // Literals carry no provenance, but the output column still exists.
        if matches!(expr, Expr::Value(_)) {
            let name = alias.map(str::to_string).unwrap_or_else(|| expr_display(expr));
            self.ensure_target_column(&name, index);
            return;
        }

        // Computed expression: an Expression node mediates the flow.
        let name = alias.map(str::to_string).unwrap_or_else(|| expr_display(expr));
        let Some(target) = self.ensure_target_column(&name, index) else {
            return;
        };

        let previous = self.ctx.set_column_context(CURRENT_TARGET_COLUMN, target.column);
        let (node, label) = self.materialize_expression(expr, target.operation);
        self.ctx
            .restore_column_context(CURRENT_TARGET_COLUMN, previous);

        self.emit_expression_edge(node, label, &target, &expr_display(expr));
    }

    /// The edge from a materialized expression into its target column:
    /// Indirect labelled INSERT inside an INSERT ... SELECT, otherwise Direct
    /// labelled with the expression's own kind (CASE, COALESCE, NULLIF) or
    /// the context operation.
    pub(crate) fn emit_expression_edge(
        &mut self,
        node: crate::graph::NodeId,
        label: Option<&'static str>,
        target: &Target,
        text: &str,
    ) {
        let operation = match target.expr_edge {
            EdgeType::Indirect => target.operation,
            _ => label.unwrap_or(target.operation),
        };
        let _ = self
            .graph
            .add_edge(node, target.column, target.expr_edge, operation, Some(text));
    }

    /// Expands `*` or `alias.*` against known columns of the tables in
    /// scope. With no metadata and no previously discovered columns this
    /// produces nothing.
    fn expand_wildcard(&mut self, qualifier: Option<String>) {
        let tables: Vec<String> = match &qualifier {
            Some(qualifier) => self
                .ctx
                .resolve_table_name(qualifier)
                .into_iter()
                .collect(),
            None => self.from_tables(),
        };

        for table in tables {
            let columns: Vec<(String, Option<String>)> = match self.provider.table_columns(&table)
            {
                Some(specs) => specs
                    .into_iter()
                    .map(|spec| (spec.name, spec.data_type))
                    .collect(),
                None => match self
                    .ctx
                    .resolve_table(&table)
                    .and_then(|id| self.graph.get_node(id).ok())
                {
                    Some(node) => node
                        .columns()
                        .iter()
                        .filter_map(|&column| self.graph.get_node(column).ok())
                        .map(|column| (column.name.to_string(), None))
                        .collect(),
                    None => Vec::new(),
                },
            };

            // Inside INSERT ... SELECT the wildcard has no positional targets
            // here; sources are ensured so the name-matching fallback can
            // pair them.
            let insert_mode = self
                .ctx
                .meta_flag(super::super::context::meta::PROCESSING_INSERT_SELECT);
            for (column, data_type) in columns {
                let data_type = data_type.as_deref().unwrap_or("unknown");
                let source = self
                    .ctx
                    .get_or_create_column(self.graph, &table, &column, data_type);
                if insert_mode {
                    continue;
                }
                let owner = self.result_owner();
                let target = self
                    .ctx
                    .get_or_create_column(self.graph, &owner, &column, data_type);
                let _ = self.graph.add_edge(
                    source,
                    target,
                    EdgeType::Direct,
                    "SELECT",
                    Some(&format!("{table}.{column}")),
                );
            }
        }
    }

    /// An assignment flow into a variable or parameter column, operation
    /// `SET`. Used by SET, DECLARE with initializer, and SELECT @v = expr.
    pub(crate) fn process_assignment(
        &mut self,
        variable: crate::graph::NodeId,
        value: &Expr,
        operation: &str,
    ) {
        self.mark_visited(FragmentRef::Expr(value));
        if matches!(value, Expr::Value(_)) {
            return;
        }
        if let Some((qualifier, column)) = column_ref_parts(value) {
            let source = self.resolve_column_source(qualifier.as_deref(), &column);
            let _ = self.graph.add_edge(
                source,
                variable,
                EdgeType::Direct,
                operation,
                Some(&expr_display(value)),
            );
            return;
        }
        let (node, _) = self.materialize_expression(value, operation);
        let _ = self.graph.add_edge(
            node,
            variable,
            EdgeType::Direct,
            operation,
            Some(&expr_display(value)),
        );
    }
}
