//! Expression linking: recursive descent over scalar/boolean expressions
//! that enriches an expression node with its input provenance.
//!
//! The linker only ever emits source-column → expression edges; edges from
//! an expression to its target are the dispatching handler's business.

use super::context::meta;
use super::helpers::{column_ref_parts, expr_display};
use super::Analysis;
use crate::ast::{function_arg_exprs, FragmentRef};
use crate::graph::{EdgeType, ExpressionKind, NodeId};
use crate::types::{issue_codes, Severity};
use sqlparser::ast::{Expr, WindowType};
use tracing::debug;

/// Maximum recursion depth for expression traversal, guarding the stack
/// against pathologically nested expressions.
pub(crate) const MAX_RECURSION_DEPTH: usize = 100;

impl Analysis<'_> {
    /// Emits one `edge_type` edge per column referenced anywhere inside
    /// `expr`, from the column to `target`.
    pub(crate) fn link_expression(
        &mut self,
        expr: &Expr,
        target: NodeId,
        edge_type: EdgeType,
        operation: &str,
    ) {
        self.link_expression_at(expr, target, edge_type, operation, 0);
    }

    fn link_expression_at(
        &mut self,
        expr: &Expr,
        target: NodeId,
        edge_type: EdgeType,
        operation: &str,
        depth: usize,
    ) {
        if depth > MAX_RECURSION_DEPTH {
            debug!(depth, "max recursion depth exceeded in expression linker");
            self.issue(
                Severity::Warning,
                issue_codes::UNSUPPORTED_SYNTAX,
                "expression nesting too deep; provenance truncated",
            );
            return;
        }
        let next = depth + 1;

        match expr {
            Expr::Identifier(_) | Expr::CompoundIdentifier(_) => {
                if let Some((qualifier, column)) = column_ref_parts(expr) {
                    let source = self.resolve_column_source(qualifier.as_deref(), &column);
                    let _ = self.graph.add_edge(
                        source,
                        target,
                        edge_type,
                        operation,
                        Some(&expr_display(expr)),
                    );
                }
            }
            Expr::BinaryOp { left, right, .. } => {
                self.link_expression_at(left, target, edge_type, operation, next);
                self.link_expression_at(right, target, edge_type, operation, next);
            }
            Expr::UnaryOp { expr, .. } | Expr::Nested(expr) | Expr::Cast { expr, .. } => {
                self.link_expression_at(expr, target, edge_type, operation, next);
            }
            Expr::Function(function) => {
                for arg in function_arg_exprs(function) {
                    self.link_expression_at(arg, target, edge_type, operation, next);
                }
                if let Some(WindowType::WindowSpec(spec)) = &function.over {
                    for partition in &spec.partition_by {
                        self.link_expression_at(partition, target, edge_type, "partition", next);
                    }
                    for order in &spec.order_by {
                        self.link_expression_at(&order.expr, target, edge_type, "order", next);
                    }
                }
            }
            Expr::Case {
                operand,
                conditions,
                else_result,
                ..
            } => {
                if let Some(operand) = operand {
                    self.link_expression_at(operand, target, edge_type, operation, next);
                }
                for case_when in conditions {
                    self.link_expression_at(&case_when.condition, target, edge_type, operation, next);
                    self.link_expression_at(&case_when.result, target, edge_type, operation, next);
                }
                if let Some(else_result) = else_result {
                    self.link_expression_at(else_result, target, edge_type, operation, next);
                }
            }
            Expr::InList { expr, list, .. } => {
                self.link_expression_at(expr, target, edge_type, operation, next);
                for item in list {
                    self.link_expression_at(item, target, edge_type, operation, next);
                }
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                self.link_expression_at(expr, target, edge_type, operation, next);
                self.link_expression_at(low, target, edge_type, operation, next);
                self.link_expression_at(high, target, edge_type, operation, next);
            }
            Expr::Like { expr, pattern, .. } | Expr::ILike { expr, pattern, .. } => {
                self.link_expression_at(expr, target, edge_type, operation, next);
                self.link_expression_at(pattern, target, edge_type, operation, next);
            }
            Expr::IsNull(expr) | Expr::IsNotNull(expr) => {
                self.link_expression_at(expr, target, edge_type, operation, next);
            }
            Expr::InSubquery { expr, subquery, .. } => {
                self.link_expression_at(expr, target, edge_type, operation, next);
                self.walk_subquery(subquery);
            }
            Expr::Subquery(subquery) | Expr::Exists { subquery, .. } => {
                self.walk_subquery(subquery);
            }
            Expr::Value(_) => {}
            other => {
                // Structure varies by dialect version; fall back to the
                // fragment capability set's structural enumeration.
                let mut children = Vec::new();
                FragmentRef::Expr(other).children(&mut children);
                for child in children {
                    if let Some(child_expr) = child.as_expr() {
                        self.link_expression_at(child_expr, target, edge_type, operation, next);
                    } else if let Some(query) = child.as_query() {
                        self.walk_subquery(query);
                    }
                }
            }
        }
    }

    /// Walks a scalar subquery in its own metadata scope: a correlated
    /// subquery sees the enclosing tables, but never the enclosing
    /// INSERT ... SELECT pairing or SELECT INTO destination.
    pub(crate) fn walk_subquery(&mut self, query: &sqlparser::ast::Query) {
        let depth = self.ctx.push_scope();
        self.ctx.clear_meta(meta::PROCESSING_INSERT_SELECT);
        self.ctx.clear_meta(meta::SELECT_INTO);
        self.walk(FragmentRef::Query(query));
        self.ctx.restore_to(depth);
    }

    /// The owning-context name for expression nodes created in the current
    /// scope.
    pub(crate) fn expression_owner(&self) -> String {
        self.ctx
            .meta_text(meta::SELECT_INTO)
            .or_else(|| self.ctx.meta_text(meta::RESULT_OWNER))
            .unwrap_or("Result")
            .to_string()
    }

    /// Builds the expression node for a complex scalar expression and links
    /// its inputs as `Indirect` edges labelled `operation` (component-
    /// specific labels for CASE/COALESCE/NULLIF/window parts).
    ///
    /// Returns the node and, for the special forms, the operation label the
    /// dispatching handler should put on the edge into its target.
    pub(crate) fn materialize_expression(
        &mut self,
        expr: &Expr,
        operation: &str,
    ) -> (NodeId, Option<&'static str>) {
        if let Expr::Case { .. } = expr {
            return (self.build_case(expr), Some("CASE"));
        }
        if let Expr::Function(function) = expr {
            let name = function.name.to_string().to_uppercase();
            if name == "COALESCE" {
                return (self.build_coalesce(function, expr), Some("COALESCE"));
            }
            if name == "NULLIF" {
                return (self.build_nullif(function, expr), Some("NULLIF"));
            }
            if function.over.is_some() {
                return (self.build_window(function, expr), None);
            }
            let owner = self.expression_owner();
            let node = self.graph.add_expression_node(
                &name,
                &expr_display(expr),
                ExpressionKind::Function,
                None,
                Some(&owner),
            );
            self.link_expression(expr, node, EdgeType::Indirect, operation);
            return (node, None);
        }

        let kind = match expr {
            Expr::BinaryOp { .. } => ExpressionKind::Arithmetic,
            _ => ExpressionKind::Function,
        };
        let owner = self.expression_owner();
        let text = expr_display(expr);
        let node = self
            .graph
            .add_expression_node(&text, &text, kind, None, Some(&owner));
        self.link_expression(expr, node, EdgeType::Indirect, operation);
        (node, None)
    }
}
