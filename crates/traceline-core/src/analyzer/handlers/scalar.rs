//! CASE, COALESCE, and NULLIF expression nodes with component-labelled
//! provenance.

use super::super::context::CURRENT_TARGET_COLUMN;
use super::super::helpers::expr_display;
use super::super::Analysis;
use super::{Handled, HandlerError};
use crate::ast::{function_arg_exprs, FragmentKind, FragmentRef};
use crate::graph::{EdgeType, ExpressionKind, NodeId};
use sqlparser::ast::{Expr, Function};

/// Organic entry for a CASE/COALESCE/NULLIF fragment. When a target-column
/// context is active the expression also flows into that target.
pub(super) fn case_like(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let Some(expr) = fragment.as_expr() else {
        return Ok(Handled::No);
    };

    let (node, label) = match fragment.kind() {
        FragmentKind::Case => (analysis.build_case(expr), "CASE"),
        FragmentKind::Coalesce => match expr {
            Expr::Function(function) => (analysis.build_coalesce(function, expr), "COALESCE"),
            _ => return Ok(Handled::No),
        },
        FragmentKind::NullIf => match expr {
            Expr::Function(function) => (analysis.build_nullif(function, expr), "NULLIF"),
            _ => return Ok(Handled::No),
        },
        _ => return Ok(Handled::No),
    };

    if let Some(target) = analysis.ctx.get_column_context(CURRENT_TARGET_COLUMN) {
        let _ = analysis.graph.add_edge(
            node,
            target,
            EdgeType::Direct,
            label,
            Some(&expr_display(expr)),
        );
    }
    Ok(Handled::Yes)
}

impl Analysis<'_> {
    /// A CASE expression node. WHEN predicates link as `case_condition`,
    /// THEN results as `case_result`, the ELSE branch as `case_else`.
    pub(crate) fn build_case(&mut self, expr: &Expr) -> NodeId {
        let owner = self.expression_owner();
        let node = self.graph.add_expression_node(
            "CASE",
            &expr_display(expr),
            ExpressionKind::Case,
            None,
            Some(&owner),
        );
        if let Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } = expr
        {
            if let Some(operand) = operand {
                self.link_expression(operand, node, EdgeType::Indirect, "case_condition");
            }
            for case_when in conditions {
                self.link_expression(
                    &case_when.condition,
                    node,
                    EdgeType::Indirect,
                    "case_condition",
                );
                self.link_expression(&case_when.result, node, EdgeType::Indirect, "case_result");
            }
            if let Some(else_result) = else_result {
                self.link_expression(else_result, node, EdgeType::Indirect, "case_else");
            }
        }
        node
    }

    /// A COALESCE expression node; every argument links as `coalesce_arg`.
    pub(crate) fn build_coalesce(&mut self, function: &Function, expr: &Expr) -> NodeId {
        let owner = self.expression_owner();
        let node = self.graph.add_expression_node(
            "COALESCE",
            &expr_display(expr),
            ExpressionKind::Coalesce,
            None,
            Some(&owner),
        );
        for arg in function_arg_exprs(function) {
            self.link_expression(arg, node, EdgeType::Indirect, "coalesce_arg");
        }
        node
    }

    /// A NULLIF expression node; the two arguments link as `nullif_first`
    /// and `nullif_second`.
    pub(crate) fn build_nullif(&mut self, function: &Function, expr: &Expr) -> NodeId {
        let owner = self.expression_owner();
        let node = self.graph.add_expression_node(
            "NULLIF",
            &expr_display(expr),
            ExpressionKind::NullIf,
            None,
            Some(&owner),
        );
        let args = function_arg_exprs(function);
        if let Some(first) = args.first() {
            self.link_expression(first, node, EdgeType::Indirect, "nullif_first");
        }
        if let Some(second) = args.get(1) {
            self.link_expression(second, node, EdgeType::Indirect, "nullif_second");
        }
        node
    }
}
