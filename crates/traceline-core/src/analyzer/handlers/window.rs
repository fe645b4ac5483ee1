//! Window functions: OVER clauses with PARTITION BY and ORDER BY
//! provenance.

use super::super::context::CURRENT_TARGET_COLUMN;
use super::super::helpers::expr_display;
use super::super::Analysis;
use super::{Handled, HandlerError};
use crate::ast::{function_arg_exprs, FragmentRef};
use crate::graph::{EdgeType, ExpressionKind, NodeId};
use sqlparser::ast::{Expr, Function, WindowType};

/// Organic entry for a window-function fragment.
pub(super) fn window_function(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let Some(expr) = fragment.as_expr() else {
        return Ok(Handled::No);
    };
    let Expr::Function(function) = expr else {
        return Ok(Handled::No);
    };
    let node = analysis.build_window(function, expr);
    if let Some(target) = analysis.ctx.get_column_context(CURRENT_TARGET_COLUMN) {
        let _ = analysis.graph.add_edge(
            node,
            target,
            EdgeType::Direct,
            "SELECT",
            Some(&expr_display(expr)),
        );
    }
    Ok(Handled::Yes)
}

impl Analysis<'_> {
    /// A window-function expression node: the function arguments link with
    /// the function's name, PARTITION BY expressions as `partition`, ORDER
    /// BY expressions as `order`. The node is tagged with the window
    /// definition text.
    pub(crate) fn build_window(&mut self, function: &Function, expr: &Expr) -> NodeId {
        let name = function.name.to_string().to_uppercase();
        let owner = self.expression_owner();
        let node = self.graph.add_expression_node(
            &name,
            &expr_display(expr),
            ExpressionKind::Window,
            None,
            Some(&owner),
        );

        for arg in function_arg_exprs(function) {
            self.link_expression(arg, node, EdgeType::Indirect, &name);
        }

        let mut definition = String::new();
        if let Some(window) = &function.over {
            match window {
                WindowType::WindowSpec(spec) => {
                    definition = spec.to_string();
                    for partition in &spec.partition_by {
                        self.link_expression(partition, node, EdgeType::Indirect, "partition");
                    }
                    for order in &spec.order_by {
                        self.link_expression(&order.expr, node, EdgeType::Indirect, "order");
                    }
                }
                WindowType::NamedWindow(ident) => {
                    definition = ident.to_string();
                }
            }
        }

        let _ = self.graph.set_node_metadata(
            node,
            [
                (
                    "isWindowFunction".to_string(),
                    serde_json::Value::Bool(true),
                ),
                (
                    "windowDefinition".to_string(),
                    serde_json::Value::String(definition),
                ),
            ],
        );
        node
    }
}
