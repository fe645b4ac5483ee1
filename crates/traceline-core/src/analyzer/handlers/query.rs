//! SELECT processing: queries, CTEs, query specifications, FROM clauses,
//! joins, set operations, and predicate/grouping edges.

use super::super::context::{meta, MetaValue};
use super::super::helpers::{
    clean_object_name, column_ref_parts, expr_display, for_each_equality, is_temp_table_name,
    is_variable_name,
};
use super::super::Analysis;
use super::{Handled, HandlerError};
use crate::ast::{join_constraint, join_operation_name, FragmentRef};
use crate::graph::{EdgeType, ExpressionKind, TableKind};
use crate::types::{issue_codes, Severity};
use sqlparser::ast::{
    Expr, Join, JoinConstraint, JoinOperator, OrderByKind, TableFactor, TableWithJoins,
};

/// A query: CTEs first, then the body, then ORDER BY.
pub(super) fn query(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let Some(query) = fragment.as_query() else {
        return Ok(Handled::No);
    };

    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            analysis.walk(FragmentRef::Cte(cte));
        }
    }
    analysis.walk(FragmentRef::SetExpr(&query.body));

    if let Some(order_by) = &query.order_by {
        if let OrderByKind::Expressions(order_exprs) = &order_by.kind {
            let exprs: Vec<&Expr> = order_exprs.iter().map(|o| &o.expr).collect();
            analysis.process_sort(&exprs);
        }
    }
    Ok(Handled::Yes)
}

/// A CTE definition: register the table first so a recursive body can
/// reference it (producing a cycle), then walk the body with the CTE as the
/// result owner.
pub(super) fn cte(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let FragmentRef::Cte(cte) = fragment else {
        return Ok(Handled::No);
    };
    let name = clean_object_name(&cte.alias.name.to_string());
    let definition = cte.query.to_string();
    let id = analysis
        .graph
        .add_table_node(&name, TableKind::Cte, None, Some(&definition));
    analysis.ctx.register_table(&name, id, TableKind::Cte);

    let depth = analysis.ctx.push_scope();
    analysis
        .ctx
        .set_meta(meta::RESULT_OWNER, MetaValue::Text(name.clone()));
    analysis.ctx.clear_meta(meta::SELECT_INTO);
    analysis.ctx.clear_meta(meta::PROCESSING_INSERT_SELECT);
    analysis.walk(FragmentRef::Query(&cte.query));
    analysis.ctx.restore_to(depth);

    // WITH C (a, b) AS (...) renames the body's output columns positionally.
    if !cte.alias.columns.is_empty() {
        let produced = analysis
            .graph
            .get_node(id)
            .map(|node| node.columns().to_vec())
            .unwrap_or_default();
        for (index, column) in cte.alias.columns.iter().enumerate() {
            let Some(&source) = produced.get(index) else {
                break;
            };
            let renamed = analysis.ctx.get_or_create_column(
                analysis.graph,
                &name,
                &column.name.value,
                "unknown",
            );
            if renamed != source {
                let _ = analysis.graph.add_edge(
                    source,
                    renamed,
                    EdgeType::Direct,
                    "SELECT",
                    None,
                );
            }
        }
    }
    Ok(Handled::Yes)
}

/// UNION/INTERSECT/EXCEPT: both branches feed the same result columns.
pub(super) fn set_operation(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let FragmentRef::SetExpr(sqlparser::ast::SetExpr::SetOperation { left, right, .. }) = fragment
    else {
        return Ok(Handled::No);
    };
    analysis.walk(FragmentRef::SetExpr(left));
    analysis.walk(FragmentRef::SetExpr(right));
    Ok(Handled::Yes)
}

/// A query specification: FROM and INTO populate the scope, then the select
/// list, then WHERE/GROUP BY/HAVING.
pub(super) fn query_spec(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let Some(select) = fragment.as_select() else {
        return Ok(Handled::No);
    };
    analysis.mark_visited(FragmentRef::Select(select));

    if let Some(into) = &select.into {
        let name = clean_object_name(&into.name.to_string());
        let kind = if is_temp_table_name(&name) {
            TableKind::TempTable
        } else {
            TableKind::BaseTable
        };
        analysis.ctx.get_or_create_table(analysis.graph, &name, kind);
        analysis.ctx.set_meta(meta::SELECT_INTO, MetaValue::Text(name));
    }

    analysis
        .ctx
        .set_meta(meta::FROM_TABLES, MetaValue::Names(Vec::new()));
    for table_with_joins in &select.from {
        analysis.process_table_with_joins(table_with_joins);
    }

    for (index, item) in select.projection.iter().enumerate() {
        analysis.mark_visited(FragmentRef::SelectItem(item));
        analysis.process_select_item(item, index);
    }

    if let Some(selection) = &select.selection {
        analysis.mark_visited(FragmentRef::Expr(selection));
        analysis.process_filter(selection, "WHERE");
    }
    if let sqlparser::ast::GroupByExpr::Expressions(exprs, _) = &select.group_by {
        for expr in exprs {
            analysis.mark_visited(FragmentRef::Expr(expr));
        }
        analysis.process_grouping(exprs);
    }
    if let Some(having) = &select.having {
        analysis.mark_visited(FragmentRef::Expr(having));
        analysis.process_filter(having, "HAVING");
    }
    Ok(Handled::Yes)
}

/// Organic entry for table factors reached outside a FROM clause.
pub(super) fn table_factor(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let FragmentRef::TableFactor(factor) = fragment else {
        return Ok(Handled::No);
    };
    analysis.process_table_factor(factor);
    Ok(Handled::Yes)
}

/// Organic entry for joins reached outside a FROM clause.
pub(super) fn join(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let FragmentRef::Join(join) = fragment else {
        return Ok(Handled::No);
    };
    analysis.process_join(join);
    Ok(Handled::Yes)
}

impl Analysis<'_> {
    pub(crate) fn process_table_with_joins(&mut self, table_with_joins: &TableWithJoins) {
        self.mark_visited(FragmentRef::TableWithJoins(table_with_joins));
        self.mark_visited(FragmentRef::TableFactor(&table_with_joins.relation));
        self.process_table_factor(&table_with_joins.relation);
        for join in &table_with_joins.joins {
            self.mark_visited(FragmentRef::Join(join));
            self.process_join(join);
        }
    }

    pub(crate) fn process_join(&mut self, join: &Join) {
        match &join.join_operator {
            JoinOperator::CrossApply | JoinOperator::OuterApply => {
                self.process_apply(join);
            }
            op => {
                self.mark_visited(FragmentRef::TableFactor(&join.relation));
                self.process_table_factor(&join.relation);
                if let Some(JoinConstraint::On(on)) = join_constraint(op) {
                    self.mark_visited(FragmentRef::Expr(on));
                    self.process_join_on(on, join_operation_name(op));
                }
            }
        }
    }

    /// Resolves one table factor in a FROM clause, registering aliases and
    /// pre-creating provider-known columns.
    pub(crate) fn process_table_factor(&mut self, factor: &TableFactor) {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let table_name = clean_object_name(&name.to_string());
                let kind = if is_temp_table_name(&table_name) {
                    TableKind::TempTable
                } else if is_variable_name(&table_name) {
                    TableKind::TableVariable
                } else {
                    TableKind::BaseTable
                };
                let alias_name = alias.as_ref().map(|a| a.name.value.clone());
                // Preserve the kind of anything already registered (CTE,
                // temp table, table variable).
                let already_known = self.ctx.resolve_table(&table_name).is_some();
                if !already_known {
                    self.graph.add_table_node(
                        &table_name,
                        kind,
                        alias_name.as_deref(),
                        None,
                    );
                }
                let display = self
                    .ctx
                    .resolve_table_name(&table_name)
                    .unwrap_or_else(|| table_name.clone());
                self.ctx.get_or_create_table(self.graph, &display, kind);
                if let Some(alias_name) = &alias_name {
                    self.ctx.register_alias(alias_name, &display);
                }
                if let Some(columns) = self.provider.table_columns(&display) {
                    for spec in columns {
                        let data_type = spec.data_type.as_deref().unwrap_or("unknown");
                        self.ctx
                            .get_or_create_column(self.graph, &display, &spec.name, data_type);
                    }
                }
                self.push_from_table(&display);
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                let owner = alias
                    .as_ref()
                    .map(|a| a.name.value.clone())
                    .unwrap_or_else(|| "derived".to_string());
                let id = self
                    .graph
                    .add_table_node(&owner, TableKind::DerivedTable, None, None);
                self.ctx.register_table(&owner, id, TableKind::DerivedTable);

                let depth = self.ctx.push_scope();
                self.ctx
                    .set_meta(meta::RESULT_OWNER, MetaValue::Text(owner.clone()));
                self.ctx.clear_meta(meta::SELECT_INTO);
                self.ctx.clear_meta(meta::PROCESSING_INSERT_SELECT);
                self.walk(FragmentRef::Query(subquery));
                self.ctx.restore_to(depth);

                self.push_from_table(&owner);
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => {
                self.process_table_with_joins(table_with_joins);
            }
            TableFactor::Pivot { .. } => {
                self.mark_visited(FragmentRef::TableFactor(factor));
                self.process_pivot(factor);
            }
            TableFactor::Unpivot { .. } => {
                self.mark_visited(FragmentRef::TableFactor(factor));
                self.process_unpivot(factor);
            }
            other => {
                self.issue(
                    Severity::Info,
                    issue_codes::UNSUPPORTED_SYNTAX,
                    format!("table source not fully supported: {other}"),
                );
            }
        }
    }

    /// ON-clause equalities become Join edges in both directions.
    pub(crate) fn process_join_on(&mut self, on: &Expr, operation: &str) {
        let mut pairs: Vec<(Expr, Expr)> = Vec::new();
        for_each_equality(on, &mut |left, right| {
            pairs.push((left.clone(), right.clone()));
        });
        for (left, right) in pairs {
            let (Some((lq, lc)), Some((rq, rc))) = (
                column_ref_parts(&left),
                column_ref_parts(&right),
            ) else {
                continue;
            };
            let text = format!("{left} = {right}");
            let left_id = self.resolve_column_source(lq.as_deref(), &lc);
            let right_id = self.resolve_column_source(rq.as_deref(), &rc);
            let _ = self
                .graph
                .add_edge(left_id, right_id, EdgeType::Join, operation, Some(&text));
            let _ = self
                .graph
                .add_edge(right_id, left_id, EdgeType::Join, operation, Some(&text));
        }
    }

    /// WHERE/HAVING: referenced columns flow into a synthetic predicate
    /// node with Filter edges. Predicates comparing a variable or parameter
    /// to a column additionally yield an Indirect column-level edge, and
    /// correlated APPLY equalities yield Join edges.
    pub(crate) fn process_filter(&mut self, predicate: &Expr, clause: &str) {
        let owner = self.expression_owner();
        let node = self.graph.add_expression_node(
            clause,
            &expr_display(predicate),
            ExpressionKind::Predicate,
            None,
            Some(&owner),
        );
        self.link_expression(predicate, node, EdgeType::Filter, clause);
        self.process_predicate_pairs(predicate);
    }

    /// Column-to-column consequences of equality predicates.
    fn process_predicate_pairs(&mut self, predicate: &Expr) {
        let apply_kind = match self.ctx.get_meta(meta::APPLY_KIND) {
            Some(MetaValue::Text(kind)) => Some(kind.clone()),
            _ => None,
        };
        let in_apply = self.ctx.meta_flag(meta::IN_APPLY);
        let left_tables: Vec<String> = match self.ctx.get_meta(meta::APPLY_LEFT_TABLES) {
            Some(MetaValue::Names(names)) => names.clone(),
            _ => Vec::new(),
        };

        let mut pairs: Vec<(Expr, Expr)> = Vec::new();
        for_each_equality(predicate, &mut |left, right| {
            pairs.push((left.clone(), right.clone()));
        });

        for (left, right) in pairs {
            let left_parts = column_ref_parts(&left);
            let right_parts = column_ref_parts(&right);
            let (Some((lq, lc)), Some((rq, rc))) = (left_parts, right_parts) else {
                continue;
            };
            let text = format!("{left} = {right}");

            // Variable against column: the variable filters the column.
            let left_is_var = lq.is_none() && is_variable_name(&lc);
            let right_is_var = rq.is_none() && is_variable_name(&rc);
            if left_is_var != right_is_var {
                let (var_name, col_q, col_c) = if left_is_var {
                    (lc.clone(), rq.clone(), rc.clone())
                } else {
                    (rc.clone(), lq.clone(), lc.clone())
                };
                let variable = self.ensure_variable(&var_name);
                let column = self.resolve_column_source(col_q.as_deref(), &col_c);
                let _ = self.graph.add_edge(
                    variable,
                    column,
                    EdgeType::Indirect,
                    "Filter",
                    Some(&text),
                );
                continue;
            }

            // Correlated reference inside an APPLY right side.
            if in_apply {
                if let Some(operation) = &apply_kind {
                    let left_outer = lq
                        .as_deref()
                        .map(|q| self.names_outer_table(q, &left_tables))
                        .unwrap_or(false);
                    let right_outer = rq
                        .as_deref()
                        .map(|q| self.names_outer_table(q, &left_tables))
                        .unwrap_or(false);
                    if left_outer != right_outer {
                        let (outer, inner) = if left_outer {
                            ((lq.clone(), lc.clone()), (rq.clone(), rc.clone()))
                        } else {
                            ((rq.clone(), rc.clone()), (lq.clone(), lc.clone()))
                        };
                        let outer_id =
                            self.resolve_column_source(outer.0.as_deref(), &outer.1);
                        let inner_id =
                            self.resolve_column_source(inner.0.as_deref(), &inner.1);
                        let _ = self.graph.add_edge(
                            outer_id,
                            inner_id,
                            EdgeType::Join,
                            operation,
                            Some(&text),
                        );
                    }
                }
            }
        }
    }

    fn names_outer_table(&self, qualifier: &str, left_tables: &[String]) -> bool {
        let resolved = self
            .ctx
            .resolve_table_name(qualifier)
            .unwrap_or_else(|| qualifier.to_string());
        left_tables
            .iter()
            .any(|table| table.eq_ignore_ascii_case(&resolved))
    }

    /// GROUP BY keys flow into a synthetic grouping node.
    pub(crate) fn process_grouping(&mut self, exprs: &[Expr]) {
        if exprs.is_empty() {
            return;
        }
        let owner = self.expression_owner();
        let text = exprs
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let node = self.graph.add_expression_node(
            "GROUP BY",
            &text,
            ExpressionKind::Grouping,
            None,
            Some(&owner),
        );
        for expr in exprs {
            self.link_expression(expr, node, EdgeType::GroupBy, "GROUP BY");
        }
    }

    /// ORDER BY keys flow into a synthetic sort node with Filter edges.
    pub(crate) fn process_sort(&mut self, exprs: &[&Expr]) {
        if exprs.is_empty() {
            return;
        }
        let owner = self.expression_owner();
        let text = exprs
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let node = self.graph.add_expression_node(
            "ORDER BY",
            &text,
            ExpressionKind::Predicate,
            None,
            Some(&owner),
        );
        for expr in exprs {
            self.mark_visited(FragmentRef::Expr(expr));
            self.link_expression(expr, node, EdgeType::Filter, "ORDER BY");
        }
    }
}
