//! PIVOT and UNPIVOT: synthesized output columns wired to the aggregate
//! argument and the pivot key columns.

use super::super::helpers::clean_object_name;
use super::super::Analysis;
use super::{Handled, HandlerError};
use crate::ast::FragmentRef;
use crate::graph::{EdgeType, NodeId, TableKind};
use sqlparser::ast::{Expr, PivotValueSource, TableFactor};

fn expr_ident_name(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        other => clean_object_name(&other.to_string()),
    }
}

pub(super) fn pivot(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let FragmentRef::TableFactor(factor) = fragment else {
        return Ok(Handled::No);
    };
    analysis.process_pivot(factor);
    Ok(Handled::Yes)
}

pub(super) fn unpivot(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let FragmentRef::TableFactor(factor) = fragment else {
        return Ok(Handled::No);
    };
    analysis.process_unpivot(factor);
    Ok(Handled::Yes)
}

impl Analysis<'_> {
    pub(crate) fn process_pivot(&mut self, factor: &TableFactor) {
        let TableFactor::Pivot {
            table,
            aggregate_functions,
            value_column,
            value_source,
            alias,
            ..
        } = factor
        else {
            return;
        };

        self.mark_visited(FragmentRef::TableFactor(table));
        self.process_table_factor(table);

        let owner = alias
            .as_ref()
            .map(|a| a.name.value.clone())
            .unwrap_or_else(|| "pivot".to_string());
        let owner_id = self
            .graph
            .add_table_node(&owner, TableKind::DerivedTable, None, None);
        self.ctx
            .register_table(&owner, owner_id, TableKind::DerivedTable);

        // The pivot key columns, resolved against the source just added to
        // the FROM scope.
        let key_columns: Vec<NodeId> = value_column
            .iter()
            .map(|expr| self.resolve_column_source(None, &expr_ident_name(expr)))
            .collect();

        if let PivotValueSource::List(values) = value_source {
            for value in values {
                let column_name = expr_ident_name(&value.expr);
                let output =
                    self.ctx
                        .get_or_create_column(self.graph, &owner, &column_name, "unknown");
                for &key in &key_columns {
                    let _ = self.graph.add_edge(
                        key,
                        output,
                        EdgeType::Indirect,
                        "PIVOT",
                        None,
                    );
                }
                for aggregate in aggregate_functions {
                    self.link_expression(
                        &aggregate.expr,
                        output,
                        EdgeType::Indirect,
                        "PIVOT",
                    );
                }
            }
        }

        self.push_from_table(&owner);
    }

    pub(crate) fn process_unpivot(&mut self, factor: &TableFactor) {
        let TableFactor::Unpivot {
            table,
            value,
            name,
            columns,
            alias,
            ..
        } = factor
        else {
            return;
        };

        self.mark_visited(FragmentRef::TableFactor(table));
        self.process_table_factor(table);

        let owner = alias
            .as_ref()
            .map(|a| a.name.value.clone())
            .unwrap_or_else(|| "unpivot".to_string());
        let owner_id = self
            .graph
            .add_table_node(&owner, TableKind::DerivedTable, None, None);
        self.ctx
            .register_table(&owner, owner_id, TableKind::DerivedTable);

        let value_column =
            self.ctx
                .get_or_create_column(self.graph, &owner, &expr_ident_name(value), "unknown");
        let name_column =
            self.ctx
                .get_or_create_column(self.graph, &owner, &name.value, "unknown");

        for column in columns {
            let source = self.resolve_column_source(None, &expr_ident_name(&column.expr));
            let _ = self
                .graph
                .add_edge(source, value_column, EdgeType::Indirect, "UNPIVOT", None);
            let _ = self
                .graph
                .add_edge(source, name_column, EdgeType::Indirect, "UNPIVOT", None);
        }

        self.push_from_table(&owner);
    }
}
