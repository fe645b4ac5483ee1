//! DML statements: INSERT (positional pairing with a name-matching
//! fallback), UPDATE, and DELETE.

use super::super::context::{meta, MetaValue};
use super::super::helpers::{clean_object_name, column_ref_parts, expr_display, is_temp_table_name};
use super::super::Analysis;
use super::{Handled, HandlerError};
use crate::ast::FragmentRef;
use crate::graph::{EdgeType, NodeId, TableKind};
use crate::types::{issue_codes, Severity};
use sqlparser::ast::{
    AssignmentTarget, Expr, FromTable, SetExpr, Statement, TableFactor, UpdateTableFromKind,
};

pub(super) fn insert(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let Some(Statement::Insert(insert)) = fragment.as_statement() else {
        return Ok(Handled::No);
    };

    let table_name = clean_object_name(&insert.table.to_string());
    let kind = if is_temp_table_name(&table_name) {
        TableKind::TempTable
    } else {
        TableKind::BaseTable
    };
    let display = analysis
        .ctx
        .resolve_table_name(&table_name)
        .unwrap_or_else(|| table_name.clone());
    let table_id = analysis
        .ctx
        .get_or_create_table(analysis.graph, &display, kind);

    // Target columns: explicit list, then metadata, then whatever the
    // table node already owns.
    let targets: Vec<NodeId> = if !insert.columns.is_empty() {
        insert
            .columns
            .iter()
            .map(|ident| {
                analysis
                    .ctx
                    .get_or_create_column(analysis.graph, &display, &ident.value, "unknown")
            })
            .collect()
    } else if let Some(specs) = analysis.provider.table_columns(&display) {
        specs
            .iter()
            .map(|spec| {
                let data_type = spec.data_type.as_deref().unwrap_or("unknown");
                analysis
                    .ctx
                    .get_or_create_column(analysis.graph, &display, &spec.name, data_type)
            })
            .collect()
    } else {
        analysis
            .graph
            .get_node(table_id)
            .map(|node| node.columns().to_vec())
            .unwrap_or_default()
    };

    let Some(source) = &insert.source else {
        return Ok(Handled::Yes);
    };
    if matches!(source.body.as_ref(), SetExpr::Values(_)) {
        // Literal rows have no column provenance.
        return Ok(Handled::Yes);
    }

    let depth = analysis.ctx.push_scope();
    analysis
        .ctx
        .set_meta(meta::PROCESSING_INSERT_SELECT, MetaValue::Bool(true));
    analysis
        .ctx
        .set_meta(meta::INSERT_TARGET_TABLE, MetaValue::Text(display.clone()));
    analysis.ctx.set_meta(
        meta::INSERT_TARGET_COLUMNS,
        MetaValue::Columns(targets.clone()),
    );
    analysis.walk(FragmentRef::Query(source));
    analysis.ctx.restore_to(depth);

    analysis.name_match_unfed_targets(&display, &targets);
    Ok(Handled::Yes)
}

pub(super) fn update(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let Some(Statement::Update {
        table,
        assignments,
        from,
        selection,
        ..
    }) = fragment.as_statement()
    else {
        return Ok(Handled::No);
    };

    // FROM sources first: `UPDATE c ... FROM Customers c` names its target
    // through an alias the FROM clause introduces.
    if let Some(from_kind) = from {
        match from_kind {
            UpdateTableFromKind::BeforeSet(tables) | UpdateTableFromKind::AfterSet(tables) => {
                for table_with_joins in tables {
                    analysis.process_table_with_joins(table_with_joins);
                }
            }
        }
    }

    // Resolve the updated table and any alias on it.
    let target_table: Option<String> = match &table.relation {
        TableFactor::Table { name, alias, .. } => {
            let table_name = clean_object_name(&name.to_string());
            let kind = if is_temp_table_name(&table_name) {
                TableKind::TempTable
            } else {
                TableKind::BaseTable
            };
            let display = analysis
                .ctx
                .resolve_table_name(&table_name)
                .unwrap_or_else(|| table_name.clone());
            analysis
                .ctx
                .get_or_create_table(analysis.graph, &display, kind);
            if let Some(alias) = alias {
                analysis.ctx.register_alias(&alias.name.value, &display);
            }
            analysis.push_from_table(&display);
            Some(display)
        }
        other => {
            analysis.process_table_factor(other);
            None
        }
    };
    for join in &table.joins {
        analysis.process_join(join);
    }

    for assignment in assignments {
        let (qualifier, column) = match &assignment.target {
            AssignmentTarget::ColumnName(object_name) => {
                let full = clean_object_name(&object_name.to_string());
                match full.rsplit_once('.') {
                    Some((qualifier, column)) => {
                        (Some(qualifier.to_string()), column.to_string())
                    }
                    None => (None, full),
                }
            }
            AssignmentTarget::Tuple(_) => {
                analysis.issue(
                    Severity::Warning,
                    issue_codes::UNSUPPORTED_SYNTAX,
                    "tuple assignment targets are not tracked",
                );
                continue;
            }
        };
        let owner = qualifier
            .as_deref()
            .and_then(|q| analysis.ctx.resolve_table_name(q))
            .or_else(|| target_table.clone())
            .unwrap_or_else(|| "Unknown".to_string());
        let target_column =
            analysis
                .ctx
                .get_or_create_column(analysis.graph, &owner, &column, "unknown");
        analysis.process_update_value(target_column, &assignment.value);
    }

    if let Some(selection) = selection {
        analysis.mark_visited(FragmentRef::Expr(selection));
        analysis.process_filter(selection, "WHERE");
    }
    Ok(Handled::Yes)
}

pub(super) fn delete(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let Some(Statement::Delete(delete)) = fragment.as_statement() else {
        return Ok(Handled::No);
    };

    let tables = match &delete.from {
        FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
    };
    for table_with_joins in tables {
        analysis.process_table_with_joins(table_with_joins);
    }
    if let Some(using) = &delete.using {
        for table_with_joins in using {
            analysis.process_table_with_joins(table_with_joins);
        }
    }
    if let Some(selection) = &delete.selection {
        analysis.mark_visited(FragmentRef::Expr(selection));
        analysis.process_filter(selection, "WHERE");
    }
    Ok(Handled::Yes)
}

impl Analysis<'_> {
    /// One SET clause of an UPDATE: column-to-column is Direct, anything
    /// else flows through an expression node as Indirect, operation UPDATE.
    fn process_update_value(&mut self, target: NodeId, value: &Expr) {
        self.mark_visited(FragmentRef::Expr(value));
        if matches!(value, Expr::Value(_)) {
            return;
        }
        if let Some((qualifier, column)) = column_ref_parts(value) {
            let source = self.resolve_column_source(qualifier.as_deref(), &column);
            let _ = self.graph.add_edge(
                source,
                target,
                EdgeType::Direct,
                "UPDATE",
                Some(&expr_display(value)),
            );
            return;
        }
        let (node, _) = self.materialize_expression(value, "UPDATE");
        let _ = self.graph.add_edge(
            node,
            target,
            EdgeType::Indirect,
            "UPDATE",
            Some(&expr_display(value)),
        );
    }

    /// The INSERT fallback: any target column that positional pairing left
    /// without an incoming edge is matched by name (case-insensitive)
    /// against the visible source tables.
    fn name_match_unfed_targets(&mut self, target_table: &str, targets: &[NodeId]) {
        for &target in targets {
            if !self.graph.in_edges(target).is_empty() {
                continue;
            }
            let Ok(node) = self.graph.get_node(target) else {
                continue;
            };
            for table in self.ctx.visible_tables() {
                if table.eq_ignore_ascii_case(target_table) {
                    continue;
                }
                if let Some(source) = self.graph.get_column(&table, &node.name) {
                    let _ = self
                        .graph
                        .add_edge(source, target, EdgeType::Direct, "INSERT", None);
                    break;
                }
            }
        }
    }
}
