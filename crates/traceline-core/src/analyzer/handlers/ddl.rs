//! DDL statements that introduce tables: CREATE TABLE (including `#temp`
//! tables and CTAS) and CREATE VIEW.

use super::super::context::{meta, MetaValue};
use super::super::helpers::{clean_object_name, is_temp_table_name};
use super::super::Analysis;
use super::{Handled, HandlerError};
use crate::ast::FragmentRef;
use crate::graph::{ColumnFlags, TableKind};
use sqlparser::ast::{ColumnOption, Statement};

pub(super) fn create_table(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let Some(Statement::CreateTable(create)) = fragment.as_statement() else {
        return Ok(Handled::No);
    };

    let name = clean_object_name(&create.name.to_string());
    let kind = if is_temp_table_name(&name) {
        TableKind::TempTable
    } else {
        TableKind::BaseTable
    };
    let table_id = analysis.ctx.get_or_create_table(analysis.graph, &name, kind);

    for column in &create.columns {
        let data_type = column.data_type.to_string();
        let nullable = !column
            .options
            .iter()
            .any(|def| matches!(def.option, ColumnOption::NotNull));
        let column_id = analysis.graph.add_column_node(
            &name,
            &column.name.value,
            &data_type,
            ColumnFlags {
                nullable,
                computed: false,
            },
        );
        let _ = analysis.graph.attach_column_to_table(table_id, column_id);
    }

    // CREATE TABLE ... AS SELECT routes the select list into the new table.
    if let Some(query) = &create.query {
        let depth = analysis.ctx.push_scope();
        analysis
            .ctx
            .set_meta(meta::RESULT_OWNER, MetaValue::Text(name));
        analysis.ctx.clear_meta(meta::SELECT_INTO);
        analysis.ctx.clear_meta(meta::PROCESSING_INSERT_SELECT);
        analysis.walk(FragmentRef::Query(query));
        analysis.ctx.restore_to(depth);
    }
    Ok(Handled::Yes)
}

pub(super) fn create_view(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let Some(Statement::CreateView { name, query, .. }) = fragment.as_statement() else {
        return Ok(Handled::No);
    };

    let view_name = clean_object_name(&name.to_string());
    let definition = query.to_string();
    let id = analysis
        .graph
        .add_table_node(&view_name, TableKind::View, None, Some(&definition));
    analysis
        .ctx
        .register_table(&view_name, id, TableKind::View);

    let depth = analysis.ctx.push_scope();
    analysis
        .ctx
        .set_meta(meta::RESULT_OWNER, MetaValue::Text(view_name));
    analysis.ctx.clear_meta(meta::SELECT_INTO);
    analysis.ctx.clear_meta(meta::PROCESSING_INSERT_SELECT);
    analysis.walk(FragmentRef::Query(query));
    analysis.ctx.restore_to(depth);
    Ok(Handled::Yes)
}
