//! DECLARE and SET: table variables, scalar variables, and assignment flow.

use super::super::helpers::is_variable_name;
use super::super::Analysis;
use super::{Handled, HandlerError};
use crate::ast::FragmentRef;
use crate::graph::{ColumnFlags, TableKind};
use sqlparser::ast::{self, DataType, DeclareAssignment, Statement};

pub(super) fn declare(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let Some(Statement::Declare { stmts }) = fragment.as_statement() else {
        return Ok(Handled::No);
    };

    for decl in stmts {
        // DECLARE @t TABLE (...) introduces a table variable.
        if let Some(DataType::Table(columns)) = &decl.data_type {
            for name in &decl.names {
                let variable_name = name.value.clone();
                let table_id = analysis.ctx.get_or_create_table(
                    analysis.graph,
                    &variable_name,
                    TableKind::TableVariable,
                );
                if let Some(columns) = columns {
                    for column in columns {
                        let data_type = column.data_type.to_string();
                        let column_id = analysis.graph.add_column_node(
                            &variable_name,
                            &column.name.value,
                            &data_type,
                            ColumnFlags::default(),
                        );
                        let _ = analysis
                            .graph
                            .attach_column_to_table(table_id, column_id);
                    }
                }
            }
            continue;
        }

        // Scalar variable, optionally with an initializer.
        let data_type = decl
            .data_type
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let mut first_variable = None;
        for name in &decl.names {
            let id = analysis.ensure_variable(&name.value);
            // Upgrade the placeholder type now that the declaration names one.
            analysis.graph.add_column_node(
                "Variables",
                &name.value,
                &data_type,
                ColumnFlags::default(),
            );
            first_variable.get_or_insert(id);
        }
        if let (Some(variable), Some(assignment)) = (first_variable, &decl.assignment) {
            if let DeclareAssignment::MsSqlAssignment(value) = assignment {
                analysis.process_assignment(variable, value, "SET");
            }
        }
    }
    Ok(Handled::Yes)
}

pub(super) fn set_variable(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let Some(Statement::Set(set)) = fragment.as_statement() else {
        return Ok(Handled::No);
    };

    if let ast::Set::SingleAssignment {
        variable, values, ..
    } = set
    {
        let name = variable.to_string();
        if is_variable_name(&name) {
            let target = analysis.ensure_variable(&name);
            for value in values {
                analysis.process_assignment(target, value, "SET");
            }
        }
    }
    Ok(Handled::Yes)
}
