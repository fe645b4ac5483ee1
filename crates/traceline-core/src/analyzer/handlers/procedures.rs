//! Stored procedures: parameter-holder tables, parameter columns, and
//! EXECUTE argument flow.

use super::super::helpers::{clean_object_name, column_ref_parts, expr_display};
use super::super::Analysis;
use super::{Handled, HandlerError};
use crate::ast::FragmentRef;
use crate::graph::{ColumnFlags, EdgeType, NodeId, TableKind};
use crate::types::{issue_codes, Severity};
use sqlparser::ast::{ArgMode, Expr, Statement};

pub(super) fn create_procedure(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let Some(Statement::CreateProcedure {
        name, params, body, ..
    }) = fragment.as_statement()
    else {
        return Ok(Handled::No);
    };

    let procedure_name = clean_object_name(&name.to_string());
    let holder = analysis.graph.add_table_node(
        &procedure_name,
        TableKind::TableVariable,
        None,
        None,
    );

    let mut parameter_columns: Vec<NodeId> = Vec::new();
    if let Some(params) = params {
        for param in params {
            let parameter = param.name.value.clone();
            let data_type = param.data_type.to_string();
            let column = analysis.graph.add_column_node(
                &procedure_name,
                &parameter,
                &data_type,
                ColumnFlags::default(),
            );
            let _ = analysis.graph.attach_column_to_table(holder, column);
            if matches!(param.mode, Some(ArgMode::Out | ArgMode::InOut)) {
                let _ = analysis.graph.set_node_metadata(
                    column,
                    [("isOutput".to_string(), serde_json::Value::Bool(true))],
                );
            }
            analysis.ctx.register_variable(&parameter, column);
            parameter_columns.push(column);
        }
    }
    analysis
        .ctx
        .register_procedure(&procedure_name, parameter_columns);

    for statement in body.statements() {
        analysis.walk(FragmentRef::Statement(statement));
    }
    Ok(Handled::Yes)
}

pub(super) fn execute(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let Some(Statement::Execute {
        name, parameters, ..
    }) = fragment.as_statement()
    else {
        return Ok(Handled::No);
    };
    let Some(name) = name else {
        return Ok(Handled::Yes);
    };

    let procedure_name = clean_object_name(&name.to_string());
    let params: Vec<NodeId> = analysis
        .ctx
        .resolve_procedure(&procedure_name)
        .map(<[NodeId]>::to_vec)
        .unwrap_or_default();
    if params.is_empty() && !parameters.is_empty() {
        analysis.issue(
            Severity::Info,
            issue_codes::UNRESOLVED_REFERENCE,
            format!("procedure '{procedure_name}' is not declared in this script"),
        );
        return Ok(Handled::Yes);
    }

    for (index, argument) in parameters.iter().enumerate() {
        let Some(&param) = params.get(index) else {
            break;
        };
        analysis.mark_visited(FragmentRef::Expr(argument));
        analysis.process_execute_argument(argument, param);
    }
    Ok(Handled::Yes)
}

impl Analysis<'_> {
    /// One EXECUTE argument: its sources feed the procedure's parameter
    /// column through Parameter edges.
    fn process_execute_argument(&mut self, argument: &Expr, param: NodeId) {
        if matches!(argument, Expr::Value(_)) {
            return;
        }
        if let Some((qualifier, column)) = column_ref_parts(argument) {
            let source = self.resolve_column_source(qualifier.as_deref(), &column);
            let _ = self.graph.add_edge(
                source,
                param,
                EdgeType::Parameter,
                "EXECUTE",
                Some(&expr_display(argument)),
            );
            return;
        }
        let (node, _) = self.materialize_expression(argument, "EXECUTE");
        let _ = self.graph.add_edge(
            node,
            param,
            EdgeType::Parameter,
            "EXECUTE",
            Some(&expr_display(argument)),
        );
    }
}
