//! Handler dispatch and resolution logic shared by every handler.
//!
//! Each handler is a pure function over `(fragment, context, graph)` bundled
//! in [`Analysis`]. A handler either fully processes its fragment, walking
//! sub-structures itself inside whatever scoped metadata it set up, or
//! returns [`Handled::No`] to let the walker schedule the fragment's
//! children.

mod apply;
mod ddl;
mod dml;
mod pivot;
mod procedures;
mod projection;
mod query;
mod scalar;
mod variables;
mod window;

use super::helpers::{clean_object_name, is_temp_table_name, is_variable_name};
use super::Analysis;
use crate::ast::{FragmentKind, FragmentRef};
use crate::error::HandlerError;
use crate::graph::{ColumnFlags, EdgeType, NodeId, TableKind};
use crate::types::{issue_codes, Severity};
use super::context::{meta, MetaValue};

/// Whether a handler fully processed its fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Handled {
    Yes,
    No,
}

pub(crate) type HandlerFn =
    for<'s, 'f> fn(&mut Analysis<'s>, FragmentRef<'f>) -> Result<Handled, HandlerError>;

/// The handler table, keyed by fragment kind.
pub(crate) fn handler_for(kind: FragmentKind) -> Option<HandlerFn> {
    use FragmentKind as K;
    let handler: HandlerFn = match kind {
        K::Query => query::query,
        K::QuerySpec => query::query_spec,
        K::SetOperation => query::set_operation,
        K::Cte => query::cte,
        K::TableReference | K::DerivedTable | K::NestedJoin => query::table_factor,
        K::Join => query::join,
        K::Apply => apply::apply,
        K::Pivot => pivot::pivot,
        K::Unpivot => pivot::unpivot,
        K::SelectElement => projection::select_element,
        K::Insert => dml::insert,
        K::Update => dml::update,
        K::Delete => dml::delete,
        K::CreateTable => ddl::create_table,
        K::CreateView => ddl::create_view,
        K::DeclareTable | K::DeclareVariable => variables::declare,
        K::SetVariable => variables::set_variable,
        K::CreateProcedure => procedures::create_procedure,
        K::Execute => procedures::execute,
        K::Case | K::Coalesce | K::NullIf => scalar::case_like,
        K::WindowFunction => window::window_function,
        K::Values => values,
        _ => return None,
    };
    Some(handler)
}

pub(crate) fn dispatch(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    match handler_for(fragment.kind()) {
        Some(handler) => handler(analysis, fragment),
        None => Ok(Handled::No),
    }
}

/// Literal rows carry no column provenance.
fn values(_analysis: &mut Analysis<'_>, _fragment: FragmentRef<'_>) -> Result<Handled, HandlerError> {
    Ok(Handled::Yes)
}

/// Where a select element's output flows.
pub(crate) struct Target {
    pub(crate) column: NodeId,
    pub(crate) operation: &'static str,
    /// Edge type for expression-mediated flows into the target.
    pub(crate) expr_edge: EdgeType,
}

impl Analysis<'_> {
    /// Records a table as part of the current FROM scope.
    pub(crate) fn push_from_table(&mut self, name: &str) {
        let mut names = match self.ctx.get_meta(meta::FROM_TABLES) {
            Some(MetaValue::Names(names)) => names.clone(),
            _ => Vec::new(),
        };
        if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            names.push(name.to_string());
        }
        self.ctx.set_meta(meta::FROM_TABLES, MetaValue::Names(names));
    }

    /// Tables a column reference may bind to: the enclosing FROM scope, or
    /// every visible table when no FROM scope is active.
    pub(crate) fn from_tables(&self) -> Vec<String> {
        match self.ctx.get_meta(meta::FROM_TABLES) {
            Some(MetaValue::Names(names)) if !names.is_empty() => names.clone(),
            _ => self.ctx.visible_tables(),
        }
    }

    /// Binds a column reference to a source column node, creating
    /// placeholders for anything that cannot be resolved.
    ///
    /// Resolution order: variables by name; a qualifier through the alias
    /// map and table namespace; otherwise the single table in scope, then a
    /// scan of in-scope tables for a column of that name.
    pub(crate) fn resolve_column_source(
        &mut self,
        qualifier: Option<&str>,
        column: &str,
    ) -> NodeId {
        if is_variable_name(column) {
            return self.ensure_variable(column);
        }

        if let Some(qualifier) = qualifier {
            let qualifier = clean_object_name(qualifier);
            if let Some(owner) = self.ctx.resolve_table_name(&qualifier) {
                return self.create_source_column(&owner, column);
            }
            self.issue(
                Severity::Warning,
                issue_codes::UNRESOLVED_REFERENCE,
                format!("unknown table or alias '{qualifier}'"),
            );
            let kind = if is_temp_table_name(&qualifier) {
                TableKind::TempTable
            } else {
                TableKind::BaseTable
            };
            self.ctx.get_or_create_table(self.graph, &qualifier, kind);
            return self.create_source_column(&qualifier, column);
        }

        let candidates = self.from_tables();
        if candidates.len() == 1 {
            return self.create_source_column(&candidates[0], column);
        }
        for table in &candidates {
            if let Some(id) = self.graph.get_column(table, column) {
                return id;
            }
        }
        self.issue(
            Severity::Warning,
            issue_codes::UNRESOLVED_REFERENCE,
            format!("column '{column}' could not be bound to any table in scope"),
        );
        self.graph
            .add_column_node("Unknown", column, "unknown", ColumnFlags::default())
    }

    /// Creates or finds a column on `owner`, taking the data type from the
    /// metadata provider when known.
    pub(crate) fn create_source_column(&mut self, owner: &str, column: &str) -> NodeId {
        let data_type = self
            .provider
            .table_columns(owner)
            .and_then(|columns| {
                columns
                    .iter()
                    .find(|spec| spec.name.eq_ignore_ascii_case(column))
                    .and_then(|spec| spec.data_type.clone())
            })
            .unwrap_or_else(|| "unknown".to_string());
        self.ctx
            .get_or_create_column(self.graph, owner, column, &data_type)
    }

    /// The scalar variable node for `@name`, created on first use and owned
    /// by the synthetic `Variables` holder.
    pub(crate) fn ensure_variable(&mut self, name: &str) -> NodeId {
        if let Some(id) = self.ctx.resolve_variable(name) {
            return id;
        }
        let holder = self
            .graph
            .add_table_node("Variables", TableKind::TableVariable, None, None);
        let id = self
            .graph
            .add_column_node("Variables", name, "unknown", ColumnFlags::default());
        let _ = self.graph.attach_column_to_table(holder, id);
        self.ctx.register_variable(name, id);
        id
    }

    /// The name of the table that owns select-element outputs in the
    /// current scope: a `SELECT INTO` destination, the registered result
    /// owner (CTE, view, derived table), or the synthetic `Result` set.
    pub(crate) fn result_owner(&mut self) -> String {
        if let Some(name) = self.ctx.meta_text(meta::SELECT_INTO) {
            return name.to_string();
        }
        if let Some(name) = self.ctx.meta_text(meta::RESULT_OWNER) {
            return name.to_string();
        }
        self.graph
            .add_table_node("Result", TableKind::ResultSet, None, None);
        "Result".to_string()
    }

    /// Picks the target column for the select element at `index`.
    ///
    /// Inside an INSERT ... SELECT the target comes from positional pairing with
    /// the insert column list; an index past the end pairs nothing (the
    /// name-matching fallback may still cover it). Otherwise a column named
    /// `name` is created on the current result owner.
    pub(crate) fn ensure_target_column(&mut self, name: &str, index: usize) -> Option<Target> {
        if self.ctx.meta_flag(meta::PROCESSING_INSERT_SELECT) {
            let paired = self
                .ctx
                .meta_columns(meta::INSERT_TARGET_COLUMNS)
                .map(|columns| columns.get(index).copied());
            match paired {
                Some(Some(column)) => {
                    return Some(Target {
                        column,
                        operation: "INSERT",
                        expr_edge: EdgeType::Indirect,
                    })
                }
                Some(None) => {
                    self.issue(
                        Severity::Warning,
                        issue_codes::COLUMN_COUNT_MISMATCH,
                        format!("select element {} has no matching insert column", index + 1),
                    );
                    return None;
                }
                None => {}
            }
        }
        let owner = self.result_owner();
        let column = self.ctx.get_or_create_column(self.graph, &owner, name, "unknown");
        Some(Target {
            column,
            operation: "SELECT",
            expr_edge: EdgeType::Direct,
        })
    }
}
