//! CROSS APPLY / OUTER APPLY: the right side is walked under an apply flag,
//! and correlated references to the left side become Join edges.

use super::super::context::{meta, MetaValue};
use super::super::helpers::clean_object_name;
use super::super::Analysis;
use super::{Handled, HandlerError};
use crate::ast::{join_operation_name, FragmentRef};
use sqlparser::ast::{Join, TableFactor};

pub(super) fn apply(
    analysis: &mut Analysis<'_>,
    fragment: FragmentRef<'_>,
) -> Result<Handled, HandlerError> {
    let FragmentRef::Join(join) = fragment else {
        return Ok(Handled::No);
    };
    analysis.process_apply(join);
    Ok(Handled::Yes)
}

impl Analysis<'_> {
    /// Walks the right side of an APPLY with the left side's tables
    /// recorded, so correlated equalities inside the right side can be
    /// turned into left-to-right Join edges.
    pub(crate) fn process_apply(&mut self, join: &Join) {
        let operation = join_operation_name(&join.join_operator);
        let left_tables = self.from_tables();

        // The applied relation stays in the FROM scope after the flag is
        // released.
        let introduced = match &join.relation {
            TableFactor::Derived { alias: Some(a), .. } => Some(a.name.value.clone()),
            TableFactor::Table { name, alias, .. } => Some(
                alias
                    .as_ref()
                    .map(|a| a.name.value.clone())
                    .unwrap_or_else(|| clean_object_name(&name.to_string())),
            ),
            _ => None,
        };

        let depth = self.ctx.push_scope();
        self.ctx.set_meta(meta::IN_APPLY, MetaValue::Bool(true));
        self.ctx
            .set_meta(meta::APPLY_KIND, MetaValue::Text(operation.to_string()));
        self.ctx
            .set_meta(meta::APPLY_LEFT_TABLES, MetaValue::Names(left_tables));
        self.mark_visited(FragmentRef::TableFactor(&join.relation));
        self.process_table_factor(&join.relation);
        self.ctx.restore_to(depth);

        if let Some(introduced) = introduced {
            let display = self
                .ctx
                .resolve_table_name(&introduced)
                .unwrap_or(introduced);
            self.push_from_table(&display);
        }
    }
}
