//! Fragment view over the parsed syntax tree.
//!
//! The walker and handler dispatch do not pattern-match parser types
//! directly. Instead every syntax node of interest is wrapped in a
//! [`FragmentRef`], which exposes exactly three capabilities: a kind from the
//! closed [`FragmentKind`] set, structural enumeration of child fragments,
//! and pointer identity for the walker's visited set. Constructs whose shape
//! varies between dialect versions fall back to structural enumeration
//! instead of relying on a specific named slot.

use sqlparser::ast::{
    self, Cte, Expr, FunctionArg, FunctionArgExpr, Join, JoinConstraint, JoinOperator, Query,
    Select, SelectItem, SetExpr, Statement, TableFactor, TableWithJoins,
};

/// The closed set of fragment kinds the handler table dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    Select,
    Insert,
    Update,
    Delete,
    CreateTable,
    CreateView,
    CreateProcedure,
    Execute,
    DeclareTable,
    DeclareVariable,
    SetVariable,
    Query,
    QuerySpec,
    SetOperation,
    Cte,
    TableReference,
    DerivedTable,
    Pivot,
    Unpivot,
    NestedJoin,
    Join,
    Apply,
    SelectElement,
    Case,
    Coalesce,
    NullIf,
    WindowFunction,
    Function,
    Binary,
    Parenthesis,
    ColumnReference,
    Literal,
    Values,
    Other,
}

/// A borrowed view of one syntax-tree fragment.
#[derive(Clone, Copy)]
pub enum FragmentRef<'a> {
    Statement(&'a Statement),
    Query(&'a Query),
    SetExpr(&'a SetExpr),
    Select(&'a Select),
    Cte(&'a Cte),
    TableWithJoins(&'a TableWithJoins),
    TableFactor(&'a TableFactor),
    Join(&'a Join),
    SelectItem(&'a SelectItem),
    Expr(&'a Expr),
}

impl<'a> FragmentRef<'a> {
    /// Pointer identity of the underlying node, for visited-set bookkeeping.
    pub fn addr(&self) -> usize {
        match self {
            Self::Statement(n) => *n as *const Statement as usize,
            Self::Query(n) => *n as *const Query as usize,
            Self::SetExpr(n) => *n as *const SetExpr as usize,
            Self::Select(n) => *n as *const Select as usize,
            Self::Cte(n) => *n as *const Cte as usize,
            Self::TableWithJoins(n) => *n as *const TableWithJoins as usize,
            Self::TableFactor(n) => *n as *const TableFactor as usize,
            Self::Join(n) => *n as *const Join as usize,
            Self::SelectItem(n) => *n as *const SelectItem as usize,
            Self::Expr(n) => *n as *const Expr as usize,
        }
    }

    pub fn kind(&self) -> FragmentKind {
        match self {
            Self::Statement(statement) => statement_kind(statement),
            Self::Query(_) => FragmentKind::Query,
            Self::SetExpr(set_expr) => match set_expr {
                SetExpr::Select(_) => FragmentKind::QuerySpec,
                SetExpr::Query(_) => FragmentKind::Query,
                SetExpr::SetOperation { .. } => FragmentKind::SetOperation,
                SetExpr::Values(_) => FragmentKind::Values,
                SetExpr::Insert(_) => FragmentKind::Insert,
                _ => FragmentKind::Other,
            },
            Self::Select(_) => FragmentKind::QuerySpec,
            Self::Cte(_) => FragmentKind::Cte,
            Self::TableWithJoins(_) => FragmentKind::Other,
            Self::TableFactor(factor) => match factor {
                TableFactor::Table { .. } => FragmentKind::TableReference,
                TableFactor::Derived { .. } => FragmentKind::DerivedTable,
                TableFactor::Pivot { .. } => FragmentKind::Pivot,
                TableFactor::Unpivot { .. } => FragmentKind::Unpivot,
                TableFactor::NestedJoin { .. } => FragmentKind::NestedJoin,
                _ => FragmentKind::Other,
            },
            Self::Join(join) => match join.join_operator {
                JoinOperator::CrossApply | JoinOperator::OuterApply => FragmentKind::Apply,
                _ => FragmentKind::Join,
            },
            Self::SelectItem(_) => FragmentKind::SelectElement,
            Self::Expr(expr) => expr_kind(expr),
        }
    }

    /// Appends this fragment's structural children to `out`, in source order.
    pub fn children(&self, out: &mut Vec<FragmentRef<'a>>) {
        match self {
            Self::Statement(statement) => statement_children(statement, out),
            Self::Query(query) => {
                if let Some(with) = &query.with {
                    for cte in &with.cte_tables {
                        out.push(Self::Cte(cte));
                    }
                }
                out.push(Self::SetExpr(&query.body));
                if let Some(order_by) = &query.order_by {
                    if let ast::OrderByKind::Expressions(order_exprs) = &order_by.kind {
                        for order_expr in order_exprs {
                            out.push(Self::Expr(&order_expr.expr));
                        }
                    }
                }
            }
            Self::SetExpr(set_expr) => match set_expr {
                SetExpr::Select(select) => out.push(Self::Select(select)),
                SetExpr::Query(query) => out.push(Self::Query(query)),
                SetExpr::SetOperation { left, right, .. } => {
                    out.push(Self::SetExpr(left));
                    out.push(Self::SetExpr(right));
                }
                SetExpr::Values(values) => {
                    for row in &values.rows {
                        for expr in row {
                            out.push(Self::Expr(expr));
                        }
                    }
                }
                SetExpr::Insert(statement) => out.push(Self::Statement(statement)),
                _ => {}
            },
            Self::Select(select) => {
                for table_with_joins in &select.from {
                    out.push(Self::TableWithJoins(table_with_joins));
                }
                for item in &select.projection {
                    out.push(Self::SelectItem(item));
                }
                if let Some(selection) = &select.selection {
                    out.push(Self::Expr(selection));
                }
                if let ast::GroupByExpr::Expressions(exprs, _) = &select.group_by {
                    for expr in exprs {
                        out.push(Self::Expr(expr));
                    }
                }
                if let Some(having) = &select.having {
                    out.push(Self::Expr(having));
                }
            }
            Self::Cte(cte) => out.push(Self::Query(&cte.query)),
            Self::TableWithJoins(table_with_joins) => {
                out.push(Self::TableFactor(&table_with_joins.relation));
                for join in &table_with_joins.joins {
                    out.push(Self::Join(join));
                }
            }
            Self::TableFactor(factor) => match factor {
                TableFactor::Derived { subquery, .. } => out.push(Self::Query(subquery)),
                TableFactor::NestedJoin {
                    table_with_joins, ..
                } => out.push(Self::TableWithJoins(table_with_joins)),
                TableFactor::Pivot { table, .. } | TableFactor::Unpivot { table, .. } => {
                    out.push(Self::TableFactor(table))
                }
                _ => {}
            },
            Self::Join(join) => {
                out.push(Self::TableFactor(&join.relation));
                if let Some(JoinConstraint::On(expr)) = join_constraint(&join.join_operator) {
                    out.push(Self::Expr(expr));
                }
            }
            Self::SelectItem(item) => match item {
                SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                    out.push(Self::Expr(expr))
                }
                _ => {}
            },
            Self::Expr(expr) => expr_children(expr, out),
        }
    }

    pub fn as_statement(&self) -> Option<&'a Statement> {
        match self {
            Self::Statement(statement) => Some(statement),
            Self::SetExpr(SetExpr::Insert(statement)) => Some(statement),
            _ => None,
        }
    }

    pub fn as_query(&self) -> Option<&'a Query> {
        match self {
            Self::Query(query) => Some(query),
            Self::SetExpr(SetExpr::Query(query)) => Some(query),
            _ => None,
        }
    }

    /// The query specification behind this fragment, looking through the
    /// `SetExpr::Select` wrapper.
    pub fn as_select(&self) -> Option<&'a Select> {
        match self {
            Self::Select(select) => Some(select),
            Self::SetExpr(SetExpr::Select(select)) => Some(select),
            _ => None,
        }
    }

    pub fn as_expr(&self) -> Option<&'a Expr> {
        match self {
            Self::Expr(expr) => Some(expr),
            _ => None,
        }
    }
}

fn statement_kind(statement: &Statement) -> FragmentKind {
    match statement {
        Statement::Query(_) => FragmentKind::Select,
        Statement::Insert(_) => FragmentKind::Insert,
        Statement::Update { .. } => FragmentKind::Update,
        Statement::Delete(_) => FragmentKind::Delete,
        Statement::CreateTable(_) => FragmentKind::CreateTable,
        Statement::CreateView { .. } => FragmentKind::CreateView,
        Statement::CreateProcedure { .. } => FragmentKind::CreateProcedure,
        Statement::Execute { .. } => FragmentKind::Execute,
        Statement::Declare { stmts } => {
            if stmts
                .iter()
                .any(|decl| matches!(decl.data_type, Some(ast::DataType::Table(_))))
            {
                FragmentKind::DeclareTable
            } else {
                FragmentKind::DeclareVariable
            }
        }
        Statement::Set(_) => FragmentKind::SetVariable,
        _ => FragmentKind::Other,
    }
}

fn statement_children<'a>(statement: &'a Statement, out: &mut Vec<FragmentRef<'a>>) {
    match statement {
        Statement::Query(query) => out.push(FragmentRef::Query(query)),
        Statement::Insert(insert) => {
            if let Some(source) = &insert.source {
                out.push(FragmentRef::Query(source));
            }
        }
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => {
            out.push(FragmentRef::TableWithJoins(table));
            for assignment in assignments {
                out.push(FragmentRef::Expr(&assignment.value));
            }
            if let Some(selection) = selection {
                out.push(FragmentRef::Expr(selection));
            }
        }
        Statement::Delete(delete) => {
            if let Some(selection) = &delete.selection {
                out.push(FragmentRef::Expr(selection));
            }
        }
        Statement::CreateTable(create) => {
            if let Some(query) = &create.query {
                out.push(FragmentRef::Query(query));
            }
        }
        Statement::CreateView { query, .. } => out.push(FragmentRef::Query(query)),
        Statement::CreateProcedure { body, .. } => {
            for statement in body.statements() {
                out.push(FragmentRef::Statement(statement));
            }
        }
        Statement::Execute { parameters, .. } => {
            for parameter in parameters {
                out.push(FragmentRef::Expr(parameter));
            }
        }
        _ => {}
    }
}

fn expr_kind(expr: &Expr) -> FragmentKind {
    match expr {
        Expr::Case { .. } => FragmentKind::Case,
        Expr::Function(function) => {
            let name = function.name.to_string().to_uppercase();
            if name == "COALESCE" {
                FragmentKind::Coalesce
            } else if name == "NULLIF" {
                FragmentKind::NullIf
            } else if function.over.is_some() {
                FragmentKind::WindowFunction
            } else {
                FragmentKind::Function
            }
        }
        Expr::BinaryOp { .. } => FragmentKind::Binary,
        Expr::Nested(_) => FragmentKind::Parenthesis,
        Expr::Identifier(_) | Expr::CompoundIdentifier(_) => FragmentKind::ColumnReference,
        Expr::Value(_) => FragmentKind::Literal,
        _ => FragmentKind::Other,
    }
}

fn expr_children<'a>(expr: &'a Expr, out: &mut Vec<FragmentRef<'a>>) {
    match expr {
        Expr::BinaryOp { left, right, .. } => {
            out.push(FragmentRef::Expr(left));
            out.push(FragmentRef::Expr(right));
        }
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) => out.push(FragmentRef::Expr(expr)),
        Expr::Function(function) => {
            for arg in function_arg_exprs(function) {
                out.push(FragmentRef::Expr(arg));
            }
        }
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            if let Some(operand) = operand {
                out.push(FragmentRef::Expr(operand));
            }
            for case_when in conditions {
                out.push(FragmentRef::Expr(&case_when.condition));
                out.push(FragmentRef::Expr(&case_when.result));
            }
            if let Some(else_result) = else_result {
                out.push(FragmentRef::Expr(else_result));
            }
        }
        Expr::InList { expr, list, .. } => {
            out.push(FragmentRef::Expr(expr));
            for item in list {
                out.push(FragmentRef::Expr(item));
            }
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            out.push(FragmentRef::Expr(expr));
            out.push(FragmentRef::Expr(low));
            out.push(FragmentRef::Expr(high));
        }
        Expr::Like { expr, pattern, .. } | Expr::ILike { expr, pattern, .. } => {
            out.push(FragmentRef::Expr(expr));
            out.push(FragmentRef::Expr(pattern));
        }
        Expr::IsNull(expr) | Expr::IsNotNull(expr) => out.push(FragmentRef::Expr(expr)),
        Expr::Cast { expr, .. } => out.push(FragmentRef::Expr(expr)),
        Expr::Subquery(query) => out.push(FragmentRef::Query(query)),
        Expr::InSubquery { expr, subquery, .. } => {
            out.push(FragmentRef::Expr(expr));
            out.push(FragmentRef::Query(subquery));
        }
        Expr::Exists { subquery, .. } => out.push(FragmentRef::Query(subquery)),
        _ => {}
    }
}

/// The constraint attached to a join operator, when it has one.
pub fn join_constraint(op: &JoinOperator) -> Option<&JoinConstraint> {
    match op {
        JoinOperator::Join(constraint)
        | JoinOperator::Inner(constraint)
        | JoinOperator::Left(constraint)
        | JoinOperator::LeftOuter(constraint)
        | JoinOperator::Right(constraint)
        | JoinOperator::RightOuter(constraint)
        | JoinOperator::FullOuter(constraint)
        | JoinOperator::Semi(constraint)
        | JoinOperator::LeftSemi(constraint)
        | JoinOperator::RightSemi(constraint)
        | JoinOperator::Anti(constraint)
        | JoinOperator::LeftAnti(constraint)
        | JoinOperator::RightAnti(constraint)
        | JoinOperator::StraightJoin(constraint) => Some(constraint),
        JoinOperator::AsOf { constraint, .. } => Some(constraint),
        _ => None,
    }
}

/// Human-readable operation label for a join operator.
pub fn join_operation_name(op: &JoinOperator) -> &'static str {
    match op {
        JoinOperator::Join(_) | JoinOperator::Inner(_) => "INNER JOIN",
        JoinOperator::Left(_) | JoinOperator::LeftOuter(_) => "LEFT JOIN",
        JoinOperator::Right(_) | JoinOperator::RightOuter(_) => "RIGHT JOIN",
        JoinOperator::FullOuter(_) => "FULL JOIN",
        JoinOperator::CrossJoin(_) => "CROSS JOIN",
        JoinOperator::CrossApply => "CROSS APPLY",
        JoinOperator::OuterApply => "OUTER APPLY",
        JoinOperator::Semi(_) | JoinOperator::LeftSemi(_) => "LEFT SEMI JOIN",
        JoinOperator::RightSemi(_) => "RIGHT SEMI JOIN",
        JoinOperator::Anti(_) | JoinOperator::LeftAnti(_) => "LEFT ANTI JOIN",
        JoinOperator::RightAnti(_) => "RIGHT ANTI JOIN",
        _ => "JOIN",
    }
}

/// Scalar expression arguments of a function call, skipping wildcards and
/// subquery arguments.
pub fn function_arg_exprs(function: &ast::Function) -> Vec<&Expr> {
    let mut exprs = Vec::new();
    if let ast::FunctionArguments::List(arg_list) = &function.args {
        for arg in &arg_list.args {
            match arg {
                FunctionArg::Unnamed(FunctionArgExpr::Expr(expr))
                | FunctionArg::Named {
                    arg: FunctionArgExpr::Expr(expr),
                    ..
                } => exprs.push(expr),
                _ => {}
            }
        }
    }
    exprs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_sql;

    fn first_statement(sql: &str) -> Statement {
        parse_sql(sql).unwrap().into_iter().next().unwrap()
    }

    #[test]
    fn statement_kinds() {
        assert_eq!(
            FragmentRef::Statement(&first_statement("SELECT 1")).kind(),
            FragmentKind::Select
        );
        assert_eq!(
            FragmentRef::Statement(&first_statement("INSERT INTO t (a) VALUES (1)")).kind(),
            FragmentKind::Insert
        );
        assert_eq!(
            FragmentRef::Statement(&first_statement("UPDATE t SET a = 1")).kind(),
            FragmentKind::Update
        );
        assert_eq!(
            FragmentRef::Statement(&first_statement("CREATE TABLE #x (a INT)")).kind(),
            FragmentKind::CreateTable
        );
    }

    #[test]
    fn query_children_include_ctes_and_body() {
        let statement = first_statement("WITH c AS (SELECT x FROM t) SELECT x FROM c");
        let Statement::Query(query) = &statement else {
            panic!("expected query");
        };
        let mut children = Vec::new();
        FragmentRef::Query(query).children(&mut children);
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].kind(), FragmentKind::Cte);
        assert_eq!(children[1].kind(), FragmentKind::QuerySpec);
    }

    #[test]
    fn expr_kinds_distinguish_specials() {
        let statement = first_statement(
            "SELECT COALESCE(a, b), NULLIF(a, b), CASE WHEN a > 0 THEN b END, a + b FROM t",
        );
        let Statement::Query(query) = &statement else {
            panic!("expected query");
        };
        let SetExpr::Select(select) = query.body.as_ref() else {
            panic!("expected select");
        };
        let kinds: Vec<FragmentKind> = select
            .projection
            .iter()
            .map(|item| match item {
                SelectItem::UnnamedExpr(expr) => FragmentRef::Expr(expr).kind(),
                _ => FragmentKind::Other,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                FragmentKind::Coalesce,
                FragmentKind::NullIf,
                FragmentKind::Case,
                FragmentKind::Binary
            ]
        );
    }

    #[test]
    fn fragment_identity_is_stable() {
        let statement = first_statement("SELECT a FROM t");
        let a = FragmentRef::Statement(&statement);
        let b = FragmentRef::Statement(&statement);
        assert_eq!(a.addr(), b.addr());
    }
}
