//! AST → LogicalPlan lowering.

use crate::error::{MeshError, MeshResult};
use crate::sql::planner::types::*;
use crate::types::{ColumnInfo, TableInfo, Value};
use parking_lot::RwLock;
use sqlparser::ast::{
    BinaryOperator as SqlBinaryOp, ColumnOption, Expr as SqlExpr, GroupByExpr, JoinConstraint,
    JoinOperator, OrderByExpr as SqlOrderByExpr, Query, Select, SelectItem, SetExpr, SetOperator,
    SetQuantifier, Statement, TableFactor, TableWithJoins,
};
use std::collections::HashMap;

/// SQL BinaryOperator → logical BinaryOperator.
pub fn convert_binary_op(op: &SqlBinaryOp) -> MeshResult<BinaryOperator> {
    match op {
        SqlBinaryOp::Plus => Ok(BinaryOperator::Plus),
        SqlBinaryOp::Minus => Ok(BinaryOperator::Minus),
        SqlBinaryOp::Multiply => Ok(BinaryOperator::Multiply),
        SqlBinaryOp::Divide => Ok(BinaryOperator::Divide),
        SqlBinaryOp::Modulo => Ok(BinaryOperator::Modulo),
        SqlBinaryOp::Eq => Ok(BinaryOperator::Eq),
        SqlBinaryOp::NotEq => Ok(BinaryOperator::NotEq),
        SqlBinaryOp::Lt => Ok(BinaryOperator::Lt),
        SqlBinaryOp::LtEq => Ok(BinaryOperator::LtEq),
        SqlBinaryOp::Gt => Ok(BinaryOperator::Gt),
        SqlBinaryOp::GtEq => Ok(BinaryOperator::GtEq),
        SqlBinaryOp::And => Ok(BinaryOperator::And),
        SqlBinaryOp::Or => Ok(BinaryOperator::Or),
        _ => Err(MeshError::NotImplemented(format!(
            "unsupported binary operator: {op:?}"
        ))),
    }
}

/// Map a function name onto a scalar function, if it is one.
pub fn match_scalar_function(name: &str) -> Option<ScalarFunction> {
    match name {
        "UPPER" => Some(ScalarFunction::Upper),
        "LOWER" => Some(ScalarFunction::Lower),
        "LENGTH" => Some(ScalarFunction::Length),
        "ABS" => Some(ScalarFunction::Abs),
        "ROUND" => Some(ScalarFunction::Round),
        _ => None,
    }
}

/// Extract a usize from a SQL literal expression (for LIMIT/OFFSET).
pub fn extract_usize(expr: &SqlExpr) -> MeshResult<usize> {
    match expr {
        SqlExpr::Value(sqlparser::ast::Value::Number(n, _)) => n.parse::<usize>().map_err(|_| {
            MeshError::InvalidArgument(format!(
                "LIMIT/OFFSET value must be a non-negative integer, got: {n}"
            ))
        }),
        _ => Err(MeshError::NotImplemented(format!(
            "non-literal LIMIT/OFFSET expression: {expr:?}"
        ))),
    }
}

/// Logical plan builder — AST → LogicalPlan.
pub struct LogicalPlanner {
    /// SELECT aliases visible to WHERE/ORDER BY
    alias_map: RwLock<HashMap<String, Expr>>,
}

impl Default for LogicalPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl LogicalPlanner {
    pub fn new() -> Self {
        Self {
            alias_map: RwLock::new(HashMap::new()),
        }
    }

    pub fn plan(&self, statement: &Statement) -> MeshResult<LogicalPlan> {
        match statement {
            Statement::Query(query) => self.plan_query(query),
            Statement::Insert(insert) => self.plan_insert(insert),
            Statement::Update { .. } => self.plan_update(statement),
            Statement::Delete(_) => self.plan_delete(statement),
            Statement::CreateTable(create) => {
                let name = create.name.to_string();
                let mut columns = Vec::with_capacity(create.columns.len());
                for col in &create.columns {
                    let mut info = ColumnInfo::new(col.name.to_string(), col.data_type.to_string());
                    for option in &col.options {
                        match &option.option {
                            ColumnOption::Unique { is_primary, .. } if *is_primary => {
                                info.primary = true;
                                info.nullable = false;
                            }
                            ColumnOption::NotNull => info.nullable = false,
                            _ => {}
                        }
                    }
                    columns.push(info);
                }
                Ok(LogicalPlan::CreateTable {
                    info: TableInfo::new(name, columns),
                    if_not_exists: create.if_not_exists,
                })
            }
            Statement::Drop {
                names,
                object_type,
                if_exists,
                ..
            } => {
                use sqlparser::ast::ObjectType;
                match object_type {
                    ObjectType::Table => Ok(LogicalPlan::DropTable {
                        table: names[0].to_string(),
                        if_exists: *if_exists,
                    }),
                    other => Err(MeshError::SqlNotSupported {
                        feature: format!("DROP {other:?}"),
                        hint: "only DROP TABLE is supported".to_string(),
                    }),
                }
            }
            Statement::Truncate { table_names, .. } => {
                let table = table_names
                    .first()
                    .map(|t| t.name.to_string())
                    .ok_or_else(|| {
                        MeshError::InvalidArgument("TRUNCATE requires a table name".to_string())
                    })?;
                Ok(LogicalPlan::Truncate { table })
            }
            _ => Err(MeshError::SqlNotSupported {
                feature: format!("statement: {statement:?}"),
                hint: "supported: SELECT, INSERT, UPDATE, DELETE, CREATE/DROP/TRUNCATE TABLE"
                    .to_string(),
            }),
        }
    }

    fn plan_query(&self, query: &Query) -> MeshResult<LogicalPlan> {
        let mut plan = self.plan_set_expr(query.body.as_ref())?;

        // ORDER BY lives on Query, not Select
        if let Some(ref order_by) = query.order_by {
            let sort_exprs: Vec<SortExpr> = order_by
                .exprs
                .iter()
                .map(|ob| self.plan_order_by_expr(ob))
                .collect::<MeshResult<_>>()?;
            if !sort_exprs.is_empty() {
                plan = LogicalPlan::Sort {
                    input: Box::new(plan),
                    order_by: sort_exprs,
                };
            }
        }

        if query.limit.is_some() || query.offset.is_some() {
            let count = match &query.limit {
                Some(expr) => extract_usize(expr)?,
                None => usize::MAX,
            };
            let offset = match &query.offset {
                Some(offset) => extract_usize(&offset.value)?,
                None => 0,
            };
            plan = LogicalPlan::Limit {
                input: Box::new(plan),
                count,
                offset,
            };
        }

        Ok(plan)
    }

    fn plan_set_expr(&self, body: &SetExpr) -> MeshResult<LogicalPlan> {
        match body {
            SetExpr::Select(select) => self.plan_select(select),
            SetExpr::SetOperation {
                op: SetOperator::Union,
                set_quantifier,
                left,
                right,
            } => {
                let distinct = !matches!(set_quantifier, SetQuantifier::All);
                let left = self.plan_set_expr(left)?;
                let right = self.plan_set_expr(right)?;
                // flatten nested unions of the same quantifier
                let mut inputs = Vec::new();
                for side in [left, right] {
                    match side {
                        LogicalPlan::Union {
                            inputs: nested,
                            distinct: nested_distinct,
                        } if nested_distinct == distinct => inputs.extend(nested),
                        other => inputs.push(other),
                    }
                }
                Ok(LogicalPlan::Union { inputs, distinct })
            }
            SetExpr::Query(query) => self.plan_query(query),
            _ => Err(MeshError::SqlNotSupported {
                feature: format!("query body: {body:?}"),
                hint: "supported: SELECT and UNION [ALL]".to_string(),
            }),
        }
    }

    fn plan_insert(&self, insert: &sqlparser::ast::Insert) -> MeshResult<LogicalPlan> {
        let table = insert.table_name.to_string();
        let columns: Vec<String> = insert.columns.iter().map(|c| c.value.clone()).collect();

        let mut values = Vec::new();
        let mut select_source = None;
        if let Some(source) = &insert.source {
            match source.body.as_ref() {
                SetExpr::Values(values_set) => {
                    for row in &values_set.rows {
                        let row_exprs: Vec<Expr> = row
                            .iter()
                            .map(|expr| self.plan_expr(expr))
                            .collect::<MeshResult<_>>()?;
                        values.push(row_exprs);
                    }
                }
                SetExpr::Select(_) | SetExpr::SetOperation { .. } => {
                    select_source = Some(Box::new(self.plan_query(source)?));
                }
                other => {
                    return Err(MeshError::SqlNotSupported {
                        feature: format!("INSERT source: {other:?}"),
                        hint: "use VALUES (...) or a SELECT".to_string(),
                    });
                }
            }
        } else {
            return Err(MeshError::SqlNotSupported {
                feature: "INSERT without a source".to_string(),
                hint: "INSERT INTO ... VALUES (...) is required".to_string(),
            });
        }

        let mut on_duplicate = Vec::new();
        if let Some(sqlparser::ast::OnInsert::DuplicateKeyUpdate(assignments)) = &insert.on {
            for assignment in assignments {
                let column = assignment.target.to_string();
                let value = self.plan_expr(&assignment.value)?;
                on_duplicate.push((column, value));
            }
        }

        Ok(LogicalPlan::Insert {
            table,
            columns,
            values,
            source: select_source,
            on_duplicate,
        })
    }

    fn plan_update(&self, statement: &Statement) -> MeshResult<LogicalPlan> {
        let Statement::Update {
            table,
            assignments,
            selection,
            ..
        } = statement
        else {
            return Err(MeshError::SqlExecution {
                message: "expected UPDATE statement".to_string(),
                context: format!("{statement:?}"),
            });
        };
        let table_name = table.relation.to_string();
        let mut parsed = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let column = assignment.target.to_string();
            let value = self.plan_expr(&assignment.value)?;
            parsed.push((column, value));
        }
        let filter = selection
            .as_ref()
            .map(|sel| self.plan_expr(sel))
            .transpose()?;
        Ok(LogicalPlan::Update {
            table: table_name,
            assignments: parsed,
            filter,
        })
    }

    fn plan_delete(&self, statement: &Statement) -> MeshResult<LogicalPlan> {
        let Statement::Delete(delete) = statement else {
            return Err(MeshError::SqlExecution {
                message: "expected DELETE statement".to_string(),
                context: format!("{statement:?}"),
            });
        };
        let tables = match &delete.from {
            sqlparser::ast::FromTable::WithFromKeyword(t) => t,
            sqlparser::ast::FromTable::WithoutKeyword(t) => t,
        };
        let table = tables
            .first()
            .map(|t| t.relation.to_string())
            .unwrap_or_default();
        let filter = delete
            .selection
            .as_ref()
            .map(|sel| self.plan_expr(sel))
            .transpose()?;
        Ok(LogicalPlan::Delete { table, filter })
    }

    fn plan_select(&self, select: &Select) -> MeshResult<LogicalPlan> {
        self.alias_map.write().clear();

        // pre-scan projections so WHERE/ORDER BY can reference aliases;
        // aggregate aliases resolve against the aggregate's output
        // column instead, so they stay out
        for item in &select.projection {
            if let SelectItem::ExprWithAlias { expr, alias } = item {
                let planned = self.plan_expr(expr)?;
                if !contains_aggregate(&planned) {
                    self.alias_map.write().insert(alias.value.clone(), planned);
                }
            }
        }

        let mut plan = self.plan_from(&select.from)?;

        if let Some(ref selection) = select.selection {
            let predicate = self.plan_expr(selection)?;
            plan = LogicalPlan::Filter {
                input: Box::new(plan),
                predicate,
            };
        }

        let group_by_exprs = match &select.group_by {
            GroupByExpr::Expressions(exprs, _) => exprs
                .iter()
                .map(|e| self.plan_expr(e))
                .collect::<MeshResult<Vec<_>>>()?,
            GroupByExpr::All(_) => vec![],
        };

        let aggregates = self.extract_aggregates(&select.projection)?;

        if !group_by_exprs.is_empty() || !aggregates.is_empty() {
            plan = LogicalPlan::Aggregate {
                input: Box::new(plan),
                group_by: group_by_exprs,
                aggregates,
            };
        }

        let projections = self.plan_projection(&select.projection)?;
        if !projections.is_empty() {
            plan = LogicalPlan::Project {
                input: Box::new(plan),
                projections,
            };
        }

        Ok(plan)
    }

    fn plan_order_by_expr(&self, ob: &SqlOrderByExpr) -> MeshResult<SortExpr> {
        Ok(SortExpr {
            expr: self.plan_expr(&ob.expr)?,
            asc: ob.asc.unwrap_or(true),
        })
    }

    fn extract_aggregates(&self, projection: &[SelectItem]) -> MeshResult<Vec<AggregateExpr>> {
        let mut aggregates = Vec::new();
        for item in projection {
            match item {
                SelectItem::UnnamedExpr(expr) => {
                    if let Some(agg) = self.try_extract_aggregate(expr, None)? {
                        aggregates.push(agg);
                    }
                }
                SelectItem::ExprWithAlias { expr, alias } => {
                    if let Some(agg) = self.try_extract_aggregate(expr, Some(alias.value.clone()))? {
                        aggregates.push(agg);
                    }
                }
                _ => {}
            }
        }
        Ok(aggregates)
    }

    fn try_extract_aggregate(
        &self,
        expr: &SqlExpr,
        alias: Option<String>,
    ) -> MeshResult<Option<AggregateExpr>> {
        let SqlExpr::Function(func) = expr else {
            return Ok(None);
        };
        let name = func.name.to_string().to_uppercase();
        let function = match name.as_str() {
            "COUNT" => AggregateFunction::Count,
            "SUM" => AggregateFunction::Sum,
            "AVG" => AggregateFunction::Avg,
            "MIN" => AggregateFunction::Min,
            "MAX" => AggregateFunction::Max,
            "GROUP_CONCAT" => AggregateFunction::GroupConcat,
            _ => return Ok(None),
        };
        let arg = self.plan_function_arg(&func.args)?;
        Ok(Some(AggregateExpr {
            function,
            expr: arg,
            alias,
        }))
    }

    /// First function argument; `*` becomes a constant 1 (COUNT(*)).
    fn plan_function_arg(&self, args: &sqlparser::ast::FunctionArguments) -> MeshResult<Expr> {
        use sqlparser::ast::{FunctionArg, FunctionArgExpr, FunctionArguments};
        match args {
            FunctionArguments::List(arg_list) => {
                let Some(first) = arg_list.args.first() else {
                    return Ok(Expr::literal(1i64));
                };
                match first {
                    FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => self.plan_expr(e),
                    FunctionArg::Unnamed(FunctionArgExpr::Wildcard)
                    | FunctionArg::Unnamed(FunctionArgExpr::QualifiedWildcard(_)) => {
                        Ok(Expr::literal(1i64))
                    }
                    FunctionArg::Named { arg, .. } => match arg {
                        FunctionArgExpr::Expr(e) => self.plan_expr(e),
                        _ => Ok(Expr::literal(1i64)),
                    },
                }
            }
            FunctionArguments::None => Ok(Expr::literal(1i64)),
            FunctionArguments::Subquery(_) => Err(MeshError::NotImplemented(
                "subquery function arguments".to_string(),
            )),
        }
    }

    fn plan_from(&self, from: &[TableWithJoins]) -> MeshResult<LogicalPlan> {
        if from.is_empty() {
            return Err(MeshError::InvalidArgument(
                "FROM clause is required".to_string(),
            ));
        }
        if from.len() > 1 {
            return Err(MeshError::SqlNotSupported {
                feature: "multiple tables in FROM".to_string(),
                hint: "use JOIN syntax".to_string(),
            });
        }

        let table_with_joins = &from[0];
        let mut plan = LogicalPlan::Scan {
            table: table_factor_name(&table_with_joins.relation)?,
            columns: vec![],
            filter: None,
        };

        for join in &table_with_joins.joins {
            let right_plan = LogicalPlan::Scan {
                table: table_factor_name(&join.relation)?,
                columns: vec![],
                filter: None,
            };

            let (join_type, constraint) = match &join.join_operator {
                JoinOperator::Inner(c) => (JoinType::Inner, Some(c)),
                JoinOperator::LeftOuter(c) => (JoinType::Left, Some(c)),
                JoinOperator::RightOuter(c) => (JoinType::Right, Some(c)),
                JoinOperator::FullOuter(c) => (JoinType::Full, Some(c)),
                JoinOperator::LeftSemi(c) => (JoinType::Semi, Some(c)),
                JoinOperator::LeftAnti(c) => (JoinType::AntiSemi, Some(c)),
                JoinOperator::CrossJoin => (JoinType::Cross, None),
                other => {
                    return Err(MeshError::SqlNotSupported {
                        feature: format!("JOIN type: {other:?}"),
                        hint: "supported: INNER, LEFT, RIGHT, FULL, CROSS, SEMI, ANTI".to_string(),
                    });
                }
            };

            let on = match constraint {
                Some(JoinConstraint::On(expr)) => self.plan_expr(expr)?,
                Some(JoinConstraint::None) | None => Expr::literal(true),
                Some(other) => {
                    return Err(MeshError::SqlNotSupported {
                        feature: format!("JOIN constraint: {other:?}"),
                        hint: "use an explicit ON clause".to_string(),
                    });
                }
            };

            plan = LogicalPlan::Join {
                left: Box::new(plan),
                right: Box::new(right_plan),
                join_type,
                on,
            };
        }

        Ok(plan)
    }

    fn plan_projection(
        &self,
        projection: &[SelectItem],
    ) -> MeshResult<Vec<(Expr, Option<String>)>> {
        let mut projections = Vec::new();
        for item in projection {
            match item {
                // SELECT *: empty projections means all columns
                SelectItem::Wildcard(_) => {}
                SelectItem::UnnamedExpr(expr) => {
                    projections.push((self.plan_expr(expr)?, None));
                }
                SelectItem::ExprWithAlias { expr, alias } => {
                    projections.push((self.plan_expr(expr)?, Some(alias.value.clone())));
                }
                other => {
                    return Err(MeshError::NotImplemented(format!(
                        "unsupported SELECT item: {other:?}"
                    )));
                }
            }
        }
        Ok(projections)
    }

    fn plan_expr(&self, expr: &SqlExpr) -> MeshResult<Expr> {
        match expr {
            SqlExpr::Identifier(ident) => {
                let name = ident.value.clone();
                if let Some(aliased) = self.alias_map.read().get(&name) {
                    return Ok(aliased.clone());
                }
                Ok(Expr::Column(name))
            }
            SqlExpr::CompoundIdentifier(idents) => {
                // table.column → column name only; sources are row maps
                let name = idents.last().map(|i| i.value.clone()).unwrap_or_default();
                Ok(Expr::Column(name))
            }
            SqlExpr::Value(value) => Ok(Expr::Literal(convert_value(value)?)),
            SqlExpr::BinaryOp { left, op, right } => Ok(Expr::BinaryOp {
                left: Box::new(self.plan_expr(left)?),
                op: convert_binary_op(op)?,
                right: Box::new(self.plan_expr(right)?),
            }),
            SqlExpr::Like {
                negated,
                expr,
                pattern,
                ..
            } => Ok(Expr::Like {
                expr: Box::new(self.plan_expr(expr)?),
                pattern: Box::new(self.plan_expr(pattern)?),
                negated: *negated,
            }),
            SqlExpr::InList {
                expr,
                list,
                negated,
            } => Ok(Expr::InList {
                expr: Box::new(self.plan_expr(expr)?),
                list: list
                    .iter()
                    .map(|e| self.plan_expr(e))
                    .collect::<MeshResult<_>>()?,
                negated: *negated,
            }),
            SqlExpr::IsNull(inner) => Ok(Expr::IsNull(Box::new(self.plan_expr(inner)?))),
            SqlExpr::IsNotNull(inner) => Ok(Expr::IsNotNull(Box::new(self.plan_expr(inner)?))),
            SqlExpr::Function(func) => {
                let name = func.name.to_string().to_uppercase();
                let args = self.plan_function_args(&func.args)?;
                match match_scalar_function(&name) {
                    Some(func) => Ok(Expr::ScalarFunc { func, args }),
                    // aggregate or unknown; the aggregate node validates
                    None => Ok(Expr::Function { name, args }),
                }
            }
            SqlExpr::Nested(inner) => self.plan_expr(inner),
            SqlExpr::UnaryOp {
                op: sqlparser::ast::UnaryOperator::Minus,
                expr,
            } => match self.plan_expr(expr)? {
                Expr::Literal(Value::Int64(i)) => Ok(Expr::literal(-i)),
                Expr::Literal(Value::Float64(f)) => Ok(Expr::literal(-f)),
                inner => Ok(Expr::BinaryOp {
                    left: Box::new(Expr::literal(0i64)),
                    op: BinaryOperator::Minus,
                    right: Box::new(inner),
                }),
            },
            _ => Err(MeshError::NotImplemented(format!(
                "unsupported expression: {expr:?}"
            ))),
        }
    }

    fn plan_function_args(&self, args: &sqlparser::ast::FunctionArguments) -> MeshResult<Vec<Expr>> {
        use sqlparser::ast::{FunctionArg, FunctionArgExpr, FunctionArguments};
        let FunctionArguments::List(arg_list) = args else {
            return Ok(vec![]);
        };
        let mut planned = Vec::new();
        for arg in &arg_list.args {
            if let FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) = arg {
                planned.push(self.plan_expr(e)?);
            }
        }
        Ok(planned)
    }
}

fn contains_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::Function { .. } => true,
        Expr::Column(_) | Expr::Literal(_) => false,
        Expr::BinaryOp { left, right, .. } => contains_aggregate(left) || contains_aggregate(right),
        Expr::Like { expr, pattern, .. } => contains_aggregate(expr) || contains_aggregate(pattern),
        Expr::InList { expr, list, .. } => {
            contains_aggregate(expr) || list.iter().any(contains_aggregate)
        }
        Expr::IsNull(inner) | Expr::IsNotNull(inner) => contains_aggregate(inner),
        Expr::ScalarFunc { args, .. } => args.iter().any(contains_aggregate),
    }
}

fn table_factor_name(factor: &TableFactor) -> MeshResult<String> {
    match factor {
        TableFactor::Table { name, .. } => Ok(name.to_string()),
        other => Err(MeshError::SqlNotSupported {
            feature: format!("table expression: {other:?}"),
            hint: "use simple table names".to_string(),
        }),
    }
}

fn convert_value(value: &sqlparser::ast::Value) -> MeshResult<Value> {
    match value {
        sqlparser::ast::Value::Number(n, _) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(Value::Int64(i))
            } else if let Ok(f) = n.parse::<f64>() {
                Ok(Value::Float64(f))
            } else {
                Err(MeshError::InvalidArgument(format!("invalid number: {n}")))
            }
        }
        sqlparser::ast::Value::SingleQuotedString(s)
        | sqlparser::ast::Value::DoubleQuotedString(s) => Ok(Value::Str(s.clone())),
        sqlparser::ast::Value::Boolean(b) => Ok(Value::Bool(*b)),
        sqlparser::ast::Value::Null => Ok(Value::Null),
        other => Err(MeshError::NotImplemented(format!(
            "unsupported literal: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqlParser;

    fn plan_sql(sql: &str) -> LogicalPlan {
        let parser = SqlParser::new();
        let statement = parser.parse_one(sql).unwrap();
        LogicalPlanner::new().plan(&statement).unwrap()
    }

    #[test]
    fn simple_select_becomes_scan() {
        let plan = plan_sql("SELECT * FROM users");
        match plan {
            LogicalPlan::Scan { table, .. } => assert_eq!(table, "users"),
            other => panic!("expected Scan, got {other:?}"),
        }
    }

    #[test]
    fn where_clause_becomes_filter() {
        let plan = plan_sql("SELECT id, name FROM users WHERE id = 1");
        let LogicalPlan::Project { input, projections } = plan else {
            panic!("expected Project");
        };
        assert_eq!(projections.len(), 2);
        let LogicalPlan::Filter { predicate, input } = *input else {
            panic!("expected Filter");
        };
        assert!(matches!(
            predicate,
            Expr::BinaryOp {
                op: BinaryOperator::Eq,
                ..
            }
        ));
        assert!(matches!(*input, LogicalPlan::Scan { .. }));
    }

    #[test]
    fn join_with_on_condition() {
        let plan = plan_sql("SELECT * FROM users JOIN orders ON users.id = orders.user_id");
        let LogicalPlan::Join {
            join_type,
            on,
            left,
            right,
        } = plan
        else {
            panic!("expected Join");
        };
        assert_eq!(join_type, JoinType::Inner);
        assert!(matches!(*left, LogicalPlan::Scan { .. }));
        assert!(matches!(*right, LogicalPlan::Scan { .. }));
        // compound identifiers collapse to bare column names
        let Expr::BinaryOp { left, right, .. } = on else {
            panic!("expected BinaryOp");
        };
        assert_eq!(*left, Expr::column("id"));
        assert_eq!(*right, Expr::column("user_id"));
    }

    #[test]
    fn outer_join_types() {
        let plan = plan_sql("SELECT * FROM a LEFT JOIN b ON a.x = b.y");
        assert!(matches!(
            plan,
            LogicalPlan::Join {
                join_type: JoinType::Left,
                ..
            }
        ));
        let plan = plan_sql("SELECT * FROM a FULL OUTER JOIN b ON a.x = b.y");
        assert!(matches!(
            plan,
            LogicalPlan::Join {
                join_type: JoinType::Full,
                ..
            }
        ));
    }

    #[test]
    fn group_by_with_aggregates() {
        let plan = plan_sql("SELECT user_id, SUM(amount) AS total FROM orders GROUP BY user_id");
        let LogicalPlan::Project { input, .. } = plan else {
            panic!("expected Project");
        };
        let LogicalPlan::Aggregate {
            group_by,
            aggregates,
            ..
        } = *input
        else {
            panic!("expected Aggregate");
        };
        assert_eq!(group_by.len(), 1);
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].function, AggregateFunction::Sum);
        assert_eq!(aggregates[0].alias.as_deref(), Some("total"));
    }

    #[test]
    fn count_star() {
        let plan = plan_sql("SELECT COUNT(*) FROM users");
        let LogicalPlan::Project { input, .. } = plan else {
            panic!("expected Project");
        };
        let LogicalPlan::Aggregate { aggregates, .. } = *input else {
            panic!("expected Aggregate");
        };
        assert_eq!(aggregates[0].function, AggregateFunction::Count);
        assert_eq!(aggregates[0].expr, Expr::literal(1i64));
    }

    #[test]
    fn order_by_and_limit() {
        let plan = plan_sql("SELECT * FROM users ORDER BY name DESC LIMIT 5 OFFSET 2");
        let LogicalPlan::Limit {
            count,
            offset,
            input,
        } = plan
        else {
            panic!("expected Limit");
        };
        assert_eq!(count, 5);
        assert_eq!(offset, 2);
        let LogicalPlan::Sort { order_by, .. } = *input else {
            panic!("expected Sort");
        };
        assert!(!order_by[0].asc);
    }

    #[test]
    fn union_all_flattens() {
        let plan =
            plan_sql("SELECT a FROM t1 UNION ALL SELECT a FROM t2 UNION ALL SELECT a FROM t3");
        let LogicalPlan::Union { inputs, distinct } = plan else {
            panic!("expected Union");
        };
        assert!(!distinct);
        assert_eq!(inputs.len(), 3);
    }

    #[test]
    fn union_distinct() {
        let plan = plan_sql("SELECT a FROM t1 UNION SELECT a FROM t2");
        assert!(matches!(
            plan,
            LogicalPlan::Union { distinct: true, .. }
        ));
    }

    #[test]
    fn insert_values() {
        let plan = plan_sql("INSERT INTO users (id, name) VALUES (1, 'Alice'), (2, 'Bob')");
        let LogicalPlan::Insert {
            table,
            columns,
            values,
            source,
            on_duplicate,
        } = plan
        else {
            panic!("expected Insert");
        };
        assert_eq!(table, "users");
        assert_eq!(columns, vec!["id", "name"]);
        assert_eq!(values.len(), 2);
        assert!(source.is_none());
        assert!(on_duplicate.is_empty());
    }

    #[test]
    fn insert_select() {
        let plan = plan_sql("INSERT INTO archive (id, name) SELECT id, name FROM users");
        let LogicalPlan::Insert { values, source, .. } = plan else {
            panic!("expected Insert");
        };
        assert!(values.is_empty());
        assert!(source.is_some());
    }

    #[test]
    fn insert_on_duplicate_key_update() {
        let plan = plan_sql(
            "INSERT INTO users (id, name) VALUES (1, 'Alice') \
             ON DUPLICATE KEY UPDATE name = 'Alice2'",
        );
        let LogicalPlan::Insert { on_duplicate, .. } = plan else {
            panic!("expected Insert");
        };
        assert_eq!(on_duplicate.len(), 1);
        assert_eq!(on_duplicate[0].0, "name");
    }

    #[test]
    fn update_with_filter() {
        let plan = plan_sql("UPDATE users SET name = 'x' WHERE id = 3");
        let LogicalPlan::Update {
            table,
            assignments,
            filter,
        } = plan
        else {
            panic!("expected Update");
        };
        assert_eq!(table, "users");
        assert_eq!(assignments.len(), 1);
        assert!(filter.is_some());
    }

    #[test]
    fn delete_without_filter() {
        let plan = plan_sql("DELETE FROM users");
        assert!(matches!(
            plan,
            LogicalPlan::Delete { filter: None, .. }
        ));
    }

    #[test]
    fn create_table_detects_primary_key() {
        let plan = plan_sql("CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(255))");
        let LogicalPlan::CreateTable { info, .. } = plan else {
            panic!("expected CreateTable");
        };
        assert_eq!(info.name, "users");
        assert!(info.columns[0].primary);
        assert!(!info.columns[0].nullable);
        assert!(!info.columns[1].primary);
    }

    #[test]
    fn like_and_in_exprs() {
        let plan = plan_sql("SELECT * FROM users WHERE name LIKE 'a%' AND id IN (1, 2)");
        let LogicalPlan::Filter { predicate, .. } = plan else {
            panic!("expected Filter");
        };
        let Expr::BinaryOp { left, right, .. } = predicate else {
            panic!("expected AND");
        };
        assert!(matches!(*left, Expr::Like { .. }));
        assert!(matches!(*right, Expr::InList { .. }));
    }

    #[test]
    fn negative_literal_folds() {
        let plan = plan_sql("SELECT * FROM t WHERE x = -5");
        let LogicalPlan::Filter { predicate, .. } = plan else {
            panic!("expected Filter");
        };
        let Expr::BinaryOp { right, .. } = predicate else {
            panic!("expected BinaryOp");
        };
        assert_eq!(*right, Expr::literal(-5i64));
    }

    #[test]
    fn truncate_statement() {
        let plan = plan_sql("TRUNCATE TABLE users");
        assert!(matches!(plan, LogicalPlan::Truncate { .. }));
    }
}
