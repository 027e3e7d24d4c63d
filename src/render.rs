//! SQL rendering backend built on sea-query.
//!
//! Turns a [`BoundQuery`] into sea-query statements. Tables and columns are named
//! by snake-casing the entity name and the joined property path, so
//! `address.zipCode` on `PurchaseOrder` reads `purchase_order.address_zip_code`.
//! Nulls sort first, matching the keyset engine's null handling.
//!
//! Explicit query text is not rendered here; plans carrying it are rejected.

use crate::error::QueryError;
use crate::executor::{BoundQuery, BoundSource};
use crate::query::path::PropertyPath;
use crate::query::predicate::{Clause, Operator, PredicateTree};
use crate::query::sort::{SortDirection, SortSpec};
use crate::value::Value;
use sea_query::{
    Asterisk, Condition, DeleteStatement, Expr, ExprTrait, Func, Iden, NullOrdering, Order, Query,
    SelectStatement,
};

/// Identifier built at runtime from an entity or property name
#[derive(Debug, Clone)]
struct Ident(String);

impl Iden for Ident {
    fn unquoted(&self) -> &str {
        &self.0
    }
}

/// Renders bound queries for one entity table
#[derive(Debug, Clone)]
pub struct SqlRenderer {
    table: String,
}

impl SqlRenderer {
    pub fn new(entity: &str) -> Self {
        Self {
            table: snake_case(entity),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// `SELECT *` with filter, ordering and window.
    pub fn select(&self, query: &BoundQuery) -> Result<SelectStatement, QueryError> {
        let mut stmt = Query::select();
        stmt.column(Asterisk).from(Ident(self.table.clone()));
        if let Some(condition) = self.condition(query)? {
            stmt.cond_where(condition);
        }
        order(&mut stmt, &query.sort);
        if let Some(limit) = query.limit {
            stmt.limit(limit as u64);
        }
        if let Some(offset) = query.offset {
            stmt.offset(offset);
        }
        Ok(stmt)
    }

    /// `SELECT COUNT(*)` over the filter, ignoring ordering and window.
    pub fn count(&self, query: &BoundQuery) -> Result<SelectStatement, QueryError> {
        let mut stmt = Query::select();
        stmt.expr(Func::count(Expr::col(Asterisk)))
            .from(Ident(self.table.clone()));
        if let Some(condition) = self.condition(query)? {
            stmt.cond_where(condition);
        }
        Ok(stmt)
    }

    pub fn delete(&self, query: &BoundQuery) -> Result<DeleteStatement, QueryError> {
        let mut stmt = Query::delete();
        stmt.from_table(Ident(self.table.clone()));
        if let Some(condition) = self.condition(query)? {
            stmt.cond_where(condition);
        }
        Ok(stmt)
    }

    fn condition(&self, query: &BoundQuery) -> Result<Option<Condition>, QueryError> {
        if let BoundSource::Explicit { .. } = query.source {
            return Err(QueryError::UnsupportedByProvider(format!(
                "explicit query text in `{}` cannot be rendered",
                query.method
            )));
        }
        query.filter().as_ref().map(tree_condition).transpose()
    }
}

fn tree_condition(tree: &PredicateTree) -> Result<Condition, QueryError> {
    Ok(match tree {
        PredicateTree::Clause(clause) => clause_condition(clause)?,
        PredicateTree::And(l, r) => Condition::all()
            .add(tree_condition(l)?)
            .add(tree_condition(r)?),
        PredicateTree::Or(l, r) => Condition::any()
            .add(tree_condition(l)?)
            .add(tree_condition(r)?),
    })
}

fn clause_condition(clause: &Clause) -> Result<Condition, QueryError> {
    let column = || Expr::col(Ident(column_name(&clause.path)));
    // Case-insensitive clauses compare LOWER(column) with folded operands
    let subject = || {
        if clause.ignore_case {
            Expr::expr(Func::lower(column()))
        } else {
            column()
        }
    };
    let operands: Vec<Value> = clause
        .literals()
        .map(|v| if clause.ignore_case { v.folded() } else { v.clone() })
        .collect();
    let operand = |i: usize| -> Result<sea_query::Value, QueryError> {
        operands
            .get(i)
            .and_then(Value::to_sea_value)
            .ok_or_else(|| {
                QueryError::InvalidArgument(format!(
                    "operand {} of {clause} is missing or not a scalar",
                    i + 1
                ))
            })
    };
    let text = |i: usize| -> Result<String, QueryError> {
        operands
            .get(i)
            .and_then(Value::as_text)
            .map(str::to_string)
            .ok_or_else(|| QueryError::InvalidArgument(format!("{clause} needs a text operand")))
    };

    let expr = match clause.operator {
        Operator::Equal if operands.first().is_some_and(Value::is_null) => column().is_null(),
        Operator::Equal => subject().eq(operand(0)?),
        Operator::LessThan => subject().lt(operand(0)?),
        Operator::LessThanEqual => subject().lte(operand(0)?),
        Operator::GreaterThan => subject().gt(operand(0)?),
        Operator::GreaterThanEqual => subject().gte(operand(0)?),
        Operator::Between => subject().between(operand(0)?, operand(1)?),
        Operator::Like => subject().like(text(0)?),
        Operator::StartsWith => subject().like(format!("{}%", escape_like(&text(0)?))),
        Operator::EndsWith => subject().like(format!("%{}", escape_like(&text(0)?))),
        Operator::Contains => subject().like(format!("%{}%", escape_like(&text(0)?))),
        Operator::In => {
            let items = match operands.first() {
                Some(Value::List(items)) => items
                    .iter()
                    .map(|v| {
                        v.to_sea_value().ok_or_else(|| {
                            QueryError::InvalidArgument(format!("nested list in {clause}"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                Some(single) => vec![single.to_sea_value().ok_or_else(|| {
                    QueryError::InvalidArgument(format!("{clause} needs a list operand"))
                })?],
                None => Vec::new(),
            };
            subject().is_in(items)
        }
        Operator::IsNull => column().is_null(),
        Operator::Empty => column().is_null().or(column().eq("")),
        Operator::True => column().eq(true),
        Operator::False => column().eq(false),
    };

    let condition = Condition::all().add(expr);
    Ok(if clause.negated {
        condition.not()
    } else {
        condition
    })
}

fn order(stmt: &mut SelectStatement, sort: &SortSpec) {
    for criterion in sort.criteria() {
        let direction = match criterion.direction {
            SortDirection::Asc => Order::Asc,
            SortDirection::Desc => Order::Desc,
        };
        // Nulls stay first in ascending order and move last when descending
        let nulls = match criterion.direction {
            SortDirection::Asc => NullOrdering::First,
            SortDirection::Desc => NullOrdering::Last,
        };
        let column = Expr::col(Ident(column_name(&criterion.path)));
        if criterion.ignore_case {
            stmt.order_by_expr_with_nulls(Expr::expr(Func::lower(column)), direction, nulls);
        } else {
            stmt.order_by_expr_with_nulls(column, direction, nulls);
        }
    }
}

/// Column for a property path: snake-cased segments joined with `_`.
pub fn column_name(path: &PropertyPath) -> String {
    path.segments()
        .iter()
        .map(|s| snake_case(s))
        .collect::<Vec<_>>()
        .join("_")
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
