//! In-memory executor.
//!
//! [`MemoryExecutor`] keeps [`Record`]s in a `Vec` and evaluates bound queries
//! directly: predicates with SQL three-valued logic (a comparison against a null
//! property is unknown, never true), ordering with nulls first, then offset and
//! limit. Each derived query is also rendered through [`SqlRenderer`] and the SQL
//! text is kept, so tests can assert on what a database backend would receive.

use crate::error::QueryError;
use crate::executor::{BoundQuery, BoundSource, Capabilities, QueryExecutor};
use crate::pagination::SortKeySource;
use crate::query::path::PropertyPath;
use crate::query::predicate::{Clause, Operator, PredicateTree};
use crate::query::sort::{SortDirection, SortSpec};
use crate::render::SqlRenderer;
use crate::value::{compare_values, Value};
use regex::RegexBuilder;
use sea_query::PostgresQueryBuilder;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

static NULL: Value = Value::Null;

/// A stored row: values keyed by dotted property path (`address.zipCode`).
///
/// Absent properties read as null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(path.to_string(), value.into());
        self
    }

    pub fn get(&self, path: &PropertyPath) -> &Value {
        self.fields.get(&path.to_string()).unwrap_or(&NULL)
    }
}

impl SortKeySource for Record {
    fn sort_value(&self, path: &PropertyPath) -> Option<Value> {
        Some(self.get(path).clone())
    }
}

/// Executor over records held in memory
#[derive(Debug)]
pub struct MemoryExecutor {
    rows: RwLock<Vec<Record>>,
    capabilities: Capabilities,
    statements: Mutex<Vec<String>>,
}

impl Default for MemoryExecutor {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MemoryExecutor {
    /// Every operator and both pagination modes; no explicit query text.
    pub fn new(rows: Vec<Record>) -> Self {
        Self {
            rows: RwLock::new(rows),
            capabilities: Capabilities {
                explicit_queries: false,
                ..Capabilities::all()
            },
            statements: Mutex::new(Vec::new()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn insert(&self, record: Record) -> Result<(), QueryError> {
        self.write()?.push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.read().map(|rows| rows.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// SQL rendered for each query run so far, oldest first.
    pub fn executed_sql(&self) -> Vec<String> {
        match self.statements.lock() {
            Ok(statements) => statements.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<Record>>, QueryError> {
        self.rows
            .read()
            .map_err(|e| QueryError::Execution(format!("failed to lock memory store: {e}")))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<Record>>, QueryError> {
        self.rows
            .write()
            .map_err(|e| QueryError::Execution(format!("failed to lock memory store: {e}")))
    }

    fn capture(&self, sql: String) {
        log::trace!("memory executor: {sql}");
        if let Ok(mut statements) = self.statements.lock() {
            statements.push(sql);
        }
    }

    /// Reject explicit text and return the filter to evaluate.
    fn filter_of(query: &BoundQuery) -> Result<Option<PredicateTree>, QueryError> {
        match &query.source {
            BoundSource::Explicit { .. } => Err(QueryError::UnsupportedByProvider(format!(
                "explicit query text in `{}`",
                query.method
            ))),
            BoundSource::Derived(_) => Ok(query.filter()),
        }
    }
}

impl QueryExecutor for MemoryExecutor {
    type Row = Record;

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn fetch(&self, query: &BoundQuery) -> Result<Vec<Record>, QueryError> {
        let filter = Self::filter_of(query)?;
        self.capture(
            SqlRenderer::new(&query.entity)
                .select(query)?
                .to_string(PostgresQueryBuilder),
        );

        let rows = self.read()?;
        let mut matched = Vec::new();
        for row in rows.iter() {
            if matches(filter.as_ref(), row)? {
                matched.push(row.clone());
            }
        }
        drop(rows);

        sort_records(&mut matched, &query.sort);
        let skip = query
            .offset
            .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
            .unwrap_or(0);
        let take = query.limit.unwrap_or(usize::MAX);
        Ok(matched.into_iter().skip(skip).take(take).collect())
    }

    fn count(&self, query: &BoundQuery) -> Result<u64, QueryError> {
        let filter = Self::filter_of(query)?;
        self.capture(
            SqlRenderer::new(&query.entity)
                .count(query)?
                .to_string(PostgresQueryBuilder),
        );

        let rows = self.read()?;
        let mut count = 0u64;
        for row in rows.iter() {
            if matches(filter.as_ref(), row)? {
                count += 1;
            }
        }
        Ok(count)
    }

    fn delete(&self, query: &BoundQuery) -> Result<Vec<Record>, QueryError> {
        let filter = Self::filter_of(query)?;
        self.capture(
            SqlRenderer::new(&query.entity)
                .delete(query)?
                .to_string(PostgresQueryBuilder),
        );

        let mut rows = self.write()?;
        let mut kept = Vec::with_capacity(rows.len());
        let mut removed = Vec::new();
        for row in rows.drain(..) {
            if matches(filter.as_ref(), &row)? {
                removed.push(row);
            } else {
                kept.push(row);
            }
        }
        *rows = kept;
        log::debug!("removed {} {} record(s)", removed.len(), query.entity);
        Ok(removed)
    }

    /// Snapshot the store and restore it if `work` fails.
    fn in_transaction<R, F>(&self, work: F) -> Result<R, QueryError>
    where
        Self: Sized,
        F: FnOnce(&Self) -> Result<R, QueryError>,
    {
        let snapshot = self.read()?.clone();
        match work(self) {
            Ok(out) => Ok(out),
            Err(e) => {
                log::debug!("rolling back memory store: {e}");
                *self.write()? = snapshot;
                Err(e)
            }
        }
    }
}

fn matches(filter: Option<&PredicateTree>, row: &Record) -> Result<bool, QueryError> {
    match filter {
        None => Ok(true),
        Some(tree) => Ok(evaluate(tree, row)? == Some(true)),
    }
}

/// Three-valued evaluation: `None` is unknown.
fn evaluate(tree: &PredicateTree, row: &Record) -> Result<Option<bool>, QueryError> {
    Ok(match tree {
        PredicateTree::Clause(clause) => evaluate_clause(clause, row)?,
        PredicateTree::And(l, r) => match (evaluate(l, row)?, evaluate(r, row)?) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        PredicateTree::Or(l, r) => match (evaluate(l, row)?, evaluate(r, row)?) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
    })
}

fn evaluate_clause(clause: &Clause, row: &Record) -> Result<Option<bool>, QueryError> {
    let fold = |v: &Value| if clause.ignore_case { v.folded() } else { v.clone() };
    let actual = fold(row.get(&clause.path));
    let operands: Vec<Value> = clause.literals().map(fold).collect();
    let operand = |i: usize| {
        operands.get(i).ok_or_else(|| {
            QueryError::InvalidArgument(format!("{clause} is missing operand {}", i + 1))
        })
    };
    let compare = |i: usize| -> Result<Option<Ordering>, QueryError> {
        let other = operand(i)?;
        if actual.is_null() || other.is_null() {
            return Ok(None);
        }
        Ok(compare_values(&actual, other, false))
    };

    let outcome = match clause.operator {
        Operator::Equal if operand(0)?.is_null() => Some(actual.is_null()),
        Operator::Equal => compare(0)?.map(|o| o == Ordering::Equal),
        Operator::LessThan => compare(0)?.map(|o| o == Ordering::Less),
        Operator::LessThanEqual => compare(0)?.map(|o| o != Ordering::Greater),
        Operator::GreaterThan => compare(0)?.map(|o| o == Ordering::Greater),
        Operator::GreaterThanEqual => compare(0)?.map(|o| o != Ordering::Less),
        Operator::Between => match (compare(0)?, compare(1)?) {
            (Some(low), Some(high)) => Some(low != Ordering::Less && high != Ordering::Greater),
            _ => None,
        },
        Operator::Like => text_match(&actual, operand(0)?, |text, pattern| {
            like_matches(text, pattern)
        })?,
        Operator::StartsWith => text_match(&actual, operand(0)?, |t, p| Ok(t.starts_with(p)))?,
        Operator::EndsWith => text_match(&actual, operand(0)?, |t, p| Ok(t.ends_with(p)))?,
        Operator::Contains => text_match(&actual, operand(0)?, |t, p| Ok(t.contains(p)))?,
        Operator::In => {
            if actual.is_null() {
                None
            } else {
                let candidates = match operand(0)? {
                    Value::List(items) => items.as_slice(),
                    single => std::slice::from_ref(single),
                };
                Some(
                    candidates
                        .iter()
                        .any(|c| compare_values(&actual, c, false) == Some(Ordering::Equal)),
                )
            }
        }
        Operator::IsNull => Some(actual.is_null()),
        Operator::Empty => Some(match &actual {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            _ => false,
        }),
        Operator::True => actual.as_bool(),
        Operator::False => actual.as_bool().map(|b| !b),
    };

    Ok(if clause.negated {
        outcome.map(|b| !b)
    } else {
        outcome
    })
}

fn text_match(
    actual: &Value,
    operand: &Value,
    test: impl FnOnce(&str, &str) -> Result<bool, QueryError>,
) -> Result<Option<bool>, QueryError> {
    match (actual, operand) {
        (Value::Null, _) | (_, Value::Null) => Ok(None),
        (Value::Text(text), Value::Text(pattern)) => test(text, pattern).map(Some),
        _ => Err(QueryError::InvalidArgument(format!(
            "pattern operators need text, got {actual} and {operand}"
        ))),
    }
}

/// SQL `LIKE`: `%` is any run, `_` any single character, `\` escapes.
fn like_matches(text: &str, pattern: &str) -> Result<bool, QueryError> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    re.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    let compiled = RegexBuilder::new(&re)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| QueryError::InvalidArgument(format!("invalid LIKE pattern `{pattern}`: {e}")))?;
    Ok(compiled.is_match(text))
}

/// Stable sort by each criterion; nulls first ascending, last descending.
fn sort_records(rows: &mut [Record], sort: &SortSpec) {
    if sort.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for criterion in sort.criteria() {
            let ordering = compare_values(
                a.get(&criterion.path),
                b.get(&criterion.path),
                criterion.ignore_case,
            )
            .unwrap_or(Ordering::Equal);
            let ordering = match criterion.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}
