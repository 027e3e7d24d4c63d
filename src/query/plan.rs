//! Method declarations and their compiled query plans.
//!
//! A [`MethodDeclaration`] describes a repository method the way a caller writes
//! it: name, parameter kinds, return shape, optional sort annotation, optional
//! explicit query text. [`QueryPlan::compile`] validates the declaration once and
//! produces an immutable plan; every declaration error surfaces here, never at
//! call time.

use crate::error::QueryError;
use crate::metadata::EntityMetadata;
use crate::pagination::ensure_unique_ordering;
use crate::query::parser::{MethodNameParser, Subject};
use crate::query::predicate::{check_arity, check_operators, PredicateTree};
use crate::query::sort::{canonicalize, SortSpec};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

static ORDER_BY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\border\s+by\b").expect("ORDER BY pattern"));
static POSITIONAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\?(\d+)").expect("positional pattern"));
static NAMED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("named pattern"));
static DELETE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*delete\b").expect("DELETE pattern"));

/// Kind of a declared method parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParameterKind {
    /// An operand for the predicate, consumed in declaration order
    Value,
    /// Result cap
    Limit,
    /// Dynamic sort criteria
    Sort,
    /// Page request, which may carry its own sort criteria
    PageRequest,
}

impl ParameterKind {
    pub fn is_special(self) -> bool {
        !matches!(self, ParameterKind::Value)
    }
}

/// Declared return shape of a method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnShape {
    /// At most one entity
    Entity,
    Collection,
    Page,
    Number,
    Boolean,
    Unit,
}

impl fmt::Display for ReturnShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReturnShape::Entity => "a single entity",
            ReturnShape::Collection => "a collection",
            ReturnShape::Page => "a page",
            ReturnShape::Number => "a number",
            ReturnShape::Boolean => "a boolean",
            ReturnShape::Unit => "nothing",
        };
        f.write_str(name)
    }
}

/// Result variant chosen at declaration time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultKind {
    Count,
    Exists,
    Single,
    Many,
    Page,
}

/// A repository method as declared
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodDeclaration {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterKind>,
    pub returns: ReturnShape,
    /// Sort annotation, the static alternative to `OrderBy` in the name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
    /// Explicit query text; bypasses name parsing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl MethodDeclaration {
    pub fn new(name: impl Into<String>, returns: ReturnShape) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            returns,
            sort: None,
            query: None,
        }
    }

    pub fn param(mut self, kind: ParameterKind) -> Self {
        self.parameters.push(kind);
        self
    }

    /// Append `count` value parameters.
    pub fn values(mut self, count: usize) -> Self {
        self.parameters
            .extend(std::iter::repeat(ParameterKind::Value).take(count));
        self
    }

    pub fn sorted(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn query(mut self, text: impl Into<String>) -> Self {
        self.query = Some(text.into());
        self
    }

    pub fn value_count(&self) -> usize {
        self.parameters.iter().filter(|p| !p.is_special()).count()
    }

    pub fn has(&self, kind: ParameterKind) -> bool {
        self.parameters.contains(&kind)
    }
}

/// Where the rows come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QuerySource {
    /// Predicate derived from the method name; `None` matches every row
    Derived { predicate: Option<PredicateTree> },
    /// Caller-written query text, rendered by the backend as is
    Explicit { text: String, ordered: bool },
}

/// Compiled, immutable plan for one declared method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub method: String,
    pub entity: String,
    pub subject: Subject,
    pub result: ResultKind,
    pub source: QuerySource,
    pub static_sort: Option<SortSpec>,
    /// Limit fixed by the name (`findFirst3By`)
    pub limit: Option<usize>,
    pub parameters: Vec<ParameterKind>,
}

impl QueryPlan {
    /// Validate `declaration` against `metadata` and compile it.
    ///
    /// A Page method's static sort must identify rows uniquely even if the method
    /// is only ever called in offset mode, and even if callers would append a
    /// unique criterion dynamically.
    pub fn compile(
        declaration: &MethodDeclaration,
        metadata: &dyn EntityMetadata,
    ) -> Result<QueryPlan, QueryError> {
        let method = declaration.name.as_str();

        if declaration.has(ParameterKind::Sort) && declaration.has(ParameterKind::PageRequest) {
            return Err(QueryError::ConflictingDynamicSort {
                method: method.to_string(),
            });
        }
        for kind in [ParameterKind::Limit, ParameterKind::Sort, ParameterKind::PageRequest] {
            if declaration.parameters.iter().filter(|p| **p == kind).count() > 1 {
                return Err(QueryError::InvalidArgument(format!(
                    "`{method}` declares more than one {kind:?} parameter"
                )));
            }
        }

        let annotated = declaration
            .sort
            .as_ref()
            .map(|sort| canonicalize(sort, metadata))
            .transpose()?;

        let plan = match &declaration.query {
            Some(text) => Self::compile_explicit(declaration, text, annotated)?,
            None => Self::compile_derived(declaration, annotated, metadata)?,
        };

        if plan.result == ResultKind::Page {
            if !declaration.has(ParameterKind::PageRequest) {
                return Err(QueryError::IncompatibleReturn {
                    method: method.to_string(),
                    declared: "a page without a PageRequest parameter".to_string(),
                });
            }
            // Checked for every Page method, whichever mode it is later called in
            if let Some(sort) = &plan.static_sort {
                ensure_unique_ordering(metadata, sort)?;
            }
        }

        Ok(QueryPlan {
            entity: metadata.entity_name().to_string(),
            ..plan
        })
    }

    fn compile_derived(
        declaration: &MethodDeclaration,
        annotated: Option<SortSpec>,
        metadata: &dyn EntityMetadata,
    ) -> Result<QueryPlan, QueryError> {
        let method = declaration.name.as_str();
        let parsed = MethodNameParser::new(metadata)
            .parse(method)?
            .with_annotated_sort(method, annotated)?;

        check_arity(method, parsed.arity, declaration.value_count())?;
        if let Some(predicate) = &parsed.predicate {
            check_operators(method, predicate, metadata)?;
        }
        let result = result_kind(method, parsed.subject, declaration.returns)?;

        Ok(QueryPlan {
            method: method.to_string(),
            entity: metadata.entity_name().to_string(),
            subject: parsed.subject,
            result,
            source: QuerySource::Derived {
                predicate: parsed.predicate,
            },
            static_sort: parsed.static_sort,
            limit: parsed.limit,
            parameters: declaration.parameters.clone(),
        })
    }

    fn compile_explicit(
        declaration: &MethodDeclaration,
        text: &str,
        annotated: Option<SortSpec>,
    ) -> Result<QueryPlan, QueryError> {
        let method = declaration.name.as_str();
        let ordered = ORDER_BY.is_match(text);

        if ordered {
            let reason = if annotated.is_some() {
                Some("ORDER BY in the query text and a sort annotation")
            } else if declaration.has(ParameterKind::Sort) {
                Some("ORDER BY in the query text and a Sort parameter")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(QueryError::ConflictingSortSource {
                    method: method.to_string(),
                    reason: reason.to_string(),
                });
            }
        }

        check_arity(method, placeholder_count(text), declaration.value_count())?;

        let subject = if DELETE.is_match(text) {
            Subject::Delete
        } else {
            match declaration.returns {
                ReturnShape::Number => Subject::Count,
                ReturnShape::Boolean => Subject::Exists,
                _ => Subject::Find,
            }
        };
        let result = result_kind(method, subject, declaration.returns)?;

        Ok(QueryPlan {
            method: method.to_string(),
            entity: String::new(),
            subject,
            result,
            source: QuerySource::Explicit {
                text: text.to_string(),
                ordered,
            },
            static_sort: annotated,
            limit: None,
            parameters: declaration.parameters.clone(),
        })
    }

    /// Derived predicate, `None` for explicit queries and match-all names.
    pub fn predicate(&self) -> Option<&PredicateTree> {
        match &self.source {
            QuerySource::Derived { predicate } => predicate.as_ref(),
            QuerySource::Explicit { .. } => None,
        }
    }

    /// Whether the source text fixes its own ordering.
    pub fn is_ordered_query(&self) -> bool {
        matches!(self.source, QuerySource::Explicit { ordered: true, .. })
    }

    pub fn value_count(&self) -> usize {
        self.parameters.iter().filter(|p| !p.is_special()).count()
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {:?} {:?}", self.method, self.subject, self.result)?;
        match &self.source {
            QuerySource::Derived { predicate: Some(p) } => write!(f, " where {p}")?,
            QuerySource::Derived { predicate: None } => {}
            QuerySource::Explicit { text, .. } => write!(f, " query `{text}`")?,
        }
        if let Some(sort) = &self.static_sort {
            write!(f, " order by {sort}")?;
        }
        if let Some(limit) = self.limit {
            write!(f, " limit {limit}")?;
        }
        Ok(())
    }
}

/// Map subject and declared return shape onto a result variant.
fn result_kind(method: &str, subject: Subject, returns: ReturnShape) -> Result<ResultKind, QueryError> {
    let kind = match (subject, returns) {
        (Subject::Count, ReturnShape::Number) => Some(ResultKind::Count),
        (Subject::Exists, ReturnShape::Boolean) => Some(ResultKind::Exists),
        (Subject::Find, ReturnShape::Entity) => Some(ResultKind::Single),
        (Subject::Find, ReturnShape::Collection) => Some(ResultKind::Many),
        (Subject::Find, ReturnShape::Page) => Some(ResultKind::Page),
        (Subject::Delete, ReturnShape::Number) => Some(ResultKind::Count),
        (Subject::Delete, ReturnShape::Unit | ReturnShape::Collection) => Some(ResultKind::Many),
        _ => None,
    };
    kind.ok_or_else(|| QueryError::IncompatibleReturn {
        method: method.to_string(),
        declared: returns.to_string(),
    })
}

/// Distinct value placeholders in query text: the highest `?N`, or the named `:param`s.
fn placeholder_count(text: &str) -> usize {
    let positional = POSITIONAL
        .captures_iter(text)
        .filter_map(|c| c[1].parse::<usize>().ok())
        .max()
        .unwrap_or(0);
    let named: BTreeSet<&str> = NAMED
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    positional.max(named.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{EmbeddableDefinition, EntityModel};
    use crate::query::path::PropertyPath;
    use crate::query::sort::{SortCriterion, SortDirection};
    use crate::value::ValueKind;

    fn product() -> EntityModel {
        EntityModel::new("Product")
            .id("id", ValueKind::Int)
            .property("name", ValueKind::Text)
            .property("price", ValueKind::Float)
            .property("type", ValueKind::Text)
    }

    fn price_desc() -> SortSpec {
        SortSpec::new().then(SortCriterion::desc(PropertyPath::single("price")))
    }

    #[test]
    fn test_product_scenario() {
        let declaration = MethodDeclaration::new("findByNameLikeAndPriceLessThan", ReturnShape::Collection)
            .values(2)
            .sorted(price_desc());
        let plan = QueryPlan::compile(&declaration, &product()).unwrap();

        assert_eq!(plan.result, ResultKind::Many);
        assert_eq!(
            plan.predicate().unwrap().to_string(),
            "(Like(name, ?1) And LessThan(price, ?2))"
        );
        let sort = plan.static_sort.as_ref().unwrap();
        assert_eq!(sort.len(), 1);
        assert_eq!(sort.criteria()[0].direction, SortDirection::Desc);
    }

    #[test]
    fn test_special_parameters_are_skipped_for_arity() {
        let declaration = MethodDeclaration::new("findByType", ReturnShape::Collection)
            .param(ParameterKind::Value)
            .param(ParameterKind::Limit)
            .param(ParameterKind::Sort);
        assert!(QueryPlan::compile(&declaration, &product()).is_ok());

        let declaration = MethodDeclaration::new("findByPriceBetween", ReturnShape::Collection)
            .values(1)
            .param(ParameterKind::Sort);
        assert!(matches!(
            QueryPlan::compile(&declaration, &product()),
            Err(QueryError::ArityMismatch { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn test_two_dynamic_sort_sources() {
        let declaration = MethodDeclaration::new("findByType", ReturnShape::Page)
            .values(1)
            .param(ParameterKind::Sort)
            .param(ParameterKind::PageRequest);
        assert!(matches!(
            QueryPlan::compile(&declaration, &product()),
            Err(QueryError::ConflictingDynamicSort { .. })
        ));
    }

    #[test]
    fn test_return_shape_must_fit_subject() {
        let declaration = MethodDeclaration::new("countByType", ReturnShape::Collection).values(1);
        assert!(matches!(
            QueryPlan::compile(&declaration, &product()),
            Err(QueryError::IncompatibleReturn { .. })
        ));

        let ok = [
            ("countByType", ReturnShape::Number, ResultKind::Count),
            ("existsByType", ReturnShape::Boolean, ResultKind::Exists),
            ("findByType", ReturnShape::Entity, ResultKind::Single),
            ("deleteByType", ReturnShape::Number, ResultKind::Count),
            ("deleteByType", ReturnShape::Unit, ResultKind::Many),
        ];
        for (name, returns, kind) in ok {
            let declaration = MethodDeclaration::new(name, returns).values(1);
            assert_eq!(QueryPlan::compile(&declaration, &product()).unwrap().result, kind);
        }
    }

    #[test]
    fn test_paged_static_sort_must_be_unique() {
        let declaration = MethodDeclaration::new("findByTypeOrderByPriceDesc", ReturnShape::Page)
            .values(1)
            .param(ParameterKind::PageRequest);
        assert!(matches!(
            QueryPlan::compile(&declaration, &product()),
            Err(QueryError::PartialOrderingError { .. })
        ));

        let declaration = MethodDeclaration::new("findByTypeOrderByPriceDescIdAsc", ReturnShape::Page)
            .values(1)
            .param(ParameterKind::PageRequest);
        assert!(QueryPlan::compile(&declaration, &product()).is_ok());
    }

    #[test]
    fn test_operators_must_fit_property_type() {
        let model = product()
            .property("active", ValueKind::Bool)
            .embedded(
                "maker",
                EmbeddableDefinition::new("Maker").property("country", ValueKind::Text),
            );
        let compile = |name: &str, values: usize| {
            QueryPlan::compile(
                &MethodDeclaration::new(name, ReturnShape::Collection).values(values),
                &model,
            )
        };

        for name in ["findByPriceLike", "findByPriceStartsWith", "findByPriceEmpty"] {
            let values = if name.ends_with("Empty") { 0 } else { 1 };
            assert!(
                matches!(compile(name, values), Err(QueryError::IncompatibleOperator { .. })),
                "{name}"
            );
        }
        assert!(matches!(
            compile("findByNameTrue", 0),
            Err(QueryError::IncompatibleOperator { .. })
        ));
        assert!(matches!(
            compile("findByPriceIgnoreCase", 1),
            Err(QueryError::IncompatibleOperator { .. })
        ));

        assert!(compile("findByActiveTrue", 0).is_ok());
        assert!(compile("findByNameContainsIgnoreCase", 1).is_ok());
        assert!(compile("findByMaker_CountryLike", 1).is_ok());
    }

    #[test]
    fn test_embedded_property_is_not_comparable() {
        let model = product().embedded(
            "maker",
            EmbeddableDefinition::new("Maker").property("country", ValueKind::Text),
        );
        let declaration = MethodDeclaration::new("findByMaker", ReturnShape::Collection).values(1);
        let err = QueryPlan::compile(&declaration, &model).unwrap_err();
        assert!(matches!(err, QueryError::InvalidProperty { ref token, .. } if token == "maker"));
        assert!(err.is_declaration());
    }

    #[test]
    fn test_explicit_query() {
        let declaration = MethodDeclaration::new("cheap", ReturnShape::Collection)
            .query("SELECT * FROM product WHERE price < ?1 AND type = ?2")
            .values(2)
            .param(ParameterKind::Sort);
        let plan = QueryPlan::compile(&declaration, &product()).unwrap();
        assert!(plan.predicate().is_none());
        assert!(!plan.is_ordered_query());

        let declaration = MethodDeclaration::new("named", ReturnShape::Number)
            .query("SELECT COUNT(*) FROM product WHERE type = :type OR name = :type")
            .values(1);
        assert_eq!(
            QueryPlan::compile(&declaration, &product()).unwrap().subject,
            Subject::Count
        );

        let declaration = MethodDeclaration::new("purge", ReturnShape::Unit)
            .query("DELETE FROM product WHERE type = ?1")
            .values(1);
        assert_eq!(
            QueryPlan::compile(&declaration, &product()).unwrap().subject,
            Subject::Delete
        );
    }

    #[test]
    fn test_ordered_query_forbids_other_sorts() {
        let text = "SELECT * FROM product ORDER BY price";
        let annotated = MethodDeclaration::new("sorted", ReturnShape::Collection)
            .query(text)
            .sorted(price_desc());
        assert!(matches!(
            QueryPlan::compile(&annotated, &product()),
            Err(QueryError::ConflictingSortSource { .. })
        ));

        let dynamic = MethodDeclaration::new("sorted", ReturnShape::Collection)
            .query(text)
            .param(ParameterKind::Sort);
        assert!(matches!(
            QueryPlan::compile(&dynamic, &product()),
            Err(QueryError::ConflictingSortSource { .. })
        ));

        let plain = MethodDeclaration::new("sorted", ReturnShape::Collection).query(text);
        assert!(QueryPlan::compile(&plain, &product()).unwrap().is_ordered_query());
    }

    #[test]
    fn test_find_first_limit_carries_into_plan() {
        let declaration = MethodDeclaration::new("findFirst3ByTypeOrderByPriceDesc", ReturnShape::Collection)
            .values(1);
        let plan = QueryPlan::compile(&declaration, &product()).unwrap();
        assert_eq!(plan.limit, Some(3));
        assert_eq!(
            plan.to_string(),
            "findFirst3ByTypeOrderByPriceDesc -> Find Many where Equal(type, ?1) order by price Desc limit 3"
        );
    }
}
