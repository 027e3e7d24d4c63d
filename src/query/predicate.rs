//! Predicate algebra: clauses, operators and the And/Or tree.
//!
//! Clauses parsed from a method name arrive as a flat list joined by connectors.
//! [`PredicateTree::from_clauses`] groups maximal `And` runs first and joins the
//! groups with `Or`, so `A And B Or C` is always `(A And B) Or C`.

use crate::error::QueryError;
use crate::metadata::{EntityMetadata, PropertyType};
use crate::query::path::PropertyPath;
use crate::value::{Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison operator of a clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Equal,
    Between,
    Empty,
    LessThan,
    GreaterThan,
    LessThanEqual,
    GreaterThanEqual,
    Like,
    In,
    IsNull,
    True,
    False,
    StartsWith,
    EndsWith,
    Contains,
}

impl Operator {
    /// Number of operands the operator consumes.
    pub fn arity(self) -> usize {
        match self {
            Operator::Between => 2,
            Operator::Empty | Operator::IsNull | Operator::True | Operator::False => 0,
            _ => 1,
        }
    }

    /// Method-name keyword, `None` for the implicit `Equal`.
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            Operator::Equal => None,
            Operator::Between => Some("Between"),
            Operator::Empty => Some("Empty"),
            Operator::LessThan => Some("LessThan"),
            Operator::GreaterThan => Some("GreaterThan"),
            Operator::LessThanEqual => Some("LessThanEqual"),
            Operator::GreaterThanEqual => Some("GreaterThanEqual"),
            Operator::Like => Some("Like"),
            Operator::In => Some("In"),
            Operator::IsNull => Some("Null"),
            Operator::True => Some("True"),
            Operator::False => Some("False"),
            Operator::StartsWith => Some("StartsWith"),
            Operator::EndsWith => Some("EndsWith"),
            Operator::Contains => Some("Contains"),
        }
    }

    /// Keyworded operators, longest keyword first so `LessThanEqual` is peeled before `LessThan`.
    pub(crate) const PEEL_ORDER: [Operator; 14] = [
        Operator::GreaterThanEqual,
        Operator::LessThanEqual,
        Operator::GreaterThan,
        Operator::StartsWith,
        Operator::LessThan,
        Operator::EndsWith,
        Operator::Contains,
        Operator::Between,
        Operator::Empty,
        Operator::False,
        Operator::Like,
        Operator::IsNull,
        Operator::True,
        Operator::In,
    ];

    /// Whether the operator compares text (and so honors `IgnoreCase` as a pattern match).
    pub fn is_pattern(self) -> bool {
        matches!(
            self,
            Operator::Like | Operator::StartsWith | Operator::EndsWith | Operator::Contains
        )
    }
}

/// Connector between two clauses in a method name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Connector {
    And,
    Or,
}

/// Where a clause operand comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// Position among the method's value parameters
    Parameter(usize),
    /// A bound value (keyset clauses, or a parameter after binding)
    Literal(Value),
}

/// One comparison on a property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub path: PropertyPath,
    pub operator: Operator,
    pub ignore_case: bool,
    pub negated: bool,
    pub operands: Vec<Operand>,
}

impl Clause {
    /// A clause with no operands attached yet.
    pub fn new(path: PropertyPath, operator: Operator) -> Self {
        Self {
            path,
            operator,
            ignore_case: false,
            negated: false,
            operands: Vec::new(),
        }
    }

    /// A clause comparing against literal values.
    pub fn literal(path: PropertyPath, operator: Operator, values: Vec<Value>) -> Self {
        Self {
            operands: values.into_iter().map(Operand::Literal).collect(),
            ..Self::new(path, operator)
        }
    }

    pub fn ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    pub fn negated(mut self, negated: bool) -> Self {
        self.negated = negated;
        self
    }

    /// Replace parameter operands with the call's argument values.
    pub fn bind(&self, args: &[Value]) -> Result<Clause, QueryError> {
        let operands = self
            .operands
            .iter()
            .map(|operand| match operand {
                Operand::Parameter(i) => args
                    .get(*i)
                    .cloned()
                    .map(Operand::Literal)
                    .ok_or_else(|| {
                        QueryError::InvalidArgument(format!(
                            "missing value for parameter {} of `{}`",
                            i + 1,
                            self.path
                        ))
                    }),
                literal => Ok(literal.clone()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Clause {
            operands,
            ..self.clone()
        })
    }

    /// Bound literal values; parameters are skipped.
    pub fn literals(&self) -> impl Iterator<Item = &Value> {
        self.operands.iter().filter_map(|operand| match operand {
            Operand::Literal(v) => Some(v),
            Operand::Parameter(_) => None,
        })
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "Not")?;
        }
        write!(f, "{:?}", self.operator)?;
        if self.ignore_case {
            write!(f, "IgnoreCase")?;
        }
        write!(f, "({}", self.path)?;
        for operand in &self.operands {
            match operand {
                Operand::Parameter(i) => write!(f, ", ?{}", i + 1)?,
                Operand::Literal(v) => write!(f, ", {v}")?,
            }
        }
        write!(f, ")")
    }
}

/// Binary tree of clauses joined by `And` / `Or`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PredicateTree {
    Clause(Clause),
    And(Box<PredicateTree>, Box<PredicateTree>),
    Or(Box<PredicateTree>, Box<PredicateTree>),
}

impl PredicateTree {
    /// Build a tree from clauses and the connectors between them (`connectors.len() == clauses.len() - 1`).
    ///
    /// Returns `None` for an empty clause list.
    pub fn from_clauses(clauses: Vec<Clause>, connectors: &[Connector]) -> Option<PredicateTree> {
        debug_assert_eq!(connectors.len() + 1, clauses.len().max(1));

        let mut groups: Vec<PredicateTree> = Vec::new();
        let mut current: Option<PredicateTree> = None;

        for (i, clause) in clauses.into_iter().enumerate() {
            let node = PredicateTree::Clause(clause);
            let joins_previous = i > 0 && connectors.get(i - 1) == Some(&Connector::And);
            current = match current.take() {
                Some(run) if joins_previous => Some(run.and(node)),
                Some(run) => {
                    groups.push(run);
                    Some(node)
                }
                None => Some(node),
            };
        }
        groups.extend(current);

        groups.into_iter().reduce(PredicateTree::or)
    }

    pub fn and(self, other: PredicateTree) -> PredicateTree {
        PredicateTree::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: PredicateTree) -> PredicateTree {
        PredicateTree::Or(Box::new(self), Box::new(other))
    }

    /// Join two optional predicates with `And`.
    pub fn conjoin(left: Option<PredicateTree>, right: Option<PredicateTree>) -> Option<PredicateTree> {
        match (left, right) {
            (Some(l), Some(r)) => Some(l.and(r)),
            (l, r) => l.or(r),
        }
    }

    /// Clauses in left-to-right order.
    pub fn clauses(&self) -> Vec<&Clause> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Clause>) {
        match self {
            PredicateTree::Clause(c) => out.push(c),
            PredicateTree::And(l, r) | PredicateTree::Or(l, r) => {
                l.collect(out);
                r.collect(out);
            }
        }
    }

    /// Copy of the tree with every parameter operand bound.
    pub fn bind(&self, args: &[Value]) -> Result<PredicateTree, QueryError> {
        Ok(match self {
            PredicateTree::Clause(c) => PredicateTree::Clause(c.bind(args)?),
            PredicateTree::And(l, r) => l.bind(args)?.and(r.bind(args)?),
            PredicateTree::Or(l, r) => l.bind(args)?.or(r.bind(args)?),
        })
    }
}

impl fmt::Display for PredicateTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredicateTree::Clause(c) => write!(f, "{c}"),
            PredicateTree::And(l, r) => write!(f, "({l} And {r})"),
            PredicateTree::Or(l, r) => write!(f, "({l} Or {r})"),
        }
    }
}

/// Number clause operands with parameter positions in declaration order.
///
/// Returns the count of value parameters the clauses consume.
pub fn number_operands(clauses: &mut [Clause]) -> usize {
    let mut next = 0;
    for clause in clauses.iter_mut() {
        let arity = clause.operator.arity();
        clause.operands = (next..next + arity).map(Operand::Parameter).collect();
        next += arity;
    }
    next
}

/// Check the operands a method's clauses consume against its declared value parameters.
pub fn check_arity(method: &str, expected: usize, found: usize) -> Result<(), QueryError> {
    if expected != found {
        return Err(QueryError::ArityMismatch {
            method: method.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

/// Check each clause against the type of the property it compares.
///
/// Clauses must end at a scalar property. Pattern operators, `Empty` and
/// `IgnoreCase` need text; `True` and `False` need a boolean.
pub fn check_operators(
    method: &str,
    tree: &PredicateTree,
    metadata: &dyn EntityMetadata,
) -> Result<(), QueryError> {
    for clause in tree.clauses() {
        let kind = match metadata.property_type(&clause.path) {
            Some(PropertyType::Scalar(kind)) => kind,
            _ => {
                return Err(QueryError::InvalidProperty {
                    entity: metadata.entity_name().to_string(),
                    token: clause.path.to_string(),
                })
            }
        };

        let required = match clause.operator {
            op if op.is_pattern() => Some(ValueKind::Text),
            Operator::Empty => Some(ValueKind::Text),
            Operator::True | Operator::False => Some(ValueKind::Bool),
            _ => None,
        };
        let incompatible = |operator: String| QueryError::IncompatibleOperator {
            method: method.to_string(),
            property: clause.path.to_string(),
            operator,
            kind: kind.to_string(),
        };

        if let Some(required) = required {
            if kind != required {
                let keyword = clause.operator.keyword().unwrap_or("Equal");
                return Err(incompatible(keyword.to_string()));
            }
        }
        if clause.ignore_case && kind != ValueKind::Text {
            return Err(incompatible("IgnoreCase".to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clause(name: &str) -> Clause {
        Clause::new(PropertyPath::single(name), Operator::Equal)
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let tree = PredicateTree::from_clauses(
            vec![clause("a"), clause("b"), clause("c")],
            &[Connector::And, Connector::Or],
        )
        .unwrap();
        assert_eq!(tree.to_string(), "((Equal(a) And Equal(b)) Or Equal(c))");

        let tree = PredicateTree::from_clauses(
            vec![clause("a"), clause("b"), clause("c")],
            &[Connector::Or, Connector::And],
        )
        .unwrap();
        assert_eq!(tree.to_string(), "(Equal(a) Or (Equal(b) And Equal(c)))");
    }

    #[test]
    fn test_long_mixed_chain() {
        let tree = PredicateTree::from_clauses(
            vec![clause("a"), clause("b"), clause("c"), clause("d"), clause("e")],
            &[Connector::Or, Connector::And, Connector::And, Connector::Or],
        )
        .unwrap();
        assert_eq!(
            tree.to_string(),
            "((Equal(a) Or ((Equal(b) And Equal(c)) And Equal(d))) Or Equal(e))"
        );
        let names: Vec<String> = tree.clauses().iter().map(|c| c.path.to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_empty_clause_list() {
        assert!(PredicateTree::from_clauses(Vec::new(), &[]).is_none());
    }

    #[test]
    fn test_operand_assignment_and_arity() {
        let mut clauses = vec![
            Clause::new(PropertyPath::single("price"), Operator::Between),
            Clause::new(PropertyPath::single("active"), Operator::True),
            Clause::new(PropertyPath::single("name"), Operator::Like).ignore_case(true),
        ];
        assert_eq!(number_operands(&mut clauses), 3);
        assert_eq!(clauses[0].operands, vec![Operand::Parameter(0), Operand::Parameter(1)]);
        assert!(clauses[1].operands.is_empty());
        assert_eq!(clauses[2].operands, vec![Operand::Parameter(2)]);

        assert!(check_arity("findByX", 3, 3).is_ok());
        let err = check_arity("findByX", 3, 2).unwrap_err();
        assert_eq!(
            err,
            QueryError::ArityMismatch {
                method: "findByX".to_string(),
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn test_bind_replaces_parameters() {
        let mut clauses = vec![Clause::new(PropertyPath::single("price"), Operator::LessThan)];
        number_operands(&mut clauses);
        let tree = PredicateTree::from_clauses(clauses, &[]).unwrap();

        let bound = tree.bind(&[Value::Float(9.5)]).unwrap();
        let values: Vec<&Value> = bound.clauses()[0].literals().collect();
        assert_eq!(values, vec![&Value::Float(9.5)]);

        assert!(matches!(tree.bind(&[]), Err(QueryError::InvalidArgument(_))));
    }
}
