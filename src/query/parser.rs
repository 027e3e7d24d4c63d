//! Method-name parser
//!
//! Turns a convention-based repository method name into a subject, a predicate
//! tree and an optional static sort:
//!
//! ```text
//! findFirst10ByNameLikeIgnoreCaseAndPriceLessThanOrderByPriceDescIdAsc
//! └─subject─┘ └──────────── clauses ──────────────┘└────── sort ──────┘
//! ```
//!
//! Connectors (`And`/`Or`) and sort directions are only recognised at camel-case
//! word boundaries. Where a name could be split more than one way, the split whose
//! segment is the longest known property wins, so a property called `brandAndModel`
//! is never broken apart. Keyword splitting is only the fallback.

use crate::error::QueryError;
use crate::metadata::EntityMetadata;
use crate::query::path::{resolve_token, PropertyPath};
use crate::query::predicate::{number_operands, Clause, Connector, Operator, PredicateTree};
use crate::query::sort::{SortCriterion, SortDirection, SortSpec};
use serde::{Deserialize, Serialize};

const IGNORE_CASE: &str = "IgnoreCase";
const NOT: &str = "Not";
const ORDER_BY: &str = "OrderBy";

/// Operation selected by the method-name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    Find,
    Delete,
    Count,
    Exists,
}

/// Result of parsing a method name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedMethod {
    pub subject: Subject,
    pub predicate: Option<PredicateTree>,
    pub static_sort: Option<SortSpec>,
    /// Result limit from `findFirst` / `findFirst<N>`
    pub limit: Option<usize>,
    /// Number of value parameters the clauses consume
    pub arity: usize,
    /// Whether the static sort came from an `OrderBy` in the name
    pub sort_from_name: bool,
}

impl ParsedMethod {
    /// Attach a sort declared outside the method name (an annotation).
    ///
    /// A name that already carries `OrderBy` can't take a second static source.
    pub fn with_annotated_sort(
        mut self,
        method: &str,
        annotated: Option<SortSpec>,
    ) -> Result<ParsedMethod, QueryError> {
        let Some(annotated) = annotated.filter(|s| !s.is_empty()) else {
            return Ok(self);
        };
        if self.sort_from_name {
            return Err(QueryError::ConflictingSortSource {
                method: method.to_string(),
                reason: "OrderBy in the method name and a sort annotation".to_string(),
            });
        }
        self.static_sort = Some(annotated);
        Ok(self)
    }
}

/// Parser bound to the metadata of one entity
pub struct MethodNameParser<'m> {
    metadata: &'m dyn EntityMetadata,
}

impl<'m> MethodNameParser<'m> {
    pub fn new(metadata: &'m dyn EntityMetadata) -> Self {
        Self { metadata }
    }

    /// Parse `method` into subject, predicate tree and static sort.
    pub fn parse(&self, method: &str) -> Result<ParsedMethod, QueryError> {
        let (subject, limit, rest) = split_subject(method)?;
        let (criteria, order) = split_order_by(rest);

        let (mut clauses, connectors) = if criteria.is_empty() {
            if order.is_none() {
                return Err(self.invalid(criteria));
            }
            (Vec::new(), Vec::new())
        } else {
            self.parse_clauses(criteria)?.into_iter().unzip::<_, _, Vec<_>, Vec<_>>()
        };

        let arity = number_operands(&mut clauses);
        // The last clause carries no connector
        let connectors: Vec<Connector> = connectors.into_iter().flatten().collect();
        let predicate = PredicateTree::from_clauses(clauses, &connectors);

        let static_sort = match order {
            Some(text) => Some(self.parse_order(text)?.into_iter().collect::<SortSpec>()),
            None => None,
        };

        Ok(ParsedMethod {
            subject,
            predicate,
            sort_from_name: static_sort.is_some(),
            static_sort,
            limit,
            arity,
        })
    }

    fn invalid(&self, token: &str) -> QueryError {
        QueryError::InvalidProperty {
            entity: self.metadata.entity_name().to_string(),
            token: token.to_string(),
        }
    }

    /// Split `text` into clauses, trying the longest segment first at every step.
    fn parse_clauses(&self, text: &str) -> Result<Vec<(Clause, Option<Connector>)>, QueryError> {
        let mut last_err = None;

        for (end, connector) in connector_splits(text) {
            let clause = match self.parse_segment(&text[..end]) {
                Ok(clause) => clause,
                Err(e @ QueryError::AmbiguousProperty { .. }) => return Err(e),
                Err(e) => {
                    last_err = Some(e);
                    continue;
                }
            };

            let Some(connector) = connector else {
                return Ok(vec![(clause, None)]);
            };

            let tail = &text[end + connector_len(connector)..];
            match self.parse_clauses(tail) {
                Ok(mut rest) => {
                    rest.insert(0, (clause, Some(connector)));
                    return Ok(rest);
                }
                Err(e @ QueryError::AmbiguousProperty { .. }) => return Err(e),
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or_else(|| self.invalid(text)))
    }

    /// Parse one clause: a property token with an optional operator and modifiers.
    fn parse_segment(&self, segment: &str) -> Result<Clause, QueryError> {
        let mut ambiguous = None;

        for reading in operator_readings(segment) {
            let mut attempts = vec![(reading.residual, false)];
            if let Some(residual) = strip_word(reading.residual, NOT) {
                attempts.push((residual, true));
            }

            for (token, negated) in attempts {
                match resolve_token(token, self.metadata) {
                    Ok(path) => {
                        return Ok(Clause::new(path, reading.operator)
                            .ignore_case(reading.ignore_case)
                            .negated(negated))
                    }
                    Err(e @ QueryError::AmbiguousProperty { .. }) => {
                        ambiguous.get_or_insert(e);
                    }
                    Err(_) => {}
                }
            }
        }

        Err(ambiguous.unwrap_or_else(|| self.invalid(segment)))
    }

    fn parse_order(&self, text: &str) -> Result<Vec<SortCriterion>, QueryError> {
        let mut last_err = None;

        for (end, direction, keyword_len) in direction_splits(text) {
            let criterion = match self.sort_property(&text[..end]) {
                Ok((path, ignore_case)) => SortCriterion {
                    path,
                    direction,
                    ignore_case,
                },
                Err(e @ QueryError::AmbiguousProperty { .. }) => return Err(e),
                Err(e) => {
                    last_err = Some(e);
                    continue;
                }
            };

            let tail = &text[end + keyword_len..];
            if tail.is_empty() {
                return Ok(vec![criterion]);
            }
            match self.parse_order(tail) {
                Ok(mut rest) => {
                    rest.insert(0, criterion);
                    return Ok(rest);
                }
                Err(e @ QueryError::AmbiguousProperty { .. }) => return Err(e),
                Err(e) => last_err = Some(e),
            }
        }

        // A trailing group without a direction keyword sorts ascending
        match self.sort_property(text) {
            Ok((path, ignore_case)) => Ok(vec![SortCriterion {
                path,
                direction: SortDirection::Asc,
                ignore_case,
            }]),
            Err(e) => Err(last_err.unwrap_or(e)),
        }
    }

    fn sort_property(&self, token: &str) -> Result<(PropertyPath, bool), QueryError> {
        match resolve_token(token, self.metadata) {
            Ok(path) => Ok((path, false)),
            Err(e) => match strip_word(token, IGNORE_CASE) {
                Some(residual) => resolve_token(residual, self.metadata).map(|p| (p, true)),
                None => Err(e),
            },
        }
    }
}

/// One way of reading the operator off the end of a segment
struct OperatorReading<'a> {
    residual: &'a str,
    operator: Operator,
    ignore_case: bool,
}

/// Candidate readings of a segment, most literal first: the whole segment as a
/// property, then with `IgnoreCase` and an operator keyword peeled off.
fn operator_readings(segment: &str) -> Vec<OperatorReading<'_>> {
    let mut readings = vec![OperatorReading {
        residual: segment,
        operator: Operator::Equal,
        ignore_case: false,
    }];

    let (body, trailing_ignore_case) = match strip_word(segment, IGNORE_CASE) {
        Some(body) => (body, true),
        None => (segment, false),
    };
    if trailing_ignore_case {
        readings.push(OperatorReading {
            residual: body,
            operator: Operator::Equal,
            ignore_case: true,
        });
    }

    for operator in Operator::PEEL_ORDER {
        let Some(keyword) = operator.keyword() else {
            continue;
        };
        let Some(residual) = strip_word(body, keyword) else {
            continue;
        };
        readings.push(OperatorReading {
            residual,
            operator,
            ignore_case: trailing_ignore_case,
        });
        // `NameIgnoreCaseLike`
        if !trailing_ignore_case {
            if let Some(inner) = strip_word(residual, IGNORE_CASE) {
                readings.push(OperatorReading {
                    residual: inner,
                    operator,
                    ignore_case: true,
                });
            }
        }
        break;
    }

    readings
}

fn split_subject(method: &str) -> Result<(Subject, Option<usize>, &str), QueryError> {
    let unsupported = || QueryError::UnsupportedSubject {
        method: method.to_string(),
    };

    if let Some(after_first) = method.strip_prefix("findFirst") {
        if let Some(by) = after_first.find("By") {
            let digits = &after_first[..by];
            if digits.chars().all(|c| c.is_ascii_digit()) {
                let limit = if digits.is_empty() {
                    1
                } else {
                    digits.parse::<usize>().map_err(|_| unsupported())?
                };
                if limit == 0 {
                    return Err(unsupported());
                }
                return Ok((Subject::Find, Some(limit), &after_first[by + 2..]));
            }
        }
    }

    let prefixes = [
        ("findBy", Subject::Find),
        ("deleteBy", Subject::Delete),
        ("countBy", Subject::Count),
        ("existsBy", Subject::Exists),
    ];
    prefixes
        .iter()
        .find_map(|(prefix, subject)| method.strip_prefix(prefix).map(|rest| (*subject, None, rest)))
        .ok_or_else(unsupported)
}

/// Split off `OrderBy…`; the first boundary occurrence starts the sort clause.
fn split_order_by(rest: &str) -> (&str, Option<&str>) {
    let mut from = 0;
    while let Some(found) = rest[from..].find(ORDER_BY) {
        let at = from + found;
        let after = &rest[at + ORDER_BY.len()..];
        if after.starts_with(|c: char| c.is_ascii_uppercase()) {
            return (&rest[..at], Some(after));
        }
        from = at + ORDER_BY.len();
    }
    (rest, None)
}

/// Segment ends to try, longest first: the whole text, then each connector boundary.
fn connector_splits(text: &str) -> Vec<(usize, Option<Connector>)> {
    let mut splits = vec![(text.len(), None)];
    let mut boundaries = Vec::new();
    for (at, _) in text.char_indices().skip(1) {
        for connector in [Connector::And, Connector::Or] {
            let word = connector_word(connector);
            if text[at..].starts_with(word) && is_boundary(&text[at + word.len()..]) {
                boundaries.push((at, Some(connector)));
            }
        }
    }
    boundaries.reverse();
    splits.extend(boundaries);
    splits
}

/// Direction keyword boundaries, longest property first.
fn direction_splits(text: &str) -> Vec<(usize, SortDirection, usize)> {
    let mut splits = Vec::new();
    for (at, _) in text.char_indices().skip(1) {
        for (word, direction) in [("Asc", SortDirection::Asc), ("Desc", SortDirection::Desc)] {
            if text[at..].starts_with(word) {
                let after = &text[at + word.len()..];
                if after.is_empty() || is_boundary(after) {
                    splits.push((at, direction, word.len()));
                }
            }
        }
    }
    splits.reverse();
    splits
}

fn connector_word(connector: Connector) -> &'static str {
    match connector {
        Connector::And => "And",
        Connector::Or => "Or",
    }
}

fn connector_len(connector: Connector) -> usize {
    connector_word(connector).len()
}

/// Next camel-case word starts here
fn is_boundary(rest: &str) -> bool {
    rest.starts_with(|c: char| c.is_ascii_uppercase())
}

/// Strip a trailing keyword, leaving a non-empty residual.
fn strip_word<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    text.strip_suffix(word).filter(|residual| !residual.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{EmbeddableDefinition, EntityModel};
    use crate::query::predicate::Operand;
    use crate::value::ValueKind;

    fn person() -> EntityModel {
        EntityModel::new("Person")
            .id("id", ValueKind::Int)
            .property("firstName", ValueKind::Text)
            .property("lastName", ValueKind::Text)
            .property("age", ValueKind::Int)
            .property("zipcode", ValueKind::Int)
            .property("type", ValueKind::Text)
            .property("brandAndModel", ValueKind::Text)
            .property("brand", ValueKind::Text)
            .property("colorOrSize", ValueKind::Text)
            .property("loggedIn", ValueKind::Bool)
            .property("nickname", ValueKind::Text)
            .embedded(
                "address",
                EmbeddableDefinition::new("Address")
                    .property("zipCode", ValueKind::Int)
                    .property("city", ValueKind::Text),
            )
            .property("addressZipCode", ValueKind::Int)
    }

    fn parse(method: &str) -> Result<ParsedMethod, QueryError> {
        let model = person();
        MethodNameParser::new(&model).parse(method)
    }

    #[test]
    fn test_subjects() {
        assert_eq!(parse("findByAge").unwrap().subject, Subject::Find);
        assert_eq!(parse("deleteByAge").unwrap().subject, Subject::Delete);
        assert_eq!(parse("countByAge").unwrap().subject, Subject::Count);
        assert_eq!(parse("existsByAge").unwrap().subject, Subject::Exists);
        assert!(matches!(
            parse("fetchByAge"),
            Err(QueryError::UnsupportedSubject { .. })
        ));
        assert!(matches!(
            parse("findAge"),
            Err(QueryError::UnsupportedSubject { .. })
        ));
    }

    #[test]
    fn test_find_first_limits() {
        assert_eq!(parse("findFirstByAge").unwrap().limit, Some(1));
        assert_eq!(parse("findFirst3ByAgeOrderByIdAsc").unwrap().limit, Some(3));
        assert_eq!(parse("findByAge").unwrap().limit, None);
        assert!(matches!(
            parse("findFirst0ByAge"),
            Err(QueryError::UnsupportedSubject { .. })
        ));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let parsed = parse("findByFirstNameAndLastNameOrAge").unwrap();
        let tree = parsed.predicate.unwrap();
        assert_eq!(
            tree.to_string(),
            "((Equal(firstName, ?1) And Equal(lastName, ?2)) Or Equal(age, ?3))"
        );
        assert_eq!(parsed.arity, 3);
    }

    #[test]
    fn test_parsing_is_deterministic() {
        let a = parse("findByFirstNameLikeIgnoreCaseOrAgeBetweenOrderByLastNameDesc").unwrap();
        let b = parse("findByFirstNameLikeIgnoreCaseOrAgeBetweenOrderByLastNameDesc").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_property_containing_connector_is_kept_whole() {
        let tree = parse("findByBrandAndModel").unwrap().predicate.unwrap();
        assert_eq!(tree.to_string(), "Equal(brandAndModel, ?1)");

        let tree = parse("findByBrandAndModelAndAge").unwrap().predicate.unwrap();
        assert_eq!(tree.to_string(), "(Equal(brandAndModel, ?1) And Equal(age, ?2))");

        let tree = parse("findByColorOrSizeOrBrand").unwrap().predicate.unwrap();
        assert_eq!(tree.to_string(), "(Equal(colorOrSize, ?1) Or Equal(brand, ?2))");
    }

    #[test]
    fn test_operator_keywords() {
        let cases = [
            ("findByAgeBetween", Operator::Between, 2),
            ("findByAgeLessThan", Operator::LessThan, 1),
            ("findByAgeLessThanEqual", Operator::LessThanEqual, 1),
            ("findByAgeGreaterThan", Operator::GreaterThan, 1),
            ("findByAgeGreaterThanEqual", Operator::GreaterThanEqual, 1),
            ("findByFirstNameLike", Operator::Like, 1),
            ("findByAgeIn", Operator::In, 1),
            ("findByNicknameNull", Operator::IsNull, 0),
            ("findByLoggedInTrue", Operator::True, 0),
            ("findByLoggedInFalse", Operator::False, 0),
            ("findByNicknameEmpty", Operator::Empty, 0),
            ("findByFirstNameStartsWith", Operator::StartsWith, 1),
            ("findByFirstNameEndsWith", Operator::EndsWith, 1),
            ("findByFirstNameContains", Operator::Contains, 1),
        ];
        for (method, operator, arity) in cases {
            let parsed = parse(method).unwrap();
            let tree = parsed.predicate.unwrap();
            let clauses = tree.clauses();
            assert_eq!(clauses[0].operator, operator, "{method}");
            assert_eq!(parsed.arity, arity, "{method}");
        }
    }

    #[test]
    fn test_property_ending_in_keyword_prefers_property() {
        let tree = parse("findByLoggedIn").unwrap().predicate.unwrap();
        let clause = tree.clauses()[0];
        assert_eq!(clause.operator, Operator::Equal);
        assert_eq!(clause.path.to_string(), "loggedIn");
    }

    #[test]
    fn test_ignore_case_in_either_position() {
        for method in ["findByFirstNameLikeIgnoreCase", "findByFirstNameIgnoreCaseLike"] {
            let parsed = parse(method).unwrap();
            let clause = parsed.predicate.as_ref().unwrap().clauses()[0].clone();
            assert_eq!(clause.operator, Operator::Like, "{method}");
            assert!(clause.ignore_case, "{method}");
            assert_eq!(parsed.arity, 1);
        }
        let tree = parse("findByLastNameIgnoreCase").unwrap().predicate.unwrap();
        assert!(tree.clauses()[0].ignore_case);
        assert_eq!(tree.clauses()[0].operator, Operator::Equal);
    }

    #[test]
    fn test_not_modifier() {
        let tree = parse("findByAgeNotIn").unwrap().predicate.unwrap();
        let clause = tree.clauses()[0];
        assert_eq!(clause.operator, Operator::In);
        assert!(clause.negated);

        let tree = parse("findByLastNameNot").unwrap().predicate.unwrap();
        assert_eq!(tree.clauses()[0].operator, Operator::Equal);
        assert!(tree.clauses()[0].negated);

        let tree = parse("findByNicknameNotNull").unwrap().predicate.unwrap();
        assert_eq!(tree.clauses()[0].operator, Operator::IsNull);
        assert!(tree.clauses()[0].negated);
    }

    #[test]
    fn test_underscore_path_is_authoritative() {
        let tree = parse("findByAddress_ZipCode").unwrap().predicate.unwrap();
        assert_eq!(tree.clauses()[0].path.to_string(), "address.zipCode");

        let tree = parse("findByAddressZipCode").unwrap().predicate.unwrap();
        assert_eq!(tree.clauses()[0].path.to_string(), "addressZipCode");
    }

    #[test]
    fn test_embedded_path_with_operator() {
        let tree = parse("findByAddress_CityLikeAndAgeGreaterThan")
            .unwrap()
            .predicate
            .unwrap();
        let clauses = tree.clauses();
        assert_eq!(clauses[0].path.to_string(), "address.city");
        assert_eq!(clauses[0].operator, Operator::Like);
        assert_eq!(clauses[1].operands, vec![Operand::Parameter(1)]);
    }

    #[test]
    fn test_invalid_property_names_the_offending_token() {
        let err = parse("findByFirstNameAndShoeSize").unwrap_err();
        assert_eq!(
            err,
            QueryError::InvalidProperty {
                entity: "Person".to_string(),
                token: "ShoeSize".to_string()
            }
        );
        assert!(matches!(parse("findBy"), Err(QueryError::InvalidProperty { .. })));
    }

    #[test]
    fn test_ambiguous_property() {
        let model = EntityModel::new("Person")
            .id("id", ValueKind::Int)
            .embedded(
                "address",
                EmbeddableDefinition::new("Address").property("zipCode", ValueKind::Int),
            )
            .embedded(
                "addressZip",
                EmbeddableDefinition::new("Zip").property("code", ValueKind::Int),
            );
        let err = MethodNameParser::new(&model)
            .parse("findByAddressZipCode")
            .unwrap_err();
        assert!(matches!(err, QueryError::AmbiguousProperty { .. }));
    }

    #[test]
    fn test_order_by_groups() {
        let parsed = parse("findByZipcodeOrderByLastNameAscFirstNameAscIdAsc").unwrap();
        let sort = parsed.static_sort.unwrap();
        let rendered: Vec<String> = sort.criteria().iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["lastName Asc", "firstName Asc", "id Asc"]);
        assert!(parsed.sort_from_name);
    }

    #[test]
    fn test_order_by_defaults_and_modifiers() {
        let sort = parse("findByAgeOrderByLastName").unwrap().static_sort.unwrap();
        assert_eq!(sort.criteria()[0].direction, SortDirection::Asc);

        let sort = parse("findByAgeOrderByLastNameIgnoreCaseDescId")
            .unwrap()
            .static_sort
            .unwrap();
        assert_eq!(sort.criteria()[0].direction, SortDirection::Desc);
        assert!(sort.criteria()[0].ignore_case);
        assert_eq!(sort.criteria()[1].path.to_string(), "id");

        assert!(parse("findByAgeOrderByShoeSizeDesc").is_err());
    }

    #[test]
    fn test_order_by_without_criteria() {
        let parsed = parse("findByOrderByAgeDesc").unwrap();
        assert!(parsed.predicate.is_none());
        assert_eq!(parsed.arity, 0);
    }

    #[test]
    fn test_order_by_conflicts_with_annotation() {
        let annotation = SortSpec::new().then(SortCriterion::desc(PropertyPath::single("age")));
        let parsed = parse("findByTypeOrderByAgeAsc").unwrap();
        let err = parsed
            .with_annotated_sort("findByTypeOrderByAgeAsc", Some(annotation.clone()))
            .unwrap_err();
        assert!(matches!(err, QueryError::ConflictingSortSource { .. }));

        let parsed = parse("findByType")
            .unwrap()
            .with_annotated_sort("findByType", Some(annotation.clone()))
            .unwrap();
        assert_eq!(parsed.static_sort, Some(annotation));
    }
}
