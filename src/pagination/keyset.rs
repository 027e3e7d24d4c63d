//! Keyset seek predicates and page assembly.
//!
//! For a sort `[(p1,d1) .. (pn,dn)]` and cursor values `[v1 .. vn]` the seek
//! predicate is the disjunction, over k = 1..n, of
//!
//! ```text
//! p1 = v1 And .. And p(k-1) = v(k-1) And pk cmp vk
//! ```
//!
//! where `cmp` is `>` for ascending and `<` for descending criteria when moving
//! forward, inverted when moving backward. A backward page is fetched with the
//! reversed sort and flipped before it is returned.
//!
//! Nulls order before every other value. An equality against a null cursor value
//! becomes `IsNull`, `> null` becomes `Not IsNull`, and `< null` can match nothing
//! so its disjunct is dropped. `< v` also admits nulls.

use crate::error::QueryError;
use crate::metadata::EntityMetadata;
use crate::pagination::cursor::{KeysetCursor, SortKeySource};
use crate::pagination::{Direction, PageMode, PageRequest, PageResult, Total};
use crate::query::path::PropertyPath;
use crate::query::predicate::{Clause, Operator, PredicateTree};
use crate::query::sort::{SortDirection, SortSpec};
use crate::value::Value;

/// What to fetch for one page: the ordering, the seek predicate and the row window.
#[derive(Debug, Clone, PartialEq)]
pub struct KeysetWindow {
    /// Ordering rows are fetched in; reversed for a backward page
    pub fetch_sort: SortSpec,
    pub keyset: Option<PredicateTree>,
    /// Rows to fetch, including the probe row
    pub limit: usize,
    pub offset: Option<u64>,
}

impl KeysetWindow {
    /// Plan the fetch for `request` over the effective `sort`.
    pub fn plan(request: &PageRequest, sort: &SortSpec, probe: bool) -> Result<KeysetWindow, QueryError> {
        let limit = if probe { request.size + 1 } else { request.size };

        if let PageMode::Offset { page } = request.mode {
            let offset = page
                .saturating_sub(1)
                .checked_mul(request.size as u64)
                .ok_or_else(|| {
                    QueryError::InvalidArgument(format!(
                        "page {page} of size {} is past the last addressable row",
                        request.size
                    ))
                })?;
            return Ok(KeysetWindow {
                fetch_sort: sort.clone(),
                keyset: None,
                limit,
                offset: Some(offset),
            });
        }

        let keyset = match &request.cursor {
            Some(cursor) => {
                if !cursor.matches(sort) {
                    return Err(QueryError::CursorMismatch);
                }
                Some(keyset_predicate(sort, cursor, request.direction))
            }
            None => None,
        };
        let fetch_sort = match request.direction {
            Direction::Forward => sort.clone(),
            Direction::Backward => sort.reversed(),
        };

        Ok(KeysetWindow {
            fetch_sort,
            // A seek predicate whose every disjunct was dropped matches nothing
            keyset: keyset.map(|k| k.unwrap_or_else(|| match_nothing(sort))),
            limit,
            offset: None,
        })
    }

    /// Turn fetched rows into a page.
    ///
    /// Without probing, "more rows" is guessed from a full page, which is inexact
    /// when the remaining row count is a multiple of the page size.
    pub fn assemble<T: SortKeySource>(
        &self,
        request: &PageRequest,
        sort: &SortSpec,
        mut rows: Vec<T>,
        probe: bool,
        total: Option<u64>,
    ) -> Result<PageResult<T>, QueryError> {
        let more = if probe {
            rows.len() > request.size
        } else {
            rows.len() == request.size
        };
        rows.truncate(request.size);

        if let PageMode::Offset { page } = request.mode {
            let skipped = self.offset.unwrap_or_default();
            let has_next = match total {
                Some(total) => skipped.saturating_add(rows.len() as u64) < total,
                None => more,
            };
            return Ok(PageResult {
                items: rows,
                has_next,
                has_previous: page > 1,
                next_cursor: None,
                previous_cursor: None,
                total: total.map_or(Total::Unknown, Total::Exact),
                request: request.clone(),
                sort: sort.clone(),
            });
        }

        if request.direction == Direction::Backward {
            rows.reverse();
        }

        let next_cursor = rows.last().map(|r| KeysetCursor::from_item(sort, r)).transpose()?;
        let previous_cursor = rows.first().map(|r| KeysetCursor::from_item(sort, r)).transpose()?;
        let came_from_cursor = request.cursor.is_some();
        let (has_next, has_previous) = match request.direction {
            Direction::Forward => (more, came_from_cursor),
            Direction::Backward => (came_from_cursor, more),
        };

        Ok(PageResult {
            items: rows,
            has_next,
            has_previous,
            next_cursor,
            previous_cursor,
            total: Total::Unknown,
            request: request.clone(),
            sort: sort.clone(),
        })
    }
}

/// Build the seek predicate past `cursor` in `direction`.
///
/// Returns `None` when every disjunct is unsatisfiable.
pub fn keyset_predicate(
    sort: &SortSpec,
    cursor: &KeysetCursor,
    direction: Direction,
) -> Option<PredicateTree> {
    let mut disjuncts: Vec<PredicateTree> = Vec::new();

    for (k, (criterion, (path, value))) in sort.criteria().iter().zip(cursor.entries()).enumerate() {
        let ascending = match (criterion.direction, direction) {
            (SortDirection::Asc, Direction::Forward) | (SortDirection::Desc, Direction::Backward) => true,
            (SortDirection::Desc, Direction::Forward) | (SortDirection::Asc, Direction::Backward) => false,
        };

        let strict = match (ascending, value) {
            (true, Value::Null) => Some(leaf(
                Clause::new(path.clone(), Operator::IsNull).negated(true),
            )),
            (false, Value::Null) => None,
            (true, v) => Some(leaf(
                Clause::literal(path.clone(), Operator::GreaterThan, vec![v.clone()])
                    .ignore_case(criterion.ignore_case),
            )),
            (false, v) => Some(
                leaf(
                    Clause::literal(path.clone(), Operator::LessThan, vec![v.clone()])
                        .ignore_case(criterion.ignore_case),
                )
                .or(leaf(Clause::new(path.clone(), Operator::IsNull))),
            ),
        };
        let Some(strict) = strict else {
            continue;
        };

        let prefix = sort.criteria()[..k]
            .iter()
            .zip(cursor.entries())
            .map(|(c, (p, v))| leaf(equal_to(c.ignore_case, p, v)))
            .reduce(PredicateTree::and);

        disjuncts.push(match prefix {
            Some(prefix) => prefix.and(strict),
            None => strict,
        });
    }

    disjuncts.into_iter().reduce(PredicateTree::or)
}

/// Reject an ordering that does not identify rows uniquely.
///
/// Unique means one criterion is unique on its own, or the criteria cover every
/// path of a composite unique key.
pub fn ensure_unique_ordering(metadata: &dyn EntityMetadata, sort: &SortSpec) -> Result<(), QueryError> {
    let single = sort.paths().any(|p| metadata.is_unique(p));
    let composite = metadata
        .unique_keys()
        .iter()
        .any(|key| !key.is_empty() && key.iter().all(|p| sort.contains(p)));

    if single || composite {
        return Ok(());
    }
    Err(QueryError::PartialOrderingError {
        entity: metadata.entity_name().to_string(),
        sort: sort.to_string(),
    })
}

fn leaf(clause: Clause) -> PredicateTree {
    PredicateTree::Clause(clause)
}

fn equal_to(ignore_case: bool, path: &PropertyPath, value: &Value) -> Clause {
    if value.is_null() {
        Clause::new(path.clone(), Operator::IsNull)
    } else {
        Clause::literal(path.clone(), Operator::Equal, vec![value.clone()]).ignore_case(ignore_case)
    }
}

/// `In ()` on the leading sort property: no row has a value in the empty list.
fn match_nothing(sort: &SortSpec) -> PredicateTree {
    let path = sort.paths().next().cloned().unwrap_or_default();
    leaf(Clause::literal(path, Operator::In, vec![Value::List(Vec::new())]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::EntityModel;
    use crate::query::sort::SortCriterion;
    use crate::value::ValueKind;

    fn path(name: &str) -> PropertyPath {
        PropertyPath::single(name)
    }

    fn person_sort() -> SortSpec {
        SortSpec::new()
            .then(SortCriterion::asc(path("lastName")))
            .then(SortCriterion::desc(path("age")))
            .then(SortCriterion::asc(path("id")))
    }

    fn cursor(values: Vec<Value>) -> KeysetCursor {
        KeysetCursor::from_values(&person_sort(), values).unwrap()
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Row(i64);

    impl SortKeySource for Row {
        fn sort_value(&self, path: &PropertyPath) -> Option<Value> {
            (path.to_string() == "id").then_some(Value::Int(self.0))
        }
    }

    fn id_sort() -> SortSpec {
        SortSpec::new().then(SortCriterion::asc(path("id")))
    }

    #[test]
    fn test_forward_predicate_shape() {
        let cursor = cursor(vec![Value::from("A"), Value::Int(30), Value::Int(2)]);
        let tree = keyset_predicate(&person_sort(), &cursor, Direction::Forward).unwrap();
        assert_eq!(
            tree.to_string(),
            "((GreaterThan(lastName, \"A\") Or (Equal(lastName, \"A\") And (LessThan(age, 30) Or IsNull(age)))) \
             Or ((Equal(lastName, \"A\") And Equal(age, 30)) And GreaterThan(id, 2)))"
        );
    }

    #[test]
    fn test_backward_inverts_comparisons() {
        let cursor = cursor(vec![Value::from("A"), Value::Int(30), Value::Int(2)]);
        let tree = keyset_predicate(&person_sort(), &cursor, Direction::Backward).unwrap();
        let ops: Vec<Operator> = tree
            .clauses()
            .iter()
            .filter(|c| c.operator != Operator::Equal)
            .map(|c| c.operator)
            .collect();
        assert_eq!(
            ops,
            vec![Operator::LessThan, Operator::IsNull, Operator::GreaterThan, Operator::LessThan, Operator::IsNull]
        );
    }

    #[test]
    fn test_null_cursor_values() {
        let sort = SortSpec::new()
            .then(SortCriterion::asc(path("nickname")))
            .then(SortCriterion::asc(path("id")));
        let cursor = KeysetCursor::from_values(&sort, vec![Value::Null, Value::Int(4)]).unwrap();

        let forward = keyset_predicate(&sort, &cursor, Direction::Forward).unwrap();
        assert_eq!(
            forward.to_string(),
            "(NotIsNull(nickname) Or (IsNull(nickname) And GreaterThan(id, 4)))"
        );

        // `< null` has no rows, only the tie-break disjunct survives
        let backward = keyset_predicate(&sort, &cursor, Direction::Backward).unwrap();
        assert_eq!(
            backward.to_string(),
            "(IsNull(nickname) And (LessThan(id, 4) Or IsNull(id)))"
        );
    }

    #[test]
    fn test_unique_ordering() {
        let model = EntityModel::new("Person")
            .id("id", ValueKind::Int)
            .property("lastName", ValueKind::Text)
            .property("firstName", ValueKind::Text)
            .unique_key(["lastName", "firstName"]);

        assert!(ensure_unique_ordering(&model, &person_sort()).is_ok());

        let partial = SortSpec::new().then(SortCriterion::asc(path("lastName")));
        assert!(matches!(
            ensure_unique_ordering(&model, &partial),
            Err(QueryError::PartialOrderingError { .. })
        ));

        let composite = partial.then(SortCriterion::desc(path("firstName")));
        assert!(ensure_unique_ordering(&model, &composite).is_ok());
    }

    #[test]
    fn test_probe_row_sets_has_next() {
        let request = PageRequest::of_size(2);
        let window = KeysetWindow::plan(&request, &id_sort(), true).unwrap();
        assert_eq!(window.limit, 3);
        assert!(window.keyset.is_none());

        let page = window
            .assemble(&request, &id_sort(), vec![Row(1), Row(2), Row(3)], true, None)
            .unwrap();
        assert_eq!(page.items, vec![Row(1), Row(2)]);
        assert!(page.has_next);
        assert!(!page.has_previous);
        assert_eq!(page.next_cursor.unwrap().to_values(), vec![Value::Int(2)]);
        assert_eq!(page.total, Total::Unknown);
    }

    #[test]
    fn test_without_probe_full_page_means_more() {
        let request = PageRequest::of_size(2);
        let window = KeysetWindow::plan(&request, &id_sort(), false).unwrap();
        assert_eq!(window.limit, 2);
        let page = window
            .assemble(&request, &id_sort(), vec![Row(1), Row(2)], false, None)
            .unwrap();
        assert!(page.has_next);
        let page = window
            .assemble(&request, &id_sort(), vec![Row(1)], false, None)
            .unwrap();
        assert!(!page.has_next);
    }

    #[test]
    fn test_backward_page_is_reversed_before_cursors() {
        let start = KeysetCursor::from_values(&id_sort(), vec![Value::Int(5)]).unwrap();
        let request = PageRequest::of_size(2).before(start);
        let window = KeysetWindow::plan(&request, &id_sort(), true).unwrap();
        assert_eq!(window.fetch_sort.criteria()[0].direction, SortDirection::Desc);

        // Rows arrive in fetch order (descending)
        let page = window
            .assemble(&request, &id_sort(), vec![Row(4), Row(3), Row(2)], true, None)
            .unwrap();
        assert_eq!(page.items, vec![Row(3), Row(4)]);
        assert!(page.has_previous);
        assert!(page.has_next);
        assert_eq!(page.previous_cursor.unwrap().to_values(), vec![Value::Int(3)]);
        assert_eq!(page.next_cursor.unwrap().to_values(), vec![Value::Int(4)]);
    }

    #[test]
    fn test_empty_page_has_no_cursors() {
        let start = KeysetCursor::from_values(&id_sort(), vec![Value::Int(9)]).unwrap();
        let request = PageRequest::of_size(2).after(start);
        let window = KeysetWindow::plan(&request, &id_sort(), true).unwrap();
        let page = window
            .assemble(&request, &id_sort(), Vec::<Row>::new(), true, None)
            .unwrap();
        assert!(page.next_cursor.is_none());
        assert!(page.previous_cursor.is_none());
        assert!(!page.has_next);
    }

    #[test]
    fn test_cursor_for_other_sort_is_rejected() {
        let request = PageRequest::of_size(2).after(cursor(vec![
            Value::from("A"),
            Value::Int(1),
            Value::Int(1),
        ]));
        assert_eq!(
            KeysetWindow::plan(&request, &id_sort(), true).unwrap_err(),
            QueryError::CursorMismatch
        );
    }

    #[test]
    fn test_offset_window_reports_exact_total() {
        let request = PageRequest::of_page(2, 2);
        let window = KeysetWindow::plan(&request, &id_sort(), false).unwrap();
        assert_eq!(window.offset, Some(2));
        let page = window
            .assemble(&request, &id_sort(), vec![Row(3), Row(4)], false, Some(5))
            .unwrap();
        assert_eq!(page.total, Total::Exact(5));
        assert!(page.has_next);
        assert!(page.has_previous);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_offset_past_addressable_rows_is_rejected() {
        let request = PageRequest::of_page(u64::MAX, 10);
        assert!(matches!(
            KeysetWindow::plan(&request, &id_sort(), true),
            Err(QueryError::InvalidArgument(_))
        ));

        let last = PageRequest::of_page(u64::MAX, 1);
        let window = KeysetWindow::plan(&last, &id_sort(), true).unwrap();
        assert_eq!(window.offset, Some(u64::MAX - 1));
    }
}
