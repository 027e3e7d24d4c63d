//! Page requests, page results and the keyset pagination engine.
//!
//! The engine is stateless. A traversal moves through three states that live
//! entirely in the values passed back and forth:
//!
//! - **Initial**: a request without a cursor;
//! - **HasResults**: a page produced a cursor in the traversal direction;
//! - **Exhausted**: a page came back without more rows in the traversal direction.
//!
//! Keyset mode seeks past the last observed sort-key values instead of skipping a
//! numeric offset, so rows inserted or deleted before the cursor never shift what
//! the next page returns. Rows whose sort keys change after being read may still be
//! seen twice or skipped.

pub mod cursor;
pub mod keyset;

pub use cursor::{KeysetCursor, SortKeySource, DEFAULT_MAX_TOKEN_LEN};
pub use keyset::{ensure_unique_ordering, keyset_predicate, KeysetWindow};

use crate::error::QueryError;
use crate::query::sort::SortSpec;
use serde::{Deserialize, Serialize};

/// Traversal direction relative to the sort order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// How a page is located
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageMode {
    /// Seek by cursor values
    #[default]
    Cursor,
    /// Skip `(page - 1) * size` rows; `page` starts at 1
    Offset { page: u64 },
}

/// Row count of the whole result, when it is known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Total {
    Unknown,
    Exact(u64),
}

/// Request for one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    pub size: usize,
    /// Dynamic criteria; static ones from the declaration always come first
    #[serde(default)]
    pub sort: SortSpec,
    #[serde(default)]
    pub cursor: Option<KeysetCursor>,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub mode: PageMode,
}

impl PageRequest {
    /// First page in cursor mode.
    pub fn of_size(size: usize) -> Self {
        Self {
            size,
            sort: SortSpec::new(),
            cursor: None,
            direction: Direction::Forward,
            mode: PageMode::Cursor,
        }
    }

    /// Page `page` (1-based) in offset mode.
    pub fn of_page(page: u64, size: usize) -> Self {
        Self {
            mode: PageMode::Offset { page },
            ..Self::of_size(size)
        }
    }

    pub fn sorted_by(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    /// Continue forward past `cursor`.
    pub fn after(mut self, cursor: KeysetCursor) -> Self {
        self.cursor = Some(cursor);
        self.direction = Direction::Forward;
        self.mode = PageMode::Cursor;
        self
    }

    /// Continue backward before `cursor`.
    pub fn before(mut self, cursor: KeysetCursor) -> Self {
        self.cursor = Some(cursor);
        self.direction = Direction::Backward;
        self.mode = PageMode::Cursor;
        self
    }

    /// Check the size against `max_size` and the offset page number.
    pub fn validate(&self, max_size: usize) -> Result<(), QueryError> {
        if self.size == 0 {
            return Err(QueryError::InvalidArgument(
                "page size must be greater than zero".to_string(),
            ));
        }
        if self.size > max_size {
            return Err(QueryError::InvalidArgument(format!(
                "page size {} exceeds the maximum of {max_size}",
                self.size
            )));
        }
        match self.mode {
            PageMode::Offset { page: 0 } => Err(QueryError::InvalidArgument(
                "offset pages are numbered from 1".to_string(),
            )),
            PageMode::Offset { .. } if self.cursor.is_some() => Err(QueryError::InvalidArgument(
                "an offset request cannot carry a cursor".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn state(&self) -> TraversalState {
        match &self.cursor {
            None => TraversalState::Initial,
            Some(_) => TraversalState::HasResults,
        }
    }
}

/// Where a traversal stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalState {
    Initial,
    HasResults,
    Exhausted,
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_cursor: Option<KeysetCursor>,
    pub previous_cursor: Option<KeysetCursor>,
    pub total: Total,
    /// Request that produced this page
    pub request: PageRequest,
    /// Effective ordering the page was fetched with (static then dynamic)
    pub sort: SortSpec,
}

impl<T> PageResult<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Exhausted once no rows remain in the traversal direction.
    pub fn state(&self) -> TraversalState {
        let more = match self.request.direction {
            Direction::Forward => self.has_next,
            Direction::Backward => self.has_previous,
        };
        if self.items.is_empty() || !more {
            TraversalState::Exhausted
        } else {
            TraversalState::HasResults
        }
    }

    /// Request for the page after this one.
    pub fn next_request(&self) -> Result<PageRequest, QueryError> {
        self.navigate(Direction::Forward)
    }

    /// Request for the page before this one.
    pub fn previous_request(&self) -> Result<PageRequest, QueryError> {
        self.navigate(Direction::Backward)
    }

    fn navigate(&self, direction: Direction) -> Result<PageRequest, QueryError> {
        if self.items.is_empty() {
            return Err(QueryError::EmptyCursorNavigation);
        }

        if let PageMode::Offset { page } = self.request.mode {
            let page = match direction {
                Direction::Forward => page + 1,
                Direction::Backward if page > 1 => page - 1,
                Direction::Backward => {
                    return Err(QueryError::InvalidArgument(
                        "already at the first page".to_string(),
                    ))
                }
            };
            return Ok(PageRequest {
                mode: PageMode::Offset { page },
                ..self.request.clone()
            });
        }

        let cursor = match direction {
            Direction::Forward => &self.next_cursor,
            Direction::Backward => &self.previous_cursor,
        };
        let cursor = cursor.clone().ok_or(QueryError::EmptyCursorNavigation)?;
        let request = self.request.clone();
        Ok(match direction {
            Direction::Forward => request.after(cursor),
            Direction::Backward => request.before(cursor),
        })
    }

    /// Opaque token for the next page, signed for this page's ordering.
    pub fn next_token(&self) -> Result<Option<String>, QueryError> {
        self.next_cursor
            .as_ref()
            .map(|c| c.encode(&self.sort))
            .transpose()
    }

    /// Opaque token for the previous page, signed for this page's ordering.
    pub fn previous_token(&self) -> Result<Option<String>, QueryError> {
        self.previous_cursor
            .as_ref()
            .map(|c| c.encode(&self.sort))
            .transpose()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            items: self.items.into_iter().map(f).collect(),
            has_next: self.has_next,
            has_previous: self.has_previous,
            next_cursor: self.next_cursor,
            previous_cursor: self.previous_cursor,
            total: self.total,
            request: self.request,
            sort: self.sort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::path::PropertyPath;
    use crate::query::sort::SortCriterion;
    use crate::value::Value;

    fn id_sort() -> SortSpec {
        SortSpec::new().then(SortCriterion::asc(PropertyPath::single("id")))
    }

    fn page(items: Vec<i64>, request: PageRequest) -> PageResult<i64> {
        let cursor = |v: Option<&i64>| {
            v.map(|v| KeysetCursor::from_values(&id_sort(), vec![Value::Int(*v)]).unwrap())
        };
        PageResult {
            next_cursor: cursor(items.last()),
            previous_cursor: cursor(items.first()),
            has_next: true,
            has_previous: request.cursor.is_some(),
            items,
            total: Total::Unknown,
            request,
            sort: id_sort(),
        }
    }

    #[test]
    fn test_validate() {
        assert!(PageRequest::of_size(10).validate(100).is_ok());
        assert!(PageRequest::of_size(0).validate(100).is_err());
        assert!(PageRequest::of_size(101).validate(100).is_err());
        assert!(PageRequest::of_page(0, 10).validate(100).is_err());
        assert!(PageRequest::of_page(2, 10).validate(100).is_ok());
    }

    #[test]
    fn test_navigation_from_cursor_page() {
        let result = page(vec![3, 4], PageRequest::of_size(2));
        assert_eq!(result.request.state(), TraversalState::Initial);

        let next = result.next_request().unwrap();
        assert_eq!(next.direction, Direction::Forward);
        assert_eq!(next.cursor.unwrap().to_values(), vec![Value::Int(4)]);

        let previous = result.previous_request().unwrap();
        assert_eq!(previous.direction, Direction::Backward);
        assert_eq!(previous.cursor.unwrap().to_values(), vec![Value::Int(3)]);
    }

    #[test]
    fn test_empty_page_rejects_navigation() {
        let mut result = page(Vec::new(), PageRequest::of_size(2));
        result.has_next = false;
        assert!(result.next_cursor.is_none());
        assert!(result.previous_cursor.is_none());
        assert_eq!(result.next_request().unwrap_err(), QueryError::EmptyCursorNavigation);
        assert_eq!(
            result.previous_request().unwrap_err(),
            QueryError::EmptyCursorNavigation
        );
        assert_eq!(result.state(), TraversalState::Exhausted);
        assert_eq!(result.next_token().unwrap(), None);
    }

    #[test]
    fn test_offset_navigation() {
        let result = page(vec![1, 2], PageRequest::of_page(1, 2));
        assert_eq!(result.next_request().unwrap().mode, PageMode::Offset { page: 2 });
        assert!(result.previous_request().is_err());
    }

    #[test]
    fn test_tokens_use_page_sort() {
        let result = page(vec![7], PageRequest::of_size(1));
        let token = result.next_token().unwrap().unwrap();
        let cursor = KeysetCursor::decode(&token, &result.sort, DEFAULT_MAX_TOKEN_LEN).unwrap();
        assert_eq!(cursor.to_values(), vec![Value::Int(7)]);
    }
}
