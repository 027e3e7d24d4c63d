//! Sort criteria and the static/dynamic sort merge.
//!
//! Static criteria come from an `OrderBy` clause in the method name or from a
//! sort annotation on the declaration; dynamic criteria arrive per call through
//! a `Sort` or `PageRequest` argument. Static criteria always come first and
//! dynamic ones only break ties: a dynamic criterion on a property the static
//! spec already orders by is dropped.

use crate::error::QueryError;
use crate::metadata::EntityMetadata;
use crate::query::path::PropertyPath;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sort direction of a single criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Return the opposite sort direction.
    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

/// One ordering criterion
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortCriterion {
    pub path: PropertyPath,
    pub direction: SortDirection,
    #[serde(default)]
    pub ignore_case: bool,
}

impl SortCriterion {
    pub fn asc(path: PropertyPath) -> Self {
        Self {
            path,
            direction: SortDirection::Asc,
            ignore_case: false,
        }
    }

    pub fn desc(path: PropertyPath) -> Self {
        Self {
            path,
            direction: SortDirection::Desc,
            ignore_case: false,
        }
    }

    pub fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    fn reversed(&self) -> Self {
        Self {
            direction: self.direction.reversed(),
            ..self.clone()
        }
    }
}

impl fmt::Display for SortCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.path, self.direction)?;
        if self.ignore_case {
            write!(f, " IgnoreCase")?;
        }
        Ok(())
    }
}

/// Ordered sort criteria with unique property paths
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortSpec(Vec<SortCriterion>);

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a criterion unless its path is already ordered by. Returns whether it was kept.
    pub fn push(&mut self, criterion: SortCriterion) -> bool {
        if self.contains(&criterion.path) {
            return false;
        }
        self.0.push(criterion);
        true
    }

    pub fn then(mut self, criterion: SortCriterion) -> Self {
        self.push(criterion);
        self
    }

    pub fn contains(&self, path: &PropertyPath) -> bool {
        self.0.iter().any(|c| c.path == *path)
    }

    pub fn criteria(&self) -> &[SortCriterion] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &PropertyPath> {
        self.0.iter().map(|c| &c.path)
    }

    /// Every criterion with its direction flipped, used to fetch a page backwards.
    pub fn reversed(&self) -> SortSpec {
        SortSpec(self.0.iter().map(SortCriterion::reversed).collect())
    }
}

impl FromIterator<SortCriterion> for SortSpec {
    fn from_iter<I: IntoIterator<Item = SortCriterion>>(iter: I) -> Self {
        let mut spec = SortSpec::new();
        for criterion in iter {
            spec.push(criterion);
        }
        spec
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// Merge static and dynamic criteria: static first, later duplicates dropped.
pub fn resolve(static_sort: Option<&SortSpec>, dynamic_sort: Option<&SortSpec>) -> SortSpec {
    static_sort
        .into_iter()
        .chain(dynamic_sort)
        .flat_map(|spec| spec.criteria().iter().cloned())
        .collect()
}

/// Pick the single dynamic sort source of a call.
///
/// A call may carry criteria through a `Sort` argument or through its
/// `PageRequest`, never both.
pub fn dynamic_source<'a>(
    method: &str,
    sort_argument: Option<&'a SortSpec>,
    page_sort: Option<&'a SortSpec>,
) -> Result<Option<&'a SortSpec>, QueryError> {
    let sort_argument = sort_argument.filter(|s| !s.is_empty());
    let page_sort = page_sort.filter(|s| !s.is_empty());
    match (sort_argument, page_sort) {
        (Some(_), Some(_)) => Err(QueryError::ConflictingDynamicSort {
            method: method.to_string(),
        }),
        (a, b) => Ok(a.or(b)),
    }
}

/// Resolve every path of a caller-supplied sort against `metadata`, returning
/// the declared spelling of each.
pub fn canonicalize(sort: &SortSpec, metadata: &dyn EntityMetadata) -> Result<SortSpec, QueryError> {
    sort.criteria()
        .iter()
        .map(|c| -> Result<SortCriterion, QueryError> {
            Ok(SortCriterion {
                path: metadata.resolve_path(&c.path.to_string())?,
                ..c.clone()
            })
        })
        .collect()
}
