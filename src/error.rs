//! Error types for declaration-time validation and call-time execution.
//!
//! Declaration errors are raised once, when a repository method is compiled into a
//! [`QueryPlan`](crate::query::QueryPlan), and make the method unusable. Call-time
//! errors are raised per invocation. None of them are transient, so nothing here is
//! ever retried.

use thiserror::Error;

/// Seawall error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Method name does not start with a known subject keyword
    #[error("unsupported subject in method `{method}`: expected findBy, deleteBy, countBy or existsBy")]
    UnsupportedSubject { method: String },

    /// A property token does not resolve against the entity
    #[error("invalid property `{token}` on entity `{entity}`")]
    InvalidProperty { entity: String, token: String },

    /// A property token resolves to more than one path
    #[error("ambiguous property `{token}`: matches {}; use `_` to separate path segments", candidates.join(", "))]
    AmbiguousProperty {
        token: String,
        candidates: Vec<String>,
    },

    /// Clause operands don't line up with declared value parameters
    #[error("arity mismatch in `{method}`: clauses need {expected} parameter(s), {found} declared")]
    ArityMismatch {
        method: String,
        expected: usize,
        found: usize,
    },

    /// Sort criteria supplied from a source that is not allowed alongside another one
    #[error("conflicting sort source in `{method}`: {reason}")]
    ConflictingSortSource { method: String, reason: String },

    /// More than one dynamic sort source
    #[error("conflicting dynamic sort in `{method}`: a Sort parameter and a PageRequest parameter both supply ordering")]
    ConflictingDynamicSort { method: String },

    /// Keyset ordering does not identify rows uniquely
    #[error("partial ordering for `{entity}`: sort [{sort}] does not include a unique property")]
    PartialOrderingError { entity: String, sort: String },

    /// Subject keyword cannot produce the declared return shape
    #[error("`{method}` cannot return {declared}")]
    IncompatibleReturn { method: String, declared: String },

    /// Operator or modifier applied to a property of the wrong type
    #[error("`{method}`: {operator} cannot be applied to `{property}` of type {kind}")]
    IncompatibleOperator {
        method: String,
        property: String,
        operator: String,
        kind: String,
    },

    /// The execution provider cannot honor a keyword or pagination mode
    #[error("unsupported by provider: {0}")]
    UnsupportedByProvider(String),

    /// Navigation was requested from a page that has no items
    #[error("cannot derive a page request from an empty page")]
    EmptyCursorNavigation,

    /// Call-time arguments don't fit the compiled plan
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A cursor token or value list could not be decoded
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    /// A cursor was produced for a different ordering
    #[error("cursor was issued for a different sort order")]
    CursorMismatch,

    /// Failure reported by the execution collaborator
    #[error("execution error: {0}")]
    Execution(String),
}

impl QueryError {
    /// Whether this error is raised while compiling a declaration.
    pub fn is_declaration(&self) -> bool {
        matches!(
            self,
            QueryError::UnsupportedSubject { .. }
                | QueryError::InvalidProperty { .. }
                | QueryError::AmbiguousProperty { .. }
                | QueryError::ArityMismatch { .. }
                | QueryError::ConflictingSortSource { .. }
                | QueryError::ConflictingDynamicSort { .. }
                | QueryError::PartialOrderingError { .. }
                | QueryError::IncompatibleReturn { .. }
                | QueryError::IncompatibleOperator { .. }
        )
    }

    /// Short stable label, used as a metric attribute.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::UnsupportedSubject { .. } => "unsupported_subject",
            QueryError::InvalidProperty { .. } => "invalid_property",
            QueryError::AmbiguousProperty { .. } => "ambiguous_property",
            QueryError::ArityMismatch { .. } => "arity_mismatch",
            QueryError::ConflictingSortSource { .. } => "conflicting_sort_source",
            QueryError::ConflictingDynamicSort { .. } => "conflicting_dynamic_sort",
            QueryError::PartialOrderingError { .. } => "partial_ordering",
            QueryError::IncompatibleReturn { .. } => "incompatible_return",
            QueryError::IncompatibleOperator { .. } => "incompatible_operator",
            QueryError::UnsupportedByProvider(_) => "unsupported_by_provider",
            QueryError::EmptyCursorNavigation => "empty_cursor_navigation",
            QueryError::InvalidArgument(_) => "invalid_argument",
            QueryError::InvalidCursor(_) => "invalid_cursor",
            QueryError::CursorMismatch => "cursor_mismatch",
            QueryError::Execution(_) => "execution",
        }
    }
}
