//! Execution seam and repository façade.
//!
//! [`QueryExecutor`] is implemented by whatever actually runs queries: it receives a
//! fully bound [`BoundQuery`] and returns rows. [`Repository`] sits in front of it:
//! it checks call-time arguments against a [`QueryPlan`], resolves the effective
//! sort, drives keyset or offset pagination and wraps the outcome in a
//! [`QueryResult`] chosen by the plan's result kind.

use crate::config::{PaginationConfig, SeawallConfig};
use crate::error::QueryError;
use crate::metadata::EntityMetadata;
use crate::metrics::{self, tracing_helpers};
use crate::pagination::{ensure_unique_ordering, KeysetCursor, KeysetWindow, PageMode, PageRequest, PageResult, SortKeySource};
use crate::query::parser::Subject;
use crate::query::plan::{ParameterKind, QueryPlan, QuerySource, ResultKind};
use crate::query::predicate::{Operator, PredicateTree};
use crate::query::sort::{self, canonicalize, SortSpec};
use crate::value::Value;
use config::ConfigError;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// What an executor can honor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub operators: HashSet<Operator>,
    pub keyset: bool,
    pub offset: bool,
    /// Fetching `size + 1` rows to detect a following page
    pub probe: bool,
    pub explicit_queries: bool,
}

impl Capabilities {
    /// Every operator and pagination mode.
    pub fn all() -> Self {
        Self {
            operators: Operator::PEEL_ORDER.into_iter().chain([Operator::Equal]).collect(),
            keyset: true,
            offset: true,
            probe: true,
            explicit_queries: true,
        }
    }

    pub fn without_operator(mut self, operator: Operator) -> Self {
        self.operators.remove(&operator);
        self
    }

    pub fn supports(&self, operator: Operator) -> bool {
        self.operators.contains(&operator)
    }
}

/// Where a bound query's rows come from
#[derive(Debug, Clone, PartialEq)]
pub enum BoundSource {
    /// Derived predicate with every parameter replaced by its value
    Derived(Option<PredicateTree>),
    Explicit { text: String, args: Vec<Value> },
}

/// A plan with call-time values applied, ready for an executor
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    pub entity: String,
    pub method: String,
    pub subject: Subject,
    pub source: BoundSource,
    /// Keyset seek predicate, to be combined with the source with `And`
    pub keyset: Option<PredicateTree>,
    /// Ordering to fetch rows in
    pub sort: SortSpec,
    pub limit: Option<usize>,
    pub offset: Option<u64>,
}

impl BoundQuery {
    /// Derived predicate and keyset predicate joined with `And`.
    ///
    /// `None` for an explicit query or when nothing filters rows.
    pub fn filter(&self) -> Option<PredicateTree> {
        match &self.source {
            BoundSource::Derived(predicate) => {
                PredicateTree::conjoin(predicate.clone(), self.keyset.clone())
            }
            BoundSource::Explicit { .. } => None,
        }
    }

    /// The same query without ordering or windowing, as used for counting.
    pub fn unwindowed(&self) -> BoundQuery {
        BoundQuery {
            keyset: None,
            sort: SortSpec::new(),
            limit: None,
            offset: None,
            ..self.clone()
        }
    }
}

/// Runs bound queries
pub trait QueryExecutor {
    type Row: SortKeySource;

    fn capabilities(&self) -> Capabilities;

    /// Rows matching the query, in query order, windowed by limit and offset.
    fn fetch(&self, query: &BoundQuery) -> Result<Vec<Self::Row>, QueryError>;

    fn count(&self, query: &BoundQuery) -> Result<u64, QueryError>;

    /// Remove matching rows and return them.
    fn delete(&self, query: &BoundQuery) -> Result<Vec<Self::Row>, QueryError>;

    /// Run `work` as one unit. Without transaction support this just calls it.
    fn in_transaction<R, F>(&self, work: F) -> Result<R, QueryError>
    where
        Self: Sized,
        F: FnOnce(&Self) -> Result<R, QueryError>,
    {
        work(self)
    }
}

/// A call-time argument, matched positionally to the plan's parameter kinds
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Value(Value),
    Limit(usize),
    Sort(SortSpec),
    Page(PageRequest),
}

impl Argument {
    pub fn value(v: impl Into<Value>) -> Self {
        Argument::Value(v.into())
    }

    fn kind(&self) -> ParameterKind {
        match self {
            Argument::Value(_) => ParameterKind::Value,
            Argument::Limit(_) => ParameterKind::Limit,
            Argument::Sort(_) => ParameterKind::Sort,
            Argument::Page(_) => ParameterKind::PageRequest,
        }
    }
}

impl From<PageRequest> for Argument {
    fn from(request: PageRequest) -> Self {
        Argument::Page(request)
    }
}

impl From<SortSpec> for Argument {
    fn from(sort: SortSpec) -> Self {
        Argument::Sort(sort)
    }
}

/// Outcome of a call, shaped by the plan's result kind
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult<T> {
    Count(u64),
    Exists(bool),
    Single(Option<T>),
    Many(Vec<T>),
    Page(PageResult<T>),
}

impl<T> QueryResult<T> {
    pub fn count(self) -> Option<u64> {
        match self {
            QueryResult::Count(n) => Some(n),
            _ => None,
        }
    }

    pub fn exists(self) -> Option<bool> {
        match self {
            QueryResult::Exists(b) => Some(b),
            _ => None,
        }
    }

    pub fn single(self) -> Option<Option<T>> {
        match self {
            QueryResult::Single(row) => Some(row),
            _ => None,
        }
    }

    pub fn many(self) -> Option<Vec<T>> {
        match self {
            QueryResult::Many(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn page(self) -> Option<PageResult<T>> {
        match self {
            QueryResult::Page(page) => Some(page),
            _ => None,
        }
    }
}

/// Arguments sorted by kind
#[derive(Default)]
struct CallArguments {
    values: Vec<Value>,
    limit: Option<usize>,
    sort: Option<SortSpec>,
    page: Option<PageRequest>,
}

impl CallArguments {
    fn split(plan: &QueryPlan, args: Vec<Argument>) -> Result<Self, QueryError> {
        if args.len() != plan.parameters.len() {
            return Err(QueryError::InvalidArgument(format!(
                "`{}` takes {} argument(s), got {}",
                plan.method,
                plan.parameters.len(),
                args.len()
            )));
        }

        let mut call = CallArguments::default();
        for (i, (arg, kind)) in args.into_iter().zip(&plan.parameters).enumerate() {
            if arg.kind() != *kind {
                return Err(QueryError::InvalidArgument(format!(
                    "argument {} of `{}` must be {kind:?}, got {:?}",
                    i + 1,
                    plan.method,
                    arg.kind()
                )));
            }
            match arg {
                Argument::Value(v) => call.values.push(v),
                Argument::Limit(0) => {
                    return Err(QueryError::InvalidArgument(
                        "limit must be greater than zero".to_string(),
                    ))
                }
                Argument::Limit(n) => call.limit = Some(n),
                Argument::Sort(s) => call.sort = Some(s),
                Argument::Page(p) => call.page = Some(p),
            }
        }
        Ok(call)
    }
}

/// Runs compiled plans against an executor
pub struct Repository<E: QueryExecutor> {
    executor: E,
    metadata: Arc<dyn EntityMetadata>,
    config: PaginationConfig,
}

impl<E: QueryExecutor> Repository<E> {
    pub fn new(executor: E, metadata: Arc<dyn EntityMetadata>) -> Self {
        Self::with_config(executor, metadata, PaginationConfig::default())
    }

    pub fn with_config(executor: E, metadata: Arc<dyn EntityMetadata>, config: PaginationConfig) -> Self {
        Self {
            executor,
            metadata,
            config,
        }
    }

    /// Build with settings from `config/seawall.toml` and `SEAWALL__*` env vars.
    pub fn configured(executor: E, metadata: Arc<dyn EntityMetadata>) -> Result<Self, ConfigError> {
        let settings = SeawallConfig::load()?;
        Ok(Self::with_config(executor, metadata, settings.pagination))
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn config(&self) -> &PaginationConfig {
        &self.config
    }

    /// Decode a cursor token issued for `sort`, bounded by the configured token length.
    pub fn decode_cursor(&self, token: &str, sort: &SortSpec) -> Result<KeysetCursor, QueryError> {
        KeysetCursor::decode(token, sort, self.config.max_cursor_token_len)
    }

    pub fn metadata(&self) -> &dyn EntityMetadata {
        self.metadata.as_ref()
    }

    /// First page request at the configured default size.
    pub fn first_page(&self) -> PageRequest {
        PageRequest::of_size(self.config.default_page_size)
    }

    /// Call `plan` with `args`.
    pub fn invoke(&self, plan: &QueryPlan, args: Vec<Argument>) -> Result<QueryResult<E::Row>, QueryError> {
        let _span = tracing_helpers::execute_span(&plan.method).entered();
        if plan.entity != self.metadata.entity_name() {
            return Err(QueryError::InvalidArgument(format!(
                "`{}` was compiled for `{}`, not `{}`",
                plan.method,
                plan.entity,
                self.metadata.entity_name()
            )));
        }

        let call = CallArguments::split(plan, args)?;
        let capabilities = self.executor.capabilities();
        self.check_capabilities(plan, &capabilities)?;

        let sort = self.effective_sort(plan, &call)?;
        let source = match &plan.source {
            QuerySource::Derived { predicate } => BoundSource::Derived(
                predicate.as_ref().map(|p| p.bind(&call.values)).transpose()?,
            ),
            QuerySource::Explicit { text, .. } => BoundSource::Explicit {
                text: text.clone(),
                args: call.values.clone(),
            },
        };
        let limit = match (plan.limit, call.limit) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let query = BoundQuery {
            entity: plan.entity.clone(),
            method: plan.method.clone(),
            subject: plan.subject,
            source,
            keyset: None,
            sort,
            limit,
            offset: None,
        };

        match plan.result {
            ResultKind::Count if plan.subject == Subject::Delete => {
                let removed = self.executor.in_transaction(|e| e.delete(&query))?;
                Ok(QueryResult::Count(removed.len() as u64))
            }
            ResultKind::Count => Ok(QueryResult::Count(self.executor.count(&query)?)),
            ResultKind::Exists => Ok(QueryResult::Exists(self.executor.count(&query)? > 0)),
            ResultKind::Many if plan.subject == Subject::Delete => {
                Ok(QueryResult::Many(self.executor.in_transaction(|e| e.delete(&query))?))
            }
            ResultKind::Many => Ok(QueryResult::Many(self.executor.fetch(&query)?)),
            ResultKind::Single => self.single(plan, query),
            ResultKind::Page => {
                let request = call.page.ok_or_else(|| {
                    QueryError::InvalidArgument(format!("`{}` needs a PageRequest argument", plan.method))
                })?;
                self.page(plan, query, request, &capabilities)
                    .map(QueryResult::Page)
            }
        }
    }

    fn check_capabilities(&self, plan: &QueryPlan, capabilities: &Capabilities) -> Result<(), QueryError> {
        match &plan.source {
            QuerySource::Explicit { .. } if !capabilities.explicit_queries => {
                Err(QueryError::UnsupportedByProvider(format!(
                    "explicit query text in `{}`",
                    plan.method
                )))
            }
            QuerySource::Explicit { .. } => Ok(()),
            QuerySource::Derived { predicate } => {
                let clauses = predicate.as_ref().map(PredicateTree::clauses).unwrap_or_default();
                match clauses.iter().find(|c| !capabilities.supports(c.operator)) {
                    Some(c) => Err(QueryError::UnsupportedByProvider(format!(
                        "operator {:?} in `{}`",
                        c.operator, plan.method
                    ))),
                    None => Ok(()),
                }
            }
        }
    }

    /// Static criteria first, then the single dynamic source, checked against the plan.
    fn effective_sort(&self, plan: &QueryPlan, call: &CallArguments) -> Result<SortSpec, QueryError> {
        let dynamic = sort::dynamic_source(
            &plan.method,
            call.sort.as_ref(),
            call.page.as_ref().map(|p| &p.sort),
        )?;
        if plan.is_ordered_query() && dynamic.is_some() {
            return Err(QueryError::ConflictingSortSource {
                method: plan.method.clone(),
                reason: "ORDER BY in the query text and call-time sort criteria".to_string(),
            });
        }
        let dynamic = dynamic
            .map(|d| canonicalize(d, self.metadata.as_ref()))
            .transpose()?;
        Ok(sort::resolve(plan.static_sort.as_ref(), dynamic.as_ref()))
    }

    fn single(&self, plan: &QueryPlan, mut query: BoundQuery) -> Result<QueryResult<E::Row>, QueryError> {
        // A plain findBy must match at most one row; fetch two to tell
        let unique = query.limit.is_none();
        if unique {
            query.limit = Some(2);
        }
        let mut rows = self.executor.fetch(&query)?;
        if unique && rows.len() > 1 {
            return Err(QueryError::Execution(format!(
                "`{}` expected at most one result",
                plan.method
            )));
        }
        Ok(QueryResult::Single(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        }))
    }

    fn page(
        &self,
        plan: &QueryPlan,
        query: BoundQuery,
        request: PageRequest,
        capabilities: &Capabilities,
    ) -> Result<PageResult<E::Row>, QueryError> {
        request.validate(self.config.max_page_size)?;
        let _span = tracing_helpers::fetch_page_span(&plan.method, request.size).entered();
        let started = Instant::now();

        let mode = match request.mode {
            PageMode::Cursor if !capabilities.keyset => {
                return Err(QueryError::UnsupportedByProvider(
                    "keyset pagination".to_string(),
                ))
            }
            PageMode::Offset { .. } if !capabilities.offset => {
                return Err(QueryError::UnsupportedByProvider(
                    "offset pagination".to_string(),
                ))
            }
            PageMode::Cursor => {
                ensure_unique_ordering(self.metadata.as_ref(), &query.sort)?;
                "keyset"
            }
            PageMode::Offset { .. } => "offset",
        };

        let probe = self.config.probe_next && capabilities.probe;
        let sort = query.sort.clone();
        let window = KeysetWindow::plan(&request, &sort, probe)?;
        let total = match request.mode {
            PageMode::Offset { .. } => Some(self.executor.count(&query.unwindowed())?),
            PageMode::Cursor => None,
        };

        let fetch = BoundQuery {
            keyset: window.keyset.clone(),
            sort: window.fetch_sort.clone(),
            limit: Some(window.limit),
            offset: window.offset,
            ..query
        };
        let rows = self.executor.fetch(&fetch)?;
        let page = window.assemble(&request, &sort, rows, probe, total)?;

        log::debug!(
            "{} {mode} page: {} item(s), has_next={}, has_previous={}",
            plan.method,
            page.len(),
            page.has_next,
            page.has_previous
        );
        metrics::record_page(mode, started.elapsed());
        Ok(page)
    }
}
