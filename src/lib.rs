//! # Seawall
//!
//! Derived-query planning and keyset pagination for repository abstractions.
//!
//! A repository method such as `findByLastNameAndAgeGreaterThanOrderByIdAsc` is
//! compiled once into a [`QueryPlan`]: subject, predicate tree, static sort and
//! result kind, all validated against the entity's [`EntityMetadata`]. Plans are
//! executed through a [`Repository`] in front of any [`QueryExecutor`]; paged
//! methods traverse results with opaque keyset cursors or page offsets.
//!
//! ## Modules
//!
//! - **`query`** - Method-name parser, predicates, sorting and plan compilation
//! - **`pagination`** - Page requests, page results, keyset cursors and windows
//! - **`registry`** - Compile-once table of declared methods
//! - **`executor`** - Execution seam and the repository façade
//! - **`render`** - SQL statements built with sea-query
//! - **`memory`** - In-memory executor used by tests and tooling
//! - **`config`** / **`metrics`** - Settings and observability hooks
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use seawall::memory::{MemoryExecutor, Record};
//! use seawall::{DeclarationRegistry, EntityModel, MethodDeclaration, Repository, ReturnShape, ValueKind};
//! use seawall::executor::Argument;
//!
//! let person = Arc::new(
//!     EntityModel::new("Person")
//!         .id("id", ValueKind::Int)
//!         .property("age", ValueKind::Int),
//! );
//! let registry = DeclarationRegistry::new();
//! let plan = registry.declare(
//!     &MethodDeclaration::new("countByAgeGreaterThan", ReturnShape::Number).values(1),
//!     person.as_ref(),
//! )?;
//!
//! let executor = MemoryExecutor::new(vec![
//!     Record::new().with("id", 1).with("age", 30),
//!     Record::new().with("id", 2).with("age", 50),
//! ]);
//! let repository = Repository::new(executor, person);
//! let adults = repository.invoke(&plan, vec![Argument::value(40)])?;
//! assert_eq!(adults.count(), Some(1));
//! # Ok::<(), seawall::QueryError>(())
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod memory;
pub mod metadata;
pub mod metrics;
pub mod pagination;
pub mod query;
pub mod registry;
pub mod render;
pub mod value;

pub use config::{PaginationConfig, SeawallConfig};
pub use error::QueryError;
pub use executor::{Argument, Capabilities, QueryExecutor, QueryResult, Repository};
pub use metadata::{EntityMetadata, EntityModel};
pub use pagination::{Direction, KeysetCursor, PageMode, PageRequest, PageResult, Total};
pub use query::{MethodDeclaration, QueryPlan, ResultKind, ReturnShape, SortCriterion, SortSpec};
pub use registry::{DeclarationRegistry, MethodSignature};
pub use value::{Value, ValueKind};
