//! Query derivation: from a method declaration to an immutable [`QueryPlan`].
//!
//! # Architecture
//!
//! - **Path**: property-path resolution against entity metadata (`path`)
//! - **Parser**: method-name grammar, subject and clause splitting (`parser`)
//! - **Predicate**: clauses, operators and the And/Or tree (`predicate`)
//! - **Sort**: sort criteria and the static/dynamic merge (`sort`)
//! - **Plan**: declarations, validation and the compiled plan (`plan`)
//!
//! # Examples
//!
//! ```rust
//! use seawall::metadata::EntityModel;
//! use seawall::query::{MethodDeclaration, QueryPlan, ResultKind, ReturnShape};
//! use seawall::ValueKind;
//!
//! let product = EntityModel::new("Product")
//!     .id("id", ValueKind::Int)
//!     .property("name", ValueKind::Text)
//!     .property("price", ValueKind::Float);
//!
//! let declaration = MethodDeclaration::new("findByNameLikeAndPriceLessThan", ReturnShape::Collection)
//!     .values(2);
//! let plan = QueryPlan::compile(&declaration, &product)?;
//!
//! assert_eq!(plan.result, ResultKind::Many);
//! assert_eq!(
//!     plan.predicate().map(ToString::to_string).as_deref(),
//!     Some("(Like(name, ?1) And LessThan(price, ?2))")
//! );
//! # Ok::<(), seawall::QueryError>(())
//! ```

pub mod parser;
pub mod path;
pub mod plan;
pub mod predicate;
pub mod sort;

pub use parser::{MethodNameParser, ParsedMethod, Subject};
pub use path::{resolve_token, PropertyPath};
pub use plan::{MethodDeclaration, ParameterKind, QueryPlan, QuerySource, ResultKind, ReturnShape};
pub use predicate::{Clause, Connector, Operand, Operator, PredicateTree};
pub use sort::{SortCriterion, SortDirection, SortSpec};
